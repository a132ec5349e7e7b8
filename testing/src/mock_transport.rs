//! Scriptable push transport and recording query cache.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc;
use std::sync::{Arc, Mutex};
use workshop_sync_core::SyncError;
use workshop_sync_core::message::QueryKey;
use workshop_sync_core::push::{PushConnection, PushSink, PushTransport, TransportEvent};
use workshop_sync_core::query_cache::QueryCache;

#[derive(Debug, Default)]
struct TransportLog {
    connects: usize,
    failures_pending: usize,
    live: Option<mpsc::UnboundedSender<TransportEvent>>,
    sent: Vec<String>,
    closes: Vec<u16>,
}

/// In-memory [`PushTransport`].
///
/// Every successful `connect` creates a new live connection; the test drives
/// it with the `emit_*` methods and inspects what the client sent.
///
/// # Example
///
/// ```
/// use workshop_sync_testing::mocks::MockTransport;
///
/// let transport = MockTransport::new();
/// transport.fail_next_connects(2);
/// assert_eq!(transport.connect_count(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    log: Arc<Mutex<TransportLog>>,
}

impl MockTransport {
    /// Create a transport whose connects succeed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connects fail
    pub fn fail_next_connects(&self, n: usize) {
        self.log.lock().unwrap().failures_pending = n;
    }

    /// Number of connect attempts, failed ones included
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.log.lock().unwrap().connects
    }

    /// Whether a connection is live
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.log.lock().unwrap().live.is_some()
    }

    /// Text frames sent by the client, across all connections
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.log.lock().unwrap().sent.clone()
    }

    /// Close codes sent by the client, across all connections
    #[must_use]
    pub fn closes(&self) -> Vec<u16> {
        self.log.lock().unwrap().closes.clone()
    }

    /// Deliver a text frame on the live connection
    pub fn emit_text(&self, text: &str) {
        self.emit(TransportEvent::Text(text.to_string()));
    }

    /// End the live connection with a close frame
    pub fn emit_closed(&self, code: Option<u16>) {
        self.emit(TransportEvent::Closed(code));
        self.log.lock().unwrap().live = None;
    }

    /// End the live connection with an error
    pub fn emit_error(&self, reason: &str) {
        self.emit(TransportEvent::Error(reason.to_string()));
        self.log.lock().unwrap().live = None;
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(live) = &self.log.lock().unwrap().live {
            let _ = live.unbounded_send(event);
        }
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn connect(&self) -> Result<PushConnection, SyncError> {
        let mut log = self.log.lock().unwrap();
        log.connects += 1;

        if log.failures_pending > 0 {
            log.failures_pending -= 1;
            return Err(SyncError::ConnectionError("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded();
        log.live = Some(tx);

        Ok(PushConnection {
            sink: Box::new(MockSink {
                log: Arc::clone(&self.log),
            }),
            events: rx.boxed(),
        })
    }
}

struct MockSink {
    log: Arc<Mutex<TransportLog>>,
}

#[async_trait]
impl PushSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<(), SyncError> {
        let mut log = self.log.lock().unwrap();
        if log.live.is_none() {
            return Err(SyncError::ConnectionError("connection closed".to_string()));
        }
        log.sent.push(text);
        Ok(())
    }

    async fn close(&mut self, code: u16, _reason: String) -> Result<(), SyncError> {
        let mut log = self.log.lock().unwrap();
        log.closes.push(code);
        log.live = None;
        Ok(())
    }
}

/// [`QueryCache`] that records every invalidation.
#[derive(Debug, Default)]
pub struct RecordingQueryCache {
    keys: Mutex<Vec<QueryKey>>,
}

impl RecordingQueryCache {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys invalidated so far, in order
    #[must_use]
    pub fn invalidated(&self) -> Vec<QueryKey> {
        self.keys.lock().unwrap().clone()
    }

    /// Return and forget the keys invalidated so far
    pub fn take(&self) -> Vec<QueryKey> {
        std::mem::take(&mut *self.keys.lock().unwrap())
    }
}

impl QueryCache for RecordingQueryCache {
    fn invalidate(&self, key: &QueryKey) {
        self.keys.lock().unwrap().push(key.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emitted_events_reach_the_live_connection() {
        let transport = MockTransport::new();
        let mut connection = transport.connect().await.unwrap();

        transport.emit_text("hello");
        transport.emit_closed(Some(1000));

        assert_eq!(
            connection.events.next().await,
            Some(TransportEvent::Text("hello".to_string()))
        );
        assert_eq!(
            connection.events.next().await,
            Some(TransportEvent::Closed(Some(1000)))
        );
        assert_eq!(connection.events.next().await, None);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn scripted_failures_are_counted() {
        let transport = MockTransport::new();
        transport.fail_next_connects(1);

        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_ok());
        assert_eq!(transport.connect_count(), 2);
    }

    #[tokio::test]
    async fn sink_records_frames_and_close_codes() {
        let transport = MockTransport::new();
        let mut connection = transport.connect().await.unwrap();

        connection.sink.send_text("ping".to_string()).await.unwrap();
        connection.sink.close(4000, "bye".to_string()).await.unwrap();

        assert_eq!(transport.sent(), vec!["ping".to_string()]);
        assert_eq!(transport.closes(), vec![4000]);
        assert!(connection.sink.send_text("late".to_string()).await.is_err());
    }
}
