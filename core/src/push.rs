//! Push transport abstraction.
//!
//! The core treats the socket as something that delivers text frames and
//! reports open and close. A [`PushTransport`] opens a [`PushConnection`]:
//! a sink for outgoing frames plus a stream of [`TransportEvent`]s.

use crate::error::SyncError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Raw event produced by a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived
    Text(String),
    /// The peer closed the connection, with its close code if one was sent
    Closed(Option<u16>),
    /// The connection failed
    Error(String),
}

/// Event delivered to the reducer by the runtime.
///
/// Carries no connection identity; the mapper installed with
/// [`crate::effect::PushOperation::Open`] tags it with one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// The connection is established
    Opened,
    /// A text frame arrived
    Message(String),
    /// The connection ended or could not be established
    Closed {
        /// Close code; `None` when no close frame was received
        code: Option<u16>,
        /// Human-readable reason
        reason: String,
    },
}

/// Outgoing half of a connection.
#[async_trait]
pub trait PushSink: Send {
    /// Send one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConnectionError`] if the socket is gone.
    async fn send_text(&mut self, text: String) -> Result<(), SyncError>;

    /// Close the connection with `code`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConnectionError`] if the close frame could not be sent.
    async fn close(&mut self, code: u16, reason: String) -> Result<(), SyncError>;
}

/// A live connection.
pub struct PushConnection {
    /// Outgoing frames
    pub sink: Box<dyn PushSink>,
    /// Incoming events; the stream ends when the connection is gone
    pub events: BoxStream<'static, TransportEvent>,
}

impl std::fmt::Debug for PushConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushConnection").finish_non_exhaustive()
    }
}

/// Opens push connections.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Establish a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ConnectionError`] if the handshake fails.
    async fn connect(&self) -> Result<PushConnection, SyncError>;
}
