//! WebSocket adapter for [`PushTransport`].

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use workshop_sync_core::SyncError;
use workshop_sync_core::push::{PushConnection, PushSink, PushTransport, TransportEvent};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn connection_error(error: impl std::fmt::Display) -> SyncError {
    SyncError::ConnectionError(error.to_string())
}

/// Push transport over a WebSocket
#[derive(Debug, Clone)]
pub struct WsPushTransport {
    url: String,
    token: Option<String>,
}

impl WsPushTransport {
    /// Transport connecting to `url`, authenticating with `token` if given
    #[must_use]
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            url: url.into(),
            token,
        }
    }

    fn handshake_request(&self) -> Result<Request, SyncError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(connection_error)?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(connection_error)?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

#[async_trait]
impl PushTransport for WsPushTransport {
    async fn connect(&self) -> Result<PushConnection, SyncError> {
        let request = self.handshake_request()?;
        let (socket, response) = connect_async(request).await.map_err(connection_error)?;
        tracing::debug!(url = %self.url, status = response.status().as_u16(), "WebSocket handshake complete");

        let (sink, stream) = socket.split();
        Ok(PushConnection {
            sink: Box::new(WsSink { sink }),
            events: translate(stream).boxed(),
        })
    }
}

/// Map WebSocket frames to transport events.
///
/// Control frames are answered by tungstenite and produce no event.
fn translate<S>(frames: S) -> impl Stream<Item = TransportEvent> + Send
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Send,
{
    frames.filter_map(|frame| async move {
        match frame {
            Ok(Message::Text(text)) => Some(TransportEvent::Text(text)),
            Ok(Message::Close(frame)) => {
                Some(TransportEvent::Closed(frame.map(|f| u16::from(f.code))))
            }
            Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                None
            }
            Err(error) => Some(TransportEvent::Error(error.to_string())),
        }
    })
}

struct WsSink {
    sink: SplitSink<Socket, Message>,
}

#[async_trait]
impl PushSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), SyncError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(connection_error)
    }

    async fn close(&mut self, code: u16, reason: String) -> Result<(), SyncError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        self.sink
            .send(Message::Close(Some(frame)))
            .await
            .map_err(connection_error)
    }
}
