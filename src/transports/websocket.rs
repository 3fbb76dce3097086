//! WebSocket transport using `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] opens the streaming channel, carrying the bearer
//! token in the handshake's `Authorization` header. [`WebSocketTransport`]
//! maps text frames to protocol messages. Both `ws://` and `wss://` are
//! supported through [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), playroom_client::PlayroomError> {
//! use playroom_client::{Connector, Credential, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("ws://localhost:5000/ws");
//! let mut transport = connector.connect(&Credential::new("jwt")).await?;
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::credential::Credential;
use crate::error::PlayroomError;
use crate::transport::{Connector, Transport};

/// The underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Opens [`WebSocketTransport`]s to a fixed URL.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn Transport>, PlayroomError> {
        let transport = WebSocketTransport::connect(&self.url, credential).await?;
        Ok(Box::new(transport))
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

/// A [`Transport`] backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future before it
/// completes does not consume a frame.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to `url`, authenticating with `credential`.
    ///
    /// # Errors
    ///
    /// Returns [`PlayroomError::ConnectFailed`] if the URL or token cannot be
    /// turned into a handshake request, and [`PlayroomError::Io`] if the
    /// connection cannot be established (the I/O error kind is preserved
    /// where there is one).
    pub async fn connect(url: &str, credential: &Credential) -> Result<Self, PlayroomError> {
        tracing::debug!(url = %url, "connecting to game channel");

        let mut request = url
            .into_client_request()
            .map_err(|e| PlayroomError::ConnectFailed(format!("bad channel url {url}: {e}")))?;
        let bearer = HeaderValue::from_str(&credential.bearer())
            .map_err(|e| PlayroomError::ConnectFailed(format!("bad credential: {e}")))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, _response) = tokio_tungstenite::connect_async(request).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            PlayroomError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "game channel established");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established stream (custom TLS, proxies, ...).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), PlayroomError> {
        if self.closed {
            return Err(PlayroomError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| PlayroomError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, PlayroomError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(PlayroomError::TransportReceive(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "game channel closed by server");
                    return None;
                }
                // tungstenite queues the pong reply itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("unexpected binary frame on game channel, skipping");
                }
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), PlayroomError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| PlayroomError::TransportSend(e.to_string()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    type Header = Arc<StdMutex<Option<String>>>;

    /// Accept one WebSocket connection, record its `Authorization` header and
    /// run `handler` on it. Returns the URL to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> (String, Header)
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let header: Header = Arc::new(StdMutex::new(None));
        let seen = Arc::clone(&header);

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_hdr_async(
                tcp,
                |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    *seen.lock().unwrap() = req
                        .headers()
                        .get(AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    Ok(resp)
                },
            )
            .await
            .unwrap();
            handler(ws).await;
        });

        (format!("ws://{addr}"), header)
    }

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url", &Credential::new("t"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlayroomError::ConnectFailed(_) | PlayroomError::Io(_)
        ));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1", &Credential::new("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, PlayroomError::Io(_)));
    }

    #[tokio::test]
    async fn handshake_carries_bearer_token() {
        let (url, header) = start_mock_server(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let connector = WebSocketConnector::new(url);
        let mut transport = connector.connect(&Credential::new("jwt-123")).await.unwrap();
        assert!(transport.recv().await.is_none());
        assert_eq!(header.lock().unwrap().as_deref(), Some("Bearer jwt-123"));
    }

    #[tokio::test]
    async fn recv_skips_control_and_binary_frames() {
        let (url, _) = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into())).await.unwrap();
            ws.send(Message::Ping(vec![1].into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"error","data":{"message":"x"}}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url, &Credential::new("t"))
            .await
            .unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert!(msg.contains("\"error\""));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_reaches_server() {
        let (url, _) = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url, &Credential::new("t"))
            .await
            .unwrap();
        transport
            .send(r#"{"type":"join-game","data":"g1"}"#.to_string())
            .await
            .unwrap();
        let echoed = transport.recv().await.unwrap().unwrap();
        assert!(echoed.contains("join-game"));
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let (url, _) =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url, &Credential::new("t"))
            .await
            .unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, PlayroomError::TransportClosed));
    }
}
