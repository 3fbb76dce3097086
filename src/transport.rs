//! Transport and connector abstractions for the real-time channel.
//!
//! A [`Transport`] is one established bidirectional text message channel.
//! A [`Connector`] knows how to establish a transport for a credential; the
//! synchronizer calls it for the first connection and again for every
//! reconnection attempt.
//!
//! Transport fallback is expressed by chaining connectors with
//! [`FallbackConnector`]: when the preferred transport cannot be
//! established, the next one is tried, and callers of the synchronizer never
//! learn which one is in use.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use playroom_client::error::PlayroomError;
//! use playroom_client::transport::Transport;
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), PlayroomError> {
//!         // Send one JSON text frame
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, PlayroomError>> {
//!         // Receive the next JSON text frame; None on clean close
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), PlayroomError> {
//!         todo!()
//!     }
//! }
//! ```

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::credential::Credential;
use crate::error::PlayroomError;

/// A bidirectional text message transport.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON
/// message and each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe: it is polled inside
/// `tokio::select!`, and a cancelled call must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`PlayroomError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), PlayroomError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns `Some(Ok(text))` for a message, `Some(Err(e))` for a transport
    /// error and `None` when the server closed the connection cleanly.
    async fn recv(&mut self) -> Option<Result<String, PlayroomError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are released
    /// regardless.
    async fn close(&mut self) -> Result<(), PlayroomError>;
}

/// Establishes authenticated transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new transport authenticated with `credential`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be established.
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn Transport>, PlayroomError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "connector"
    }
}

/// Tries `primary`, then `fallback` when the primary cannot connect.
#[derive(Debug, Clone)]
pub struct FallbackConnector<P, F> {
    primary: P,
    fallback: F,
}

impl<P: Connector, F: Connector> FallbackConnector<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P: Connector, F: Connector> Connector for FallbackConnector<P, F> {
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn Transport>, PlayroomError> {
        match self.primary.connect(credential).await {
            Ok(transport) => Ok(transport),
            Err(primary_err) => {
                debug!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    "primary transport unavailable ({primary_err}), degrading"
                );
                self.fallback.connect(credential).await.map_err(|e| {
                    warn!(fallback = self.fallback.name(), "fallback transport failed: {e}");
                    PlayroomError::ConnectFailed(format!(
                        "{}: {primary_err}; {}: {e}",
                        self.primary.name(),
                        self.fallback.name()
                    ))
                })
            }
        }
    }

    fn name(&self) -> &str {
        self.primary.name()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NullTransport(&'static str);

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&mut self, _message: String) -> Result<(), PlayroomError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, PlayroomError>> {
            Some(Ok(self.0.to_string()))
        }

        async fn close(&mut self) -> Result<(), PlayroomError> {
            Ok(())
        }
    }

    struct Fixed {
        label: &'static str,
        works: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for Fixed {
        async fn connect(&self, _credential: &Credential) -> Result<Box<dyn Transport>, PlayroomError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.works {
                Ok(Box::new(NullTransport(self.label)))
            } else {
                Err(PlayroomError::ConnectFailed(format!("{} down", self.label)))
            }
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    fn fixed(label: &'static str, works: bool) -> (Fixed, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Fixed {
                label,
                works,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    #[tokio::test]
    async fn uses_primary_when_available() {
        let (primary, primary_calls) = fixed("stream", true);
        let (fallback, fallback_calls) = fixed("poll", true);
        let chain = FallbackConnector::new(primary, fallback);

        let mut t = chain.connect(&Credential::new("t")).await.unwrap();
        assert_eq!(t.recv().await.unwrap().unwrap(), "stream");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn degrades_to_fallback() {
        let (primary, _) = fixed("stream", false);
        let (fallback, fallback_calls) = fixed("poll", true);
        let chain = FallbackConnector::new(primary, fallback);

        let mut t = chain.connect(&Credential::new("t")).await.unwrap();
        assert_eq!(t.recv().await.unwrap().unwrap(), "poll");
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reports_both_failures() {
        let (primary, _) = fixed("stream", false);
        let (fallback, _) = fixed("poll", false);
        let chain = FallbackConnector::new(primary, fallback);

        let err = chain.connect(&Credential::new("t")).await.err().unwrap();
        let PlayroomError::ConnectFailed(msg) = err else {
            panic!("expected ConnectFailed");
        };
        assert!(msg.contains("stream down"));
        assert!(msg.contains("poll down"));
    }
}
