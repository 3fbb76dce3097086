//! # Playroom Client
//!
//! Client core of a turn-based multiplayer game platform: keeps a player's
//! view of a tic-tac-toe session in step with the authoritative server.
//!
//! The server pushes complete session snapshots over a persistent real-time
//! channel; the client renders them, pre-checks its own moves, and offers
//! an optimistic win/draw hint until the server's verdict arrives. Server
//! truth always wins.
//!
//! ## Features
//!
//! - **Session synchronization** - [`SessionSynchronizer`] owns the channel,
//!   reconnects with a bounded fixed-delay retry and rejoins the subscribed
//!   room after a drop
//! - **Reconciliation** - [`BoardReconciler`] folds snapshots into the
//!   presented [`GameSession`](reconciler::GameSession) and enforces the
//!   at-most-one-pending-move rule
//! - **Transport-agnostic** - implement [`Connector`] and [`Transport`] for
//!   any backend; chain them with [`FallbackConnector`]
//! - **WebSocket built-in** - default `transport-websocket` feature
//! - **REST client** - default `rest-client` feature provides
//!   [`HttpGameApi`](api::HttpGameApi); [`PollingSession`](polling::PollingSession)
//!   plays single-player games over it
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "transport-websocket", feature = "rest-client"))]
//! # async fn example() -> playroom_client::error::Result<()> {
//! use playroom_client::api::{ApiConfig, GameApi, HttpGameApi};
//! use playroom_client::{SessionSynchronizer, SyncConfig, SyncUpdate, WebSocketConnector};
//!
//! let config = ApiConfig::from_env();
//! let mut api = HttpGameApi::new(config.clone())?;
//! let auth = api.login("ann@example.com", "hunter22").await?;
//! let game = api.join_room("K3XQ").await?;
//!
//! let mut sync = SessionSynchronizer::new(
//!     WebSocketConnector::new(config.channel_url()),
//!     SyncConfig::default(),
//! );
//! sync.set_local_player(auth.user.id);
//! sync.connect(auth.token);
//! sync.join_room(game.id);
//!
//! while let Some(update) = sync.next_update().await {
//!     if let SyncUpdate::GameOver { outcome } = update {
//!         println!("game over: {outcome:?}");
//!         break;
//!     }
//! }
//! sync.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod board;
pub mod credential;
pub mod error;
pub mod event;
pub mod polling;
pub mod protocol;
pub mod reconciler;
pub mod synchronizer;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use credential::{Credential, CredentialStore, FileCredentialStore};
pub use error::PlayroomError;
pub use event::{ConnectionStatus, SyncUpdate};
pub use protocol::{ClientMessage, ServerMessage};
pub use reconciler::BoardReconciler;
pub use synchronizer::{SessionSynchronizer, SyncConfig};
pub use transport::{Connector, FallbackConnector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
