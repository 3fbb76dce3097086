//! Concrete [`Connector`](crate::Connector) / [`Transport`](crate::Transport)
//! implementations behind feature gates.
//!
//! | Feature                | Connector              |
//! |------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketConnector`] |
//!
//! Chain a WebSocket connector with any other connector through
//! [`FallbackConnector`](crate::FallbackConnector) to degrade when the
//! streaming upgrade is unavailable.

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
