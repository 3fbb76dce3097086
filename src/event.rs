//! Updates and connection status surfaced to callers.

use crate::protocol::PlayerId;
use crate::reconciler::GameOutcome;

/// What changed after an inbound event was reconciled.
///
/// Returned by [`SessionSynchronizer::next_update`](crate::SessionSynchronizer::next_update)
/// and [`PollingSession::next_update`](crate::polling::PollingSession::next_update).
/// The session itself is read from the reconciler; updates only say why it
/// should be re-read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncUpdate {
    /// A snapshot replaced the session.
    SessionUpdated,
    /// Play began; the board was reset to the snapshot's board.
    GameStarted,
    /// The server ended the session.
    GameOver {
        /// Authoritative result, when the server reported one.
        outcome: Option<GameOutcome>,
    },
    /// A participant changed readiness.
    PlayerReady { player_id: PlayerId },
    /// A participant dropped off the channel.
    PlayerDisconnected { player_id: PlayerId },
    /// The server rejected a request. Local state is unchanged.
    ServerError { message: String },
    /// The connection is gone for good (reconnection gave up or the link
    /// closed). A fresh `connect()` is required.
    Disconnected {
        /// Human-readable reason, if known.
        reason: Option<String>,
    },
}

/// Lifecycle of the real-time connection.
///
/// Observed through a [`tokio::sync::watch`] receiver so a UI can show a
/// retry-in-progress state without any application-level event traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// First connection attempt in progress.
    #[default]
    Connecting,
    /// A transport is established.
    Connected,
    /// The transport dropped; retry `attempt` (1-based) is pending.
    Reconnecting { attempt: u32 },
    /// Retries are exhausted or the client disconnected.
    Disconnected,
}

impl ConnectionStatus {
    /// Whether a usable transport is established.
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connected_counts_as_connected() {
        assert!(ConnectionStatus::Connected.is_connected());
        assert!(!ConnectionStatus::default().is_connected());
        assert!(!ConnectionStatus::Reconnecting { attempt: 2 }.is_connected());
        assert!(!ConnectionStatus::Disconnected.is_connected());
    }
}
