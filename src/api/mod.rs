//! REST surface of the game backend.
//!
//! [`GameApi`] is the request/response half of the platform: profile, room
//! and game CRUD, and move submission for the polling variant. The
//! [`HttpGameApi`] implementation (feature `rest-client`) talks to the
//! backend over `reqwest`; tests and alternative backends implement the
//! trait directly.

#[cfg(feature = "rest-client")]
mod http;

#[cfg(feature = "rest-client")]
pub use http::HttpGameApi;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::board::{CellPosition, Marker};
use crate::credential::Credential;
use crate::error::Result;
use crate::protocol::{GameSnapshot, GameType, PlayerId, SessionId, WireStatus};

/// Base URL used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Environment variable read by [`ApiConfig::from_env`].
pub const API_URL_ENV: &str = "PLAYROOM_API_URL";

/// Default timeout for a single REST request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ── Configuration ───────────────────────────────────────────────────

/// Where the backend lives.
///
/// # Example
///
/// ```
/// use playroom_client::api::ApiConfig;
///
/// let config = ApiConfig::new("https://play.example.com/api");
/// assert_eq!(config.channel_url(), "wss://play.example.com/ws");
/// ```
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// REST base URL including the `/api` prefix.
    /// Defaults to `http://localhost:5000/api`.
    pub base_url: String,
    /// Per-request timeout. Defaults to **10 seconds**.
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Read the base URL from `PLAYROOM_API_URL`, falling back to the
    /// default when unset or blank.
    pub fn from_env() -> Self {
        match std::env::var(API_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Full URL for a REST path such as `/games/rooms`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// URL of the real-time channel served next to the REST API: the `/api`
    /// suffix is dropped, `http(s)` becomes `ws(s)` and `/ws` is appended.
    pub fn channel_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = base.strip_suffix("/api").unwrap_or(base);
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{base}/ws")
    }
}

// ── Payloads ────────────────────────────────────────────────────────

/// Aggregate record of a player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerStats {
    pub matches_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub win_rate: f64,
    pub global_rank: Option<u32>,
    pub points: Option<u32>,
}

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(alias = "_id")]
    pub id: PlayerId,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub stats: PlayerStats,
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthSession {
    pub token: Credential,
    pub user: Profile,
}

/// Request body for creating a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRoom {
    pub name: String,
    #[serde(rename = "type")]
    pub game_type: GameType,
}

impl NewRoom {
    pub fn new(name: impl Into<String>, game_type: GameType) -> Self {
        Self {
            name: name.into(),
            game_type,
        }
    }
}

/// The user document attached to a room seat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatUser {
    #[serde(default, alias = "_id")]
    pub id: Option<PlayerId>,
    #[serde(default)]
    pub username: Option<String>,
}

/// One occupied seat in a room listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSeat {
    #[serde(default)]
    pub user: Option<SeatUser>,
    #[serde(default)]
    pub symbol: Option<Marker>,
}

/// A room as listed by the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    #[serde(alias = "_id")]
    pub id: SessionId,
    /// Code used by [`GameApi::join_room`].
    #[serde(default)]
    pub room_code: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub game_type: GameType,
    #[serde(default)]
    pub players: Vec<RoomSeat>,
    #[serde(default)]
    pub status: Option<WireStatus>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl RoomSummary {
    /// Username of the first seat, if populated.
    pub fn host_name(&self) -> Option<&str> {
        self.players
            .first()
            .and_then(|seat| seat.user.as_ref())
            .and_then(|user| user.username.as_deref())
    }
}

// ── Trait ───────────────────────────────────────────────────────────

/// Typed REST calls against the game backend.
///
/// Every call is authenticated with the implementation's credential.
/// Non-success responses surface as
/// [`PlayroomError::Api`](crate::PlayroomError::Api).
#[async_trait]
pub trait GameApi: Send + Sync {
    /// `GET /auth/profile`
    async fn fetch_profile(&self) -> Result<Profile>;

    /// `POST /games/rooms`
    async fn create_room(&self, room: &NewRoom) -> Result<RoomSummary>;

    /// `GET /games/rooms`
    async fn list_rooms(&self) -> Result<Vec<RoomSummary>>;

    /// `POST /games/rooms/{code}/join`, returning the joined game.
    async fn join_room(&self, room_code: &str) -> Result<GameSnapshot>;

    /// `GET /games/{id}`
    async fn get_game_state(&self, game_id: &str) -> Result<GameSnapshot>;

    /// `POST /games/{id}/move`, returning the game after the move (and the
    /// opponent's reply in single-player mode).
    async fn make_move(&self, game_id: &str, position: CellPosition) -> Result<GameSnapshot>;

    /// `PUT /games/{id}/ready`
    async fn set_ready(&self, game_id: &str) -> Result<()>;

    /// `POST /games/single-player`, returning the new game.
    async fn create_single_player(&self, room: &NewRoom) -> Result<GameSnapshot>;
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
    use serde_json::json;

    #[test]
    fn channel_url_is_derived_from_base_url() {
        assert_eq!(ApiConfig::default().channel_url(), "ws://localhost:5000/ws");
        assert_eq!(
            ApiConfig::new("https://play.example.com/api/").channel_url(),
            "wss://play.example.com/ws"
        );
        assert_eq!(
            ApiConfig::new("http://10.0.0.2:8080").channel_url(),
            "ws://10.0.0.2:8080/ws"
        );
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = ApiConfig::new("http://h/api/");
        assert_eq!(config.endpoint("/games/rooms"), "http://h/api/games/rooms");
    }

    #[test]
    fn profile_parses_mongo_style_document() {
        let profile: Profile = serde_json::from_value(json!({
            "_id": "u1",
            "username": "ann",
            "email": "ann@example.com",
            "stats": {"matchesPlayed": 12, "wins": 7, "losses": 4, "winRate": 58.3, "globalRank": 41}
        }))
        .unwrap();
        assert_eq!(profile.id, "u1");
        assert_eq!(profile.stats.matches_played, 12);
        assert_eq!(profile.stats.ties, 0);
        assert_eq!(profile.stats.global_rank, Some(41));
        assert_eq!(profile.stats.points, None);
    }

    #[test]
    fn room_listing_parses_populated_seats() {
        let rooms: Vec<RoomSummary> = serde_json::from_value(json!([
            {
                "_id": "g1",
                "roomCode": "K3XQ",
                "name": "Friday",
                "type": "tic-tac-toe",
                "players": [{"user": {"_id": "u1", "username": "ann"}, "symbol": "X"}],
                "status": "waiting",
                "createdAt": "2024-05-01T10:00:00Z"
            },
            {"_id": "g2", "type": "connect4"}
        ]))
        .unwrap();
        assert_eq!(rooms[0].room_code.as_deref(), Some("K3XQ"));
        assert_eq!(rooms[0].host_name(), Some("ann"));
        assert_eq!(rooms[1].game_type, GameType::Connect4);
        assert_eq!(rooms[1].host_name(), None);
    }

    #[test]
    fn new_room_body_uses_type_key() {
        let body = serde_json::to_value(NewRoom::new("Solo", GameType::TicTacToe)).unwrap();
        assert_eq!(body, json!({"name": "Solo", "type": "tic-tac-toe"}));
    }
}
