//! Wire types for the Playroom real-time channel.
//!
//! Every frame is a JSON text message of the form
//! `{"type": "<event-name>", "data": <payload>}`. Snapshot payloads are
//! parsed leniently: only `id` is required, every other field is optional so
//! that a partial snapshot can still be applied (see
//! [`BoardReconciler::apply_snapshot`](crate::reconciler::BoardReconciler::apply_snapshot)).

use serde::{Deserialize, Deserializer, Serialize};

use crate::board::{Cell, CellPosition, Marker};

// ── Type aliases ────────────────────────────────────────────────────

/// Server-assigned identifier of a game session (also the room id).
pub type SessionId = String;

/// Server-assigned identifier of a player.
pub type PlayerId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// Session status as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireStatus {
    Waiting,
    Ready,
    InProgress,
    Completed,
    Finished,
    /// Any status this client does not know about.
    #[serde(other)]
    Unknown,
}

/// Room game type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GameType {
    #[default]
    TicTacToe,
    Chess,
    #[serde(rename = "connect-4", alias = "connect4")]
    Connect4,
}

// ── Structs ─────────────────────────────────────────────────────────

/// A player seated in a session.
///
/// Decodes both the flat channel form (`{"id", "username", ...}`) and the
/// REST form where the player is a nested user document
/// (`{"user": {"_id", "username"}, "symbol", ...}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawParticipant")]
pub struct Participant {
    pub id: PlayerId,
    pub username: String,
    /// Assigned marker; `None` until the server seats the player.
    #[serde(rename = "symbol")]
    pub marker: Option<Marker>,
    pub ready: bool,
    pub is_host: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParticipant {
    #[serde(default, alias = "_id")]
    id: Option<PlayerId>,
    #[serde(default, alias = "name")]
    username: Option<String>,
    #[serde(default)]
    user: Option<PlayerRef>,
    #[serde(default)]
    symbol: Option<Marker>,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    is_host: bool,
}

impl TryFrom<RawParticipant> for Participant {
    type Error = String;

    fn try_from(raw: RawParticipant) -> Result<Self, Self::Error> {
        let (user_id, user_name) = match raw.user {
            Some(user) => user.into_parts(),
            None => (None, None),
        };
        let id = raw
            .id
            .or(user_id)
            .ok_or_else(|| "participant without an id".to_string())?;
        Ok(Self {
            id,
            username: raw.username.or(user_name).unwrap_or_default(),
            marker: raw.symbol,
            ready: raw.ready,
            is_host: raw.is_host,
        })
    }
}

/// A player reference: either a bare id or a populated user document.
#[derive(Deserialize)]
#[serde(untagged)]
enum PlayerRef {
    Id(PlayerId),
    Doc {
        #[serde(default, alias = "_id")]
        id: Option<PlayerId>,
        #[serde(default)]
        username: Option<String>,
    },
}

impl PlayerRef {
    fn into_parts(self) -> (Option<PlayerId>, Option<String>) {
        match self {
            PlayerRef::Id(id) => (Some(id), None),
            PlayerRef::Doc { id, username } => (id, username),
        }
    }
}

/// Deserialize an optional player reference down to its id.
fn player_id_opt<'de, D>(deserializer: D) -> Result<Option<PlayerId>, D::Error>
where
    D: Deserializer<'de>,
{
    let reference = Option::<PlayerRef>::deserialize(deserializer)?;
    Ok(reference.and_then(|r| r.into_parts().0))
}

/// A complete, authoritative description of a session pushed by the server.
///
/// Only `id` is mandatory. Missing fields mean "not reported", not "empty".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    #[serde(alias = "_id")]
    pub id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Raw board cells; validated to nine entries before use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<Vec<Cell>>,
    /// Id of the participant whose turn it is.
    #[serde(
        default,
        deserialize_with = "player_id_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub current_turn: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<Participant>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WireStatus>,
    /// Id of the winning participant, once decided.
    #[serde(
        default,
        deserialize_with = "player_id_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub winner: Option<PlayerId>,
    /// Free-form result tag; `"draw"` marks a drawn game.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spectators: Option<u32>,
}

impl GameSnapshot {
    /// A snapshot carrying only the session id.
    pub fn new(id: impl Into<SessionId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Whether the `result` tag reports a draw.
    pub fn is_draw(&self) -> bool {
        self.result
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("draw"))
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Subscribe to a session's event stream.
    JoinGame(SessionId),
    /// Unsubscribe from a session.
    LeaveGame(SessionId),
    /// Submit a move intent.
    MakeMove {
        #[serde(rename = "gameId")]
        game_id: SessionId,
        position: CellPosition,
    },
    /// Signal readiness in the waiting room.
    PlayerReady(SessionId),
}

impl ClientMessage {
    /// The session this message targets.
    pub fn session_id(&self) -> &str {
        match self {
            ClientMessage::JoinGame(id)
            | ClientMessage::LeaveGame(id)
            | ClientMessage::PlayerReady(id) => id,
            ClientMessage::MakeMove { game_id, .. } => game_id,
        }
    }
}

/// Message types sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Full session state after any change.
    GameUpdate(GameSnapshot),
    /// All participants are ready and play begins.
    GameStart(GameSnapshot),
    /// The session has ended.
    GameOver {
        #[serde(default, deserialize_with = "player_id_opt")]
        winner: Option<PlayerId>,
        game: GameSnapshot,
    },
    /// A participant toggled readiness.
    PlayerReadyUpdate {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        game: GameSnapshot,
    },
    /// A participant dropped off the channel.
    PlayerDisconnected {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        game: GameSnapshot,
    },
    /// The server refused a request (e.g. an illegal move).
    Error { message: String },
}

impl ServerMessage {
    /// The session this message belongs to, if it carries a snapshot.
    pub fn session_id(&self) -> Option<&str> {
        self.snapshot().map(|s| s.id.as_str())
    }

    /// The snapshot carried by this message, if any.
    pub fn snapshot(&self) -> Option<&GameSnapshot> {
        match self {
            ServerMessage::GameUpdate(game) | ServerMessage::GameStart(game) => Some(game),
            ServerMessage::GameOver { game, .. }
            | ServerMessage::PlayerReadyUpdate { game, .. }
            | ServerMessage::PlayerDisconnected { game, .. } => Some(game),
            ServerMessage::Error { .. } => None,
        }
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
    use serde_json::json;

    #[test]
    fn make_move_wire_shape() {
        let msg = ClientMessage::MakeMove {
            game_id: "g1".into(),
            position: CellPosition { row: 1, col: 2 },
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "make-move", "data": {"gameId": "g1", "position": {"row": 1, "col": 2}}})
        );
    }

    #[test]
    fn join_leave_ready_carry_bare_id() {
        assert_eq!(
            serde_json::to_value(ClientMessage::JoinGame("r1".into())).unwrap(),
            json!({"type": "join-game", "data": "r1"})
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::LeaveGame("r1".into())).unwrap(),
            json!({"type": "leave-game", "data": "r1"})
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::PlayerReady("r1".into())).unwrap(),
            json!({"type": "player-ready", "data": "r1"})
        );
    }

    #[test]
    fn parses_full_game_update() {
        let raw = json!({
            "type": "game-update",
            "data": {
                "_id": "g7",
                "name": "Friday night",
                "board": ["X", null, null, null, "O", null, null, null, null],
                "currentTurn": "p1",
                "players": [
                    {"id": "p1", "username": "ann", "symbol": "X", "ready": true, "isHost": true},
                    {"id": "p2", "username": "bo", "symbol": "O", "ready": true}
                ],
                "status": "in-progress",
                "spectators": 3
            }
        });
        let msg: ServerMessage = serde_json::from_value(raw).unwrap();
        let ServerMessage::GameUpdate(snap) = msg else {
            panic!("expected GameUpdate");
        };
        assert_eq!(snap.id, "g7");
        assert_eq!(snap.status, Some(WireStatus::InProgress));
        assert_eq!(snap.board.as_ref().unwrap().len(), 9);
        let players = snap.players.unwrap();
        assert_eq!(players[0].marker, Some(Marker::X));
        assert!(players[0].is_host);
        assert!(!players[1].is_host);
        assert_eq!(snap.spectators, Some(3));
    }

    #[test]
    fn sparse_snapshot_parses_with_only_id() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"game-start","data":{"id":"g1"}}"#).unwrap();
        assert_eq!(msg.snapshot(), Some(&GameSnapshot::new("g1")));
        assert_eq!(msg.session_id(), Some("g1"));
    }

    #[test]
    fn snapshot_without_id_is_rejected() {
        let res: Result<ServerMessage, _> =
            serde_json::from_str(r#"{"type":"game-update","data":{"board":[]}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn unknown_status_maps_to_unknown() {
        let snap: GameSnapshot =
            serde_json::from_str(r#"{"id":"g","status":"paused"}"#).unwrap();
        assert_eq!(snap.status, Some(WireStatus::Unknown));
    }

    #[test]
    fn game_over_and_player_events() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "game-over",
            "data": {"winner": "p2", "game": {"id": "g1", "status": "completed"}}
        }))
        .unwrap();
        assert!(matches!(
            &msg,
            ServerMessage::GameOver { winner: Some(w), .. } if w == "p2"
        ));

        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "player-disconnected",
            "data": {"playerId": "p1", "game": {"id": "g1"}}
        }))
        .unwrap();
        assert_eq!(msg.session_id(), Some("g1"));

        let msg: ServerMessage =
            serde_json::from_value(json!({"type": "error", "data": {"message": "Not your turn"}}))
                .unwrap();
        assert_eq!(msg.session_id(), None);
    }

    #[test]
    fn draw_result_is_case_insensitive() {
        let mut snap = GameSnapshot::new("g");
        assert!(!snap.is_draw());
        snap.result = Some("Draw".into());
        assert!(snap.is_draw());
    }

    #[test]
    fn game_type_wire_names() {
        assert_eq!(
            serde_json::to_value(GameType::TicTacToe).unwrap(),
            json!("tic-tac-toe")
        );
        assert_eq!(
            serde_json::to_value(GameType::Connect4).unwrap(),
            json!("connect-4")
        );
    }

    #[test]
    fn parses_rest_snapshot_with_populated_users() {
        let snap: GameSnapshot = serde_json::from_value(json!({
            "_id": "g9",
            "currentTurn": {"_id": "u2", "username": "bo"},
            "winner": null,
            "players": [
                {"user": {"_id": "u1", "username": "ann"}, "symbol": "X"},
                {"user": "u2", "symbol": "O"}
            ],
            "status": "in-progress"
        }))
        .unwrap();
        assert_eq!(snap.current_turn.as_deref(), Some("u2"));
        assert_eq!(snap.winner, None);
        let players = snap.players.unwrap();
        assert_eq!(players[0].id, "u1");
        assert_eq!(players[0].username, "ann");
        assert_eq!(players[1].id, "u2");
        assert_eq!(players[1].username, "");
        assert_eq!(players[1].marker, Some(Marker::O));
    }

    #[test]
    fn participant_without_any_id_is_rejected() {
        let res: Result<Participant, _> =
            serde_json::from_value(json!({"username": "ghost", "symbol": "X"}));
        assert!(res.is_err());
    }

    #[test]
    fn participant_serializes_flat() {
        let p = Participant {
            id: "p1".into(),
            username: "ann".into(),
            marker: Some(Marker::X),
            ready: true,
            is_host: false,
        };
        assert_eq!(
            serde_json::to_value(&p).unwrap(),
            json!({"id": "p1", "username": "ann", "symbol": "X", "ready": true, "isHost": false})
        );
    }
}
