//! Board reconciliation: local optimism versus server truth.
//!
//! [`BoardReconciler`] owns the presented [`GameSession`], the single
//! outstanding [`PendingMove`] and the local outcome hint. It is purely
//! synchronous; the [`SessionSynchronizer`](crate::SessionSynchronizer) and
//! [`PollingSession`](crate::polling::PollingSession) feed it server data and
//! forward the moves it accepts.
//!
//! The board is never changed by a local move. A move is recorded as pending
//! and the board only changes when the next snapshot arrives. Every applied
//! snapshot clears the pending move, whether or not it contains that move.

use thiserror::Error;
use tracing::{debug, warn};

use crate::board::{local_win_check, Board, BoardVerdict, CellPosition, Marker};
use crate::event::SyncUpdate;
use crate::protocol::{GameSnapshot, Participant, PlayerId, ServerMessage, SessionId, WireStatus};

// ── Session model ───────────────────────────────────────────────────

/// Lifecycle stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GamePhase {
    /// Session formed, not all participants ready.
    #[default]
    Waiting,
    /// Moves are accepted.
    Active,
    /// Terminal. A new session is required to play again.
    Finished,
}

impl GamePhase {
    /// Map a wire status onto a phase. `Unknown` yields `None`.
    pub fn from_wire(status: WireStatus) -> Option<Self> {
        match status {
            WireStatus::Waiting | WireStatus::Ready => Some(GamePhase::Waiting),
            WireStatus::InProgress => Some(GamePhase::Active),
            WireStatus::Completed | WireStatus::Finished => Some(GamePhase::Finished),
            WireStatus::Unknown => None,
        }
    }
}

/// Authoritative result of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Won(Marker),
    Draw,
}

impl From<BoardVerdict> for Option<GameOutcome> {
    fn from(verdict: BoardVerdict) -> Self {
        match verdict {
            BoardVerdict::Winner(marker) => Some(GameOutcome::Won(marker)),
            BoardVerdict::Draw => Some(GameOutcome::Draw),
            BoardVerdict::Undecided => None,
        }
    }
}

/// The presented state of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    pub id: SessionId,
    /// Room display name.
    pub name: String,
    pub participants: Vec<Participant>,
    pub board: Board,
    /// Marker whose turn it is, when the server reported a known owner.
    pub current_turn: Option<Marker>,
    pub phase: GamePhase,
    pub spectators: u32,
    /// Result reported by the server. Never set from the local check.
    pub outcome: Option<GameOutcome>,
}

impl GameSession {
    /// An empty waiting session keyed to `id`.
    pub fn new(id: impl Into<SessionId>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            participants: Vec::new(),
            board: Board::empty(),
            current_turn: None,
            phase: GamePhase::Waiting,
            spectators: 0,
            outcome: None,
        }
    }

    /// Look up a participant by id.
    pub fn participant(&self, player_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == player_id)
    }

    /// Marker assigned to `player_id`.
    pub fn marker_of(&self, player_id: &str) -> Option<Marker> {
        marker_of(&self.participants, player_id)
    }

    /// Participant currently holding `marker`.
    pub fn holder_of(&self, marker: Marker) -> Option<&Participant> {
        self.participants.iter().find(|p| p.marker == Some(marker))
    }
}

fn marker_of(participants: &[Participant], player_id: &str) -> Option<Marker> {
    participants
        .iter()
        .find(|p| p.id == player_id)
        .and_then(|p| p.marker)
}

/// A move sent to the server that has not been answered by a snapshot yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMove {
    pub index: usize,
    pub position: CellPosition,
}

/// Why a local move was refused. The reconciler is unchanged in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveRejection {
    #[error("no session is bound")]
    NoSession,
    #[error("cell index {0} is off the board")]
    OffBoard(usize),
    #[error("session is not active ({0:?})")]
    NotActive(GamePhase),
    #[error("the board already shows a finished game")]
    AlreadyDecided,
    #[error("a move is already awaiting the server")]
    MovePending,
    #[error("cell {0} is occupied")]
    CellOccupied(usize),
    #[error("it is not the local player's turn")]
    NotYourTurn,
}

/// Whether local moves must respect turn ownership.
///
/// `Strict` is used on the real-time channel, where both players are human.
/// `Relaxed` suits the single-player polling mode: the local player always
/// moves and the server answers with the opponent's move in the same
/// response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPolicy {
    #[default]
    Strict,
    Relaxed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Transition {
    Update,
    Start,
    Over { winner: Option<PlayerId> },
}

// ── Reconciler ──────────────────────────────────────────────────────

/// Owner of the presented session state.
#[derive(Debug, Default)]
pub struct BoardReconciler {
    session: Option<GameSession>,
    pending: Option<PendingMove>,
    local_hint: BoardVerdict,
    local_player: Option<PlayerId>,
    turn_policy: TurnPolicy,
}

impl BoardReconciler {
    /// Create an unbound reconciler.
    pub fn new(turn_policy: TurnPolicy) -> Self {
        Self {
            turn_policy,
            ..Default::default()
        }
    }

    /// Set the id of the player using this client.
    #[must_use]
    pub fn with_local_player(mut self, player_id: impl Into<PlayerId>) -> Self {
        self.local_player = Some(player_id.into());
        self
    }

    /// Set the id of the player using this client.
    pub fn set_local_player(&mut self, player_id: impl Into<PlayerId>) {
        self.local_player = Some(player_id.into());
    }

    /// Key the reconciler to `session_id`.
    ///
    /// Binding to a different id starts from a fresh waiting session and
    /// drops any pending move; binding to the current id changes nothing.
    pub fn bind(&mut self, session_id: impl Into<SessionId>) {
        let session_id = session_id.into();
        if self.bound_session_id() == Some(session_id.as_str()) {
            return;
        }
        debug!(session = %session_id, "reconciler bound");
        self.session = Some(GameSession::new(session_id));
        self.pending = None;
        self.local_hint = BoardVerdict::Undecided;
    }

    /// Drop the session. Later events are discarded until the next `bind`.
    pub fn unbind(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(session = %session.id, "reconciler unbound");
        }
        self.pending = None;
        self.local_hint = BoardVerdict::Undecided;
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn session(&self) -> Option<&GameSession> {
        self.session.as_ref()
    }

    pub fn bound_session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id.as_str())
    }

    pub fn pending(&self) -> Option<&PendingMove> {
        self.pending.as_ref()
    }

    pub fn local_player(&self) -> Option<&str> {
        self.local_player.as_deref()
    }

    pub fn turn_policy(&self) -> TurnPolicy {
        self.turn_policy
    }

    /// Outcome computed from the presented board alone.
    pub fn local_hint(&self) -> BoardVerdict {
        self.local_hint
    }

    /// Outcome to show: the server's when known, else the local hint.
    pub fn presented_outcome(&self) -> Option<GameOutcome> {
        self.session
            .as_ref()
            .and_then(|s| s.outcome)
            .or_else(|| self.local_hint.into())
    }

    /// Marker assigned to the local player in the bound session.
    pub fn local_marker(&self) -> Option<Marker> {
        let player = self.local_player.as_deref()?;
        self.session.as_ref()?.marker_of(player)
    }

    /// Whether the local player holds the current marker.
    pub fn is_local_turn(&self) -> bool {
        match (self.local_marker(), self.session.as_ref()) {
            (Some(mine), Some(session)) => session.current_turn == Some(mine),
            _ => false,
        }
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Fold one server message into the session.
    ///
    /// Returns `None` when the message was discarded: its session id does
    /// not match the bound session, or nothing is bound.
    pub fn reconcile(&mut self, message: ServerMessage) -> Option<SyncUpdate> {
        match message {
            ServerMessage::GameUpdate(game) => self
                .apply(game, Transition::Update)
                .then_some(SyncUpdate::SessionUpdated),
            ServerMessage::GameStart(game) => self
                .apply(game, Transition::Start)
                .then_some(SyncUpdate::GameStarted),
            ServerMessage::GameOver { winner, game } => {
                if !self.apply(game, Transition::Over { winner }) {
                    return None;
                }
                Some(SyncUpdate::GameOver {
                    outcome: self.session.as_ref().and_then(|s| s.outcome),
                })
            }
            ServerMessage::PlayerReadyUpdate { player_id, game } => self
                .apply(game, Transition::Update)
                .then_some(SyncUpdate::PlayerReady { player_id }),
            ServerMessage::PlayerDisconnected { player_id, game } => self
                .apply(game, Transition::Update)
                .then_some(SyncUpdate::PlayerDisconnected { player_id }),
            ServerMessage::Error { message } => {
                warn!(%message, "server rejected a request");
                Some(SyncUpdate::ServerError { message })
            }
        }
    }

    /// Replace the session with `snapshot`. Returns `false` if discarded.
    pub fn apply_snapshot(&mut self, snapshot: GameSnapshot) -> bool {
        self.apply(snapshot, Transition::Update)
    }

    fn apply(&mut self, snapshot: GameSnapshot, transition: Transition) -> bool {
        let Some(prev) = self.session.as_ref() else {
            debug!(session = %snapshot.id, "discarding snapshot: no session bound");
            return false;
        };
        if prev.id != snapshot.id {
            debug!(
                bound = %prev.id,
                session = %snapshot.id,
                "discarding snapshot for another session"
            );
            return false;
        }

        let next = next_session(prev, snapshot, &transition);
        debug!(
            session = %next.id,
            phase = ?next.phase,
            turn = ?next.current_turn,
            "applied snapshot"
        );
        if let Some(pending) = self.pending.take() {
            debug!(index = pending.index, "pending move cleared by snapshot");
        }
        self.local_hint = local_win_check(&next.board);
        self.session = Some(next);
        true
    }

    // ── Outbound ────────────────────────────────────────────────────

    /// Check a move on cell `index` and record it as pending.
    ///
    /// The board is not touched; the caller sends the returned position to
    /// the server.
    pub fn attempt_local_move(&mut self, index: usize) -> Result<CellPosition, MoveRejection> {
        let session = self.session.as_ref().ok_or(MoveRejection::NoSession)?;
        let position = CellPosition::from_index(index).ok_or(MoveRejection::OffBoard(index))?;
        if session.phase != GamePhase::Active {
            return Err(MoveRejection::NotActive(session.phase));
        }
        if self.local_hint.is_decided() {
            return Err(MoveRejection::AlreadyDecided);
        }
        if self.pending.is_some() {
            return Err(MoveRejection::MovePending);
        }
        if !session.board.is_empty_at(index) {
            return Err(MoveRejection::CellOccupied(index));
        }
        if self.turn_policy == TurnPolicy::Strict && !self.is_local_turn() {
            return Err(MoveRejection::NotYourTurn);
        }

        self.pending = Some(PendingMove { index, position });
        debug!(index, row = position.row, col = position.col, "move pending");
        Ok(position)
    }

    /// Drop the pending move without a snapshot.
    ///
    /// Only for request/response paths where the rejection is known
    /// directly; the channel path waits for the next snapshot instead.
    pub fn abandon_pending(&mut self) -> Option<PendingMove> {
        self.pending.take()
    }
}

/// Build the session that replaces `prev`.
///
/// Fields absent from the snapshot carry over from `prev`. A board of the
/// wrong length is ignored and the previous board kept.
fn next_session(prev: &GameSession, snapshot: GameSnapshot, transition: &Transition) -> GameSession {
    let participants = snapshot
        .players
        .clone()
        .unwrap_or_else(|| prev.participants.clone());

    let board = match snapshot.board.clone().map(Board::try_from) {
        Some(Ok(board)) => board,
        Some(Err(e)) => {
            warn!(session = %snapshot.id, "keeping previous board: {e}");
            prev.board
        }
        None => prev.board,
    };
    if *transition != Transition::Start {
        let cleared = prev.board.cleared_in(&board);
        if !cleared.is_empty() {
            warn!(session = %snapshot.id, ?cleared, "snapshot cleared occupied cells");
        }
    }

    let current_turn = match snapshot.current_turn.as_deref() {
        Some(owner) => {
            let marker = marker_of(&participants, owner);
            if marker.is_none() {
                debug!(%owner, "turn owner has no assigned marker");
            }
            marker
        }
        None => prev.current_turn,
    };

    let phase = match transition {
        Transition::Start => GamePhase::Active,
        Transition::Over { .. } => GamePhase::Finished,
        Transition::Update => snapshot
            .status
            .and_then(GamePhase::from_wire)
            .unwrap_or(prev.phase),
    };

    let reported = reported_outcome(&snapshot, transition, &participants);
    let outcome = match (phase, transition) {
        (_, Transition::Start) => None,
        (GamePhase::Finished, Transition::Over { winner }) => {
            if winner.is_none() && snapshot.winner.is_none() {
                reported.or(Some(GameOutcome::Draw))
            } else {
                reported
            }
        }
        (GamePhase::Finished, _) => reported.or(prev.outcome),
        _ => None,
    };

    GameSession {
        id: snapshot.id,
        name: snapshot.name.unwrap_or_else(|| prev.name.clone()),
        participants,
        board,
        current_turn,
        phase,
        spectators: snapshot.spectators.unwrap_or(prev.spectators),
        outcome,
    }
}

/// The result the server reported, if it named one.
///
/// A winner id that matches no seated marker (e.g. the AI opponent in
/// single-player mode) yields no outcome.
fn reported_outcome(
    snapshot: &GameSnapshot,
    transition: &Transition,
    participants: &[Participant],
) -> Option<GameOutcome> {
    if snapshot.is_draw() {
        return Some(GameOutcome::Draw);
    }
    let winner = match transition {
        Transition::Over { winner } => winner.as_deref().or(snapshot.winner.as_deref()),
        _ => snapshot.winner.as_deref(),
    }?;
    marker_of(participants, winner).map(GameOutcome::Won)
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

    const X: Option<Marker> = Some(Marker::X);
    const O: Option<Marker> = Some(Marker::O);
    const E: Option<Marker> = None;

    fn players() -> Vec<Participant> {
        vec![
            Participant {
                id: "p1".into(),
                username: "ann".into(),
                marker: Some(Marker::X),
                ready: true,
                is_host: true,
            },
            Participant {
                id: "p2".into(),
                username: "bo".into(),
                marker: Some(Marker::O),
                ready: true,
                is_host: false,
            },
        ]
    }

    fn snapshot(id: &str, board: Vec<Option<Marker>>, turn: &str, status: WireStatus) -> GameSnapshot {
        GameSnapshot {
            id: id.into(),
            name: Some("room".into()),
            board: Some(board),
            current_turn: Some(turn.into()),
            players: Some(players()),
            status: Some(status),
            ..GameSnapshot::new(id)
        }
    }

    /// A reconciler for p1 bound to `g1` in an active game on an empty board.
    fn active() -> BoardReconciler {
        let mut r = BoardReconciler::default().with_local_player("p1");
        r.bind("g1");
        assert!(r.apply_snapshot(snapshot("g1", vec![E; 9], "p1", WireStatus::InProgress)));
        r
    }

    #[test]
    fn apply_snapshot_derives_phase_and_turn() {
        let r = active();
        let s = r.session().unwrap();
        assert_eq!(s.phase, GamePhase::Active);
        assert_eq!(s.current_turn, Some(Marker::X));
        assert_eq!(s.name, "room");
        assert!(r.is_local_turn());
        assert_eq!(r.local_marker(), Some(Marker::X));
        assert_eq!(s.participant("p2").map(|p| p.marker), Some(Some(Marker::O)));
        assert!(s.participant("nobody").is_none());
    }

    #[test]
    fn wire_statuses_map_to_phases() {
        assert_eq!(GamePhase::from_wire(WireStatus::Ready), Some(GamePhase::Waiting));
        assert_eq!(GamePhase::from_wire(WireStatus::InProgress), Some(GamePhase::Active));
        assert_eq!(GamePhase::from_wire(WireStatus::Completed), Some(GamePhase::Finished));
        assert_eq!(GamePhase::from_wire(WireStatus::Unknown), None);
    }

    #[test]
    fn local_move_records_pending_without_touching_board() {
        let mut r = active();
        let pos = r.attempt_local_move(4).unwrap();
        assert_eq!(pos, CellPosition { row: 1, col: 1 });
        assert_eq!(r.pending().unwrap().index, 4);
        assert_eq!(r.session().unwrap().board, Board::empty());
    }

    #[test]
    fn move_on_occupied_cell_is_a_no_op() {
        let mut r = active();
        r.apply_snapshot(snapshot("g1", vec![O, E, E, E, E, E, E, E, E], "p1", WireStatus::InProgress));
        let before = r.session().cloned();
        assert_eq!(r.attempt_local_move(0), Err(MoveRejection::CellOccupied(0)));
        assert!(r.pending().is_none());
        assert_eq!(r.session().cloned(), before);
    }

    #[test]
    fn second_move_while_pending_is_a_no_op() {
        let mut r = active();
        r.attempt_local_move(0).unwrap();
        assert_eq!(r.attempt_local_move(1), Err(MoveRejection::MovePending));
        assert_eq!(r.pending().unwrap().index, 0);
    }

    #[test]
    fn move_out_of_turn_is_refused() {
        let mut r = active();
        r.apply_snapshot(snapshot("g1", vec![X, E, E, E, E, E, E, E, E], "p2", WireStatus::InProgress));
        assert_eq!(r.attempt_local_move(1), Err(MoveRejection::NotYourTurn));
    }

    #[test]
    fn relaxed_policy_ignores_turn_owner() {
        let mut r = BoardReconciler::new(TurnPolicy::Relaxed);
        r.bind("g1");
        r.apply_snapshot(snapshot("g1", vec![E; 9], "p2", WireStatus::InProgress));
        assert!(r.attempt_local_move(8).is_ok());
    }

    #[test]
    fn move_outside_active_phase_is_refused() {
        let mut r = BoardReconciler::default().with_local_player("p1");
        assert_eq!(r.attempt_local_move(0), Err(MoveRejection::NoSession));
        r.bind("g1");
        assert_eq!(
            r.attempt_local_move(0),
            Err(MoveRejection::NotActive(GamePhase::Waiting))
        );
        let mut r = active();
        assert_eq!(r.attempt_local_move(9), Err(MoveRejection::OffBoard(9)));
    }

    #[test]
    fn any_applied_snapshot_clears_pending() {
        let mut r = active();
        r.attempt_local_move(4).unwrap();
        // The snapshot does not contain the move; it still clears it.
        r.apply_snapshot(snapshot("g1", vec![E; 9], "p1", WireStatus::InProgress));
        assert!(r.pending().is_none());

        r.attempt_local_move(4).unwrap();
        r.apply_snapshot(snapshot("g1", vec![E, E, E, E, X, E, E, E, E], "p2", WireStatus::InProgress));
        assert!(r.pending().is_none());
        assert_eq!(r.session().unwrap().board.get(4), Some(X));
    }

    #[test]
    fn event_for_other_session_is_discarded() {
        let mut r = active();
        r.attempt_local_move(0).unwrap();
        let before = r.session().cloned();

        let update = r.reconcile(ServerMessage::GameUpdate(snapshot(
            "g2",
            vec![X, X, X, E, E, E, E, E, E],
            "p2",
            WireStatus::Completed,
        )));
        assert_eq!(update, None);
        assert_eq!(r.session().cloned(), before);
        assert!(r.pending().is_some(), "stale events must not clear pending");
    }

    #[test]
    fn events_while_unbound_are_discarded() {
        let mut r = BoardReconciler::default();
        let update = r.reconcile(ServerMessage::GameStart(GameSnapshot::new("g1")));
        assert_eq!(update, None);
        assert!(r.session().is_none());
    }

    #[test]
    fn winning_snapshot_sets_local_hint() {
        let mut r = active();
        r.apply_snapshot(snapshot("g1", vec![X, X, X, E, E, E, E, E, E], "p2", WireStatus::InProgress));
        assert_eq!(r.local_hint(), BoardVerdict::Winner(Marker::X));
        assert_eq!(r.presented_outcome(), Some(GameOutcome::Won(Marker::X)));
        assert_eq!(r.session().unwrap().outcome, None);
        assert_eq!(r.attempt_local_move(5), Err(MoveRejection::AlreadyDecided));
    }

    #[test]
    fn authoritative_outcome_wins_over_hint() {
        let mut r = active();
        // Board shows an X line but the server declares O the winner.
        let update = r.reconcile(ServerMessage::GameOver {
            winner: Some("p2".into()),
            game: snapshot("g1", vec![X, X, X, O, O, E, E, E, E], "p2", WireStatus::Completed),
        });
        assert_eq!(
            update,
            Some(SyncUpdate::GameOver {
                outcome: Some(GameOutcome::Won(Marker::O))
            })
        );
        assert_eq!(r.local_hint(), BoardVerdict::Winner(Marker::X));
        assert_eq!(r.presented_outcome(), Some(GameOutcome::Won(Marker::O)));
        assert_eq!(r.session().unwrap().phase, GamePhase::Finished);
    }

    #[test]
    fn game_over_without_winner_is_a_draw() {
        let mut r = active();
        r.reconcile(ServerMessage::GameOver {
            winner: None,
            game: GameSnapshot::new("g1"),
        });
        assert_eq!(r.session().unwrap().outcome, Some(GameOutcome::Draw));
    }

    #[test]
    fn game_over_for_unseated_winner_has_no_outcome() {
        let mut r = active();
        let update = r.reconcile(ServerMessage::GameOver {
            winner: Some("ai".into()),
            game: GameSnapshot::new("g1"),
        });
        assert_eq!(update, Some(SyncUpdate::GameOver { outcome: None }));
        assert_eq!(r.session().unwrap().phase, GamePhase::Finished);
    }

    #[test]
    fn finished_update_with_draw_result() {
        let mut r = active();
        let mut snap = snapshot("g1", vec![X, O, X, O, X, O, O, X, O], "p1", WireStatus::Completed);
        snap.result = Some("draw".into());
        r.reconcile(ServerMessage::GameUpdate(snap));
        let s = r.session().unwrap();
        assert_eq!(s.phase, GamePhase::Finished);
        assert_eq!(s.outcome, Some(GameOutcome::Draw));
    }

    #[test]
    fn game_start_forces_active_and_resets_board() {
        let mut r = BoardReconciler::default().with_local_player("p1");
        r.bind("g1");
        let mut snap = snapshot("g1", vec![E; 9], "p1", WireStatus::Waiting);
        snap.status = Some(WireStatus::Ready);
        assert_eq!(r.reconcile(ServerMessage::GameStart(snap)), Some(SyncUpdate::GameStarted));
        let s = r.session().unwrap();
        assert_eq!(s.phase, GamePhase::Active);
        assert_eq!(s.board, Board::empty());
        assert_eq!(s.outcome, None);
    }

    #[test]
    fn wrong_length_board_keeps_previous_board_but_applies_rest() {
        let mut r = active();
        r.apply_snapshot(snapshot("g1", vec![X, E, E, E, E, E, E, E, E], "p2", WireStatus::InProgress));
        let mut bad = snapshot("g1", vec![O; 8], "p1", WireStatus::InProgress);
        bad.spectators = Some(4);
        assert!(r.apply_snapshot(bad));
        let s = r.session().unwrap();
        assert_eq!(s.board.get(0), Some(X));
        assert_eq!(s.board.occupied(), 1);
        assert_eq!(s.current_turn, Some(Marker::X));
        assert_eq!(s.spectators, 4);
    }

    #[test]
    fn sparse_snapshot_carries_missing_fields_over() {
        let mut r = active();
        assert!(r.apply_snapshot(GameSnapshot::new("g1")));
        let s = r.session().unwrap();
        assert_eq!(s.participants.len(), 2);
        assert_eq!(s.name, "room");
        assert_eq!(s.phase, GamePhase::Active);
        assert_eq!(s.current_turn, Some(Marker::X));
    }

    #[test]
    fn unknown_status_keeps_phase() {
        let mut r = active();
        let mut snap = GameSnapshot::new("g1");
        snap.status = Some(WireStatus::Unknown);
        r.apply_snapshot(snap);
        assert_eq!(r.session().unwrap().phase, GamePhase::Active);
    }

    #[test]
    fn player_events_apply_their_snapshot() {
        let mut r = BoardReconciler::default();
        r.bind("g1");
        let mut game = GameSnapshot::new("g1");
        game.players = Some(players());
        let update = r.reconcile(ServerMessage::PlayerReadyUpdate {
            player_id: "p2".into(),
            game,
        });
        assert_eq!(update, Some(SyncUpdate::PlayerReady { player_id: "p2".into() }));
        assert_eq!(r.session().unwrap().participants.len(), 2);

        let mut game = GameSnapshot::new("g1");
        game.players = Some(players().into_iter().take(1).collect());
        let update = r.reconcile(ServerMessage::PlayerDisconnected {
            player_id: "p2".into(),
            game,
        });
        assert_eq!(
            update,
            Some(SyncUpdate::PlayerDisconnected { player_id: "p2".into() })
        );
        assert_eq!(r.session().unwrap().participants.len(), 1);
    }

    #[test]
    fn server_error_leaves_state_alone() {
        let mut r = active();
        r.attempt_local_move(3).unwrap();
        let before = r.session().cloned();
        let update = r.reconcile(ServerMessage::Error {
            message: "Cell already occupied".into(),
        });
        assert_eq!(
            update,
            Some(SyncUpdate::ServerError {
                message: "Cell already occupied".into()
            })
        );
        assert_eq!(r.session().cloned(), before);
        assert!(r.pending().is_some());
    }

    #[test]
    fn rebinding_to_new_session_resets_state() {
        let mut r = active();
        r.attempt_local_move(0).unwrap();
        r.bind("g1");
        assert!(r.pending().is_some(), "same id keeps state");
        r.bind("g2");
        assert!(r.pending().is_none());
        assert_eq!(r.session().unwrap(), &GameSession::new("g2"));
    }

    #[test]
    fn abandon_pending_returns_the_move() {
        let mut r = active();
        r.attempt_local_move(2).unwrap();
        assert_eq!(r.abandon_pending().map(|p| p.index), Some(2));
        assert!(r.pending().is_none());
    }
}
