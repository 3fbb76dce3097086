//! Request/response variant of session synchronization.
//!
//! Single-player games (and hosts without a usable real-time channel) have
//! no push events. [`PollingSession`] substitutes a periodic
//! [`GameApi::get_game_state`] fetch for them and submits moves with
//! [`GameApi::make_move`], whose response is applied as the next snapshot.
//! All state still flows through a [`BoardReconciler`], so the presented
//! session behaves exactly as in the channel-based path.

use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::api::{GameApi, NewRoom};
use crate::board::{CellPosition, Marker};
use crate::error::{PlayroomError, Result};
use crate::event::SyncUpdate;
use crate::protocol::{GameSnapshot, GameType, PlayerId, SessionId};
use crate::reconciler::{
    BoardReconciler, GameOutcome, GamePhase, GameSession, MoveRejection, TurnPolicy,
};

/// Default period between state fetches.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Why a [`PollingSession::play`] call did not produce a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    /// A local guard refused the move; nothing was sent.
    #[error(transparent)]
    Rejected(#[from] MoveRejection),
    /// The server call failed; the pending move was dropped.
    #[error(transparent)]
    Api(#[from] PlayroomError),
}

/// A game driven by REST polling.
///
/// The turn check is relaxed: the opponent replies within the same request,
/// so the board's emptiness and the busy flag (the pending move) are the
/// only local guards besides phase and outcome.
pub struct PollingSession<A> {
    api: A,
    game_id: SessionId,
    reconciler: BoardReconciler,
    interval: Interval,
}

impl<A: GameApi> PollingSession<A> {
    /// Track an existing game, seeded with `initial`.
    pub fn new(api: A, initial: GameSnapshot) -> Self {
        let game_id = initial.id.clone();
        let mut reconciler = BoardReconciler::new(TurnPolicy::Relaxed);
        reconciler.bind(game_id.clone());
        reconciler.apply_snapshot(initial);
        Self {
            api,
            game_id,
            reconciler,
            interval: poll_interval(DEFAULT_POLL_INTERVAL),
        }
    }

    /// Create a single-player game on the server and track it.
    ///
    /// # Errors
    ///
    /// Returns the API error if the game cannot be created.
    pub async fn start_single_player(api: A, name: impl Into<String>) -> Result<Self> {
        let room = NewRoom::new(name, GameType::TicTacToe);
        let initial = api.create_single_player(&room).await?;
        debug!(game = %initial.id, "single-player game created");
        Ok(Self::new(api, initial))
    }

    /// Change the polling period. The next fetch happens one period from now.
    #[must_use]
    pub fn with_poll_interval(mut self, period: Duration) -> Self {
        self.interval = poll_interval(period);
        self
    }

    /// Set the id of the local player.
    #[must_use]
    pub fn with_local_player(mut self, player_id: impl Into<PlayerId>) -> Self {
        self.reconciler.set_local_player(player_id);
        self
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.reconciler.session()
    }

    pub fn reconciler(&self) -> &BoardReconciler {
        &self.reconciler
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Whether a move request is outstanding.
    pub fn is_busy(&self) -> bool {
        self.reconciler.pending().is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.session()
            .is_some_and(|s| s.phase == GamePhase::Finished)
    }

    /// Wait for the next poll and apply the fetched state.
    ///
    /// Fetch failures are logged and retried on the next tick. Returns
    /// `None` once the game is finished.
    pub async fn next_update(&mut self) -> Option<SyncUpdate> {
        loop {
            if self.is_finished() {
                return None;
            }
            self.interval.tick().await;
            match self.api.get_game_state(&self.game_id).await {
                Ok(snapshot) => return Some(self.absorb(snapshot)),
                Err(e) => warn!(game = %self.game_id, "game state poll failed: {e}"),
            }
        }
    }

    /// Check a move on cell `index`, submit it and apply the response.
    ///
    /// # Errors
    ///
    /// Returns [`PlayError::Rejected`] when a local guard fails and
    /// [`PlayError::Api`] when the request fails. In the latter case the
    /// pending move is dropped and the board is unchanged.
    pub async fn play(&mut self, index: usize) -> std::result::Result<SyncUpdate, PlayError> {
        let position: CellPosition = self.reconciler.attempt_local_move(index)?;
        match self.api.make_move(&self.game_id, position).await {
            Ok(snapshot) => Ok(self.absorb(snapshot)),
            Err(e) => {
                self.reconciler.abandon_pending();
                warn!(game = %self.game_id, index, "move request failed: {e}");
                Err(e.into())
            }
        }
    }

    fn absorb(&mut self, snapshot: GameSnapshot) -> SyncUpdate {
        let was_finished = self.is_finished();
        if !self.reconciler.apply_snapshot(snapshot) {
            // Only reachable if the server answers for another game.
            return SyncUpdate::ServerError {
                message: "response for another game".into(),
            };
        }
        match self.session() {
            Some(session) if session.phase == GamePhase::Finished && !was_finished => {
                let outcome = Some(session.outcome.unwrap_or_else(|| self.computer_win()));
                debug!(game = %self.game_id, ?outcome, "game finished");
                SyncUpdate::GameOver { outcome }
            }
            _ => SyncUpdate::SessionUpdated,
        }
    }
}

impl<A> PollingSession<A> {
    /// A finished game with neither a seated winner nor a draw result was
    /// won by the server's opponent, which holds the other marker.
    fn computer_win(&self) -> GameOutcome {
        let ours = self.reconciler.local_marker().unwrap_or(Marker::X);
        GameOutcome::Won(ours.opponent())
    }
}

fn poll_interval(period: Duration) -> Interval {
    let start = tokio::time::Instant::now() + period;
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl<A> std::fmt::Debug for PollingSession<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingSession")
            .field("game_id", &self.game_id)
            .field("reconciler", &self.reconciler)
            .finish()
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
    use crate::api::{Profile, RoomSummary};
    use crate::protocol::{Participant, WireStatus};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex as StdMutex};

    const X: Option<Marker> = Some(Marker::X);
    const O: Option<Marker> = Some(Marker::O);
    const E: Option<Marker> = None;

    /// Scripted backend: polls and moves pop from separate queues.
    #[derive(Default, Clone)]
    struct ScriptedApi {
        polls: Arc<StdMutex<VecDeque<Result<GameSnapshot>>>>,
        moves: Arc<StdMutex<VecDeque<Result<GameSnapshot>>>>,
        sent: Arc<StdMutex<Vec<CellPosition>>>,
    }

    impl ScriptedApi {
        fn poll(&self, r: Result<GameSnapshot>) {
            self.polls.lock().unwrap().push_back(r);
        }

        fn reply(&self, r: Result<GameSnapshot>) {
            self.moves.lock().unwrap().push_back(r);
        }
    }

    #[async_trait]
    impl GameApi for ScriptedApi {
        async fn fetch_profile(&self) -> Result<Profile> {
            Err(PlayroomError::Http("unused".into()))
        }

        async fn create_room(&self, _room: &NewRoom) -> Result<RoomSummary> {
            Err(PlayroomError::Http("unused".into()))
        }

        async fn list_rooms(&self) -> Result<Vec<RoomSummary>> {
            Ok(Vec::new())
        }

        async fn join_room(&self, _room_code: &str) -> Result<GameSnapshot> {
            Err(PlayroomError::Http("unused".into()))
        }

        async fn get_game_state(&self, _game_id: &str) -> Result<GameSnapshot> {
            self.polls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PlayroomError::Http("no scripted poll".into())))
        }

        async fn make_move(&self, _game_id: &str, position: CellPosition) -> Result<GameSnapshot> {
            self.sent.lock().unwrap().push(position);
            self.moves
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PlayroomError::Http("no scripted move".into())))
        }

        async fn set_ready(&self, _game_id: &str) -> Result<()> {
            Ok(())
        }

        async fn create_single_player(&self, room: &NewRoom) -> Result<GameSnapshot> {
            assert_eq!(room.game_type, GameType::TicTacToe);
            Ok(solo(vec![E; 9], WireStatus::InProgress))
        }
    }

    fn solo(board: Vec<Option<Marker>>, status: WireStatus) -> GameSnapshot {
        GameSnapshot {
            board: Some(board),
            current_turn: Some("me".into()),
            players: Some(vec![Participant {
                id: "me".into(),
                username: "ann".into(),
                marker: Some(Marker::X),
                ready: true,
                is_host: true,
            }]),
            status: Some(status),
            ..GameSnapshot::new("solo1")
        }
    }

    async fn started(api: &ScriptedApi) -> PollingSession<ScriptedApi> {
        PollingSession::start_single_player(api.clone(), "Solo")
            .await
            .unwrap()
            .with_local_player("me")
    }

    #[tokio::test]
    async fn start_binds_and_applies_initial_snapshot() {
        let api = ScriptedApi::default();
        let session = started(&api).await;
        assert_eq!(session.game_id(), "solo1");
        let s = session.session().unwrap();
        assert_eq!(s.phase, GamePhase::Active);
        assert_eq!(s.board.occupied(), 0);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn move_response_includes_opponent_reply() {
        let api = ScriptedApi::default();
        let mut session = started(&api).await;

        api.reply(Ok(solo(vec![X, E, E, E, O, E, E, E, E], WireStatus::InProgress)));
        let update = session.play(0).await.unwrap();
        assert_eq!(update, SyncUpdate::SessionUpdated);
        assert_eq!(
            api.sent.lock().unwrap().as_slice(),
            &[CellPosition { row: 0, col: 0 }]
        );
        assert!(!session.is_busy());
        assert_eq!(session.session().unwrap().board.occupied(), 2);

        assert!(matches!(
            session.play(4).await,
            Err(PlayError::Rejected(MoveRejection::CellOccupied(4)))
        ));
    }

    #[tokio::test]
    async fn failed_move_request_clears_busy_state() {
        let api = ScriptedApi::default();
        let mut session = started(&api).await;

        api.reply(Err(PlayroomError::Api {
            status: 400,
            message: "Invalid move".into(),
        }));
        let err = session.play(3).await.unwrap_err();
        assert!(matches!(err, PlayError::Api(PlayroomError::Api { status: 400, .. })));
        assert!(!session.is_busy());
        assert!(session.session().unwrap().board.is_empty_at(3));
    }

    #[tokio::test]
    async fn winning_move_reports_game_over() {
        let api = ScriptedApi::default();
        let mut session = started(&api).await;

        let mut done = solo(vec![X, X, X, O, O, E, E, E, E], WireStatus::Completed);
        done.winner = Some("me".into());
        api.reply(Ok(done));
        let update = session.play(2).await.unwrap();
        assert_eq!(
            update,
            SyncUpdate::GameOver {
                outcome: Some(GameOutcome::Won(Marker::X))
            }
        );
        assert!(session.is_finished());
        assert!(session.next_update().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn polling_applies_state_and_stops_when_finished() {
        let api = ScriptedApi::default();
        let mut session = started(&api)
            .await
            .with_poll_interval(Duration::from_millis(500));

        api.poll(Err(PlayroomError::Http("flaky".into())));
        api.poll(Ok(solo(vec![E, E, E, E, O, E, E, E, E], WireStatus::InProgress)));
        let mut drawn = solo(vec![X, O, X, X, O, O, O, X, X], WireStatus::Completed);
        drawn.result = Some("draw".into());
        api.poll(Ok(drawn));

        let before = tokio::time::Instant::now();
        assert_eq!(session.next_update().await, Some(SyncUpdate::SessionUpdated));
        // The failed poll was retried one period later.
        assert!(before.elapsed() >= Duration::from_millis(1000));
        assert_eq!(session.session().unwrap().board.occupied(), 1);

        assert_eq!(
            session.next_update().await,
            Some(SyncUpdate::GameOver {
                outcome: Some(GameOutcome::Draw)
            })
        );
        assert!(session.next_update().await.is_none());
    }

    #[tokio::test]
    async fn unseated_winner_is_reported_as_the_opponent() {
        let api = ScriptedApi::default();
        let mut session = started(&api).await;

        let mut lost = solo(vec![X, X, E, O, O, O, E, E, X], WireStatus::Completed);
        lost.winner = None;
        api.reply(Ok(lost));
        let update = session.play(6).await.unwrap();
        assert_eq!(
            update,
            SyncUpdate::GameOver {
                outcome: Some(GameOutcome::Won(Marker::O))
            }
        );
        // The board itself still shows who won.
        assert_eq!(
            session.reconciler().presented_outcome(),
            Some(GameOutcome::Won(Marker::O))
        );
    }
}
