#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration tests for `SessionSynchronizer`.
//!
//! Uses the scripted `MockConnector` from `tests/common` to drive the link
//! task through connection, subscription, reconnection and shutdown, and
//! checks what reaches the server and what reaches the caller.

mod common;

use std::time::Duration;

use playroom_client::board::{CellPosition, Marker};
use playroom_client::protocol::{ClientMessage, GameSnapshot, ServerMessage, WireStatus};
use playroom_client::reconciler::{GameOutcome, GamePhase, MoveRejection};
use playroom_client::{
    ConnectionStatus, Credential, SessionSynchronizer, SyncConfig, SyncUpdate,
};

use common::{fresh_game, game_start, game_update, snapshot, MockConnector, ServerSide};

const X: Option<Marker> = Some(Marker::X);
const O: Option<Marker> = Some(Marker::O);
const E: Option<Marker> = None;

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn fast_config() -> SyncConfig {
    SyncConfig::default()
        .with_reconnection_attempts(3)
        .with_reconnection_delay(Duration::from_millis(20))
}

fn synchronizer(connector: &MockConnector, config: SyncConfig) -> SessionSynchronizer {
    let mut sync = SessionSynchronizer::new(connector.clone(), config);
    sync.set_local_player("p1");
    sync
}

/// Wait until the server has received at least `count` messages.
async fn wait_for_sent(server: &ServerSide, count: usize) -> Vec<ClientMessage> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let sent = server.sent_messages();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for outbound messages")
}

async fn wait_for_status(sync: &SessionSynchronizer, want: ConnectionStatus) {
    let mut rx = sync.status_watch().expect("link should exist");
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == want))
        .await
        .expect("timed out waiting for status")
        .expect("link dropped its status channel");
}

async fn next(sync: &mut SessionSynchronizer) -> SyncUpdate {
    tokio::time::timeout(Duration::from_secs(5), sync.next_update())
        .await
        .expect("timed out waiting for update")
        .expect("synchronizer has no connection")
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connect_is_idempotent() {
    let connector = MockConnector::new();
    let _server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    assert_eq!(sync.status(), ConnectionStatus::Disconnected);
    sync.connect(Credential::new("jwt"));
    sync.connect(Credential::new("jwt"));
    wait_for_status(&sync, ConnectionStatus::Connected).await;
    sync.connect(Credential::new("other"));

    assert!(sync.has_connection());
    assert_eq!(connector.attempts(), 1);
    assert_eq!(connector.tokens(), vec!["jwt".to_string()]);

    sync.disconnect().await;
}

#[test]
fn next_update_without_connection_is_immediately_none() {
    let connector = MockConnector::new();
    let mut sync = synchronizer(&connector, fast_config());
    let mut update = tokio_test::task::spawn(sync.next_update());
    tokio_test::assert_ready_eq!(update.poll(), None);
}

#[tokio::test]
async fn next_update_waits_while_the_channel_is_quiet() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    wait_for_status(&sync, ConnectionStatus::Connected).await;
    {
        let mut update = tokio_test::task::spawn(sync.next_update());
        tokio_test::assert_pending!(update.poll());
    }
    assert!(!server.is_closed());

    sync.disconnect().await;
}

#[tokio::test]
async fn disconnect_closes_transport_and_forgets_subscription() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    wait_for_sent(&server, 1).await;

    sync.disconnect().await;

    assert!(server.is_closed());
    assert!(!sync.has_connection());
    assert_eq!(sync.status(), ConnectionStatus::Disconnected);
    assert_eq!(sync.current_session_id(), None);
    assert!(sync.session().is_none());
    assert!(sync.next_update().await.is_none());
}

#[tokio::test]
async fn disconnect_then_connect_starts_over() {
    let connector = MockConnector::new();
    let first = connector.accept();
    let second = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    wait_for_sent(&first, 1).await;
    sync.disconnect().await;

    sync.connect(Credential::new("jwt"));
    wait_for_status(&sync, ConnectionStatus::Connected).await;
    sync.join_room("g2");
    second.push_message(&game_update(fresh_game("g2")));

    assert_eq!(next(&mut sync).await, SyncUpdate::SessionUpdated);
    assert_eq!(sync.session().unwrap().id, "g2");
    assert_eq!(
        wait_for_sent(&second, 1).await,
        vec![ClientMessage::JoinGame("g2".into())],
        "old subscription must not be replayed on a fresh connection"
    );

    sync.disconnect().await;
}

#[tokio::test]
async fn disconnect_while_still_connecting() {
    let connector = MockConnector::new();
    let mut sync = synchronizer(
        &connector,
        SyncConfig::default().with_reconnection_delay(Duration::from_secs(30)),
    );

    sync.connect(Credential::new("jwt"));
    tokio::time::timeout(Duration::from_secs(5), sync.disconnect())
        .await
        .expect("disconnect should not wait out the retry delay");
    assert_eq!(sync.status(), ConnectionStatus::Disconnected);
}

// ════════════════════════════════════════════════════════════════════
// Reconnection
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn exhausted_retries_yield_one_disconnected() {
    let connector = MockConnector::new();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    let update = next(&mut sync).await;
    let SyncUpdate::Disconnected { reason } = update else {
        panic!("expected Disconnected, got {update:?}");
    };
    assert!(reason.unwrap().contains("3 reconnection attempts failed"));

    // One initial attempt plus three retries.
    assert_eq!(connector.attempts(), 4);
    assert!(sync.next_update().await.is_none());
    assert!(sync.next_update().await.is_none());
    assert_eq!(sync.status(), ConnectionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn first_connection_retries_until_accepted() {
    let connector = MockConnector::new();
    connector.refuse();
    connector.refuse();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    wait_for_status(&sync, ConnectionStatus::Connected).await;
    assert_eq!(connector.attempts(), 3);

    sync.join_room("g1");
    server.push_message(&game_update(fresh_game("g1")));
    assert_eq!(next(&mut sync).await, SyncUpdate::SessionUpdated);

    sync.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn dropped_transport_reconnects_and_rejoins() {
    let connector = MockConnector::new();
    let first = connector.accept();
    connector.refuse();
    let second = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    first.push_message(&game_update(fresh_game("g1")));
    assert_eq!(next(&mut sync).await, SyncUpdate::SessionUpdated);
    wait_for_sent(&first, 1).await;

    first.hang_up();

    let rejoin = wait_for_sent(&second, 1).await;
    assert_eq!(rejoin, vec![ClientMessage::JoinGame("g1".into())]);
    wait_for_status(&sync, ConnectionStatus::Connected).await;
    assert_eq!(connector.attempts(), 3);

    // Nothing about the retry reached the caller; the next update is the
    // fresh snapshot from the new transport.
    let mut moved = fresh_game("g1");
    moved.board = Some(vec![X, E, E, E, E, E, E, E, E]);
    moved.current_turn = Some("p2".into());
    second.push_message(&game_update(moved));
    assert_eq!(next(&mut sync).await, SyncUpdate::SessionUpdated);
    assert_eq!(sync.session().unwrap().current_turn, Some(Marker::O));
    assert_eq!(sync.current_session_id(), Some("g1"));

    sync.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn receive_error_triggers_reconnect() {
    let connector = MockConnector::new();
    let first = connector.accept();
    let second = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    wait_for_status(&sync, ConnectionStatus::Connected).await;
    first.fail("connection reset");

    second.push_message(&ServerMessage::Error {
        message: "still here".into(),
    });
    assert_eq!(
        next(&mut sync).await,
        SyncUpdate::ServerError {
            message: "still here".into()
        }
    );
    assert_eq!(connector.attempts(), 2);
    assert!(
        second.sent_messages().is_empty(),
        "no subscription to replay"
    );

    sync.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn reconnection_gives_up_after_drop() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    wait_for_status(&sync, ConnectionStatus::Connected).await;
    server.hang_up();

    let update = next(&mut sync).await;
    assert!(matches!(update, SyncUpdate::Disconnected { .. }));
    // One successful attempt plus three failed retries.
    assert_eq!(connector.attempts(), 4);
    assert!(sync.next_update().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn lost_link_unbinds_the_session() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config().with_reconnection_attempts(1));

    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    server.push_message(&game_start(fresh_game("g1")));
    assert_eq!(next(&mut sync).await, SyncUpdate::GameStarted);
    wait_for_sent(&server, 1).await;
    server.hang_up();

    let update = next(&mut sync).await;
    assert!(matches!(update, SyncUpdate::Disconnected { .. }));
    assert!(sync.session().is_none());
    assert!(sync.reconciler().bound_session_id().is_none());
    assert_eq!(sync.play(4), Err(MoveRejection::NoSession));
    assert!(sync.reconciler().pending().is_none());
    assert_eq!(server.sent_messages(), vec![ClientMessage::JoinGame("g1".into())]);

    // Coming back to the same room starts from a clean session.
    let server = connector.accept();
    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    server.push_message(&game_start(fresh_game("g1")));
    assert_eq!(next(&mut sync).await, SyncUpdate::GameStarted);
    assert_eq!(sync.play(4), Ok(CellPosition { row: 1, col: 1 }));
    let sent = wait_for_sent(&server, 2).await;
    assert_eq!(
        sent[1],
        ClientMessage::MakeMove {
            game_id: "g1".into(),
            position: CellPosition { row: 1, col: 1 },
        }
    );

    sync.disconnect().await;
}

// ════════════════════════════════════════════════════════════════════
// Subscription
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn join_room_before_connect_is_ignored() {
    let connector = MockConnector::new();
    let mut sync = synchronizer(&connector, fast_config());

    sync.join_room("g1");
    assert_eq!(sync.current_session_id(), None);
    assert!(sync.session().is_none());
}

#[tokio::test]
async fn switching_rooms_discards_the_old_room() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    sync.join_room("r1");
    sync.join_room("r2");

    server.push_message(&game_update(fresh_game("r1")));
    server.push_message(&game_update(snapshot(
        "r2",
        vec![E; 9],
        "p2",
        WireStatus::InProgress,
    )));

    assert_eq!(next(&mut sync).await, SyncUpdate::SessionUpdated);
    let session = sync.session().unwrap();
    assert_eq!(session.id, "r2");
    assert_eq!(session.current_turn, Some(Marker::O));

    let sent = wait_for_sent(&server, 3).await;
    assert_eq!(
        sent,
        vec![
            ClientMessage::JoinGame("r1".into()),
            ClientMessage::LeaveGame("r1".into()),
            ClientMessage::JoinGame("r2".into()),
        ]
    );

    sync.disconnect().await;
}

#[tokio::test]
async fn rejoining_the_same_room_keeps_state() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    server.push_message(&game_update(fresh_game("g1")));
    assert_eq!(next(&mut sync).await, SyncUpdate::SessionUpdated);

    sync.join_room("g1");
    assert_eq!(sync.session().unwrap().phase, GamePhase::Active);
    let sent = wait_for_sent(&server, 2).await;
    assert!(!sent.contains(&ClientMessage::LeaveGame("g1".into())));

    sync.disconnect().await;
}

#[tokio::test]
async fn leave_room_discards_later_snapshots() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    sync.leave_room();
    assert_eq!(sync.current_session_id(), None);

    server.push_message(&game_update(fresh_game("g1")));
    server.push_message(&ServerMessage::Error {
        message: "marker".into(),
    });
    assert_eq!(
        next(&mut sync).await,
        SyncUpdate::ServerError {
            message: "marker".into()
        }
    );
    assert!(sync.session().is_none());
    assert_eq!(
        wait_for_sent(&server, 2).await,
        vec![
            ClientMessage::JoinGame("g1".into()),
            ClientMessage::LeaveGame("g1".into()),
        ]
    );

    sync.disconnect().await;
}

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    server.push("not json".into());
    server.push(r#"{"type":"game-update","data":{"board":[]}}"#.into());
    server.push(r#"{"type":"mystery","data":{}}"#.into());
    server.push_message(&game_update(fresh_game("g1")));

    assert_eq!(next(&mut sync).await, SyncUpdate::SessionUpdated);
    assert_eq!(sync.status(), ConnectionStatus::Connected);

    sync.disconnect().await;
}

// ════════════════════════════════════════════════════════════════════
// Moves and game flow
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn submit_without_subscription_is_a_no_op() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    wait_for_status(&sync, ConnectionStatus::Connected).await;
    sync.submit_move(CellPosition { row: 0, col: 0 });
    sync.submit_ready();
    assert_eq!(sync.play(0), Err(MoveRejection::NoSession));

    sync.join_room("g1");
    let sent = wait_for_sent(&server, 1).await;
    assert_eq!(sent, vec![ClientMessage::JoinGame("g1".into())]);

    sync.disconnect().await;
}

#[tokio::test]
async fn ready_then_start_then_move() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    sync.submit_ready();

    let waiting = snapshot("g1", vec![E; 9], "p1", WireStatus::Waiting);
    server.push_message(&ServerMessage::PlayerReadyUpdate {
        player_id: "p1".into(),
        game: waiting,
    });
    assert_eq!(
        next(&mut sync).await,
        SyncUpdate::PlayerReady {
            player_id: "p1".into()
        }
    );
    assert_eq!(sync.play(4), Err(MoveRejection::NotActive(GamePhase::Waiting)));

    server.push_message(&game_start(fresh_game("g1")));
    assert_eq!(next(&mut sync).await, SyncUpdate::GameStarted);
    assert!(sync.reconciler().is_local_turn());

    assert_eq!(sync.play(4), Ok(CellPosition { row: 1, col: 1 }));
    assert_eq!(sync.play(5), Err(MoveRejection::MovePending));
    assert!(sync.session().unwrap().board.is_empty_at(4));

    let sent = wait_for_sent(&server, 3).await;
    assert_eq!(
        sent.last(),
        Some(&ClientMessage::MakeMove {
            game_id: "g1".into(),
            position: CellPosition { row: 1, col: 1 },
        })
    );

    let mut after = snapshot("g1", vec![E, E, E, E, X, E, E, E, E], "p2", WireStatus::InProgress);
    after.spectators = Some(2);
    server.push_message(&game_update(after));
    assert_eq!(next(&mut sync).await, SyncUpdate::SessionUpdated);
    assert!(sync.reconciler().pending().is_none());
    assert!(!sync.reconciler().is_local_turn());
    assert_eq!(sync.play(0), Err(MoveRejection::NotYourTurn));
    assert_eq!(sync.session().unwrap().spectators, 2);

    sync.disconnect().await;
}

#[tokio::test]
async fn server_rejection_keeps_pending_until_next_snapshot() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    server.push_message(&game_update(fresh_game("g1")));
    assert_eq!(next(&mut sync).await, SyncUpdate::SessionUpdated);

    sync.play(0).unwrap();
    server.push_message(&ServerMessage::Error {
        message: "Not your turn".into(),
    });
    assert_eq!(
        next(&mut sync).await,
        SyncUpdate::ServerError {
            message: "Not your turn".into()
        }
    );
    assert!(sync.reconciler().pending().is_some());

    server.push_message(&game_update(fresh_game("g1")));
    assert_eq!(next(&mut sync).await, SyncUpdate::SessionUpdated);
    assert!(sync.reconciler().pending().is_none());

    sync.disconnect().await;
}

#[tokio::test]
async fn game_over_reports_authoritative_outcome() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    server.push_message(&game_start(fresh_game("g1")));
    assert_eq!(next(&mut sync).await, SyncUpdate::GameStarted);

    let final_board = vec![X, X, X, O, O, E, E, E, E];
    server.push_message(&game_update(snapshot(
        "g1",
        final_board.clone(),
        "p2",
        WireStatus::InProgress,
    )));
    assert_eq!(next(&mut sync).await, SyncUpdate::SessionUpdated);
    // Locally decided before the server says so.
    assert_eq!(
        sync.reconciler().presented_outcome(),
        Some(GameOutcome::Won(Marker::X))
    );
    assert_eq!(sync.play(5), Err(MoveRejection::AlreadyDecided));

    server.push_message(&ServerMessage::GameOver {
        winner: Some("p1".into()),
        game: GameSnapshot {
            board: Some(final_board),
            ..GameSnapshot::new("g1")
        },
    });
    assert_eq!(
        next(&mut sync).await,
        SyncUpdate::GameOver {
            outcome: Some(GameOutcome::Won(Marker::X))
        }
    );
    assert_eq!(sync.session().unwrap().phase, GamePhase::Finished);

    sync.disconnect().await;
}

#[tokio::test]
async fn player_disconnected_is_surfaced() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config());

    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    server.push_message(&ServerMessage::PlayerDisconnected {
        player_id: "p2".into(),
        game: fresh_game("g1"),
    });
    assert_eq!(
        next(&mut sync).await,
        SyncUpdate::PlayerDisconnected {
            player_id: "p2".into()
        }
    );

    sync.disconnect().await;
}

#[tokio::test]
async fn full_channel_still_delivers_game_over() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut sync = synchronizer(&connector, fast_config().with_event_channel_capacity(1));

    sync.connect(Credential::new("jwt"));
    sync.join_room("g1");
    // Queue everything before the caller reads anything.
    server.push_message(&game_start(fresh_game("g1")));
    server.push_message(&game_update(snapshot(
        "g1",
        vec![X, E, E, E, E, E, E, E, E],
        "p2",
        WireStatus::InProgress,
    )));
    server.push_message(&game_update(snapshot(
        "g1",
        vec![X, O, E, E, E, E, E, E, E],
        "p1",
        WireStatus::InProgress,
    )));
    let final_board = vec![X, O, E, X, O, E, X, E, E];
    server.push_message(&ServerMessage::GameOver {
        winner: Some("p1".into()),
        game: GameSnapshot {
            board: Some(final_board.clone()),
            status: Some(WireStatus::Completed),
            ..GameSnapshot::new("g1")
        },
    });

    let mut updates = Vec::new();
    loop {
        let update = next(&mut sync).await;
        let done = matches!(update, SyncUpdate::GameOver { .. });
        updates.push(update);
        if done {
            break;
        }
    }
    // Snapshot updates may be shed; the phase changes never are.
    assert_eq!(updates.first(), Some(&SyncUpdate::GameStarted));
    assert_eq!(
        updates.last(),
        Some(&SyncUpdate::GameOver {
            outcome: Some(GameOutcome::Won(Marker::X))
        })
    );
    assert!(updates.len() <= 4);
    let session = sync.session().unwrap();
    assert_eq!(session.phase, GamePhase::Finished);
    assert_eq!(session.board.count(Marker::X), 3);

    sync.disconnect().await;
}
