#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Playroom client integration tests.
//!
//! Provides a channel-driven [`MockTransport`], a scripted
//! [`MockConnector`] and helpers for building server frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use playroom_client::board::Marker;
use playroom_client::protocol::{
    ClientMessage, GameSnapshot, Participant, ServerMessage, WireStatus,
};
use playroom_client::{Connector, Credential, PlayroomError, Transport};
use tokio::sync::mpsc;

type Frame = Option<Result<String, PlayroomError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A transport whose inbound frames are pushed by the test through a
/// [`ServerSide`] handle.
///
/// Once the handle is dropped `recv()` hangs, so the link stays up until the
/// test pushes `None` (server close) or shuts the client down.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// The test's end of a [`MockTransport`].
#[derive(Clone)]
pub struct ServerSide {
    tx: mpsc::UnboundedSender<Frame>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new() -> (Self, ServerSide) {
        let (tx, incoming) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, ServerSide { tx, sent, closed })
    }
}

impl ServerSide {
    /// Push one server frame.
    pub fn push(&self, json: String) {
        let _ = self.tx.send(Some(Ok(json)));
    }

    pub fn push_message(&self, message: &ServerMessage) {
        self.push(serde_json::to_string(message).expect("server message serialization"));
    }

    /// Simulate the server closing the connection.
    pub fn hang_up(&self) {
        let _ = self.tx.send(None);
    }

    /// Simulate a transport failure.
    pub fn fail(&self, reason: &str) {
        let _ = self
            .tx
            .send(Some(Err(PlayroomError::TransportReceive(reason.into()))));
    }

    /// Everything the client sent so far, decoded.
    pub fn sent_messages(&self) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).expect("client message parse"))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), PlayroomError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PlayroomError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, PlayroomError>> {
        match self.incoming.recv().await {
            Some(frame) => frame,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), PlayroomError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// A connector that hands out pre-built transports in order.
///
/// Each `connect()` pops the next scripted result; an empty script fails.
#[derive(Clone, Default)]
pub struct MockConnector {
    script: Arc<StdMutex<VecDeque<Result<MockTransport, PlayroomError>>>>,
    attempts: Arc<AtomicUsize>,
    tokens: Arc<StdMutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful connection and return its server side.
    pub fn accept(&self) -> ServerSide {
        let (transport, server) = MockTransport::new();
        self.script.lock().unwrap().push_back(Ok(transport));
        server
    }

    /// Queue a failed connection attempt.
    pub fn refuse(&self) {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(PlayroomError::ConnectFailed("refused".into())));
    }

    /// Number of `connect()` calls so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Tokens presented on each attempt.
    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, credential: &Credential) -> Result<Box<dyn Transport>, PlayroomError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .unwrap()
            .push(credential.token().to_string());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(transport)) => Ok(Box::new(transport)),
            Some(Err(e)) => Err(e),
            None => Err(PlayroomError::ConnectFailed("no scripted transport".into())),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ── Snapshot helpers ────────────────────────────────────────────────

/// Two seated players: `p1` holds X, `p2` holds O.
pub fn players() -> Vec<Participant> {
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

/// A full snapshot of session `id`.
pub fn snapshot(
    id: &str,
    board: Vec<Option<Marker>>,
    turn: &str,
    status: WireStatus,
) -> GameSnapshot {
    GameSnapshot {
        name: Some(format!("room {id}")),
        board: Some(board),
        current_turn: Some(turn.into()),
        players: Some(players()),
        status: Some(status),
        ..GameSnapshot::new(id)
    }
}

/// An in-progress snapshot of `id` on an empty board with `p1` to move.
pub fn fresh_game(id: &str) -> GameSnapshot {
    snapshot(id, vec![None; 9], "p1", WireStatus::InProgress)
}

pub fn game_update(snapshot: GameSnapshot) -> ServerMessage {
    ServerMessage::GameUpdate(snapshot)
}

pub fn game_start(snapshot: GameSnapshot) -> ServerMessage {
    ServerMessage::GameStart(snapshot)
}
