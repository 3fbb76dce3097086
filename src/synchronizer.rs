//! Real-time session synchronization over the game channel.
//!
//! [`SessionSynchronizer`] owns at most one connection. A connection is a
//! background *link* task that holds the [`Transport`], multiplexes outgoing
//! commands, shutdown and incoming frames with `tokio::select!`, and
//! re-establishes the transport through the [`Connector`] when it drops.
//! The synchronizer handle talks to the link over MPSC channels and feeds
//! every inbound message through its [`BoardReconciler`].
//!
//! # Example
//!
//! ```rust,ignore
//! let mut sync = SessionSynchronizer::new(WebSocketConnector::new(url), SyncConfig::default());
//! sync.set_local_player(profile.id);
//! sync.connect(credential);
//! sync.join_room("665f0c...");
//!
//! while let Some(update) = sync.next_update().await {
//!     match update {
//!         SyncUpdate::GameStarted | SyncUpdate::SessionUpdated => render(sync.session()),
//!         SyncUpdate::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::board::CellPosition;
use crate::credential::Credential;
use crate::event::{ConnectionStatus, SyncUpdate};
use crate::protocol::{ClientMessage, ServerMessage, SessionId};
use crate::reconciler::{BoardReconciler, GameSession, MoveRejection, TurnPolicy};
use crate::transport::{Connector, Transport};

/// Default number of reconnection attempts after a drop.
const DEFAULT_RECONNECTION_ATTEMPTS: u32 = 10;

/// Default fixed delay between connection attempts.
const DEFAULT_RECONNECTION_DELAY: Duration = Duration::from_secs(1);

/// Default per-attempt connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default capacity of the bounded inbound channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`SessionSynchronizer`].
///
/// # Example
///
/// ```
/// use playroom_client::SyncConfig;
/// use std::time::Duration;
///
/// let config = SyncConfig::default()
///     .with_reconnection_attempts(3)
///     .with_reconnection_delay(Duration::from_millis(250));
/// assert_eq!(config.reconnection_attempts, 3);
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Attempts made after the transport drops before giving up. The first
    /// connection also gets this many retries after its initial attempt.
    ///
    /// Defaults to **10**.
    pub reconnection_attempts: u32,
    /// Fixed delay before each retry. Defaults to **1 second**.
    pub reconnection_delay: Duration,
    /// Timeout for a single connect attempt. Defaults to **20 seconds**.
    pub connect_timeout: Duration,
    /// Capacity of the bounded inbound channel.
    ///
    /// When the consumer falls behind, snapshot updates are dropped with a
    /// warning; the next snapshot supersedes them anyway. Game start, game
    /// over and the terminal disconnect wait for room instead. Defaults to **256**; values below 1
    /// are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the link gets to close its transport on
    /// [`disconnect`](SessionSynchronizer::disconnect) before it is aborted.
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnection_attempts: DEFAULT_RECONNECTION_ATTEMPTS,
            reconnection_delay: DEFAULT_RECONNECTION_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn with_reconnection_attempts(mut self, attempts: u32) -> Self {
        self.reconnection_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_reconnection_delay(mut self, delay: Duration) -> Self {
        self.reconnection_delay = delay;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Link plumbing ───────────────────────────────────────────────────

/// What the link task reports to the handle.
#[derive(Debug)]
enum LinkEvent {
    Message(ServerMessage),
    /// The link ended and will not come back.
    Lost { reason: Option<String> },
}

/// Handle-side ends of one live link.
struct Link {
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    inbound_rx: mpsc::Receiver<LinkEvent>,
    status_rx: watch::Receiver<ConnectionStatus>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Drop for Link {
    fn drop(&mut self) {
        // No executor context for a graceful close here; abort the task so it
        // cannot outlive the handle.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Synchronizer ────────────────────────────────────────────────────

/// Owner of the channel connection and the room subscription.
pub struct SessionSynchronizer {
    connector: Arc<dyn Connector>,
    config: SyncConfig,
    link: Option<Link>,
    subscription: Option<SessionId>,
    reconciler: BoardReconciler,
}

impl SessionSynchronizer {
    /// Create a disconnected synchronizer. Nothing happens until
    /// [`connect`](Self::connect).
    pub fn new(connector: impl Connector, config: SyncConfig) -> Self {
        Self::with_shared_connector(Arc::new(connector), config)
    }

    /// Like [`new`](Self::new), for a connector that is shared elsewhere.
    pub fn with_shared_connector(connector: Arc<dyn Connector>, config: SyncConfig) -> Self {
        Self {
            connector,
            config,
            link: None,
            subscription: None,
            reconciler: BoardReconciler::new(TurnPolicy::Strict),
        }
    }

    /// Set the id of the player using this client (needed for turn checks).
    pub fn set_local_player(&mut self, player_id: impl Into<String>) {
        self.reconciler.set_local_player(player_id);
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Open the channel, authenticated with `credential`.
    ///
    /// Idempotent: with a connection already in place this does nothing.
    /// Otherwise a link task is spawned which connects in the background,
    /// retrying per [`SyncConfig`]. Progress is visible through
    /// [`status`](Self::status); only a terminal failure surfaces as
    /// [`SyncUpdate::Disconnected`].
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&mut self, credential: Credential) {
        if self.link.is_some() {
            debug!("connect: already connected, keeping existing link");
            return;
        }

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let capacity = self.config.event_channel_capacity.max(1);
        let (inbound_tx, inbound_rx) = mpsc::channel::<LinkEvent>(capacity);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(link_loop(
            Arc::clone(&self.connector),
            credential,
            self.config.clone(),
            cmd_rx,
            inbound_tx,
            status_tx,
            shutdown_rx,
        ));

        self.link = Some(Link {
            cmd_tx,
            inbound_rx,
            status_rx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        });
    }

    /// Tear the connection down and forget the subscription.
    ///
    /// The link gets [`SyncConfig::shutdown_timeout`] to close its transport
    /// before it is aborted. A later [`connect`](Self::connect) starts from
    /// scratch.
    pub async fn disconnect(&mut self) {
        self.subscription = None;
        self.reconciler.unbind();

        let Some(mut link) = self.link.take() else {
            return;
        };
        debug!("disconnect requested");

        if let Some(tx) = link.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = link.task.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("link task terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("link task did not exit within timeout; aborting");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("link task aborted: {join_err}");
                    }
                }
            }
        }
    }

    // ── Room subscription ───────────────────────────────────────────

    /// Subscribe to `session_id`, superseding any previous subscription.
    ///
    /// No-op without a connection.
    pub fn join_room(&mut self, session_id: impl Into<SessionId>) {
        let session_id = session_id.into();
        if self.link.is_none() {
            debug!(session = %session_id, "join_room ignored: not connected");
            return;
        }
        if let Some(previous) = self.subscription.take() {
            if previous != session_id {
                self.send(ClientMessage::LeaveGame(previous));
            }
        }
        self.send(ClientMessage::JoinGame(session_id.clone()));
        self.reconciler.bind(session_id.clone());
        self.subscription = Some(session_id);
    }

    /// Unsubscribe from the current session, if any.
    ///
    /// An in-flight move is not cancelled; its eventual snapshot is
    /// discarded because nothing is bound any more.
    pub fn leave_room(&mut self) {
        if let Some(session_id) = self.subscription.take() {
            self.send(ClientMessage::LeaveGame(session_id));
        }
        self.reconciler.unbind();
    }

    // ── Outbound intents ────────────────────────────────────────────

    /// Emit a move for the subscribed session. No-op if not subscribed.
    pub fn submit_move(&self, position: CellPosition) {
        let Some(session_id) = self.subscription.clone() else {
            debug!("submit_move ignored: not subscribed");
            return;
        };
        self.send(ClientMessage::MakeMove {
            game_id: session_id,
            position,
        });
    }

    /// Signal readiness for the subscribed session. No-op if not subscribed.
    pub fn submit_ready(&self) {
        let Some(session_id) = self.subscription.clone() else {
            debug!("submit_ready ignored: not subscribed");
            return;
        };
        self.send(ClientMessage::PlayerReady(session_id));
    }

    /// Check a move on cell `index` locally and send it if legal.
    ///
    /// # Errors
    ///
    /// Returns the [`MoveRejection`] when a local guard fails; nothing is
    /// sent in that case.
    pub fn play(&mut self, index: usize) -> Result<CellPosition, MoveRejection> {
        let position = self.reconciler.attempt_local_move(index)?;
        self.submit_move(position);
        Ok(position)
    }

    // ── Inbound ─────────────────────────────────────────────────────

    /// Wait for the next inbound event and reconcile it.
    ///
    /// Discarded events (stale session, nothing bound) are skipped. Returns
    /// `None` while disconnected; after the link is lost for good the final
    /// [`SyncUpdate::Disconnected`] is returned once, the connection is
    /// dropped and the reconciler is unbound.
    pub async fn next_update(&mut self) -> Option<SyncUpdate> {
        loop {
            let link = self.link.as_mut()?;
            let event = match link.inbound_rx.recv().await {
                Some(event) => event,
                None => LinkEvent::Lost {
                    reason: Some("link task ended".into()),
                },
            };
            match event {
                LinkEvent::Message(message) => {
                    if let Some(update) = self.reconciler.reconcile(message) {
                        return Some(update);
                    }
                }
                LinkEvent::Lost { reason } => {
                    info!(reason = reason.as_deref().unwrap_or("unknown"), "channel lost");
                    self.link = None;
                    self.subscription = None;
                    self.reconciler.unbind();
                    return Some(SyncUpdate::Disconnected { reason });
                }
            }
        }
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current connection status. `Disconnected` when no link exists.
    pub fn status(&self) -> ConnectionStatus {
        self.link
            .as_ref()
            .map_or(ConnectionStatus::Disconnected, |l| *l.status_rx.borrow())
    }

    /// A watch receiver for the connection status, if connected.
    pub fn status_watch(&self) -> Option<watch::Receiver<ConnectionStatus>> {
        self.link.as_ref().map(|l| l.status_rx.clone())
    }

    /// Whether a connection (possibly reconnecting) exists.
    pub fn has_connection(&self) -> bool {
        self.link.is_some()
    }

    pub fn current_session_id(&self) -> Option<&str> {
        self.subscription.as_deref()
    }

    pub fn session(&self) -> Option<&GameSession> {
        self.reconciler.session()
    }

    pub fn reconciler(&self) -> &BoardReconciler {
        &self.reconciler
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send(&self, msg: ClientMessage) {
        let Some(link) = self.link.as_ref() else {
            return;
        };
        if link.cmd_tx.send(msg).is_err() {
            debug!("link task gone, dropping outbound message");
        }
    }
}

impl std::fmt::Debug for SessionSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSynchronizer")
            .field("connector", &self.connector.name())
            .field("status", &self.status())
            .field("subscription", &self.subscription)
            .finish()
    }
}

// ── Link task ───────────────────────────────────────────────────────

enum Established {
    Ready(Box<dyn Transport>),
    Exhausted(String),
    Cancelled,
}

enum SessionEnd {
    /// Shutdown requested or the handle went away.
    Closed,
    /// The transport failed; reconnect.
    Dropped(String),
}

/// Background task owning the transport for one connection.
async fn link_loop(
    connector: Arc<dyn Connector>,
    credential: Credential,
    config: SyncConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    inbound_tx: mpsc::Sender<LinkEvent>,
    status_tx: watch::Sender<ConnectionStatus>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(connector = connector.name(), "link started");
    // Last subscription the server was told about; replayed after reconnect.
    let mut subscription: Option<SessionId> = None;
    let mut reconnecting = false;

    loop {
        let established = establish(
            connector.as_ref(),
            &credential,
            &config,
            &status_tx,
            &mut shutdown_rx,
            reconnecting,
        )
        .await;

        let mut transport = match established {
            Established::Ready(transport) => transport,
            Established::Exhausted(reason) => {
                error!("giving up on game channel: {reason}");
                emit_lost(&inbound_tx, &status_tx, Some(reason)).await;
                break;
            }
            Established::Cancelled => {
                let _ = status_tx.send(ConnectionStatus::Disconnected);
                break;
            }
        };
        let _ = status_tx.send(ConnectionStatus::Connected);

        if reconnecting {
            info!("game channel re-established");
            if let Some(session_id) = subscription.clone() {
                debug!(session = %session_id, "rejoining after reconnect");
                if let Err(e) = send_message(&mut transport, &ClientMessage::JoinGame(session_id)).await {
                    warn!("rejoin failed: {e}");
                    reconnecting = true;
                    continue;
                }
            }
        }

        match run_session(
            &mut transport,
            &mut cmd_rx,
            &inbound_tx,
            &mut shutdown_rx,
            &mut subscription,
        )
        .await
        {
            SessionEnd::Closed => {
                let _ = transport.close().await;
                let _ = status_tx.send(ConnectionStatus::Disconnected);
                break;
            }
            SessionEnd::Dropped(reason) => {
                warn!("game channel dropped: {reason}");
                reconnecting = true;
            }
        }
    }

    debug!("link exited");
}

/// Connect, retrying with a fixed delay.
///
/// A first connection tries immediately and then retries; a reconnection
/// waits before its first attempt. Either way at most
/// `config.reconnection_attempts` retries are made.
async fn establish(
    connector: &dyn Connector,
    credential: &Credential,
    config: &SyncConfig,
    status_tx: &watch::Sender<ConnectionStatus>,
    shutdown_rx: &mut oneshot::Receiver<()>,
    reconnecting: bool,
) -> Established {
    let first = u32::from(reconnecting);
    let mut last_error = String::from("no connection attempt made");

    for attempt in first..=config.reconnection_attempts {
        if attempt > 0 {
            let _ = status_tx.send(ConnectionStatus::Reconnecting { attempt });
            tokio::select! {
                _ = tokio::time::sleep(config.reconnection_delay) => {}
                _ = &mut *shutdown_rx => return Established::Cancelled,
            }
        }

        let outcome = tokio::select! {
            res = tokio::time::timeout(config.connect_timeout, connector.connect(credential)) => res,
            _ = &mut *shutdown_rx => return Established::Cancelled,
        };
        match outcome {
            Ok(Ok(transport)) => return Established::Ready(transport),
            Ok(Err(e)) => {
                debug!(attempt, "connect attempt failed: {e}");
                last_error = e.to_string();
            }
            Err(_) => {
                debug!(attempt, "connect attempt timed out");
                last_error = "connect timed out".into();
            }
        }
    }

    Established::Exhausted(format!(
        "{} reconnection attempts failed, last error: {last_error}",
        config.reconnection_attempts
    ))
}

/// Pump one established transport until it fails or the link is closed.
async fn run_session(
    transport: &mut Box<dyn Transport>,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    inbound_tx: &mpsc::Sender<LinkEvent>,
    shutdown_rx: &mut oneshot::Receiver<()>,
    subscription: &mut Option<SessionId>,
) -> SessionEnd {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(msg) = cmd else {
                    debug!("command channel closed, shutting down link");
                    return SessionEnd::Closed;
                };
                match &msg {
                    ClientMessage::JoinGame(id) => *subscription = Some(id.clone()),
                    ClientMessage::LeaveGame(id) if subscription.as_deref() == Some(id.as_str()) => {
                        *subscription = None;
                    }
                    _ => {}
                }
                if let Err(e) = send_message(transport, &msg).await {
                    return SessionEnd::Dropped(format!("send failed: {e}"));
                }
            }

            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                return SessionEnd::Closed;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) if is_phase_change(&message) => {
                            deliver(inbound_tx, LinkEvent::Message(message)).await;
                        }
                        Ok(message) => emit(inbound_tx, LinkEvent::Message(message)),
                        Err(e) => warn!("failed to decode server message: {e} (raw: {text})"),
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return SessionEnd::Dropped(e.to_string());
                    }
                    None => return SessionEnd::Dropped("closed by server".into()),
                }
            }
        }
    }
}

async fn send_message(
    transport: &mut Box<dyn Transport>,
    msg: &ClientMessage,
) -> crate::error::Result<()> {
    let json = serde_json::to_string(msg)?;
    debug!(session = msg.session_id(), "sending {}", json);
    transport.send(json).await
}

/// Forward an inbound event, dropping it when the consumer is behind.
fn emit(inbound_tx: &mpsc::Sender<LinkEvent>, event: LinkEvent) {
    match inbound_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("inbound channel full, dropping {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("inbound channel closed, handle dropped");
        }
    }
}

/// Game start and game over move the session between phases; a later
/// snapshot does not stand in for them, so they are never dropped.
fn is_phase_change(message: &ServerMessage) -> bool {
    matches!(
        message,
        ServerMessage::GameStart(_) | ServerMessage::GameOver { .. }
    )
}

/// Forward an inbound event, waiting for room in the channel.
async fn deliver(inbound_tx: &mpsc::Sender<LinkEvent>, event: LinkEvent) {
    if inbound_tx.send(event).await.is_err() {
        debug!("inbound channel closed, handle dropped");
    }
}

/// Deliver the terminal event. Blocks on a full channel so it is never lost.
async fn emit_lost(
    inbound_tx: &mpsc::Sender<LinkEvent>,
    status_tx: &watch::Sender<ConnectionStatus>,
    reason: Option<String>,
) {
    let _ = status_tx.send(ConnectionStatus::Disconnected);
    deliver(inbound_tx, LinkEvent::Lost { reason }).await;
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

    #[test]
    fn config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.reconnection_attempts, 10);
        assert_eq!(config.reconnection_delay, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = SyncConfig::default().with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }
}
