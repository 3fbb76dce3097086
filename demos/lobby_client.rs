//! # Lobby Client Example
//!
//! Plays an online tic-tac-toe game from the terminal:
//!
//! 1. Log in over REST (or reuse the token saved by a previous run)
//! 2. Join a room by its code
//! 3. Open the real-time channel and subscribe to the game
//! 4. Mark ready, then type a cell number (0-8) to move
//! 5. Shut down gracefully on Ctrl+C, game over or disconnect
//!
//! ## Running
//!
//! ```sh
//! PLAYROOM_EMAIL=ann@example.com PLAYROOM_PASSWORD=secret \
//!     cargo run --example lobby_client -- K3XQ
//!
//! # Point at another backend:
//! PLAYROOM_API_URL=https://play.example.com/api cargo run --example lobby_client -- K3XQ
//! ```

use playroom_client::api::{ApiConfig, GameApi, HttpGameApi};
use playroom_client::board::Board;
use playroom_client::{
    CredentialStore, FileCredentialStore, PlayroomError, SessionSynchronizer, SyncConfig,
    SyncUpdate, WebSocketConnector,
};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Where the token is kept between runs.
const AUTH_FILE: &str = ".playroom/auth.json";

fn render(board: &Board) -> String {
    let mut out = String::new();
    for (i, cell) in board.cells().iter().enumerate() {
        match cell {
            Some(marker) => out.push_str(&marker.to_string()),
            None => out.push_str(&i.to_string()),
        }
        out.push(if i % 3 == 2 { '\n' } else { '|' });
    }
    out
}

/// Username of a seated player, falling back to the raw id.
fn display_name<'a>(sync: &'a SessionSynchronizer, player_id: &'a str) -> &'a str {
    sync.session()
        .and_then(|s| s.participant(player_id))
        .map_or(player_id, |p| p.username.as_str())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let room_code = std::env::args()
        .nth(1)
        .ok_or("usage: lobby_client <ROOM_CODE>")?;

    // ── Authentication ──────────────────────────────────────────────
    let config = ApiConfig::from_env();
    let store = FileCredentialStore::new(AUTH_FILE);
    let mut api = HttpGameApi::new(config.clone())?;

    let profile = match store.load()? {
        Some(credential) => {
            api.set_credential(Some(credential));
            match api.fetch_profile().await {
                Ok(profile) => Some(profile),
                Err(PlayroomError::Api { status: 401, .. }) => {
                    tracing::info!("Saved token expired");
                    store.clear()?;
                    None
                }
                Err(e) => return Err(e.into()),
            }
        }
        None => None,
    };
    let profile = match profile {
        Some(profile) => profile,
        None => {
            let email = std::env::var("PLAYROOM_EMAIL")?;
            let password = std::env::var("PLAYROOM_PASSWORD")?;
            let auth = api.login(&email, &password).await?;
            store.save(&auth.token)?;
            auth.user
        }
    };
    tracing::info!(
        "Signed in as {} ({} wins / {} played)",
        profile.username,
        profile.stats.wins,
        profile.stats.matches_played
    );
    let credential = api.credential().cloned().ok_or("no credential after login")?;

    // ── Join ────────────────────────────────────────────────────────
    let game = api.join_room(&room_code).await?;
    tracing::info!("Joined room {room_code} (game {})", game.id);

    let mut sync = SessionSynchronizer::new(
        WebSocketConnector::new(config.channel_url()),
        SyncConfig::default(),
    );
    sync.set_local_player(profile.id.clone());
    sync.connect(credential);
    sync.join_room(game.id.clone());
    sync.submit_ready();

    // ── Event loop ──────────────────────────────────────────────────
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            update = sync.next_update() => {
                let Some(update) = update else {
                    tracing::info!("Channel closed, exiting");
                    break;
                };
                match update {
                    SyncUpdate::SessionUpdated | SyncUpdate::GameStarted => {
                        if let Some(session) = sync.session() {
                            println!("{}", render(&session.board));
                        }
                        if sync.reconciler().is_local_turn() {
                            println!("Your move (0-8):");
                        }
                    }
                    SyncUpdate::PlayerReady { player_id } => {
                        tracing::info!("{} is ready", display_name(&sync, &player_id));
                    }
                    SyncUpdate::PlayerDisconnected { player_id } => {
                        tracing::warn!("{} dropped off", display_name(&sync, &player_id));
                    }
                    SyncUpdate::ServerError { message } => {
                        tracing::error!("Server: {message}");
                    }
                    SyncUpdate::GameOver { outcome } => {
                        if let Some(session) = sync.session() {
                            println!("{}", render(&session.board));
                        }
                        tracing::info!("Game over: {:?}", outcome.or(sync.reconciler().presented_outcome()));
                        break;
                    }
                    SyncUpdate::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("unknown"));
                        break;
                    }
                }
            }

            line = stdin.next_line() => {
                let Some(line) = line? else { break };
                match line.trim().parse::<usize>() {
                    Ok(_) if !sync.status().is_connected() => {
                        println!("Not connected right now, try again in a moment");
                    }
                    Ok(index) => {
                        if let Err(rejection) = sync.play(index) {
                            println!("Can't play there: {rejection}");
                        }
                    }
                    Err(_) => println!("Type a cell number between 0 and 8"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving the room");
                sync.leave_room();
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    sync.disconnect().await;
    tracing::info!("Disconnected. Goodbye!");
    Ok(())
}
