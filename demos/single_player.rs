//! # Single-Player Example
//!
//! Plays a game against the server's computer opponent over plain REST:
//! the move response carries the opponent's reply, and a one-second poll
//! keeps the board in step in between.
//!
//! ## Running
//!
//! ```sh
//! PLAYROOM_EMAIL=ann@example.com PLAYROOM_PASSWORD=secret \
//!     cargo run --example single_player
//! ```

use playroom_client::api::{ApiConfig, HttpGameApi};
use playroom_client::board::BOARD_CELLS;
use playroom_client::polling::{PlayError, PollingSession};
use playroom_client::SyncUpdate;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut api = HttpGameApi::new(ApiConfig::from_env())?;
    let email = std::env::var("PLAYROOM_EMAIL")?;
    let password = std::env::var("PLAYROOM_PASSWORD")?;
    let auth = api.login(&email, &password).await?;

    let mut game = PollingSession::start_single_player(api, "Solo Tic-Tac-Toe")
        .await?
        .with_local_player(auth.user.id);
    tracing::info!("Started game {}", game.game_id());

    // Take the first free cell each turn; the server answers with its move.
    while !game.is_finished() {
        let free = game
            .session()
            .and_then(|s| (0..BOARD_CELLS).find(|&i| s.board.is_empty_at(i)));
        let Some(index) = free else {
            // Board full but not yet finished: wait for the server to catch up.
            if game.next_update().await.is_none() {
                break;
            }
            continue;
        };

        match game.play(index).await {
            Ok(SyncUpdate::GameOver { outcome }) => {
                tracing::info!("Game over: {outcome:?}");
            }
            Ok(_) => {
                tracing::info!("Played cell {index}");
            }
            Err(PlayError::Rejected(rejection)) => {
                tracing::warn!("Move refused locally: {rejection}");
                game.next_update().await;
            }
            Err(PlayError::Api(e)) => {
                tracing::error!("Move failed: {e}");
                game.next_update().await;
            }
        }
    }

    tracing::info!(
        "Final result: {:?}",
        game.reconciler().presented_outcome()
    );
    Ok(())
}
