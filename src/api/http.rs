//! [`GameApi`] over HTTP using `reqwest`.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::{ApiConfig, AuthSession, GameApi, NewRoom, Profile, RoomSummary};
use crate::board::CellPosition;
use crate::credential::Credential;
use crate::error::{PlayroomError, Result};
use crate::protocol::GameSnapshot;

/// Message used when an error response carries no `message` field.
const FALLBACK_ERROR_MESSAGE: &str = "Something went wrong";

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct GameEnvelope {
    game: GameSnapshot,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// REST client for the game backend.
///
/// # Example
///
/// ```rust,no_run
/// # async fn example() -> playroom_client::error::Result<()> {
/// use playroom_client::api::{ApiConfig, GameApi, HttpGameApi};
///
/// let mut api = HttpGameApi::new(ApiConfig::from_env())?;
/// api.login("ann@example.com", "hunter22").await?;
/// for room in api.list_rooms().await? {
///     println!("{} ({:?})", room.name, room.room_code);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpGameApi {
    client: reqwest::Client,
    config: ApiConfig,
    credential: Option<Credential>,
}

impl HttpGameApi {
    /// Build a client for `config`. Requests carry no credential until one
    /// is set or [`login`](Self::login) succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`PlayroomError::Http`] if the underlying HTTP client cannot
    /// be built.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PlayroomError::Http(e.to_string()))?;
        Ok(Self {
            client,
            config,
            credential: None,
        })
    }

    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn set_credential(&mut self, credential: Option<Credential>) {
        self.credential = credential;
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// `POST /auth/login`. On success the returned token becomes this
    /// client's credential.
    ///
    /// # Errors
    ///
    /// Returns [`PlayroomError::InvalidRequest`] for an empty email or
    /// password without contacting the server, and
    /// [`PlayroomError::Api`] if the server refuses the login.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthSession> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(PlayroomError::InvalidRequest(
                "please provide both email and password".into(),
            ));
        }
        let body = serde_json::to_value(LoginRequest { email, password })?;
        let session: AuthSession = self.call(Method::POST, "/auth/login", Some(body)).await?;
        debug!(user = %session.user.username, "logged in");
        self.credential = Some(session.token.clone());
        Ok(session)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let text = self.send(method, path, body).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Perform one request and return the body of a success response.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<String> {
        let url = self.config.endpoint(path);
        debug!(%method, %url, "api request");

        let mut request = self.client.request(method.clone(), &url);
        if let Some(credential) = &self.credential {
            request = request.header(AUTHORIZATION, credential.bearer());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        let text = response.text().await.map_err(request_error)?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string());
            warn!(%method, %url, status = status.as_u16(), %message, "api request failed");
            return Err(PlayroomError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(text)
    }
}

fn request_error(e: reqwest::Error) -> PlayroomError {
    if e.is_timeout() {
        PlayroomError::Timeout
    } else {
        PlayroomError::Http(e.to_string())
    }
}

#[async_trait]
impl GameApi for HttpGameApi {
    async fn fetch_profile(&self) -> Result<Profile> {
        self.call(Method::GET, "/auth/profile", None).await
    }

    async fn create_room(&self, room: &NewRoom) -> Result<RoomSummary> {
        let body = serde_json::to_value(room)?;
        self.call(Method::POST, "/games/rooms", Some(body)).await
    }

    async fn list_rooms(&self) -> Result<Vec<RoomSummary>> {
        self.call(Method::GET, "/games/rooms", None).await
    }

    async fn join_room(&self, room_code: &str) -> Result<GameSnapshot> {
        let path = format!("/games/rooms/{room_code}/join");
        let envelope: GameEnvelope = self.call(Method::POST, &path, None).await?;
        Ok(envelope.game)
    }

    async fn get_game_state(&self, game_id: &str) -> Result<GameSnapshot> {
        self.call(Method::GET, &format!("/games/{game_id}"), None)
            .await
    }

    async fn make_move(&self, game_id: &str, position: CellPosition) -> Result<GameSnapshot> {
        let path = format!("/games/{game_id}/move");
        let body = json!({ "position": position });
        let envelope: GameEnvelope = self.call(Method::POST, &path, Some(body)).await?;
        Ok(envelope.game)
    }

    async fn set_ready(&self, game_id: &str) -> Result<()> {
        self.send(Method::PUT, &format!("/games/{game_id}/ready"), None)
            .await
            .map(drop)
    }

    async fn create_single_player(&self, room: &NewRoom) -> Result<GameSnapshot> {
        let body = serde_json::to_value(room)?;
        let envelope: GameEnvelope = self
            .call(Method::POST, "/games/single-player", Some(body))
            .await?;
        Ok(envelope.game)
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
    use crate::protocol::GameType;
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// One request as seen by the mock server.
    #[derive(Debug, Clone, Default)]
    struct Seen {
        method: String,
        path: String,
        authorization: Option<String>,
        body: String,
    }

    /// Serve one canned response per entry in `responses`, recording each
    /// request. Returns the API base URL.
    async fn mock_backend(responses: Vec<(u16, &'static str)>) -> (String, Arc<StdMutex<Vec<Seen>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (stream, _) = listener.accept().await.unwrap();
                let mut reader = BufReader::new(stream);

                let mut request_line = String::new();
                reader.read_line(&mut request_line).await.unwrap();
                let mut parts = request_line.split_whitespace();
                let mut req = Seen {
                    method: parts.next().unwrap_or_default().to_string(),
                    path: parts.next().unwrap_or_default().to_string(),
                    ..Seen::default()
                };

                let mut content_length = 0usize;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).await.unwrap();
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    let (name, value) = line.split_once(':').unwrap();
                    let value = value.trim();
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.parse().unwrap();
                    } else if name.eq_ignore_ascii_case("authorization") {
                        req.authorization = Some(value.to_string());
                    }
                }
                let mut body_buf = vec![0u8; content_length];
                reader.read_exact(&mut body_buf).await.unwrap();
                req.body = String::from_utf8(body_buf).unwrap();
                log.lock().unwrap().push(req);

                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                let mut stream = reader.into_inner();
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.unwrap();
            }
        });

        (format!("http://{addr}/api"), seen)
    }

    fn api(base: &str) -> HttpGameApi {
        HttpGameApi::new(ApiConfig::new(base))
            .unwrap()
            .with_credential(Credential::new("tok"))
    }

    #[tokio::test]
    async fn get_game_state_sends_bearer_and_parses_snapshot() {
        let (base, seen) =
            mock_backend(vec![(200, r#"{"_id":"g1","board":[null,null,null,null,"X",null,null,null,null],"status":"in-progress"}"#)])
                .await;

        let snap = api(&base).get_game_state("g1").await.unwrap();
        assert_eq!(snap.id, "g1");
        assert_eq!(snap.board.unwrap()[4], Some(crate::board::Marker::X));

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].method, "GET");
        assert_eq!(seen[0].path, "/api/games/g1");
        assert_eq!(seen[0].authorization.as_deref(), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn make_move_posts_position_and_unwraps_game() {
        let (base, seen) = mock_backend(vec![(200, r#"{"game":{"_id":"g1","currentTurn":"u2"}}"#)]).await;

        let snap = api(&base)
            .make_move("g1", CellPosition { row: 2, col: 0 })
            .await
            .unwrap();
        assert_eq!(snap.current_turn.as_deref(), Some("u2"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].method, "POST");
        assert_eq!(seen[0].path, "/api/games/g1/move");
        let body: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
        assert_eq!(body, json!({"position": {"row": 2, "col": 0}}));
    }

    #[tokio::test]
    async fn error_status_maps_to_api_error_with_message() {
        let (base, _) = mock_backend(vec![(400, r#"{"message":"Cell already taken"}"#)]).await;

        let err = api(&base)
            .make_move("g1", CellPosition { row: 0, col: 0 })
            .await
            .unwrap_err();
        let PlayroomError::Api { status, message } = err else {
            panic!("expected Api error, got {err:?}");
        };
        assert_eq!(status, 400);
        assert_eq!(message, "Cell already taken");
    }

    #[tokio::test]
    async fn error_without_message_uses_fallback() {
        let (base, _) = mock_backend(vec![(500, "oops")]).await;

        let err = api(&base).list_rooms().await.unwrap_err();
        assert!(matches!(
            err,
            PlayroomError::Api { status: 500, ref message } if message == "Something went wrong"
        ));
    }

    #[tokio::test]
    async fn login_stores_credential_for_later_calls() {
        let (base, seen) = mock_backend(vec![
            (
                200,
                r#"{"token":"fresh","user":{"id":"u1","username":"ann","email":"ann@example.com"}}"#,
            ),
            (200, r#"{"_id":"u1","username":"ann","stats":{"wins":3}}"#),
        ])
        .await;

        let mut client = HttpGameApi::new(ApiConfig::new(&base)).unwrap();
        let session = client.login("ann@example.com", "pw").await.unwrap();
        assert_eq!(session.token.token(), "fresh");
        assert_eq!(client.credential(), Some(&Credential::new("fresh")));

        let profile = client.fetch_profile().await.unwrap();
        assert_eq!(profile.stats.wins, 3);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].path, "/api/auth/login");
        assert_eq!(seen[0].authorization, None);
        let body: serde_json::Value = serde_json::from_str(&seen[0].body).unwrap();
        assert_eq!(body, json!({"email": "ann@example.com", "password": "pw"}));
        assert_eq!(seen[1].path, "/api/auth/profile");
        assert_eq!(seen[1].authorization.as_deref(), Some("Bearer fresh"));
    }

    #[tokio::test]
    async fn login_with_empty_fields_is_refused_locally() {
        let mut client = HttpGameApi::new(ApiConfig::new("http://127.0.0.1:1/api")).unwrap();
        let err = client.login("", "pw").await.unwrap_err();
        assert!(matches!(err, PlayroomError::InvalidRequest(_)));
        assert!(client.credential().is_none());
    }

    #[tokio::test]
    async fn room_routes() {
        let (base, seen) = mock_backend(vec![
            (201, r#"{"_id":"g5","roomCode":"ABCD","name":"Fri","type":"tic-tac-toe"}"#),
            (200, r#"{"game":{"_id":"g5","status":"waiting"}}"#),
            (200, r#"{"message":"ready"}"#),
            (201, r#"{"game":{"_id":"g6","status":"in-progress"}}"#),
        ])
        .await;
        let client = api(&base);

        let room = client
            .create_room(&NewRoom::new("Fri", GameType::TicTacToe))
            .await
            .unwrap();
        assert_eq!(room.room_code.as_deref(), Some("ABCD"));

        let joined = client.join_room("ABCD").await.unwrap();
        assert_eq!(joined.id, "g5");

        client.set_ready("g5").await.unwrap();

        let solo = client
            .create_single_player(&NewRoom::new("Solo", GameType::TicTacToe))
            .await
            .unwrap();
        assert_eq!(solo.id, "g6");

        let seen = seen.lock().unwrap();
        let routes: Vec<(&str, &str)> = seen
            .iter()
            .map(|s| (s.method.as_str(), s.path.as_str()))
            .collect();
        assert_eq!(
            routes,
            vec![
                ("POST", "/api/games/rooms"),
                ("POST", "/api/games/rooms/ABCD/join"),
                ("PUT", "/api/games/g5/ready"),
                ("POST", "/api/games/single-player"),
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_http_error() {
        let client = HttpGameApi::new(
            ApiConfig::new("http://127.0.0.1:1/api").with_request_timeout(Duration::from_secs(2)),
        )
        .unwrap();
        let err = client.list_rooms().await.unwrap_err();
        assert!(matches!(
            err,
            PlayroomError::Http(_) | PlayroomError::Timeout
        ));
    }
}
