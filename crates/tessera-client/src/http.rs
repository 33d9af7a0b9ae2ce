//! Thin JSON-over-HTTP homeserver session.
//!
//! Only the four calls the client needs: password login, room send,
//! to-device send, and the long-poll sync that delivers verification
//! envelopes. Retry policy is deliberately absent; callers decide whether
//! a failed send is worth repeating.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tessera_proto::{InboundEnvelope, MessageContent, ToDeviceMessage};
use thiserror::Error;

/// How long the server may hold a sync request open.
const SYNC_TIMEOUT_MS: u64 = 30_000;

/// Errors from talking to the homeserver.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The request never completed (connection, TLS, timeout).
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server rejected the request ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body, or the status text.
        message: String,
    },

    /// A call that needs an access token was made before login.
    #[error("not logged in")]
    NotLoggedIn,
}

/// Result of a successful password login.
#[derive(Clone, Deserialize)]
pub struct LoginOutcome {
    /// Full user id the server resolved.
    pub user_id: String,
    /// Device id assigned to this session.
    pub device_id: String,
    /// Access token for subsequent calls.
    pub access_token: String,
}

impl std::fmt::Debug for LoginOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginOutcome")
            .field("user_id", &self.user_id)
            .field("device_id", &self.device_id)
            .field("access_token", &format!("<redacted {} bytes>", self.access_token.len()))
            .finish()
    }
}

/// One batch of sync results.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncBatch {
    /// Token to resume from on the next sync call.
    pub next_batch: String,
    /// To-device envelopes delivered in this batch.
    #[serde(default)]
    pub to_device: Vec<InboundEnvelope>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    user: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct ApiError {
    error: String,
}

/// An authenticated (or soon-to-be) homeserver session.
pub struct HttpSession {
    base: String,
    client: reqwest::Client,
    access_token: Option<String>,
}

impl HttpSession {
    /// Create a session against `homeserver`, not yet logged in.
    pub fn new(homeserver: &str) -> Self {
        Self {
            base: homeserver.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
            access_token: None,
        }
    }

    /// Create a session that reuses a stored access token.
    pub fn with_token(homeserver: &str, access_token: impl Into<String>) -> Self {
        let mut session = Self::new(homeserver);
        session.access_token = Some(access_token.into());
        session
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/_api/client/v1/{path}", self.base)
    }

    fn token(&self) -> Result<&str, SessionError> {
        self.access_token.as_deref().ok_or(SessionError::NotLoggedIn)
    }

    async fn reject(status: StatusCode, response: reqwest::Response) -> SessionError {
        let message = match response.json::<ApiError>().await {
            Ok(body) => body.error,
            Err(_) => status.canonical_reason().unwrap_or("unknown error").to_owned(),
        };
        SessionError::Api { status: status.as_u16(), message }
    }

    /// Log in with a password; the returned token is also retained for
    /// subsequent calls on this session.
    pub async fn login(&mut self, user: &str, password: &str) -> Result<LoginOutcome, SessionError> {
        let response = self
            .client
            .post(self.endpoint("login"))
            .json(&LoginRequest { user, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::reject(status, response).await);
        }

        let outcome: LoginOutcome = response.json().await?;
        self.access_token = Some(outcome.access_token.clone());
        tracing::debug!(user_id = %outcome.user_id, device_id = %outcome.device_id, "logged in");
        Ok(outcome)
    }

    /// Send one message into a room.
    pub async fn send_room_message(
        &self,
        room_id: &str,
        content: &MessageContent,
    ) -> Result<(), SessionError> {
        let token = self.token()?;
        let response = self
            .client
            .post(self.endpoint(&format!("rooms/{room_id}/send")))
            .bearer_auth(token)
            .json(content)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::reject(status, response).await);
        }
        tracing::debug!(room_id, "message sent");
        Ok(())
    }

    /// Deliver a payload to one peer device.
    pub async fn send_to_device(&self, message: &ToDeviceMessage) -> Result<(), SessionError> {
        let token = self.token()?;
        let response = self
            .client
            .post(self.endpoint("to_device"))
            .bearer_auth(token)
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::reject(status, response).await);
        }
        Ok(())
    }

    /// Long-poll for the next batch of to-device envelopes.
    pub async fn sync(&self, since: Option<&str>) -> Result<SyncBatch, SessionError> {
        let token = self.token()?;
        let mut request = self
            .client
            .get(self.endpoint("sync"))
            .bearer_auth(token)
            .query(&[("timeout_ms", SYNC_TIMEOUT_MS.to_string())]);
        if let Some(since) = since {
            request = request.query(&[("since", since)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Self::reject(status, response).await);
        }
        Ok(response.json().await?)
    }
}
