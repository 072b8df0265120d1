//! Typed HTTP client for the broker API.
//!
//! Fire-and-forget semantics: callers treat these as best-effort network
//! calls and only change UI-observable state on explicit success or on
//! the corresponding broadcast event. The bearer token always travels in
//! the dedicated `X-Chat-Token` header.

use serde::Deserialize;

use ephemere_shared::constants::TOKEN_HEADER;
use ephemere_shared::EncryptedPayload;

use crate::error::ClientError;

/// Cheap to clone (shares the reqwest connection pool).
#[derive(Clone)]
pub struct RoomApi {
    base_url: String,
    http: reqwest::Client,
}

/// Outcome of the initial room registration call.
#[derive(Debug)]
pub enum RoomCheck {
    /// This device created the room and was auto-admitted.
    Created { participant_token: String },
    /// The room exists; admission goes through knock/approve.
    Exists { has_participants: bool },
}

#[derive(Deserialize)]
struct RoomCheckResponse {
    status: String,
    #[serde(default)]
    has_participants: bool,
    #[serde(default)]
    participant_token: Option<String>,
}

#[derive(Deserialize)]
struct ApproveResponse {
    new_participant_token: String,
}

#[derive(Deserialize)]
struct PresenceResponse {
    active_participants: i64,
}

impl RoomApi {
    /// `base_url` is the server origin, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub async fn register_room(&self, room_hash: &str) -> Result<RoomCheck, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/rooms", self.base_url))
            .json(&serde_json::json!({ "room_hash": room_hash }))
            .send()
            .await?;

        let response = check_status(response)?;
        let body: RoomCheckResponse = response.json().await?;
        match body.participant_token {
            Some(token) if body.status == "created" => Ok(RoomCheck::Created {
                participant_token: token,
            }),
            _ => Ok(RoomCheck::Exists {
                has_participants: body.has_participants,
            }),
        }
    }

    pub async fn knock(
        &self,
        room_hash: &str,
        message: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.room_url(room_hash, "knock"))
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    pub async fn approve(&self, room_hash: &str, token: &str) -> Result<String, ClientError> {
        let response = self
            .http
            .post(self.room_url(room_hash, "approve"))
            .header(TOKEN_HEADER, token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let body: ApproveResponse = check_status(response)?.json().await?;
        Ok(body.new_participant_token)
    }

    pub async fn reject(
        &self,
        room_hash: &str,
        token: &str,
        message: Option<&str>,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.room_url(room_hash, "reject"))
            .header(TOKEN_HEADER, token)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    pub async fn send_message(
        &self,
        room_hash: &str,
        token: &str,
        msg_id: &str,
        payload: &EncryptedPayload,
    ) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.room_url(room_hash, "message"))
            .header(TOKEN_HEADER, token)
            .json(&serde_json::json!({
                "msg_id": msg_id,
                "encrypted_payload": payload,
            }))
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    /// Heartbeat; returns the current live participant count.
    pub async fn presence(&self, room_hash: &str, token: &str) -> Result<i64, ClientError> {
        let response = self
            .http
            .post(self.room_url(room_hash, "presence"))
            .header(TOKEN_HEADER, token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let body: PresenceResponse = check_status(response)?.json().await?;
        Ok(body.active_participants)
    }

    pub async fn disband(&self, room_hash: &str, token: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.room_url(room_hash, "disband"))
            .header(TOKEN_HEADER, token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        check_status(response)?;
        Ok(())
    }

    fn room_url(&self, room_hash: &str, action: &str) -> String {
        format!("{}/api/rooms/{room_hash}/{action}", self.base_url)
    }
}

/// Map the broker's status codes onto the client error taxonomy.
fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status.as_u16() {
        401 | 403 => Err(ClientError::Unauthorized),
        404 => Err(ClientError::RoomGone),
        code => Err(ClientError::UnexpectedStatus(code)),
    }
}
