use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Request-level errors, mapped onto the wire vocabulary the client keys
/// on (`invalid_room_hash`, `missing_token`, ...).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid room hash")]
    InvalidRoomHash,

    #[error("Missing encrypted payload")]
    MissingPayload,

    #[error("Missing participant token")]
    MissingToken,

    #[error("Invalid participant token")]
    InvalidToken,

    #[error("Room not found")]
    RoomNotFound,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Stable machine-readable error code sent in the JSON body.
    fn code(&self) -> &'static str {
        match self {
            ServerError::InvalidRoomHash => "invalid_room_hash",
            ServerError::MissingPayload => "missing_payload",
            ServerError::MissingToken => "missing_token",
            ServerError::InvalidToken => "invalid_token",
            ServerError::RoomNotFound => "room_not_found",
            ServerError::Internal(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRoomHash | ServerError::MissingPayload => {
                StatusCode::BAD_REQUEST
            }
            ServerError::MissingToken => StatusCode::UNAUTHORIZED,
            ServerError::InvalidToken => StatusCode::FORBIDDEN,
            ServerError::RoomNotFound => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for ServerError {
    fn from(e: rusqlite::Error) -> Self {
        ServerError::Internal(e.to_string())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if let ServerError::Internal(ref detail) = self {
            tracing::error!(detail, "internal server error");
        }

        let body = serde_json::json!({ "error": self.code() });
        (self.status(), axum::Json(body)).into_response()
    }
}
