use serde_json::Value;
use thiserror::Error;

use crate::token::TokenError;

/// Keys tried, in order, when pulling a display message out of an error body.
const MESSAGE_KEYS: [&str; 3] = ["message", "error", "title"];

const FALLBACK_MESSAGE: &str = "The server did not say what went wrong";

/// Failure of a backend operation, already shaped for display.
///
/// Every public operation of the client returns this type; nothing is
/// allowed to escape as a panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("You are not signed in or your session has expired")]
    Unauthorized,

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("Your session credential is malformed: {0}")]
    MalformedToken(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Could not reach the server: {0}")]
    Network(String),

    #[error("Unexpected response from the server: {0}")]
    InvalidResponse(String),

    #[error("{operation} is not available for {resource}")]
    UnsupportedOperation {
        resource: String,
        operation: String,
    },

    #[error("Request cancelled")]
    Cancelled,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Whether the caller should send the user back through login.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, ApiError::Unauthorized | ApiError::MalformedToken(_))
    }

    /// HTTP status associated with the failure, when there was a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Forbidden => Some(403),
            ApiError::NotFound(_) => Some(404),
            ApiError::Conflict(_) => Some(409),
            ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Map a non-2xx status and its body to the matching variant.
    ///
    /// 401 is classified without looking at the body at all.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            404 => ApiError::NotFound(parse_server_error(body)),
            409 => ApiError::Conflict(parse_server_error(body)),
            _ => ApiError::Server {
                status,
                message: parse_server_error(body),
            },
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        ApiError::MalformedToken(err.to_string())
    }
}

/// Extract a display message from an error response body.
///
/// Tries the `message`, `error` and `title` keys of a JSON object in that
/// order, then falls back to the raw text of the body.
///
/// # Arguments
/// * `body` - Raw response body, JSON or plain text
///
/// # Returns
/// * `String` - A message suitable for showing to the user
pub fn parse_server_error(body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        let found = MESSAGE_KEYS
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::trim)
            .find(|message| !message.is_empty());

        if let Some(message) = found {
            return message.to_string();
        }
    }

    let text = body.trim();
    if text.is_empty() {
        FALLBACK_MESSAGE.to_string()
    } else {
        text.to_string()
    }
}
