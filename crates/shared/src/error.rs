use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Internal,
    Unexpected,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            400 | 422 => Self::Validation,
            500..=599 => Self::Internal,
            _ => Self::Unexpected,
        }
    }
}

/// Error reported by the order API for a non-success response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

/// Error bodies the backend produces: the response envelope with
/// `success: false` or the bare `{"error": "..."}` used by the auth layer.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Envelope { message: String },
    Bare { error: String },
}

impl ApiError {
    /// Builds an error from a response status and its raw body. Falls back to
    /// a generic message when the body is empty or not one of the known shapes.
    pub fn from_response(status: u16, body: &str) -> Self {
        let code = ErrorCode::from_status(status);
        let message = match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody::Envelope { message }) | Ok(ErrorBody::Bare { error: message })
                if !message.trim().is_empty() =>
            {
                message
            }
            _ => format!("order endpoint responded with status {status}"),
        };
        Self { code, message }
    }
}
