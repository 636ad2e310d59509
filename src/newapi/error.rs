use thiserror::Error;

/// The login exchange with the gateway did not produce a usable session.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("New API login request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("New API login failed: {0}")]
    Rejected(String),

    #[error("malformed New API login response: {0}")]
    Malformed(String),
}

/// Failure of an authenticated gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Non-2xx answer. Carries the raw body text for diagnostics.
    #[error("New API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// 2xx answer whose envelope reported `success: false`.
    #[error("New API rejected request: {0}")]
    Rejected(String),

    #[error("New API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed New API response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// HTTP status of the failed call, when the gateway answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        match self {
            GatewayError::Status { status, .. } => *status == 401,
            GatewayError::Rejected(message) => is_unauthenticated_message(message),
            GatewayError::Auth(_) => true,
            _ => false,
        }
    }
}

/// Messages the gateway uses in `success: false` envelopes when the admin
/// session is missing or expired. New API answers in Chinese by default.
const UNAUTHENTICATED_MARKERS: &[&str] = &["未登录", "not logged in", "unauthorized"];

pub(crate) fn is_unauthenticated_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    UNAUTHENTICATED_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
