use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::json;
use zeroize::Zeroizing;

use super::error::AuthError;
use super::session::{Credential, LoginGrant};
use super::types::{Envelope, LoginUser};
use crate::metrics::METRICS;

static SESSION_COOKIE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[\s;,])session=([^;,\s]+)").expect("valid session regex"));

/// Source of admin credentials for the gateway.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Obtain a fresh session from the gateway at `base_url`.
    async fn login(&self, http: &Client, base_url: &str) -> Result<LoginGrant, AuthError>;

    /// Whether logging in again can recover from a rejected session. Static
    /// credentials cannot, so the client never retries with them.
    fn refreshable(&self) -> bool;
}

/// Username/password exchange against `POST /api/user/login`.
pub struct PasswordLogin {
    username: String,
    password: Zeroizing<String>,
}

impl PasswordLogin {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }
}

#[async_trait]
impl Authenticator for PasswordLogin {
    #[tracing::instrument(skip_all, fields(username = %self.username))]
    async fn login(&self, http: &Client, base_url: &str) -> Result<LoginGrant, AuthError> {
        let resp = http
            .post(format!("{}/api/user/login", base_url))
            .json(&json!({
                "username": self.username,
                "password": self.password.as_str(),
            }))
            .send()
            .await
            .map_err(|e| {
                METRICS.login("error");
                AuthError::Transport(e)
            })?;

        let cookie = resp
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find_map(extract_session_cookie);

        let status = resp.status();
        let text = resp.text().await.map_err(|e| {
            METRICS.login("error");
            AuthError::Transport(e)
        })?;
        let body: Envelope<LoginUser> = serde_json::from_str(&text).map_err(|e| {
            METRICS.login("error");
            AuthError::Malformed(format!("{} (status {})", e, status))
        })?;

        let user = match (body.success, body.data) {
            (true, Some(user)) => user,
            _ => {
                METRICS.login("rejected");
                let message = body
                    .message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("status {}", status));
                return Err(AuthError::Rejected(message));
            }
        };

        let credential = match cookie {
            Some(value) => Credential::Cookie(value),
            None => {
                tracing::warn!(
                    admin_id = user.id,
                    "New API login set no session cookie, continuing without one"
                );
                Credential::Missing
            }
        };

        METRICS.login("ok");
        tracing::info!(admin_id = user.id, "New API admin session acquired");
        Ok(LoginGrant {
            credential,
            admin_id: user.id,
        })
    }

    fn refreshable(&self) -> bool {
        true
    }
}

/// Pre-issued admin access token; no login exchange happens.
pub struct StaticToken {
    token: Zeroizing<String>,
    admin_id: i64,
}

impl StaticToken {
    pub fn new(token: impl Into<String>, admin_id: i64) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
            admin_id,
        }
    }
}

#[async_trait]
impl Authenticator for StaticToken {
    async fn login(&self, _http: &Client, _base_url: &str) -> Result<LoginGrant, AuthError> {
        Ok(LoginGrant {
            credential: Credential::Bearer(self.token.to_string()),
            admin_id: self.admin_id,
        })
    }

    fn refreshable(&self) -> bool {
        false
    }
}

/// Pull the `session` value out of one `Set-Cookie` header.
pub(crate) fn extract_session_cookie(header: &str) -> Option<String> {
    SESSION_COOKIE
        .captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
