//! Client for the New API gateway's admin surface: tokens, channels and
//! usage logs.

pub mod auth;
pub mod client;
pub mod error;
pub mod session;
pub mod types;

use std::sync::Arc;

pub use auth::{Authenticator, PasswordLogin, StaticToken};
pub use client::NewApiClient;
pub use error::{AuthError, GatewayError};
pub use types::*;

use crate::config::{NewApiAuth, NewApiConfig};

impl NewApiClient {
    /// Build a client with the authenticator selected by configuration.
    pub fn from_config(cfg: &NewApiConfig) -> Result<Self, GatewayError> {
        let auth: Arc<dyn Authenticator> = match &cfg.auth {
            NewApiAuth::Session { username, password } => {
                Arc::new(PasswordLogin::new(username.clone(), password.as_str()))
            }
            NewApiAuth::Bearer {
                access_token,
                admin_id,
            } => Arc::new(StaticToken::new(access_token.as_str(), *admin_id)),
        };
        NewApiClient::new(cfg.base_url.clone(), auth, cfg.timeout)
    }
}
