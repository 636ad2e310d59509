//! Process-wide admin session held by the gateway client.
//!
//! The cache is the only owner of the session. Login runs while the lock is
//! held, so concurrent callers that find the slot empty share one login.
//! Invalidation is keyed by generation: a caller can only discard the session
//! it was rejected with, never a fresher one installed by someone else.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::RequestBuilder;
use tokio::sync::Mutex;

use super::error::AuthError;

/// How a held session proves itself to the gateway.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// `session` cookie issued by the login endpoint.
    Cookie(String),
    /// Static admin access token.
    Bearer(String),
    /// Login succeeded but handed out no cookie. Requests go out with the
    /// admin identity header only.
    Missing,
}

impl Credential {
    pub(crate) fn apply(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Credential::Cookie(value) => {
                req.header(reqwest::header::COOKIE, format!("session={}", value))
            }
            Credential::Bearer(token) => req.bearer_auth(token),
            Credential::Missing => req,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Credential::Missing)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Cookie(_) => f.write_str("Cookie(****)"),
            Credential::Bearer(_) => f.write_str("Bearer(****)"),
            Credential::Missing => f.write_str("Missing"),
        }
    }
}

/// What a successful login hands back.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub credential: Credential,
    pub admin_id: i64,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub credential: Credential,
    pub admin_id: i64,
    /// Monotonic per cache; identifies this session for invalidation.
    pub generation: u64,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Default)]
struct Slot {
    current: Option<Arc<Session>>,
    generation: u64,
}

impl Slot {
    fn install(&mut self, grant: LoginGrant) -> Arc<Session> {
        self.generation += 1;
        let session = Arc::new(Session {
            credential: grant.credential,
            admin_id: grant.admin_id,
            generation: self.generation,
            acquired_at: Utc::now(),
        });
        self.current = Some(session.clone());
        session
    }
}

#[derive(Default)]
pub struct SessionCache {
    slot: Mutex<Slot>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the held session, running `login` first if the slot is empty.
    pub async fn get_or_login<F, Fut>(&self, login: F) -> Result<Arc<Session>, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<LoginGrant, AuthError>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(session) = &slot.current {
            return Ok(session.clone());
        }
        let grant = login().await?;
        Ok(slot.install(grant))
    }

    pub async fn current(&self) -> Option<Arc<Session>> {
        self.slot.lock().await.current.clone()
    }

    /// Replace whatever is held with `grant`.
    pub async fn install(&self, grant: LoginGrant) -> Arc<Session> {
        self.slot.lock().await.install(grant)
    }

    /// Drop the held session if it is still `generation`. Returns whether
    /// anything was discarded.
    pub async fn invalidate(&self, generation: u64) -> bool {
        let mut slot = self.slot.lock().await;
        match &slot.current {
            Some(session) if session.generation == generation => {
                slot.current = None;
                true
            }
            _ => false,
        }
    }

    pub async fn clear(&self) {
        self.slot.lock().await.current = None;
    }
}
