//! New API admin client.
//!
//! Every call goes through [`NewApiClient::perform`], which attaches the held
//! admin session and retries once after the gateway rejects it. The typed
//! wrappers below only build bodies and decode `data`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::auth::Authenticator;
use super::error::{is_unauthenticated_message, GatewayError};
use super::session::{Session, SessionCache};
use super::types::*;
use crate::metrics::METRICS;

/// Page size used when listing tokens.
pub const TOKEN_PAGE_SIZE: usize = 100;

/// Result of one attempt at a call.
enum Attempt {
    Accepted(Envelope<Value>),
    /// The gateway rejected the session; the call may be retried.
    Unauthorized(GatewayError),
}

pub struct NewApiClient {
    http: Client,
    base_url: String,
    auth: Arc<dyn Authenticator>,
    sessions: SessionCache,
}

impl NewApiClient {
    pub fn new(
        base_url: impl Into<String>,
        auth: Arc<dyn Authenticator>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
            sessions: SessionCache::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The session holder, exposed so callers can inspect or seed it.
    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }

    /// Return the held session, logging in first if none is held.
    pub async fn ensure_authenticated(&self) -> Result<Arc<Session>, GatewayError> {
        let session = self
            .sessions
            .get_or_login(|| self.auth.login(&self.http, &self.base_url))
            .await?;
        Ok(session)
    }

    /// Issue an authenticated call and return the accepted envelope.
    ///
    /// A 401, or a `success: false` envelope with an unauthenticated message,
    /// discards the session and retries once when `retry_allowed` is set. The
    /// retried attempt never retries again.
    pub async fn perform(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        retry_allowed: bool,
    ) -> Result<Envelope<Value>, GatewayError> {
        let mut retries_left: u8 = if retry_allowed && self.auth.refreshable() {
            1
        } else {
            0
        };

        loop {
            let session = self.ensure_authenticated().await?;
            let attempt = self
                .send_once(&session, method.clone(), endpoint, body)
                .await
                .inspect_err(|_| METRICS.request(endpoint, "error"))?;

            match attempt {
                Attempt::Accepted(envelope) => {
                    METRICS.request(endpoint, "ok");
                    return Ok(envelope);
                }
                Attempt::Unauthorized(err) if retries_left > 0 => {
                    retries_left -= 1;
                    METRICS.auth_retry();
                    tracing::warn!(
                        %method,
                        endpoint,
                        error = %err,
                        "New API rejected admin session, logging in again"
                    );
                    self.sessions.invalidate(session.generation).await;
                }
                Attempt::Unauthorized(err) => {
                    METRICS.request(endpoint, "unauthorized");
                    return Err(err);
                }
            }
        }
    }

    async fn send_once(
        &self,
        session: &Session,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Attempt, GatewayError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut req = self
            .http
            .request(method.clone(), &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("New-Api-User", session.admin_id.to_string());
        req = session.credential.apply(req);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        tracing::debug!(%method, endpoint, status = status.as_u16(), "New API call");

        if !status.is_success() {
            let err = GatewayError::Status {
                status: status.as_u16(),
                body: text,
            };
            return if status == StatusCode::UNAUTHORIZED {
                Ok(Attempt::Unauthorized(err))
            } else {
                Err(err)
            };
        }

        let envelope: Envelope<Value> = serde_json::from_str(&text).map_err(|e| {
            let snippet: String = text.chars().take(200).collect();
            GatewayError::Decode(format!("{} (body: {})", e, snippet))
        })?;

        if envelope.success {
            return Ok(Attempt::Accepted(envelope));
        }

        let message = envelope.message.unwrap_or_default();
        if is_unauthenticated_message(&message) {
            Ok(Attempt::Unauthorized(GatewayError::Rejected(message)))
        } else {
            Err(GatewayError::Rejected(message))
        }
    }

    async fn call(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, GatewayError> {
        let envelope = self.perform(method, endpoint, body, true).await?;
        Ok(envelope.data)
    }

    // ── Tokens ───────────────────────────────────────────────

    /// Create a token. The returned `key` is the only copy of the secret the
    /// gateway will ever hand out.
    pub async fn create_token(&self, params: CreateTokenParams) -> Result<NewApiToken, GatewayError> {
        let data = self
            .call(Method::POST, "/api/token/", Some(&params.to_body()))
            .await?;
        let token: NewApiToken = decode_required(data, "created token")?;
        tracing::info!(token_id = token.id, name = %token.name, "New API token created");
        Ok(token)
    }

    pub async fn list_tokens_page(&self, page: usize) -> Result<TokenPage, GatewayError> {
        let endpoint = format!("/api/token/?p={}&size={}", page, TOKEN_PAGE_SIZE);
        let data = self.call(Method::GET, &endpoint, None).await?;
        let (items, total) = normalize_listing(data)?;
        Ok(TokenPage { items, total })
    }

    /// All tokens, walking pages until a short page, a page with nothing new,
    /// or the reported total. A gateway that ignores `p` repeats its first
    /// page, which ends the walk after one extra request.
    pub async fn list_tokens(&self) -> Result<Vec<NewApiToken>, GatewayError> {
        let mut tokens = Vec::new();
        let mut seen = HashSet::new();

        for page in 0.. {
            let TokenPage { items, total } = self.list_tokens_page(page).await?;
            let fetched = items.len();
            let before = tokens.len();
            tokens.extend(items.into_iter().filter(|t| seen.insert(t.id)));

            let exhausted = fetched < TOKEN_PAGE_SIZE
                || tokens.len() == before
                || total.is_some_and(|total| tokens.len() as u64 >= total);
            if exhausted {
                break;
            }
        }

        Ok(tokens)
    }

    pub async fn delete_token(&self, token_id: i64) -> Result<(), GatewayError> {
        self.call(Method::DELETE, &format!("/api/token/{}", token_id), None)
            .await?;
        tracing::info!(token_id, "New API token deleted");
        Ok(())
    }

    pub async fn update_token_status(
        &self,
        token_id: i64,
        status: TokenStatus,
    ) -> Result<(), GatewayError> {
        let body = json!({ "id": token_id, "status": i64::from(status) });
        self.call(Method::PUT, "/api/token/?status_only=true", Some(&body))
            .await?;
        Ok(())
    }

    // ── Usage ────────────────────────────────────────────────

    pub async fn get_usage_logs(&self, filter: LogFilter) -> Result<Vec<UsageLogEntry>, GatewayError> {
        let endpoint = format!("/api/log/?{}", filter.to_query());
        let data = self.call(Method::GET, &endpoint, None).await?;
        let (entries, _) = normalize_listing(data)?;
        Ok(entries)
    }

    // ── Channels ─────────────────────────────────────────────

    /// Register an inference backend. Returns the channel id when the gateway
    /// reports one; some versions answer with no `data`.
    pub async fn create_channel(&self, params: CreateChannelParams) -> Result<Option<i64>, GatewayError> {
        let data = self
            .call(Method::POST, "/api/channel/", Some(&params.to_body()))
            .await?;
        let channel_id = data.as_ref().and_then(|d| d.get("id")).and_then(Value::as_i64);
        tracing::info!(name = %params.name, ?channel_id, "New API channel created");
        Ok(channel_id)
    }

    /// Ask the gateway to probe a channel. Any failure reads as unreachable.
    pub async fn test_channel(&self, channel_id: i64) -> bool {
        match self
            .call(Method::GET, &format!("/api/channel/test/{}", channel_id), None)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(channel_id, error = %e, "channel test failed");
                false
            }
        }
    }
}

fn decode_required<T: DeserializeOwned>(data: Option<Value>, what: &str) -> Result<T, GatewayError> {
    let data = data
        .filter(|d| !d.is_null())
        .ok_or_else(|| GatewayError::Decode(format!("response carried no {}", what)))?;
    serde_json::from_value(data).map_err(|e| GatewayError::Decode(format!("invalid {}: {}", what, e)))
}
