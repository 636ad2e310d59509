use std::fmt;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::newapi::DEFAULT_TOKEN_QUOTA;

pub struct Config {
    pub port: u16,
    /// Dashboard frontend origin allowed by CORS.
    pub dashboard_origin: String,
    /// Keys a single user may hold. Set via DASHBOARD_MAX_KEYS. Default: 3.
    pub max_keys: i64,
    /// Quota granted to each new key. Set via DASHBOARD_DEFAULT_QUOTA.
    pub default_quota: i64,
    /// Postgres URL for key and server records. Unset = in-memory store.
    pub database_url: Option<String>,
    pub new_api: NewApiConfig,
}

pub struct NewApiConfig {
    pub base_url: String,
    pub auth: NewApiAuth,
    pub timeout: Duration,
}

/// How the gateway client authenticates, chosen by NEW_API_AUTH_MODE.
pub enum NewApiAuth {
    /// Admin username/password login, session cookie + `New-Api-User`.
    Session {
        username: String,
        password: Zeroizing<String>,
    },
    /// Pre-issued admin access token sent as a bearer token.
    Bearer {
        access_token: Zeroizing<String>,
        admin_id: i64,
    },
}

impl fmt::Debug for NewApiAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewApiAuth::Session { username, .. } => f
                .debug_struct("Session")
                .field("username", username)
                .field("password", &"****")
                .finish(),
            NewApiAuth::Bearer { admin_id, .. } => f
                .debug_struct("Bearer")
                .field("access_token", &"****")
                .field("admin_id", admin_id)
                .finish(),
        }
    }
}

impl fmt::Debug for NewApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewApiConfig")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("dashboard_origin", &self.dashboard_origin)
            .field("max_keys", &self.max_keys)
            .field("default_quota", &self.default_quota)
            .field("database_url", &self.database_url.as_ref().map(|_| "****"))
            .field("new_api", &self.new_api)
            .finish()
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Build the configuration from any key/value source.
pub fn from_lookup<F>(get: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let auth = match var("NEW_API_AUTH_MODE").as_deref().unwrap_or("session") {
        "session" => {
            let (Some(username), Some(password)) =
                (var("NEW_API_ADMIN_USER"), get("NEW_API_ADMIN_PASS"))
            else {
                anyhow::bail!(
                    "NEW_API_ADMIN_USER and NEW_API_ADMIN_PASS must be set in session auth mode"
                );
            };
            NewApiAuth::Session {
                username,
                password: Zeroizing::new(password),
            }
        }
        "bearer" => {
            let Some(access_token) = var("NEW_API_ACCESS_TOKEN") else {
                anyhow::bail!("NEW_API_ACCESS_TOKEN must be set in bearer auth mode");
            };
            let admin_id = match var("NEW_API_ADMIN_ID") {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| anyhow::anyhow!("NEW_API_ADMIN_ID must be an integer, got '{}'", raw))?,
                None => 1,
            };
            NewApiAuth::Bearer {
                access_token: Zeroizing::new(access_token),
                admin_id,
            }
        }
        other => anyhow::bail!(
            "NEW_API_AUTH_MODE must be 'session' or 'bearer', got '{}'",
            other
        ),
    };

    Ok(Config {
        port: var("DASHBOARD_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080),
        dashboard_origin: var("DASHBOARD_ORIGIN")
            .unwrap_or_else(|| "http://localhost:3000".into()),
        max_keys: var("DASHBOARD_MAX_KEYS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(3),
        default_quota: var("DASHBOARD_DEFAULT_QUOTA")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TOKEN_QUOTA),
        database_url: var("DATABASE_URL"),
        new_api: NewApiConfig {
            base_url: var("NEW_API_BASE_URL")
                .unwrap_or_else(|| "http://localhost:3000".into()),
            auth,
            timeout: Duration::from_secs(
                var("NEW_API_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
        },
    })
}
