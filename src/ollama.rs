//! Reachability probe for user-supplied Ollama servers.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

/// Bound on the `/api/tags` probe run during registration.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

pub struct OllamaProbe {
    http: Client,
}

impl OllamaProbe {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Installed model names. A server that answers with a non-2xx status or
    /// an unexpected body has no usable models; a server that cannot be
    /// reached at all is an error.
    pub async fn list_models(&self, server_url: &str) -> Result<Vec<String>, reqwest::Error> {
        let url = format!("{}/api/tags", server_url.trim_end_matches('/'));
        let resp = self.http.get(&url).send().await?;

        if !resp.status().is_success() {
            tracing::debug!(%url, status = resp.status().as_u16(), "Ollama tags probe failed");
            return Ok(Vec::new());
        }

        let tags = match resp.json::<TagsResponse>().await {
            Ok(tags) => tags,
            Err(e) => {
                tracing::debug!(%url, error = %e, "Ollama tags body unreadable");
                return Ok(Vec::new());
            }
        };
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}
