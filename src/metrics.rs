//! Prometheus counters for gateway traffic.
//!
//! Registered once in the default registry and exported at `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    opts, register_counter_vec, register_int_counter, CounterVec, Encoder, IntCounter,
    TextEncoder,
};

pub static METRICS: Lazy<GatewayMetrics> = Lazy::new(GatewayMetrics::register);

pub struct GatewayMetrics {
    requests_total: CounterVec,
    logins_total: CounterVec,
    auth_retries_total: IntCounter,
}

impl GatewayMetrics {
    fn register() -> Self {
        let requests_total = register_counter_vec!(
            opts!(
                "dashboard_gateway_requests_total",
                "New API calls by endpoint and outcome"
            ),
            &["endpoint", "outcome"]
        )
        .expect("failed to register dashboard_gateway_requests_total");

        let logins_total = register_counter_vec!(
            opts!(
                "dashboard_gateway_logins_total",
                "New API admin login exchanges by outcome"
            ),
            &["outcome"]
        )
        .expect("failed to register dashboard_gateway_logins_total");

        let auth_retries_total = register_int_counter!(
            "dashboard_gateway_auth_retries_total",
            "Calls retried after the gateway rejected the admin session"
        )
        .expect("failed to register dashboard_gateway_auth_retries_total");

        Self {
            requests_total,
            logins_total,
            auth_retries_total,
        }
    }

    pub fn request(&self, endpoint: &str, outcome: &str) {
        self.requests_total
            .with_label_values(&[&endpoint_label(endpoint), outcome])
            .inc();
    }

    pub fn login(&self, outcome: &str) {
        self.logins_total.with_label_values(&[outcome]).inc();
    }

    pub fn auth_retry(&self) {
        self.auth_retries_total.inc();
    }
}

/// Collapse an endpoint into a bounded label: query dropped, numeric path
/// segments replaced by `:id`.
fn endpoint_label(endpoint: &str) -> String {
    let path = endpoint.split('?').next().unwrap_or_default();
    path.split('/')
        .map(|seg| {
            if !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_digit()) {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}
