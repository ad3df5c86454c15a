//! Configuration schema definitions.
//!
//! This module defines the configuration structure for the envelope layer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::envelope::SubstitutionRule;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Defaults applied to every envelope.
    pub envelope: EnvelopeSettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Per-API settings, looked up by `api_name`.
    pub apis: Vec<ApiConfig>,
}

/// Envelope defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvelopeSettings {
    /// Upstream call timeout in seconds.
    pub timeout_secs: f64,

    /// Queue expiry TTL in seconds, measured from envelope creation.
    /// 0 disables expiry.
    pub expiry_secs: f64,

    /// Maximum inbound body size read by `from_inbound_call`.
    pub max_body_bytes: usize,
}

impl Default for EnvelopeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30.0,
            expiry_secs: 30.0,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Settings for one upstream API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Logical API name.
    pub name: String,

    /// Upstream timeout override in seconds.
    #[serde(default)]
    pub timeout_secs: Option<f64>,

    /// Expiry TTL override in seconds.
    #[serde(default)]
    pub expiry_secs: Option<f64>,

    /// Whether rate-limiting stages account for this API's requests.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: bool,

    /// Simulated streaming and body substitution.
    #[serde(default)]
    pub advanced: AdvancedSettings,
}

fn default_rate_limit() -> bool {
    true
}

/// Raw `advanced` table, validated into a `RequestConfig`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdvancedSettings {
    pub simulated_stream_enabled: bool,
    pub delay_seconds: f64,
    pub init_delay_seconds: f64,
    pub chunk_size_bytes: usize,
    /// Response content types eligible for simulated streaming.
    pub apply_to: Vec<String>,
    pub req_body_subst_enabled: bool,
    pub subst_rules: Vec<SubstitutionRule>,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            simulated_stream_enabled: false,
            delay_seconds: 0.2,
            init_delay_seconds: 0.5,
            chunk_size_bytes: 256,
            apply_to: vec!["application/json".to_string()],
            req_body_subst_enabled: false,
            subst_rules: Vec::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub log_json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
