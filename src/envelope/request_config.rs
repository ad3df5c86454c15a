//! Per-request processing configuration.
//!
//! # Responsibilities
//! - Carry simulated-streaming parameters to the streaming renderer
//! - Carry body substitution rules to the substitution engine
//! - Reject invalid parameter combinations at construction time
//!
//! # Design Decisions
//! - Immutable once built; overrides go through `to_builder()` and produce a copy
//! - Rules are owned JSON objects, so `Clone` is always a deep copy
//! - Content types are kept as an insertion-ordered, case-insensitive set

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::schema::AdvancedSettings;
use crate::envelope::error::{EnvelopeError, EnvelopeResult};

const DEFAULT_DELAY_SECONDS: f64 = 0.2;
const DEFAULT_INIT_DELAY_SECONDS: f64 = 0.5;
const DEFAULT_CHUNK_SIZE_BYTES: usize = 256;
const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// An opaque match/replace descriptor applied to a request body.
///
/// The core never interprets the rule; it only stores and copies it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubstitutionRule(Map<String, Value>);

impl SubstitutionRule {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Look up a single field of the descriptor.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Mutable access for building a modified copy. Rules attached to an
    /// envelope are only reachable through `&RequestConfig`.
    pub fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.0
    }
}

impl From<Map<String, Value>> for SubstitutionRule {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

/// Behavioral configuration attached to one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestConfig {
    simulated_stream_enabled: bool,
    delay_seconds: f64,
    init_delay_seconds: f64,
    chunk_size_bytes: usize,
    apply_to_content_types: Vec<String>,
    body_substitution_enabled: bool,
    substitution_rules: Vec<SubstitutionRule>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            simulated_stream_enabled: false,
            delay_seconds: DEFAULT_DELAY_SECONDS,
            init_delay_seconds: DEFAULT_INIT_DELAY_SECONDS,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            apply_to_content_types: vec![DEFAULT_CONTENT_TYPE.to_string()],
            body_substitution_enabled: false,
            substitution_rules: Vec::new(),
        }
    }
}

impl RequestConfig {
    /// Start from the default configuration.
    pub fn builder() -> RequestConfigBuilder {
        RequestConfigBuilder {
            inner: RequestConfig::default(),
        }
    }

    /// Start a per-request override from this configuration.
    pub fn to_builder(&self) -> RequestConfigBuilder {
        RequestConfigBuilder {
            inner: self.clone(),
        }
    }

    pub fn simulated_stream_enabled(&self) -> bool {
        self.simulated_stream_enabled
    }

    pub fn delay_seconds(&self) -> f64 {
        self.delay_seconds
    }

    pub fn init_delay_seconds(&self) -> f64 {
        self.init_delay_seconds
    }

    /// Inter-chunk delay.
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.delay_seconds).unwrap_or(Duration::MAX)
    }

    /// Delay before the first chunk.
    pub fn init_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.init_delay_seconds).unwrap_or(Duration::MAX)
    }

    pub fn chunk_size_bytes(&self) -> usize {
        self.chunk_size_bytes
    }

    pub fn apply_to_content_types(&self) -> &[String] {
        &self.apply_to_content_types
    }

    pub fn body_substitution_enabled(&self) -> bool {
        self.body_substitution_enabled
    }

    pub fn substitution_rules(&self) -> &[SubstitutionRule] {
        &self.substitution_rules
    }

    /// Whether a response with this content type should be streamed in
    /// simulated chunks. Parameters such as `charset` are ignored.
    pub fn applies_to(&self, content_type: &str) -> bool {
        if !self.simulated_stream_enabled {
            return false;
        }
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.apply_to_content_types.iter().any(|ct| *ct == essence)
    }

    fn validate(&self) -> EnvelopeResult<()> {
        if self.simulated_stream_enabled && self.chunk_size_bytes == 0 {
            return Err(EnvelopeError::InvalidConfig(
                "chunk_size_bytes must be greater than 0 when simulated streaming is enabled".into(),
            ));
        }
        for (name, value) in [
            ("delay_seconds", self.delay_seconds),
            ("init_delay_seconds", self.init_delay_seconds),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EnvelopeError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(EnvelopeError::InvalidConfig(format!(
                    "{} is too large to be a duration, got {}",
                    name, value
                )));
            }
        }
        if self.apply_to_content_types.iter().any(|ct| ct.is_empty()) {
            return Err(EnvelopeError::InvalidConfig(
                "apply_to content types must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`RequestConfig`].
#[derive(Debug, Clone)]
pub struct RequestConfigBuilder {
    inner: RequestConfig,
}

impl RequestConfigBuilder {
    pub fn simulated_stream(mut self, enabled: bool) -> Self {
        self.inner.simulated_stream_enabled = enabled;
        self
    }

    pub fn delay_seconds(mut self, seconds: f64) -> Self {
        self.inner.delay_seconds = seconds;
        self
    }

    pub fn init_delay_seconds(mut self, seconds: f64) -> Self {
        self.inner.init_delay_seconds = seconds;
        self
    }

    pub fn chunk_size_bytes(mut self, bytes: usize) -> Self {
        self.inner.chunk_size_bytes = bytes;
        self
    }

    /// Replace the eligible content types. Duplicates are dropped,
    /// keeping the first occurrence.
    pub fn apply_to<I, S>(mut self, content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.apply_to_content_types.clear();
        for ct in content_types {
            self = self.add_content_type(ct);
        }
        self
    }

    pub fn add_content_type(mut self, content_type: impl AsRef<str>) -> Self {
        let normalized = content_type.as_ref().trim().to_ascii_lowercase();
        if !self.inner.apply_to_content_types.contains(&normalized) {
            self.inner.apply_to_content_types.push(normalized);
        }
        self
    }

    pub fn body_substitution(mut self, enabled: bool) -> Self {
        self.inner.body_substitution_enabled = enabled;
        self
    }

    /// Append a rule after the existing ones.
    pub fn rule(mut self, rule: SubstitutionRule) -> Self {
        self.inner.substitution_rules.push(rule);
        self
    }

    /// Replace the rule sequence.
    pub fn rules<I>(mut self, rules: I) -> Self
    where
        I: IntoIterator<Item = SubstitutionRule>,
    {
        self.inner.substitution_rules = rules.into_iter().collect();
        self
    }

    pub fn build(self) -> EnvelopeResult<RequestConfig> {
        self.inner.validate()?;
        Ok(self.inner)
    }
}

impl TryFrom<AdvancedSettings> for RequestConfig {
    type Error = EnvelopeError;

    fn try_from(settings: AdvancedSettings) -> Result<Self, Self::Error> {
        RequestConfig::builder()
            .simulated_stream(settings.simulated_stream_enabled)
            .delay_seconds(settings.delay_seconds)
            .init_delay_seconds(settings.init_delay_seconds)
            .chunk_size_bytes(settings.chunk_size_bytes)
            .apply_to(&settings.apply_to)
            .body_substitution(settings.req_body_subst_enabled)
            .rules(settings.subst_rules)
            .build()
    }
}
