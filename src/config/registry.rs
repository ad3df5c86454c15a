//! Per-API request profiles built from the loaded configuration.
//!
//! # Responsibilities
//! - Turn each validated `ApiConfig` into a ready `RequestConfig`
//! - Hand every envelope its own copy (never a shared mutable default)
//! - Swap profiles atomically on reload
//!
//! # Design Decisions
//! - Profiles are rebuilt in full on reload; readers never see a mix
//! - Unknown API names get the envelope defaults and a fresh default config

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::config::loader::ConfigError;
use crate::config::schema::{ApiConfig, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::envelope::{RequestConfig, RequestEnvelope};

/// Resolved settings for one API.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiProfile {
    pub name: String,
    pub timeout: Duration,
    /// `None` means envelopes for this API never expire.
    pub expiry: Option<Duration>,
    pub rate_limit: bool,
    pub request_config: RequestConfig,
}

#[derive(Debug)]
struct Profiles {
    default_profile: ApiProfile,
    by_name: HashMap<String, ApiProfile>,
    max_body_bytes: usize,
}

fn duration_from_secs(field: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        ConfigError::Validation(vec![ValidationError::OutOfRange {
            field: field.to_string(),
            value: secs,
        }])
    })
}

fn expiry_from_secs(field: &str, secs: f64) -> Result<Option<Duration>, ConfigError> {
    if secs > 0.0 {
        duration_from_secs(field, secs).map(Some)
    } else {
        Ok(None)
    }
}

impl Profiles {
    fn build(config: &ProxyConfig) -> Result<Self, ConfigError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let default_profile = ApiProfile {
            name: crate::envelope::UNKNOWN_API.to_string(),
            timeout: duration_from_secs("envelope.timeout_secs", config.envelope.timeout_secs)?,
            expiry: expiry_from_secs("envelope.expiry_secs", config.envelope.expiry_secs)?,
            rate_limit: true,
            request_config: RequestConfig::default(),
        };

        let mut by_name = HashMap::with_capacity(config.apis.len());
        for api in &config.apis {
            let profile = Self::profile_for(api, &default_profile)?;
            by_name.insert(api.name.clone(), profile);
        }

        Ok(Self {
            default_profile,
            by_name,
            max_body_bytes: config.envelope.max_body_bytes,
        })
    }

    fn profile_for(api: &ApiConfig, defaults: &ApiProfile) -> Result<ApiProfile, ConfigError> {
        let request_config = RequestConfig::try_from(api.advanced.clone()).map_err(|e| {
            ConfigError::Validation(vec![ValidationError::Advanced {
                api: api.name.clone(),
                reason: e.to_string(),
            }])
        })?;
        let timeout = match api.timeout_secs {
            Some(secs) => duration_from_secs(&format!("apis.{}.timeout_secs", api.name), secs)?,
            None => defaults.timeout,
        };
        let expiry = match api.expiry_secs {
            Some(secs) => expiry_from_secs(&format!("apis.{}.expiry_secs", api.name), secs)?,
            None => defaults.expiry,
        };
        Ok(ApiProfile {
            name: api.name.clone(),
            timeout,
            expiry,
            rate_limit: api.rate_limit,
            request_config,
        })
    }
}

/// Shared, hot-swappable view of the per-API profiles.
#[derive(Debug, Clone)]
pub struct ApiRegistry {
    profiles: Arc<ArcSwap<Profiles>>,
}

impl ApiRegistry {
    /// Build a registry from a configuration, validating it first.
    pub fn new(config: &ProxyConfig) -> Result<Self, ConfigError> {
        let profiles = Profiles::build(config)?;
        Ok(Self {
            profiles: Arc::new(ArcSwap::from_pointee(profiles)),
        })
    }

    /// Replace all profiles. On error the current profiles stay in place.
    pub fn reload(&self, config: &ProxyConfig) -> Result<(), ConfigError> {
        let profiles = Profiles::build(config)?;
        let count = profiles.by_name.len();
        self.profiles.store(Arc::new(profiles));
        tracing::info!(apis = count, "API profiles reloaded");
        Ok(())
    }

    /// Profile for `api_name`, falling back to the defaults.
    pub fn profile(&self, api_name: &str) -> ApiProfile {
        let profiles = self.profiles.load();
        profiles
            .by_name
            .get(api_name)
            .cloned()
            .unwrap_or_else(|| profiles.default_profile.clone())
    }

    /// A fresh copy of the request config for `api_name`.
    pub fn request_config_for(&self, api_name: &str) -> RequestConfig {
        let profiles = self.profiles.load();
        profiles
            .by_name
            .get(api_name)
            .map(|p| p.request_config.clone())
            .unwrap_or_default()
    }

    /// Body limit for `RequestEnvelope::from_inbound_call`.
    pub fn max_body_bytes(&self) -> usize {
        self.profiles.load().max_body_bytes
    }

    pub fn api_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.profiles.load().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, api_name: &str) -> bool {
        self.profiles.load().by_name.contains_key(api_name)
    }

    /// Attach the profile of the envelope's API: config copy, upstream
    /// timeout, expiry deadline and rate-limit flag.
    pub fn apply_to(&self, envelope: &mut RequestEnvelope) {
        let profile = self.profile(envelope.api_name());
        if let Err(e) = envelope.set_timeout(profile.timeout) {
            tracing::warn!(request_id = %envelope.id(), error = %e, "Ignoring invalid profile timeout");
        }
        match profile.expiry {
            Some(ttl) => envelope.expire_after(ttl),
            None => envelope.clear_expiry(),
        }
        envelope.set_rate_limit_applicable(profile.rate_limit);
        envelope.set_config(profile.request_config);
    }

    /// Apply every config received on `updates` until the sender closes.
    pub async fn follow(&self, mut updates: tokio::sync::mpsc::UnboundedReceiver<ProxyConfig>) {
        while let Some(config) = updates.recv().await {
            if let Err(e) = self.reload(&config) {
                tracing::error!(error = %e, "Rejected config update, keeping current profiles");
            }
        }
    }
}
