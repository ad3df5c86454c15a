//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, expiry >= 0, representable as `Duration`)
//! - Reject duplicate API names
//! - Apply `RequestConfig` rules to every `advanced` table
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::envelope::RequestConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be a positive number, got {value}")]
    NonPositive { field: String, value: f64 },

    #[error("{field} must be a non-negative number, got {value}")]
    Negative { field: String, value: f64 },

    #[error("{field} is too large to be a duration, got {value}")]
    OutOfRange { field: String, value: f64 },

    #[error("envelope.max_body_bytes must be greater than 0")]
    ZeroBodyLimit,

    #[error("apis[{index}] has an empty name")]
    EmptyApiName { index: usize },

    #[error("API '{0}' is defined more than once")]
    DuplicateApi(String),

    #[error("API '{api}' has an invalid advanced config: {reason}")]
    Advanced { api: String, reason: String },

    #[error("observability.log_level '{0}' is not a valid level")]
    LogLevel(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),
}

fn check_positive(field: impl Into<String>, value: f64, errors: &mut Vec<ValidationError>) {
    if !value.is_finite() || value <= 0.0 {
        errors.push(ValidationError::NonPositive { field: field.into(), value });
    } else {
        check_representable(field, value, errors);
    }
}

fn check_non_negative(field: impl Into<String>, value: f64, errors: &mut Vec<ValidationError>) {
    if !value.is_finite() || value < 0.0 {
        errors.push(ValidationError::Negative { field: field.into(), value });
    } else {
        check_representable(field, value, errors);
    }
}

fn check_representable(field: impl Into<String>, value: f64, errors: &mut Vec<ValidationError>) {
    if Duration::try_from_secs_f64(value).is_err() {
        errors.push(ValidationError::OutOfRange { field: field.into(), value });
    }
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_positive("envelope.timeout_secs", config.envelope.timeout_secs, &mut errors);
    check_non_negative("envelope.expiry_secs", config.envelope.expiry_secs, &mut errors);
    if config.envelope.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    let mut seen = HashSet::new();
    for (index, api) in config.apis.iter().enumerate() {
        if api.name.trim().is_empty() {
            errors.push(ValidationError::EmptyApiName { index });
            continue;
        }
        if !seen.insert(api.name.as_str()) {
            errors.push(ValidationError::DuplicateApi(api.name.clone()));
        }
        if let Some(timeout) = api.timeout_secs {
            check_positive(format!("apis.{}.timeout_secs", api.name), timeout, &mut errors);
        }
        if let Some(expiry) = api.expiry_secs {
            check_non_negative(format!("apis.{}.expiry_secs", api.name), expiry, &mut errors);
        }
        if let Err(e) = RequestConfig::try_from(api.advanced.clone()) {
            errors.push(ValidationError::Advanced {
                api: api.name.clone(),
                reason: e.to_string(),
            });
        }
    }

    if config.observability.log_level.parse::<tracing::Level>().is_err() {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
