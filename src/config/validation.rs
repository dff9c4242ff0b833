//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile every route pattern and check declared params
//! - Validate value ranges (capacities > 0, addresses parse)
//! - Detect duplicate route tags and unusable markers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SsrConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - Loader refs are checked later, against the full registry

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::SsrConfig;
use crate::routing::Route;

/// One semantic problem in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &SsrConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.routing.match_cache_capacity == 0 {
        errors.push(ValidationError::new("routing.match_cache_capacity", "must be greater than 0"));
    }
    if config.cache.enabled && config.cache.capacity == 0 {
        errors.push(ValidationError::new("cache.capacity", "must be greater than 0"));
    }
    if config.stream.channel_capacity == 0 {
        errors.push(ValidationError::new("stream.channel_capacity", "must be greater than 0"));
    }

    let stream = &config.stream;
    if stream.head_marker.is_empty() {
        errors.push(ValidationError::new("stream.head_marker", "must not be empty"));
    }
    if stream.body_marker.is_empty() {
        errors.push(ValidationError::new("stream.body_marker", "must not be empty"));
    }
    if !stream.head_marker.is_empty() && stream.head_marker == stream.body_marker {
        errors.push(ValidationError::new("stream.body_marker", "must differ from stream.head_marker"));
    }

    let mut tags = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        if let Err(e) = Route::from_config(route) {
            errors.push(ValidationError::new(format!("routes[{i}]"), e.to_string()));
        }
        if !tags.insert(route.tag.as_str()) {
            errors.push(ValidationError::new(
                format!("routes[{i}].tag"),
                format!("duplicate tag '{}'", route.tag),
            ));
        }
        if let Some(policy) = &route.cache {
            if policy.enabled && policy.max_age_secs == 0 && policy.stale_while_revalidate_secs.is_some() {
                errors.push(ValidationError::new(
                    format!("routes[{i}].cache"),
                    "stale_while_revalidate_secs requires max_age_secs > 0",
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
