//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (lifetimes > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::RouterConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// True when `path` cannot smuggle extra attributes into a `Set-Cookie`
/// header.
pub(crate) fn is_cookie_path_safe(path: &str) -> bool {
    !path
        .chars()
        .any(|c| c == ';' || c == ',' || c.is_whitespace() || c.is_control())
}

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a configuration, collecting every problem.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("{:?} is not a socket address", config.listener.bind_address),
        ));
    }

    if config.session.lifetime_secs == 0 {
        errors.push(ValidationError::new("session.lifetime_secs", "must be greater than 0"));
    }

    if !config.session.path.starts_with('/') {
        errors.push(ValidationError::new("session.path", "must start with /"));
    }
    if !is_cookie_path_safe(&config.session.path) {
        errors.push(ValidationError::new(
            "session.path",
            "must not contain ';', ',', whitespace or control characters",
        ));
    }

    if config.static_files.gzip_min_size > config.static_files.gzip_max_size {
        errors.push(ValidationError::new(
            "static_files.gzip_min_size",
            "must not exceed static_files.gzip_max_size",
        ));
    }

    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::new("limits.max_body_size", "must be greater than 0"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("{:?} is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = RouterConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.session.lifetime_secs = 0;
        config.session.path = "api".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["listener.bind_address", "session.lifetime_secs", "session.path"]
        );
    }

    #[test]
    fn test_session_path_cannot_add_cookie_attributes() {
        for path in ["/; Domain=evil.example", "/a,b", "/a b", "/a\tb"] {
            let mut config = RouterConfig::default();
            config.session.path = path.into();
            let errors = validate_config(&config).unwrap_err();
            assert_eq!(errors.len(), 1, "{path:?}");
            assert_eq!(errors[0].field, "session.path");
        }

        let mut config = RouterConfig::default();
        config.session.path = "/app/v1".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_gzip_size_bounds() {
        let mut config = RouterConfig::default();
        config.static_files.gzip_min_size = 10;
        config.static_files.gzip_max_size = 5;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "static_files.gzip_min_size");
    }

    #[test]
    fn test_unknown_log_level() {
        let mut config = RouterConfig::default();
        config.observability.log_level = "loud".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observability.log_level");
    }
}
