//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the router.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the router.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouterConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// How nested groups compose prefixes and middleware.
    pub routing: RoutingConfig,

    /// Session cookie settings.
    pub session: SessionConfig,

    /// Static file serving settings.
    pub static_files: StaticFilesConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Nested group composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupingMode {
    /// A group uses its own pattern as prefix and runs only its own chain
    /// after the global one.
    #[default]
    Flat,
    /// A group extends its parent's prefix and runs every ancestor's chain.
    Inherited,
}

/// Routing configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub grouping: GroupingMode,
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie lifetime in seconds.
    pub lifetime_secs: u64,

    /// Cookie path scope.
    pub path: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lifetime_secs: 30 * 60,
            path: "/".to_string(),
        }
    }
}

/// Static file configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// `Cache-Control: max-age` for served files, in seconds.
    pub cache_max_age_secs: u64,
    /// Files smaller than this are sent uncompressed.
    pub gzip_min_size: u64,
    /// Files larger than this are sent uncompressed instead of being buffered.
    pub gzip_max_size: u64,
    /// Content types that are never compressed (parameters ignored).
    pub gzip_excluded_types: Vec<String>,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            cache_max_age_secs: 86_400,
            gzip_min_size: 1024,
            gzip_max_size: 8 * 1024 * 1024,
            gzip_excluded_types: default_gzip_excluded_types(),
        }
    }
}

/// Formats that are already compressed.
fn default_gzip_excluded_types() -> Vec<String> {
    [
        "application/gzip",
        "application/x-gzip",
        "application/zip",
        "application/x-7z-compressed",
        "application/x-bzip2",
        "application/pdf",
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/avif",
        "audio/mpeg",
        "audio/ogg",
        "video/mp4",
        "video/webm",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
