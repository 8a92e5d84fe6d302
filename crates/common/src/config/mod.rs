//! Configuration management for Knowgap services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml)
//! - Default values
//!
//! All similarity thresholds are product configuration, not algorithmic
//! constants. The defaults preserve the required ordering:
//! assignment_threshold > display_threshold > recall_threshold.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Passage retrieval configuration
    pub retrieval: RetrievalConfig,

    /// Gap clustering configuration
    pub clustering: ClusteringConfig,

    /// Cluster labeling configuration
    pub labeling: LabelingConfig,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Downstream hook configuration (pipeline, alerts)
    #[serde(default)]
    pub hooks: HooksConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Minimum similarity for raw recall (wider than display on purpose)
    #[serde(default = "default_recall_threshold")]
    pub recall_threshold: f32,

    /// Minimum similarity for a passage to be shown as a citation
    #[serde(default = "default_display_threshold")]
    pub display_threshold: f32,

    /// Passages fetched per query before assembly
    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Maximum sources returned to the user per chat turn
    #[serde(default = "default_max_sources")]
    pub max_sources: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusteringConfig {
    /// Minimum centroid similarity to join an existing cluster
    #[serde(default = "default_assignment_threshold")]
    pub assignment_threshold: f32,

    /// Similarity tolerance within which two clusters count as tied
    #[serde(default = "default_tie_tolerance")]
    pub tie_tolerance: f32,

    /// Similarity threshold for the orphan batch clusterer
    #[serde(default = "default_orphan_threshold")]
    pub orphan_threshold: f32,

    /// Ordered question-count boundaries that fire a one-shot alert
    #[serde(default = "default_alert_boundaries")]
    pub alert_boundaries: Vec<u32>,

    /// Weight of the recency boost on the priority score
    #[serde(default = "default_recency_boost_weight")]
    pub recency_boost_weight: f64,

    /// Half-life of the recency boost in hours
    #[serde(default = "default_recency_half_life_hours")]
    pub recency_half_life_hours: f64,

    /// Centroid maintenance on removal: approximate or exact
    #[serde(default = "default_centroid_policy")]
    pub centroid_policy: String,

    /// Serialize assignments per tenant instead of accepting the
    /// bounded duplicate-cluster race under concurrency
    #[serde(default)]
    pub serialize_assignments: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LabelingConfig {
    /// Labeling provider: openai, fallback
    #[serde(default = "default_labeling_provider")]
    pub provider: String,

    /// API key for the labeling service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Chat model used to produce labels
    #[serde(default = "default_labeling_model")]
    pub model: String,

    /// Maximum label length in characters
    #[serde(default = "default_max_label_chars")]
    pub max_label_chars: usize,

    /// Request timeout in seconds
    #[serde(default = "default_labeling_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// API key header name
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Tenant ID header name
    #[serde(default = "default_tenant_header")]
    pub tenant_header: String,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HooksConfig {
    /// Processing pipeline submit endpoint. Unset logs submissions only.
    pub pipeline_url: Option<String>,

    /// Alert webhook endpoint. Unset logs alerts only.
    pub alert_webhook_url: Option<String>,

    /// Hook request timeout in seconds
    #[serde(default = "default_hook_timeout")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 50 }
fn default_min_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { "text-embedding-3-small".to_string() }
fn default_embedding_dimension() -> usize { 1536 }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_recall_threshold() -> f32 { 0.5 }
fn default_display_threshold() -> f32 { 0.65 }
fn default_search_top_k() -> usize { 8 }
fn default_max_sources() -> usize { 3 }
fn default_assignment_threshold() -> f32 { 0.85 }
fn default_tie_tolerance() -> f32 { 1e-6 }
fn default_orphan_threshold() -> f32 { 0.8 }
fn default_alert_boundaries() -> Vec<u32> { vec![5, 10, 25] }
fn default_recency_boost_weight() -> f64 { 0.25 }
fn default_recency_half_life_hours() -> f64 { 72.0 }
fn default_centroid_policy() -> String { "approximate".to_string() }
fn default_labeling_provider() -> String { "openai".to_string() }
fn default_labeling_model() -> String { "gpt-4o-mini".to_string() }
fn default_max_label_chars() -> usize { 80 }
fn default_labeling_timeout() -> u64 { 15 }
fn default_api_key_header() -> String { "Authorization".to_string() }
fn default_tenant_header() -> String { "X-Tenant-ID".to_string() }
fn default_request_id_header() -> String { "X-Request-ID".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "knowgap".to_string() }
fn default_hook_timeout() -> u64 { 10 }

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            pipeline_url: None,
            alert_webhook_url: None,
            timeout_secs: default_hook_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/knowgap".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            embedding: EmbeddingConfig {
                provider: default_embedding_provider(),
                api_key: None,
                api_base: None,
                model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_embedding_timeout(),
                max_retries: default_embedding_retries(),
            },
            retrieval: RetrievalConfig::default(),
            clustering: ClusteringConfig::default(),
            labeling: LabelingConfig {
                provider: default_labeling_provider(),
                api_key: None,
                api_base: None,
                model: default_labeling_model(),
                max_label_chars: default_max_label_chars(),
                timeout_secs: default_labeling_timeout(),
            },
            auth: AuthConfig {
                api_key_header: default_api_key_header(),
                tenant_header: default_tenant_header(),
                request_id_header: default_request_id_header(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
            hooks: HooksConfig::default(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            recall_threshold: default_recall_threshold(),
            display_threshold: default_display_threshold(),
            search_top_k: default_search_top_k(),
            max_sources: default_max_sources(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            assignment_threshold: default_assignment_threshold(),
            tie_tolerance: default_tie_tolerance(),
            orphan_threshold: default_orphan_threshold(),
            alert_boundaries: default_alert_boundaries(),
            recency_boost_weight: default_recency_boost_weight(),
            recency_half_life_hours: default_recency_half_life_hours(),
            centroid_policy: default_centroid_policy(),
            serialize_assignments: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
    }

    #[test]
    fn test_threshold_ordering() {
        // Assignment must be stricter than display, display stricter than recall
        let config = AppConfig::default();
        assert!(config.clustering.assignment_threshold > config.retrieval.display_threshold);
        assert!(config.retrieval.display_threshold > config.retrieval.recall_threshold);
    }

    #[test]
    fn test_alert_boundaries_sorted() {
        let config = ClusteringConfig::default();
        let mut sorted = config.alert_boundaries.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, config.alert_boundaries);
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/knowgap");
    }
}
