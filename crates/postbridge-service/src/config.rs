//! Configuration management for postbridge binaries.
//!
//! Supports multiple configuration sources with precedence:
//! 1. Environment variables (highest priority)
//! 2. TOML configuration file (`POSTBRIDGE_CONFIG`, default `./postbridge.toml`)
//! 3. Default values (lowest priority)

use std::path::{Path, PathBuf};
use std::time::Duration;

use postbridge_core::MigrationPhase;
use serde::{Deserialize, Serialize};

/// Environment variable naming the TOML file.
pub const CONFIG_PATH_ENV: &str = "POSTBRIDGE_CONFIG";

/// Default TOML file location.
pub const DEFAULT_CONFIG_PATH: &str = "postbridge.toml";

/// Environment variable overriding the persisted phase.
pub const PHASE_ENV: &str = "MIGRATION_PHASE";

/// Accepted range for `migration.batch_size`.
pub const BATCH_SIZE_RANGE: std::ops::RangeInclusive<usize> = 1..=10_000;

/// Accepted range for `migration.max_in_flight`.
pub const MAX_IN_FLIGHT_RANGE: std::ops::RangeInclusive<usize> = 1..=64;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Phase the data layer runs in.
    #[serde(default)]
    pub migration_phase: MigrationPhase,

    #[serde(default)]
    pub mongo: MongoConfig,

    #[serde(default)]
    pub cassandra: CassandraConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub migration: MigrationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MongoDB connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoConfig {
    /// Connection string (default: "mongodb://localhost:27017/")
    #[serde(default = "default_mongo_uri")]
    pub uri: String,

    /// Database name (default: "blog_database")
    #[serde(default = "default_mongo_database")]
    pub database: String,

    /// Collection holding blog posts (default: "posts")
    #[serde(default = "default_posts_collection")]
    pub posts_collection: String,

    /// Server selection timeout in seconds (default: 5)
    #[serde(default = "default_server_selection_timeout")]
    pub server_selection_timeout_secs: u64,
}

/// Cassandra connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CassandraConfig {
    /// Contact points (default: ["127.0.0.1"])
    #[serde(default = "default_contact_points")]
    pub contact_points: Vec<String>,

    /// Native protocol port (default: 9042)
    #[serde(default = "default_cassandra_port")]
    pub port: u16,

    /// Keyspace (default: "blog_data")
    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    /// SimpleStrategy replication factor used when creating the keyspace (default: 1)
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,

    /// Connection timeout in seconds (default: 5)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port (default: 5000)
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Bulk migration defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per Cassandra batch (default: 50)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent batches (default: 4)
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Collections to migrate; empty means all (default: [])
    #[serde(default)]
    pub collections: Vec<String>,

    /// Directory for controller state such as the last verification (default: ".postbridge")
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty (default: "pretty")
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_mongo_uri() -> String {
    "mongodb://localhost:27017/".to_string()
}

fn default_mongo_database() -> String {
    "blog_database".to_string()
}

fn default_posts_collection() -> String {
    "posts".to_string()
}

fn default_server_selection_timeout() -> u64 {
    5
}

fn default_contact_points() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}

fn default_cassandra_port() -> u16 {
    9042
}

fn default_keyspace() -> String {
    "blog_data".to_string()
}

fn default_replication_factor() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_batch_size() -> usize {
    50
}

fn default_max_in_flight() -> usize {
    4
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".postbridge")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: default_mongo_uri(),
            database: default_mongo_database(),
            posts_collection: default_posts_collection(),
            server_selection_timeout_secs: default_server_selection_timeout(),
        }
    }
}

impl MongoConfig {
    #[must_use]
    pub fn server_selection_timeout(&self) -> Duration {
        Duration::from_secs(self.server_selection_timeout_secs)
    }
}

impl Default for CassandraConfig {
    fn default() -> Self {
        Self {
            contact_points: default_contact_points(),
            port: default_cassandra_port(),
            keyspace: default_keyspace(),
            replication_factor: default_replication_factor(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl CassandraConfig {
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for binding.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_in_flight: default_max_in_flight(),
            collections: Vec::new(),
            state_dir: default_state_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AppConfig {
    /// Path of the TOML file: `POSTBRIDGE_CONFIG` or `./postbridge.toml`.
    #[must_use]
    pub fn config_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file doesn't exist or has invalid TOML syntax.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::TomlError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Loads the file at [`AppConfig::config_path`] if present, applies
    /// environment overrides and validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path())
    }

    /// Same as [`AppConfig::load`] with an explicit file location.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `MIGRATION_PHASE` - Migration phase
    /// - `MONGODB_URI`, `MONGO_DB` - MongoDB connection
    /// - `CASS_CONTACT_POINTS` (comma-separated), `CASS_PORT`, `CASS_KEYSPACE` - Cassandra connection
    /// - `POSTBRIDGE_HOST`, `POSTBRIDGE_PORT` - HTTP bind address
    /// - `POSTBRIDGE_LOG_LEVEL`, `POSTBRIDGE_LOG_FORMAT` - Logging
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(phase) = lookup(PHASE_ENV) {
            self.migration_phase = phase
                .parse()
                .map_err(|_| ConfigError::InvalidPhase(phase.clone()))?;
        }

        if let Some(uri) = lookup("MONGODB_URI") {
            self.mongo.uri = uri;
        }

        if let Some(db) = lookup("MONGO_DB") {
            self.mongo.database = db;
        }

        if let Some(points) = lookup("CASS_CONTACT_POINTS") {
            self.cassandra.contact_points = points
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(port) = lookup("CASS_PORT") {
            self.cassandra.port = parse_env("CASS_PORT", &port)?;
        }

        if let Some(keyspace) = lookup("CASS_KEYSPACE") {
            self.cassandra.keyspace = keyspace;
        }

        if let Some(host) = lookup("POSTBRIDGE_HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("POSTBRIDGE_PORT") {
            self.server.port = parse_env("POSTBRIDGE_PORT", &port)?;
        }

        if let Some(level) = lookup("POSTBRIDGE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = lookup("POSTBRIDGE_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mongo.uri.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "mongo.uri cannot be empty".to_string(),
            ));
        }

        if self.mongo.database.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "mongo.database cannot be empty".to_string(),
            ));
        }

        if self.mongo.posts_collection.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "mongo.posts_collection cannot be empty".to_string(),
            ));
        }

        if self.cassandra.contact_points.is_empty() {
            return Err(ConfigError::ValidationError(
                "cassandra.contact_points must list at least one host".to_string(),
            ));
        }

        if self.cassandra.port == 0 {
            return Err(ConfigError::ValidationError(
                "cassandra.port must be non-zero".to_string(),
            ));
        }

        if self.cassandra.keyspace.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "cassandra.keyspace cannot be empty".to_string(),
            ));
        }

        if self.cassandra.replication_factor == 0 {
            return Err(ConfigError::ValidationError(
                "cassandra.replication_factor must be > 0".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be non-zero".to_string(),
            ));
        }

        if !BATCH_SIZE_RANGE.contains(&self.migration.batch_size) {
            return Err(ConfigError::ValidationError(format!(
                "migration.batch_size must be between {} and {}",
                BATCH_SIZE_RANGE.start(),
                BATCH_SIZE_RANGE.end()
            )));
        }

        if !MAX_IN_FLIGHT_RANGE.contains(&self.migration.max_in_flight) {
            return Err(ConfigError::ValidationError(format!(
                "migration.max_in_flight must be between {} and {}",
                MAX_IN_FLIGHT_RANGE.start(),
                MAX_IN_FLIGHT_RANGE.end()
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.format must be one of: {}",
                valid_formats.join(", ")
            )));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key,
        value: value.to_string(),
    })
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading or writing the configuration file
    #[error("Failed to access config file {path:?}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("Failed to parse TOML in {path:?}: {source}")]
    TomlError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Unrecognized phase in the environment
    #[error("Invalid MIGRATION_PHASE `{0}` (expected mongo_only, dual_write, read_cassandra or cassandra_only)")]
    InvalidPhase(String),

    /// Environment variable with an unparseable value
    #[error("Invalid value `{value}` for {key}")]
    InvalidEnv { key: &'static str, value: String },

    /// Validation error
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.migration_phase, MigrationPhase::MongoOnly);
        assert_eq!(config.mongo.uri, "mongodb://localhost:27017/");
        assert_eq!(config.mongo.database, "blog_database");
        assert_eq!(config.cassandra.contact_points, vec!["127.0.0.1"]);
        assert_eq!(config.cassandra.port, 9042);
        assert_eq!(config.cassandra.keyspace, "blog_data");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.migration.batch_size, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
            migration_phase = "dual_write"

            [mongo]
            uri = "mongodb://db:27017/"

            [cassandra]
            contact_points = ["c1", "c2"]
            keyspace = "blog_v2"

            [migration]
            batch_size = 200
            collections = ["posts", "comments"]
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.migration_phase, MigrationPhase::DualWrite);
        assert_eq!(config.mongo.uri, "mongodb://db:27017/");
        assert_eq!(config.mongo.database, "blog_database");
        assert_eq!(config.cassandra.contact_points, vec!["c1", "c2"]);
        assert_eq!(config.migration.batch_size, 200);
        assert_eq!(config.migration.max_in_flight, 4);
        assert_eq!(config.migration.collections, vec!["posts", "comments"]);
    }

    #[test]
    fn test_toml_rejects_unknown_phase() {
        let result: Result<AppConfig, _> = toml::from_str(r#"migration_phase = "halfway""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_env_override() {
        let mut config = AppConfig::default();
        config
            .apply_overrides(lookup(&[
                ("MIGRATION_PHASE", "Read_Cassandra"),
                ("MONGO_DB", "blog_test"),
                ("CASS_CONTACT_POINTS", "10.0.0.1, 10.0.0.2,"),
                ("CASS_PORT", "9142"),
                ("POSTBRIDGE_PORT", "8088"),
            ]))
            .unwrap();

        assert_eq!(config.migration_phase, MigrationPhase::ReadCassandra);
        assert_eq!(config.mongo.database, "blog_test");
        assert_eq!(config.cassandra.contact_points, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(config.cassandra.port, 9142);
        assert_eq!(config.server.port, 8088);
    }

    #[test]
    fn test_env_invalid_phase_is_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(lookup(&[("MIGRATION_PHASE", "cleanup")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPhase(ref v) if v == "cleanup"));
        assert_eq!(config.migration_phase, MigrationPhase::MongoOnly);
    }

    #[test]
    fn test_env_invalid_port_is_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(lookup(&[("CASS_PORT", "ninety")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { key: "CASS_PORT", .. }));
    }

    #[test]
    fn test_config_validation_limits() {
        let mut config = AppConfig::default();
        config.migration.batch_size = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("migration.batch_size"));

        let mut config = AppConfig::default();
        config.migration.max_in_flight = 65;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.cassandra.contact_points.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.format = "yaml".to_string();
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("logging.format must be"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("postbridge.toml");
        std::fs::write(&path, "migration_phase = \"cassandra_only\"\n[server]\nport = 7000\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.migration_phase, MigrationPhase::CassandraOnly);
        assert_eq!(config.server.port, 7000);

        let missing = AppConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::IoError { .. }));
    }
}
