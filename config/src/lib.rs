//! # Configuration Management for bucketcache
//!
//! This crate provides the configuration structures shared by the cache
//! adapter and its resource manager: adapter options (namespace, separator,
//! ttl, resource id) and named connection resources.
//!
//! ## Quick Start
//!
//! ### Programmatic Configuration
//! ```rust
//! use config::{CacheOptions, ResourceConfig, ServerAddress};
//!
//! let options = CacheOptions::new("app")
//!     .with_ttl(3600)
//!     .with_resource_id("sessions");
//!
//! let resource = ResourceConfig::new(vec![ServerAddress::new("localhost", 6379)])
//!     .with_credentials("app", "secret")
//!     .with_bucket("2");
//! ```
//!
//! ### TOML File Configuration
//! ```toml
//! [cache]
//! namespace = "app"
//! namespace_separator = ":"
//! ttl = 3600
//! resource_id = "default"
//!
//! [resources.default]
//! servers = "127.0.0.1:6379, 10.0.0.2"
//! username = ""
//! password = ""
//! bucket = "0"
//! connect_timeout_ms = 3000
//! ```
//!
//! Load configuration:
//! ```rust,no_run
//! use config::AppConfig;
//!
//! // Load from bucketcache.toml (or the path in BUCKETCACHE_CONFIG)
//! let config = AppConfig::load()?;
//!
//! // Or load from custom path
//! let config = AppConfig::from_file("config/production.toml")?;
//! # Ok::<(), config::ConfigError>(())
//! ```

mod server;

pub use server::{dedup as dedup_servers, ServerAddress, DEFAULT_HOST, DEFAULT_PORT};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{env, fmt, path::Path};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "./bucketcache.toml";
const CONFIG_PATH_VAR: &str = "BUCKETCACHE_CONFIG";

/// Longest namespace accepted by the adapter, in bytes
pub const MAX_NAMESPACE_LENGTH: usize = 128;

/// Separator placed between namespace and key
pub const DEFAULT_NAMESPACE_SEPARATOR: &str = ":";

/// Resource used when none is configured
pub const DEFAULT_RESOURCE_ID: &str = "default";

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Environment variable error: {0}")]
    Env(#[from] env::VarError),
    #[error("Dotenvy error: {0}")]
    Dotenvy(#[from] dotenvy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheOptions,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceConfig>,
}

/// Adapter options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Prefix applied to every key, empty for none
    #[serde(default)]
    pub namespace: String,

    #[serde(default = "default_separator")]
    pub namespace_separator: String,

    /// Default time to live in seconds, 0 means no expiry
    #[serde(default)]
    pub ttl: u64,

    /// Which resource of the resource manager to use
    #[serde(default = "default_resource_id")]
    pub resource_id: String,
}

/// Connection settings of one resource
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(
        default = "default_servers",
        deserialize_with = "server::deserialize_servers"
    )]
    pub servers: Vec<ServerAddress>,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Bucket, i.e. the database index on the backing store; empty selects 0
    #[serde(default)]
    pub bucket: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

fn default_separator() -> String {
    DEFAULT_NAMESPACE_SEPARATOR.to_string()
}

fn default_resource_id() -> String {
    DEFAULT_RESOURCE_ID.to_string()
}

fn default_servers() -> Vec<ServerAddress> {
    vec![ServerAddress::default()]
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

impl AppConfig {
    /// Load configuration from TOML file specified in .env or defaults
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }

        // Path from the environment (possibly set by .env) wins
        if let Ok(config_path) = env::var(CONFIG_PATH_VAR) {
            Self::from_file(&config_path)
        }
        // Try to load config from DEFAULT_CONFIG_PATH
        else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::from_file(DEFAULT_CONFIG_PATH)
        } else {
            Err(ConfigError::Invalid(format!(
                "Config path must be specified as {} or in {} file",
                CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH
            )))
        }
    }

    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// A config without any `[resources]` is accepted here; the default
    /// cache's resource is checked when a hub is built from it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;

        for (id, resource) in &self.resources {
            resource
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("Resource '{}': {}", id, e)))?;
        }

        if !self.resources.is_empty() && !self.resources.contains_key(&self.cache.resource_id) {
            return Err(ConfigError::Invalid(format!(
                "No resource with id '{}'",
                self.cache.resource_id
            )));
        }

        Ok(())
    }
}

impl CacheOptions {
    /// Create options for a namespace, everything else at defaults
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    pub fn with_namespace_separator(mut self, separator: impl Into<String>) -> Self {
        self.namespace_separator = separator.into();
        self
    }

    pub fn with_ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.len() > MAX_NAMESPACE_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "Namespace must be no longer than {} bytes, got {}",
                MAX_NAMESPACE_LENGTH,
                self.namespace.len()
            )));
        }
        if self.resource_id.is_empty() {
            return Err(ConfigError::Invalid(
                "Resource id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            namespace_separator: default_separator(),
            ttl: 0,
            resource_id: default_resource_id(),
        }
    }
}

impl ResourceConfig {
    pub fn new(servers: Vec<ServerAddress>) -> Self {
        Self {
            servers: server::dedup(servers),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self
    }

    /// Database index selected by the bucket name
    pub fn database_index(&self) -> Result<i64, ConfigError> {
        if self.bucket.is_empty() {
            return Ok(0);
        }
        self.bucket.parse::<u32>().map(i64::from).map_err(|_| {
            ConfigError::Invalid(format!(
                "Bucket must be a numeric database index, got '{}'",
                self.bucket
            ))
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servers.is_empty() {
            return Err(ConfigError::Invalid(
                "At least one server is required".to_string(),
            ));
        }
        if self.servers.iter().any(|s| s.host.is_empty()) {
            return Err(ConfigError::Invalid(
                "Missing required server host".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "connect_timeout_ms must be greater than 0".to_string(),
            ));
        }
        self.database_index()?;
        Ok(())
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            username: String::new(),
            password: String::new(),
            bucket: String::new(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl fmt::Debug for ResourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceConfig")
            .field("servers", &self.servers)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("bucket", &self.bucket)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FULL_CONFIG: &str = r#"
        [cache]
        namespace = "app"
        namespace_separator = "::"
        ttl = 120
        resource_id = "sessions"

        [resources.sessions]
        servers = "cache-a:7000, cache-b"
        username = "svc"
        password = "hunter2"
        bucket = "3"

        [resources.reports]
        servers = [["cache-c", 7001], { host = "cache-d" }, "cache-e:7002"]
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = AppConfig::parse(FULL_CONFIG).unwrap();

        assert_eq!(config.cache.namespace, "app");
        assert_eq!(config.cache.namespace_separator, "::");
        assert_eq!(config.cache.ttl, 120);
        assert_eq!(config.cache.resource_id, "sessions");

        let sessions = &config.resources["sessions"];
        assert_eq!(
            sessions.servers,
            vec![
                ServerAddress::new("cache-a", 7000),
                ServerAddress::new("cache-b", DEFAULT_PORT),
            ]
        );
        assert_eq!(sessions.username, "svc");
        assert_eq!(sessions.database_index().unwrap(), 3);
        assert_eq!(sessions.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS);

        let reports = &config.resources["reports"];
        assert_eq!(
            reports.servers,
            vec![
                ServerAddress::new("cache-c", 7001),
                ServerAddress::new("cache-d", DEFAULT_PORT),
                ServerAddress::new("cache-e", 7002),
            ]
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.cache, CacheOptions::default());
        assert_eq!(config.cache.namespace_separator, ":");
        assert_eq!(config.cache.resource_id, "default");
        assert!(config.resources.is_empty());
    }

    #[test]
    fn test_resource_defaults() {
        let config = AppConfig::parse("[resources.default]\n").unwrap();
        let resource = &config.resources["default"];
        assert_eq!(resource.servers, vec![ServerAddress::default()]);
        assert_eq!(resource.database_index().unwrap(), 0);
    }

    #[test]
    fn test_namespace_too_long() {
        let options = CacheOptions::new("n".repeat(MAX_NAMESPACE_LENGTH + 1));
        assert!(matches!(options.validate(), Err(ConfigError::Invalid(_))));

        let options = CacheOptions::new("n".repeat(MAX_NAMESPACE_LENGTH));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_unknown_default_resource() {
        let result = AppConfig::parse(
            r#"
            [cache]
            resource_id = "missing"

            [resources.default]
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_invalid_resources() {
        let cases = [
            "[resources.default]\nservers = \"\"\n",
            "[resources.default]\nservers = []\n",
            "[resources.default]\nbucket = \"sessions\"\n",
            "[resources.default]\nconnect_timeout_ms = 0\n",
        ];

        for case in cases {
            assert!(AppConfig::parse(case).is_err(), "Should reject: {}", case);
        }
    }

    #[test]
    fn test_password_is_redacted() {
        let resource = ResourceConfig::default().with_credentials("svc", "hunter2");
        let debug = format!("{:?}", resource);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(FULL_CONFIG.as_bytes()).unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.resources.len(), 2);
    }

    #[test]
    fn test_missing_file() {
        let result = AppConfig::from_file("/nonexistent/bucketcache.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
