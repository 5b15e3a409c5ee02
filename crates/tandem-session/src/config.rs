//! Session configuration management

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use tandem_protocol::LogLevel;

/// Default environment prefix for overrides, e.g. `TANDEM__REQUESTS__MAX_IN_FLIGHT_HANDLERS`
pub const ENV_PREFIX: &str = "TANDEM";

/// Largest accepted `pagination.max_page_size`
pub const MAX_PAGE_SIZE_LIMIT: usize = 10_000;

/// Largest accepted `requests.max_in_flight_handlers`
pub const MAX_IN_FLIGHT_HANDLERS_LIMIT: usize = 65_536;

/// Session configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Outbound request behavior
    pub requests: RequestConfig,
    /// Pagination and cursor signing
    pub pagination: PaginationConfig,
    /// Peer log threshold and local tracing output
    pub logging: LoggingConfig,
}

/// Outbound request configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Deadline for a response, in seconds; `0` disables it
    #[serde(with = "optional_secs")]
    pub default_timeout: Option<Duration>,
    /// Inbound requests handled concurrently; further requests wait
    pub max_in_flight_handlers: usize,
}

/// Pagination configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page size when the caller does not ask for one
    pub default_page_size: usize,
    /// Upper bound; larger requests are clamped
    pub max_page_size: usize,
    /// Base64 cursor signing key. Without one, a random key is drawn per
    /// session and cursors do not survive a restart.
    pub cursor_key: Option<String>,
    /// Cursors older than this many seconds are rejected
    #[serde(with = "optional_secs")]
    pub cursor_max_age: Option<Duration>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Threshold for records sent to the peer until it calls `logging/setLevel`
    pub initial_level: LogLevel,
    /// Local tracing directive, e.g. `info` or `tandem_session=debug`
    pub level: String,
    /// Emit local tracing as JSON
    pub structured: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            default_timeout: Some(Duration::from_secs(60)),
            max_in_flight_handlers: 64,
        }
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 500,
            cursor_key: None,
            cursor_max_age: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            initial_level: LogLevel::Info,
            level: "info".to_string(),
            structured: true,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// A value parsed but is not usable
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the field
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SessionConfig {
    /// Load configuration from a file (TOML, YAML, or JSON).
    ///
    /// The format follows the extension. Environment variables prefixed with
    /// `TANDEM__` override file settings, with `__` separating sections:
    /// `TANDEM__PAGINATION__MAX_PAGE_SIZE=200`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use tandem_session::SessionConfig;
    ///
    /// let config = SessionConfig::from_file("tandem.toml")?;
    /// # Ok::<(), tandem_session::ConfigError>(())
    /// ```
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml") | Some("yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values that deserialize but cannot work
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requests.max_in_flight_handlers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "requests.max_in_flight_handlers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.requests.max_in_flight_handlers > MAX_IN_FLIGHT_HANDLERS_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "requests.max_in_flight_handlers",
                reason: format!("must not exceed {MAX_IN_FLIGHT_HANDLERS_LIMIT}"),
            });
        }
        if self.pagination.default_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pagination.default_page_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.pagination.max_page_size < self.pagination.default_page_size {
            return Err(ConfigError::InvalidValue {
                field: "pagination.max_page_size",
                reason: "must not be smaller than default_page_size".to_string(),
            });
        }
        if self.pagination.max_page_size > MAX_PAGE_SIZE_LIMIT {
            return Err(ConfigError::InvalidValue {
                field: "pagination.max_page_size",
                reason: format!("must not exceed {MAX_PAGE_SIZE_LIMIT}"),
            });
        }
        self.cursor_key_bytes().map(|_| ())
    }

    /// Decoded cursor signing key, if one is configured
    pub fn cursor_key_bytes(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        let Some(encoded) = &self.pagination.cursor_key else {
            return Ok(None);
        };
        let key = STANDARD
            .decode(encoded.trim())
            .map_err(|e| ConfigError::InvalidValue {
                field: "pagination.cursor_key",
                reason: e.to_string(),
            })?;
        if key.len() < tandem_protocol::cursor::MIN_KEY_LEN {
            return Err(ConfigError::InvalidValue {
                field: "pagination.cursor_key",
                reason: format!(
                    "key is {} bytes, need at least {}",
                    key.len(),
                    tandem_protocol::cursor::MIN_KEY_LEN
                ),
            });
        }
        Ok(Some(key))
    }
}

/// Configuration builder
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Start from defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Response deadline for outbound requests; `None` waits forever
    #[must_use]
    pub fn default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.requests.default_timeout = timeout;
        self
    }

    /// Inbound requests handled concurrently
    #[must_use]
    pub fn max_in_flight_handlers(mut self, max: usize) -> Self {
        self.config.requests.max_in_flight_handlers = max;
        self
    }

    /// Default and maximum page size
    #[must_use]
    pub fn page_sizes(mut self, default: usize, max: usize) -> Self {
        self.config.pagination.default_page_size = default;
        self.config.pagination.max_page_size = max;
        self
    }

    /// Raw cursor signing key
    #[must_use]
    pub fn cursor_key(mut self, key: &[u8]) -> Self {
        self.config.pagination.cursor_key = Some(STANDARD.encode(key));
        self
    }

    /// Reject cursors older than `max_age`
    #[must_use]
    pub fn cursor_max_age(mut self, max_age: Duration) -> Self {
        self.config.pagination.cursor_max_age = Some(max_age);
        self
    }

    /// Initial peer log threshold
    #[must_use]
    pub fn initial_log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.initial_level = level;
        self
    }

    /// Local tracing directive
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

/// `Option<Duration>` as whole seconds, with `0` meaning "none"
mod optional_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_u64(duration.as_secs()),
            None => serializer.serialize_u64(0),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs))
    }
}

#[cfg(test)]
mod inline_tests {
    use super::*;
    use std::io::Write;

    fn write_config(extension: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{extension}"))
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.requests.default_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.requests.max_in_flight_handlers, 64);
        assert_eq!(config.pagination.default_page_size, 50);
        assert_eq!(config.pagination.max_page_size, 500);
        assert_eq!(config.logging.initial_level, LogLevel::Info);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfigBuilder::new()
            .default_timeout(None)
            .page_sizes(10, 20)
            .initial_log_level(LogLevel::Warning)
            .cursor_key(&[7u8; 32])
            .build();

        assert_eq!(config.requests.default_timeout, None);
        assert_eq!(config.pagination.max_page_size, 20);
        assert_eq!(config.logging.initial_level, LogLevel::Warning);
        assert_eq!(config.cursor_key_bytes().unwrap(), Some(vec![7u8; 32]));
    }

    #[test]
    fn test_from_toml_file() {
        let file = write_config(
            "toml",
            r#"
[requests]
default_timeout = 5
max_in_flight_handlers = 8

[pagination]
default_page_size = 25

[logging]
initial_level = "warning"
structured = false
"#,
        );

        let config = SessionConfig::from_file_with_prefix(file.path(), "TANDEM_TEST_TOML").unwrap();
        assert_eq!(config.requests.default_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.requests.max_in_flight_handlers, 8);
        assert_eq!(config.pagination.default_page_size, 25);
        assert_eq!(config.pagination.max_page_size, 500);
        assert_eq!(config.logging.initial_level, LogLevel::Warning);
        assert!(!config.logging.structured);
    }

    #[test]
    fn test_from_json_file_disables_timeout_with_zero() {
        let file = write_config("json", r#"{"requests": {"default_timeout": 0}}"#);
        let config = SessionConfig::from_file_with_prefix(file.path(), "TANDEM_TEST_JSON").unwrap();
        assert_eq!(config.requests.default_timeout, None);
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let file = write_config("yaml", "logging:\n  initial_level: verbose\n");
        let err = SessionConfig::from_file_with_prefix(file.path(), "TANDEM_TEST_YAML").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_missing_and_unsupported_files() {
        assert!(matches!(
            SessionConfig::from_file("/definitely/not/here.toml"),
            Err(ConfigError::FileNotFound(_))
        ));

        let file = write_config("ini", "x = 1");
        assert!(matches!(
            SessionConfig::from_file(file.path()),
            Err(ConfigError::UnsupportedFormat)
        ));
    }

    #[test]
    fn test_short_cursor_key_rejected() {
        let config = SessionConfigBuilder::new().cursor_key(b"short").build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "pagination.cursor_key", .. })
        ));
    }

    #[test]
    fn test_oversized_limits_rejected() {
        let config = SessionConfigBuilder::new()
            .page_sizes(50, usize::MAX)
            .build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "pagination.max_page_size", .. })
        ));

        let config = SessionConfigBuilder::new()
            .max_in_flight_handlers(usize::MAX)
            .build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "requests.max_in_flight_handlers", .. })
        ));

        let config = SessionConfigBuilder::new()
            .page_sizes(50, MAX_PAGE_SIZE_LIMIT)
            .max_in_flight_handlers(MAX_IN_FLIGHT_HANDLERS_LIMIT)
            .build();
        assert!(config.validate().is_ok());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_page_sizes_validate(default in 1usize..1000, extra in 0usize..1000) {
                let config = SessionConfigBuilder::new()
                    .page_sizes(default, default + extra)
                    .build();
                prop_assert!(config.validate().is_ok());
            }

            #[test]
            fn test_inverted_page_sizes_rejected(max in 1usize..1000, gap in 1usize..1000) {
                let config = SessionConfigBuilder::new()
                    .page_sizes(max + gap, max)
                    .build();
                prop_assert!(config.validate().is_err());
            }
        }
    }
}
