//! Configuration loading and validation for the field encryption service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use std::fmt;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated service configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Hex-encoded 256-bit master key. **Required.**
    pub encryption_key: String,

    /// Label recorded as `keyVersion` in classified-record metadata.
    #[serde(default = "default_key_version")]
    pub key_version: u32,

    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Envelope age (days) after which rotation is due.
    #[serde(default = "default_rotation_max_age_days")]
    pub rotation_max_age_days: u32,

    /// Optional YAML or JSON rule table replacing the built-in field rules.
    #[serde(default)]
    pub classifier_rules_path: Option<String>,

    /// OTLP/gRPC collector endpoint. Span export is off when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_key_version() -> u32 {
    1
}
fn default_listen_port() -> u16 {
    8080
}
fn default_rotation_max_age_days() -> u32 {
    fieldcrypt::rotation::DEFAULT_MAX_AGE_DAYS
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_source(config::Environment::default())
    }

    fn from_source(env: config::Environment) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(env)
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration (is ENCRYPTION_KEY set?)")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.encryption_key, "ENCRYPTION_KEY")?;
        if let Some(path) = &self.classifier_rules_path {
            ensure_non_empty(path, "CLASSIFIER_RULES_PATH")?;
        }
        if self.rotation_max_age_days == 0 {
            anyhow::bail!("ROTATION_MAX_AGE_DAYS must be > 0");
        }
        if self.key_version == 0 {
            anyhow::bail!("KEY_VERSION must be > 0");
        }
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("encryption_key", &"[REDACTED]")
            .field("key_version", &self.key_version)
            .field("listen_port", &self.listen_port)
            .field("rotation_max_age_days", &self.rotation_max_age_days)
            .field("classifier_rules_path", &self.classifier_rules_path)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
