//! Runtime configuration.
//!
//! Loaded from a TOML file, then overridden by `GHOSTHIRE_*` environment
//! variables, then validated. Production refuses every path that could let a
//! simulated proof near the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ENV_ENVIRONMENT: &str = "GHOSTHIRE_ENV";
pub const ENV_BACKEND: &str = "GHOSTHIRE_BACKEND";
pub const ENV_PROVER_URL: &str = "GHOSTHIRE_PROVER_URL";
pub const ENV_PROVER_TIMEOUT_MS: &str = "GHOSTHIRE_PROVER_TIMEOUT_MS";

/// Errors while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0} is not allowed in production")]
    ForbiddenInProduction(&'static str),

    #[error("remote backend selected but no remote_url configured")]
    MissingRemoteUrl,

    #[error("prover deadline must be positive")]
    ZeroDeadline,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_ENVIRONMENT,
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
    Simulated,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "remote" => Ok(BackendKind::Remote),
            "simulated" => Ok(BackendKind::Simulated),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_BACKEND,
                value: s.to_string(),
            }),
        }
    }
}

/// `[prover]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProverConfig {
    pub backend: BackendKind,
    pub remote_url: Option<String>,
    pub deadline_ms: u64,
    /// Honoured only in development.
    pub fallback_to_simulated: bool,
    pub simulated_latency_ms: u64,
    pub key_dir: PathBuf,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Local,
            remote_url: None,
            deadline_ms: 30_000,
            fallback_to_simulated: false,
            simulated_latency_ms: 1_500,
            key_dir: PathBuf::from("./keys"),
        }
    }
}

impl ProverConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }
}

/// `[ledger]` table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub accept_simulated: bool,
    /// Upper bound on one submission's verification.
    pub verify_deadline_ms: Option<u64>,
}

impl LedgerConfig {
    pub fn verify_deadline(&self) -> Option<Duration> {
        self.verify_deadline_ms.map(Duration::from_millis)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: Environment,
    pub prover: ProverConfig,
    pub ledger: LedgerConfig,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read `path`, apply process environment overrides, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus process environment overrides, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_ENVIRONMENT) {
            self.environment = value.parse()?;
        }
        if let Some(value) = lookup(ENV_BACKEND) {
            self.prover.backend = value.parse()?;
        }
        if let Some(value) = lookup(ENV_PROVER_URL) {
            self.prover.remote_url = Some(value);
        }
        if let Some(value) = lookup(ENV_PROVER_TIMEOUT_MS) {
            self.prover.deadline_ms =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_PROVER_TIMEOUT_MS,
                        value,
                    })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prover.deadline_ms == 0 {
            return Err(ConfigError::ZeroDeadline);
        }
        if self.prover.backend == BackendKind::Remote && self.prover.remote_url.is_none() {
            return Err(ConfigError::MissingRemoteUrl);
        }
        if self.environment == Environment::Production {
            if self.prover.backend == BackendKind::Simulated {
                return Err(ConfigError::ForbiddenInProduction("the simulated backend"));
            }
            if self.prover.fallback_to_simulated {
                return Err(ConfigError::ForbiddenInProduction("fallback_to_simulated"));
            }
            if self.ledger.accept_simulated {
                return Err(ConfigError::ForbiddenInProduction("accept_simulated"));
            }
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Whether the generator may substitute a simulated proof.
    pub fn allows_fallback(&self) -> bool {
        !self.is_production() && self.prover.fallback_to_simulated
    }

    /// Whether the ledger takes simulated proofs.
    pub fn accepts_simulated(&self) -> bool {
        !self.is_production() && self.ledger.accept_simulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
environment = "development"

[prover]
backend = "remote"
remote_url = "http://127.0.0.1:6300"
deadline_ms = 5000
fallback_to_simulated = true

[ledger]
accept_simulated = true
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.prover.backend, BackendKind::Remote);
        assert_eq!(config.prover.deadline(), Duration::from_secs(5));
        assert_eq!(config.prover.simulated_latency_ms, 1_500);
        assert!(config.allows_fallback());
        assert!(config.accepts_simulated());
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.prover.backend, BackendKind::Local);
        assert!(!config.allows_fallback());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config
            .apply_env(env(&[
                (ENV_BACKEND, "simulated"),
                (ENV_PROVER_TIMEOUT_MS, "250"),
                (ENV_PROVER_URL, "http://prover:9000"),
            ]))
            .unwrap();
        assert_eq!(config.prover.backend, BackendKind::Simulated);
        assert_eq!(config.prover.deadline_ms, 250);
        assert_eq!(config.prover.remote_url.as_deref(), Some("http://prover:9000"));

        assert!(matches!(
            config.apply_env(env(&[(ENV_PROVER_TIMEOUT_MS, "soon")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_production_forbids_simulation() {
        let mut config = Config::from_toml_str(SAMPLE).unwrap();
        config.apply_env(env(&[(ENV_ENVIRONMENT, "production")])).unwrap();
        assert!(!config.allows_fallback());
        assert!(!config.accepts_simulated());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ForbiddenInProduction("fallback_to_simulated"))
        ));

        config.prover.fallback_to_simulated = false;
        config.ledger.accept_simulated = false;
        config.validate().unwrap();

        config.prover.backend = BackendKind::Simulated;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ForbiddenInProduction(_))
        ));
    }

    #[test]
    fn test_remote_needs_url() {
        let mut config = Config::default();
        config.prover.backend = BackendKind::Remote;
        assert!(matches!(config.validate(), Err(ConfigError::MissingRemoteUrl)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ghosthire.toml");
        std::fs::write(&path, "[prover]\nbackend = \"simulated\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.prover.backend, BackendKind::Simulated);

        assert!(matches!(
            Config::load(&dir.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
