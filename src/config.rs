use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an alternative configuration file.
pub const CONFIG_ENV: &str = "ATTENDANCE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "attendance.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value {value:?} for environment variable {var}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub predictions: PredictionConfig,

    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://attendance.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// At least 64 bytes; a random key is generated when absent.
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default)]
    pub secure_cookie: bool,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("secure_cookie", &self.secure_cookie)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Scorer executable. Defaults to `predict_dropouts` next to the server binary.
    #[serde(default)]
    pub program: Option<PathBuf>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Kill a scorer run that takes longer than this. No limit when unset.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Labelled feature rows the scorer trains its model on.
    #[serde(default = "default_training_data")]
    pub training_data: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    30
}

fn default_training_data() -> PathBuf {
    PathBuf::from("data/dropout_training.csv")
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: None,
            args: Vec::new(),
            interval_secs: default_interval_secs(),
            timeout_secs: None,
            training_data: default_training_data(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Students whose dropout risk is strictly above this count as high risk.
    #[serde(default = "default_high_risk_threshold")]
    pub high_risk_threshold: f64,
}

fn default_high_risk_threshold() -> f64 {
    0.7
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            high_risk_threshold: default_high_risk_threshold(),
        }
    }
}

impl AppConfig {
    /// Loads `.env`, the TOML file (if present), then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let explicit = env::var_os(CONFIG_ENV).map(PathBuf::from);
        let path = explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if explicit.is_some() || path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        config.apply_env(|var| env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { var: "PORT", value: port })?;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(secret) = lookup("SESSION_SECRET") {
            self.session.secret = Some(secret);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_file_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "sqlite://attendance.db");
        assert!(config.predictions.enabled);
        assert_eq!(config.predictions.interval_secs, 30);
        assert_eq!(config.predictions.timeout_secs, None);
        assert_eq!(config.analytics.high_risk_threshold, 0.7);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [predictions]
            program = "/usr/local/bin/score"
            args = ["--fast"]
            timeout_secs = 120

            [server]
            port = 8080
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(
            config.predictions.program.as_deref(),
            Some(Path::new("/usr/local/bin/score"))
        );
        assert_eq!(config.predictions.args, vec!["--fast".to_string()]);
        assert_eq!(config.predictions.timeout_secs, Some(120));
        assert_eq!(config.predictions.interval_secs, 30);
    }

    #[test]
    fn env_overrides_file_values() {
        let vars: HashMap<&str, &str> = [("PORT", "9000"), ("DATABASE_URL", "sqlite::memory:")]
            .into_iter()
            .collect();
        let mut config = AppConfig::default();
        config
            .apply_env(|var| vars.get(var).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.url, "sqlite::memory:");
    }

    #[test]
    fn bad_port_is_reported() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|var| (var == "PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: "PORT", .. }));
    }

    #[test]
    fn session_secret_is_masked_in_debug_output() {
        let config = SessionConfig {
            secret: Some("super-secret".to_string()),
            secure_cookie: false,
        };
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
