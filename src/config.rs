//! Configuration loader and validator for the fluxsync CLI.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub api: Api,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Overrides the default `sqlite://<data_dir>/fluxsync.db`.
    #[serde(default)]
    pub database_url: Option<String>,
    pub action_timeout_ms: u64,
}

/// WordPress.com REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    /// Bearer token; may be empty for public endpoints only.
    #[serde(default)]
    pub token: String,
    pub user_agent: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins over `app.database_url`, which wins over the data dir default.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.app.database_url.clone())
            .unwrap_or_else(|| {
                format!(
                    "sqlite://{}/fluxsync.db",
                    self.app.data_dir.trim_end_matches('/')
                )
            })
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.app.action_timeout_ms)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.action_timeout_ms == 0 {
        return Err(ConfigError::Invalid("app.action_timeout_ms must be > 0"));
    }
    if let Some(url) = &cfg.app.database_url {
        if url.trim().is_empty() {
            return Err(ConfigError::Invalid("app.database_url must be non-empty when set"));
        }
    }

    if reqwest::Url::parse(&cfg.api.base_url).is_err() {
        return Err(ConfigError::Invalid("api.base_url must be an absolute URL"));
    }
    if cfg.api.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("api.user_agent must be non-empty"));
    }

    Ok(())
}

pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  action_timeout_ms: 30000

api:
  base_url: "https://public-api.wordpress.com/"
  token: "YOUR_WPCOM_BEARER_TOKEN"
  user_agent: "fluxsync/0.1"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.action_timeout(), Duration::from_secs(30));
        assert!(cfg.app.database_url.is_none());
    }

    #[test]
    fn invalid_timeout() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.action_timeout_ms = 0;
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("action_timeout_ms")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_api_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.base_url = "not a url".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("api.base_url")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.user_agent = " ".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn database_url_prefers_explicit_setting() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = "/tmp/flux/".into();
        if std::env::var("DATABASE_URL").is_err() {
            assert_eq!(cfg.database_url(), "sqlite:///tmp/flux/fluxsync.db");
            cfg.app.database_url = Some("sqlite::memory:".into());
            assert_eq!(cfg.database_url(), "sqlite::memory:");
        }
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.api.user_agent, "fluxsync/0.1");
    }
}
