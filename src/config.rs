//! Configuration loader and validator for the panel data deleter.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::{AnonymizePolicy, ApiMode, MissingSurveyPolicy};

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
    pub platform: Platform,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default)]
    pub mode: ApiMode,
    #[serde(default)]
    pub anonymize_policy: AnonymizePolicy,
    #[serde(default)]
    pub missing_survey_policy: MissingSurveyPolicy,
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
}

/// Survey platform endpoint, directory and credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Platform {
    pub base_url: String,
    pub directory_id: String,
    pub directory_token: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_whitelist")]
    pub whitelisted_statuses: Vec<u16>,
    pub credentials: Vec<Credential>,
}

/// A named API token of one survey-platform account.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub name: String,
    pub token: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_page_size() -> u32 {
    100
}

fn default_whitelist() -> Vec<u16> {
    vec![200, 404]
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Default SQLite URL, overridable through `DATABASE_URL`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| {
            format!(
                "sqlite://{}/panel_purge.db",
                self.app.data_dir.trim_end_matches('/')
            )
        })
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

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.request_timeout_seconds == 0 {
        return Err(ConfigError::Invalid(
            "app.request_timeout_seconds must be > 0",
        ));
    }

    let p = &cfg.platform;
    if reqwest::Url::parse(p.base_url.trim()).is_err() {
        return Err(ConfigError::Invalid("platform.base_url must be an absolute URL"));
    }
    if p.directory_id.trim().is_empty() {
        return Err(ConfigError::Invalid("platform.directory_id must be non-empty"));
    }
    if p.directory_token.trim().is_empty() {
        return Err(ConfigError::Invalid("platform.directory_token must be non-empty"));
    }
    if p.page_size == 0 || p.page_size > 1000 {
        return Err(ConfigError::Invalid("platform.page_size must be in 1..=1000"));
    }
    if p.whitelisted_statuses.is_empty() {
        return Err(ConfigError::Invalid(
            "platform.whitelisted_statuses must list at least one status",
        ));
    }
    if p.credentials.is_empty() {
        return Err(ConfigError::Invalid("platform.credentials must not be empty"));
    }
    if p.credentials.iter().any(|c| c.name.trim().is_empty()) {
        return Err(ConfigError::Invalid("platform.credentials[].name must be non-empty"));
    }
    if p.credentials.iter().any(|c| c.token.trim().is_empty()) {
        return Err(ConfigError::Invalid("platform.credentials[].token must be non-empty"));
    }

    Ok(())
}

/// Returns a documented example configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  # delete | dry_run (dry_run calls deletion endpoints with GET and writes nothing)
  mode: delete
  # substitute_delete | reject
  anonymize_policy: substitute_delete
  # skip | abort
  missing_survey_policy: skip
  request_timeout_seconds: 30

platform:
  base_url: "https://yourdatacenter.qualtrics.com/"
  directory_id: "POOL_XXXXXXXXXXXXXXX"
  directory_token: "YOUR_DIRECTORY_API_TOKEN"
  page_size: 100
  whitelisted_statuses: [200, 404]
  credentials:
    - name: "research-a"
      token: "YOUR_FIRST_API_TOKEN"
    - name: "research-b"
      token: "YOUR_SECOND_API_TOKEN"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn example_cfg() -> Config {
        serde_yaml::from_str(example()).unwrap()
    }

    #[test]
    fn parse_example_ok() {
        let cfg = example_cfg();
        validate(&cfg).unwrap();
        assert_eq!(cfg.platform.credentials.len(), 2);
        assert_eq!(cfg.platform.whitelisted_statuses, vec![200, 404]);
    }

    #[test]
    fn defaults_apply_when_omitted() {
        let yaml = r#"app:
  data_dir: "./data"
platform:
  base_url: "https://example.qualtrics.com/"
  directory_id: "POOL_1"
  directory_token: "t"
  credentials:
    - name: "a"
      token: "k"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.mode, ApiMode::Delete);
        assert_eq!(cfg.app.anonymize_policy, AnonymizePolicy::SubstituteDelete);
        assert_eq!(cfg.app.missing_survey_policy, MissingSurveyPolicy::Skip);
        assert_eq!(cfg.app.request_timeout_seconds, 30);
        assert_eq!(cfg.platform.page_size, 100);
        assert_eq!(cfg.platform.whitelisted_statuses, vec![200, 404]);
    }

    #[test]
    fn invalid_directory_settings() {
        let mut cfg = example_cfg();
        cfg.platform.directory_id = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("directory_id")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_cfg();
        cfg.platform.directory_token = "  ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("directory_token")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_cfg();
        cfg.platform.base_url = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_credentials() {
        let mut cfg = example_cfg();
        cfg.platform.credentials.clear();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("credentials")),
            _ => panic!("wrong error"),
        }

        let mut cfg = example_cfg();
        cfg.platform.credentials[1].token = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_limits() {
        let mut cfg = example_cfg();
        cfg.platform.page_size = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.platform.whitelisted_statuses.clear();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg = example_cfg();
        cfg.app.request_timeout_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn credential_debug_hides_token() {
        let cfg = example_cfg();
        let printed = format!("{:?}", cfg.platform.credentials[0]);
        assert!(printed.contains("research-a"));
        assert!(!printed.contains("YOUR_FIRST_API_TOKEN"));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg = example_cfg();
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
        assert_eq!(cfg.platform.directory_id, "POOL_XXXXXXXXXXXXXXX");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let td = tempdir().unwrap();
        let err = load(Some(&td.path().join("absent.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
