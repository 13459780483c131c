//! CLI configuration handling.

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use maroon_core::{AwsConfigFile, AwsCredentialsFile, DEFAULT_API_URL, ProfileStore, Secret};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings read from `cli.toml`. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Base URL of the Maroon API.
    pub api_url: String,

    /// Profile store file. Defaults to the platform config directory.
    pub store_path: Option<PathBuf>,

    /// AWS shared credentials file.
    pub aws_credentials_file: Option<PathBuf>,

    /// AWS config file.
    pub aws_config_file: Option<PathBuf>,

    /// Where replacement AWS files are staged before being moved into place.
    pub scratch_dir: Option<PathBuf>,

    /// File holding the API token, used when neither `--token` nor
    /// `MAROON_TOKEN` is given.
    pub token_file: Option<PathBuf>,

    /// Logging level used when `RUST_LOG` is not set.
    pub log_level: String,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

pub const DEFAULT_LOG_LEVEL: &str = "warn";

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            store_path: None,
            aws_credentials_file: None,
            aws_config_file: None,
            scratch_dir: None,
            token_file: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            config_path: None,
        }
    }
}

impl CliConfig {
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => ProfileStore::default_path().context("Failed to locate the profile store"),
        }
    }

    pub fn aws_credentials_file(&self) -> Result<PathBuf> {
        match &self.aws_credentials_file {
            Some(path) => Ok(path.clone()),
            None => AwsCredentialsFile::default_path()
                .context("Failed to locate the AWS credentials file"),
        }
    }

    pub fn aws_config_file(&self) -> Result<PathBuf> {
        match &self.aws_config_file {
            Some(path) => Ok(path.clone()),
            None => AwsConfigFile::default_path().context("Failed to locate the AWS config file"),
        }
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Pick the API token: explicit value (flag or `MAROON_TOKEN`), else `token_file`.
    pub fn token(&self, explicit: Option<&str>) -> Result<Option<Secret>> {
        if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
            return Ok(Some(Secret::new(token)));
        }

        let Some(path) = &self.token_file else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token from {:?}", path))?;
        let token = contents.trim();
        if token.is_empty() {
            bail!("Token file {:?} is empty", path);
        }
        Ok(Some(Secret::new(token)))
    }
}

/// Load configuration from `path`, or from the default location.
///
/// A missing default file yields the defaults; a missing explicit file is an error.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let (config_path, required) = match path {
        Some(path) => (Some(path.to_path_buf()), true),
        None => (project_dirs().map(|d| d.config_dir().join("cli.toml")), false),
    };

    let Some(config_path) = config_path else {
        return Ok(CliConfig::default());
    };

    if !required && !config_path.exists() {
        return Ok(CliConfig::default());
    }

    let contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config from {:?}", config_path))?;
    let mut config: CliConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config from {:?}", config_path))?;
    config.config_path = Some(config_path);

    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "gtech", "maroon")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_keys_missing() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.log_level, "warn");
        assert!(config.store_path.is_none());
        assert_eq!(config.scratch_dir(), std::env::temp_dir());
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cli.toml");
        std::fs::write(
            &path,
            "api_url = \"http://localhost:8080\"\nstore_path = \"/tmp/maroon.json\"\nlog_level = \"debug\"\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();

        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.store_path().unwrap(), PathBuf::from("/tmp/maroon.json"));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(load_config(Some(&temp.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_invalid_toml_is_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cli.toml");
        std::fs::write(&path, "api_url = [").unwrap();
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    fn test_token_precedence() {
        let temp = TempDir::new().unwrap();
        let token_file = temp.path().join("token");
        std::fs::write(&token_file, "from-file\n").unwrap();
        let config = CliConfig {
            token_file: Some(token_file),
            ..Default::default()
        };

        let explicit = config.token(Some("from-flag")).unwrap().unwrap();
        assert_eq!(explicit.expose(), "from-flag");

        let from_file = config.token(None).unwrap().unwrap();
        assert_eq!(from_file.expose(), "from-file");

        assert!(CliConfig::default().token(None).unwrap().is_none());
    }

    #[test]
    fn test_empty_token_file_is_error() {
        let temp = TempDir::new().unwrap();
        let token_file = temp.path().join("token");
        std::fs::write(&token_file, "  \n").unwrap();
        let config = CliConfig {
            token_file: Some(token_file),
            ..Default::default()
        };

        assert!(config.token(None).is_err());
    }
}
