//! Configuration types and loading
//!
//! Precedence: env vars > config file > defaults. Every section is optional,
//! so an empty file (or no file at the default location) is a valid config.
//! The refresh token is read from AUTH_REFRESH_TOKEN or `refresh_token_file`,
//! never from the TOML itself.

use std::path::{Path, PathBuf};

use auth_client::{ClientOptions, RefreshPolicy};
use common::Secret;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "auth-api-cli.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: transport::DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub refresh_path: String,
    pub login_path: String,
    pub register_path: String,
    /// Refresh and replay on 401. When false a 401 is returned as-is.
    pub auto_refresh: bool,
    pub refresh_token_file: Option<PathBuf>,
    #[serde(skip)]
    pub refresh_token: Option<Secret<String>>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_path: auth_session::REFRESH_PATH.to_string(),
            login_path: auth_session::LOGIN_PATH.to_string(),
            register_path: auth_session::REGISTER_PATH.to_string(),
            auto_refresh: true,
            refresh_token_file: None,
            refresh_token: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub dir: PathBuf,
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".auth-state"),
            key: auth_session::STORAGE_KEY.to_string(),
        }
    }
}

impl Config {
    /// Load from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Load `path` if it exists; a missing file at the default location means
    /// defaults plus environment.
    pub fn load_or_default(path: &Path, explicit: bool) -> common::Result<Self> {
        if !explicit && !path.exists() {
            return Self::parse("");
        }
        Self::load(path)
    }

    /// Parse TOML, overlay environment variables and validate.
    ///
    /// Refresh token resolution order:
    /// 1. AUTH_REFRESH_TOKEN env var
    /// 2. refresh_token_file path from config
    pub fn parse(contents: &str) -> common::Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Ok(url) = std::env::var("API_BASE_URL") {
            config.api.base_url = url;
        }

        config.validate()?;

        if let Ok(token) = std::env::var("AUTH_REFRESH_TOKEN") {
            let token = token.trim().to_owned();
            if !token.is_empty() {
                config.auth.refresh_token = Some(Secret::new(token));
            }
        } else if let Some(ref file) = config.auth.refresh_token_file {
            config.auth.refresh_token = common::read_secret_file(file)?;
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        for (name, path) in [
            ("refresh_path", &self.auth.refresh_path),
            ("login_path", &self.auth.login_path),
            ("register_path", &self.auth.register_path),
        ] {
            if !path.starts_with('/') {
                return Err(common::Error::Config(format!(
                    "{name} must start with '/', got: {path}"
                )));
            }
        }

        if self.storage.key.trim().is_empty() {
            return Err(common::Error::Config("storage key must not be empty".into()));
        }

        Ok(())
    }

    /// Resolve the config file path from the CLI arg or CONFIG_PATH env var.
    /// The flag is true when the path was asked for explicitly.
    pub fn resolve_path(cli_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(p) = cli_path {
            return (PathBuf::from(p), true);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return (PathBuf::from(p), true);
        }
        (PathBuf::from(DEFAULT_CONFIG_FILE), false)
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            refresh_path: self.auth.refresh_path.clone(),
            login_path: self.auth.login_path.clone(),
            register_path: self.auth.register_path.clone(),
            policy: RefreshPolicy::from_flag(self.auth.auto_refresh),
            refresh_token: self.auth.refresh_token.clone(),
        }
    }
}
