//! Configuration and the context value handed to each component.
//!
//! Settings live in `$GIT_AUTOCOMMIT_HOME/config.toml`, defaulting to
//! `<config dir>/git-autocommit/`. The credential cache sits next to it.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// Model used when neither the command line nor the config names one.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default prompt budget in estimated tokens.
pub const DEFAULT_TOKEN_BUDGET: usize = 6_000;

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Environment variable that relocates config and credentials.
const HOME_ENV_VAR: &str = "GIT_AUTOCOMMIT_HOME";

/// Environment variable to override the per-request HTTP timeout.
const TIMEOUT_ENV_VAR: &str = "GIT_AUTOCOMMIT_HTTP_TIMEOUT";

const LOCK_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

const APP_DIR: &str = "git-autocommit";
const CONFIG_FILE: &str = "config.toml";
const CREDENTIALS_FILE: &str = "credentials.json";

/// User settings stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub default_model: Option<String>,
    pub token_budget: usize,
    pub http_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: None,
            token_budget: DEFAULT_TOKEN_BUDGET,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Set `default_model` in the config file, keeping the rest of the file intact.
    pub fn set_default_model(path: &Path, model: &str) -> Result<(), ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut doc = content
            .parse::<toml_edit::DocumentMut>()
            .map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: format!("Invalid TOML: {}", e),
            })?;
        doc["default_model"] = toml_edit::value(model);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, doc.to_string()).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Base URLs of the services the tool talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Device-flow host (`/login/device/code`, `/login/oauth/access_token`).
    pub github_url: String,
    /// REST host serving the Copilot token exchange.
    pub github_api_url: String,
    /// Copilot chat host (`/models`, `/chat/completions`).
    pub copilot_api_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            github_url: "https://github.com".to_string(),
            github_api_url: "https://api.github.com".to_string(),
            copilot_api_url: "https://api.githubcopilot.com".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every endpoint at one host (used against mock servers).
    pub fn single_host(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            github_url: base.clone(),
            github_api_url: base.clone(),
            copilot_api_url: base,
        }
    }
}

/// Exponential backoff settings for completion requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
}

impl Default for RetryPolicy {
    /// 3 total attempts, base 1s, max 30s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
        }
    }
}

/// Everything a component needs to know about its environment.
///
/// Built once in `main` and passed down explicitly; nothing reads global state
/// after that.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub credentials_path: PathBuf,
    pub endpoints: Endpoints,
    pub retry: RetryPolicy,
    pub http_timeout: Duration,
}

impl AppContext {
    /// Build the context from the user's home for this tool.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_home(&home_dir()?)
    }

    /// Build the context rooted at an explicit directory.
    pub fn from_home(home: &Path) -> Result<Self, ConfigError> {
        let config_path = home.join(CONFIG_FILE);
        let config = Config::load(&config_path)?;
        let http_timeout = http_timeout(&config);

        Ok(Self {
            config,
            config_path,
            credentials_path: home.join(CREDENTIALS_FILE),
            endpoints: Endpoints::default(),
            retry: RetryPolicy::default(),
            http_timeout,
        })
    }

    /// How long to wait for the credential cache lock. Another process may
    /// hold it across one token exchange, so it outlasts the HTTP timeout.
    pub fn lock_timeout(&self) -> Duration {
        self.http_timeout + LOCK_TIMEOUT_MARGIN
    }

    /// HTTP client with the configured per-call timeout.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.http_timeout)
            .user_agent(concat!("git-autocommit/", env!("CARGO_PKG_VERSION")))
            .build()
    }
}

fn home_dir() -> Result<PathBuf, ConfigError> {
    match env::var(HOME_ENV_VAR) {
        Ok(v) if !v.is_empty() => Ok(PathBuf::from(v)),
        _ => dirs::config_dir()
            .map(|p| p.join(APP_DIR))
            .ok_or(ConfigError::NoConfigDir),
    }
}

/// Per-call HTTP timeout.
///
/// `GIT_AUTOCOMMIT_HTTP_TIMEOUT` wins over the config file. An invalid value
/// logs a warning and is ignored.
fn http_timeout(config: &Config) -> Duration {
    let fallback = Duration::from_secs(config.http_timeout_secs);
    match env::var(TIMEOUT_ENV_VAR) {
        Ok(v) if !v.is_empty() => match v.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                warn!(
                    "Invalid {} value '{}', using {}s",
                    TIMEOUT_ENV_VAR,
                    v,
                    fallback.as_secs()
                );
                fallback
            }
        },
        _ => fallback,
    }
}
