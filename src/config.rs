//! Server configuration and the branch-chain profile.
//!
//! The server reads an optional YAML file, then lets `PICK_TRAIN_*`
//! environment variables override individual fields. The CLI reads the branch
//! chain from a small profile file checked into the repository.

use std::path::{Path, PathBuf};
use std::time::Duration;

use jsonwebtoken::EncodingKey;
use serde::Deserialize;
use thiserror::Error;

use crate::conflict::ConflictMode;
use crate::github::GitHubAuth;
use crate::server::PickSettings;
use crate::types::BranchChain;
use crate::webhooks::WebhookSecret;

/// Default location of the branch-chain profile.
pub const DEFAULT_PROFILE_PATH: &str = ".cherry-pick-path.yml";

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "PICK_TRAIN_";

const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {origin}: {source}")]
    Yaml {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_yaml<T: for<'de> Deserialize<'de>>(yaml: &str, origin: &str) -> Result<T, ConfigError> {
    serde_yaml::from_str(yaml).map_err(|source| ConfigError::Yaml {
        origin: origin.to_string(),
        source,
    })
}

// ─── Server configuration ─────────────────────────────────────────────────────

/// GitHub credentials and client settings.
#[derive(Clone, Deserialize)]
pub struct GitHubConfig {
    /// Webhook secret used to verify `X-Hub-Signature-256`.
    #[serde(default)]
    pub secret: Option<String>,

    #[serde(default)]
    pub app_id: Option<u64>,

    /// The app's private key, either inline PEM or a path to a PEM file.
    #[serde(default)]
    pub private_key: Option<String>,

    /// A token used instead of app authentication.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for GitHubConfig {
    fn default() -> Self {
        GitHubConfig {
            secret: None,
            app_id: None,
            private_key: None,
            token: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("GitHubConfig")
            .field("secret", &redact(&self.secret))
            .field("app_id", &self.app_id)
            .field("private_key", &redact(&self.private_key))
            .field("token", &redact(&self.token))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// Configuration of the webhook server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default)]
    pub github: GitHubConfig,

    /// The release branch chain, oldest first.
    #[serde(default)]
    pub branches: Vec<String>,

    /// Local working copy for patch-based conflict checks.
    #[serde(default)]
    pub repo_path: Option<PathBuf>,

    #[serde(default)]
    pub conflict_mode: Option<ConflictMode>,
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            http_port: DEFAULT_HTTP_PORT,
            github: GitHubConfig::default(),
            branches: Vec::new(),
            repo_path: None,
            conflict_mode: None,
        }
    }
}

impl ServerConfig {
    /// Loads the file (if given), then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let yaml = read_file(path)?;
                parse_yaml(&yaml, &path.display().to_string())?
            }
            None => ServerConfig::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parses configuration from a YAML string without environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        parse_yaml(yaml, "configuration")
    }

    /// Applies `PICK_TRAIN_*` overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}")).filter(|value| !value.trim().is_empty())
        };

        if let Some(port) = get("HTTP_PORT") {
            self.http_port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("HTTP_PORT {port:?} is not a port")))?;
        }
        if let Some(secret) = get("GITHUB_SECRET") {
            self.github.secret = Some(secret);
        }
        if let Some(app_id) = get("GITHUB_APP_ID") {
            self.github.app_id = Some(app_id.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("GITHUB_APP_ID {app_id:?} is not a number"))
            })?);
        }
        if let Some(key) = get("GITHUB_PRIVATE_KEY") {
            self.github.private_key = Some(key);
        }
        if let Some(token) = get("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(branches) = get("BRANCHES") {
            self.branches = branches
                .split(',')
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(path) = get("REPO_PATH") {
            self.repo_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn branch_chain(&self) -> Result<BranchChain, ConfigError> {
        chain_from(self.branches.iter().cloned())
    }

    pub fn webhook_secret(&self) -> Result<WebhookSecret, ConfigError> {
        match &self.github.secret {
            Some(secret) if !secret.is_empty() => Ok(WebhookSecret::from(secret.as_str())),
            _ => Err(ConfigError::Invalid("github.secret is required".into())),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.github.request_timeout_secs)
    }

    /// Chooses app authentication when an app id and key are configured,
    /// otherwise a token.
    pub fn github_auth(&self) -> Result<GitHubAuth, ConfigError> {
        let github = &self.github;
        match (github.app_id, &github.private_key, &github.token) {
            (Some(app_id), Some(private_key), _) => {
                let pem = load_private_key(private_key)?;
                let key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
                    ConfigError::Invalid(format!("github.private_key is not an RSA PEM key: {e}"))
                })?;
                Ok(GitHubAuth::App { app_id, key })
            }
            (Some(_), None, _) => Err(ConfigError::Invalid(
                "github.app_id is set but github.private_key is missing".into(),
            )),
            (None, _, Some(token)) => Ok(GitHubAuth::Token(token.clone())),
            (None, _, None) => Err(ConfigError::Invalid(
                "either github.app_id with github.private_key, or github.token, is required"
                    .into(),
            )),
        }
    }

    pub fn pick_settings(&self) -> Result<PickSettings, ConfigError> {
        Ok(PickSettings {
            branches: self.branch_chain()?,
            repo_path: self.repo_path.clone(),
            conflict_mode: self.conflict_mode,
        })
    }
}

/// Inline PEM is used as is; anything else is read as a path.
fn load_private_key(value: &str) -> Result<String, ConfigError> {
    if value.trim_start().starts_with("-----BEGIN") {
        Ok(value.to_string())
    } else {
        read_file(Path::new(value.trim()))
    }
}

fn chain_from(branches: impl IntoIterator<Item = String>) -> Result<BranchChain, ConfigError> {
    let chain = BranchChain::new(branches).map_err(|e| ConfigError::Invalid(e.to_string()))?;
    if chain.is_empty() {
        return Err(ConfigError::Invalid("the branch chain is empty".into()));
    }
    Ok(chain)
}

// ─── Branch profile ───────────────────────────────────────────────────────────

/// The profile file read by the `pick` command.
///
/// ```yaml
/// branches:
///   - release/1.0
///   - release/2.0
///   - master
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct BranchProfile {
    #[serde(default)]
    pub branches: Vec<String>,
}

impl BranchProfile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let yaml = read_file(path)?;
        parse_yaml(&yaml, &path.display().to_string())
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        parse_yaml(yaml, "profile")
    }

    /// Validates the listed branches into a chain.
    pub fn chain(&self) -> Result<BranchChain, ConfigError> {
        chain_from(self.branches.iter().cloned())
    }
}
