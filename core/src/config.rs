//! Broker naming configuration.
//!
//! The defaults reproduce the names the single-sign-on daemon registers on
//! the session bus, so clients under test need no changes to find the mock.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::path::ObjectPath;
use crate::BrokerError;

pub const DEFAULT_SERVICE_NAME: &str = "com.google.code.AccountsSSO.SingleSignOn";
pub const DEFAULT_ROOT_PATH: &str = "/com/google/code/AccountsSSO/SingleSignOn";
pub const DEFAULT_IDENTITY_PREFIX: &str = "/identity";
pub const DEFAULT_SESSION_PREFIX: &str = "/session";

const ENV_SERVICE_NAME: &str = "SIGNON_MOCK_SERVICE_NAME";
const ENV_ROOT_PATH: &str = "SIGNON_MOCK_ROOT_PATH";
const ENV_IDENTITY_PREFIX: &str = "SIGNON_MOCK_IDENTITY_PREFIX";
const ENV_SESSION_PREFIX: &str = "SIGNON_MOCK_SESSION_PREFIX";

/// Names under which the broker answers calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Well-known bus name of the service
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Object path of the service-level object
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Interface of the service-level object (defaults to `<service_name>.AuthService`)
    #[serde(default)]
    pub service_interface: Option<String>,

    /// Interface of session objects (defaults to `<service_name>.AuthSession`)
    #[serde(default)]
    pub session_interface: Option<String>,

    /// Prefix of identity references returned by `getIdentity`
    #[serde(default = "default_identity_prefix")]
    pub identity_prefix: String,

    /// Prefix of session object paths
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_root_path() -> String {
    DEFAULT_ROOT_PATH.to_string()
}

fn default_identity_prefix() -> String {
    DEFAULT_IDENTITY_PREFIX.to_string()
}

fn default_session_prefix() -> String {
    DEFAULT_SESSION_PREFIX.to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            root_path: default_root_path(),
            service_interface: None,
            session_interface: None,
            identity_prefix: default_identity_prefix(),
            session_prefix: default_session_prefix(),
        }
    }
}

impl BrokerConfig {
    /// Load configuration: defaults, then the TOML file (explicit path or the
    /// per-user default location, when present), then environment overrides.
    pub fn load(config_override: Option<&Path>) -> Result<Self> {
        let config_path = match config_override {
            Some(p) => Some(p.to_path_buf()),
            None => Self::default_config_path(),
        };

        let mut config = match config_path {
            Some(path) if path.exists() => {
                debug!("Loading broker configuration from: {}", path.display());
                Self::from_file(&path)?
            }
            Some(path) if config_override.is_some() => {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            _ => {
                debug!("No config file, using default broker configuration");
                Self::default()
            }
        };

        config.apply_env();
        config.validate()?;
        info!(service = %config.service_name, "Broker configuration loaded");
        Ok(config)
    }

    /// Parse a TOML configuration file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: BrokerConfig = toml::from_str(&content)
            .map_err(BrokerError::from)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// `<config_dir>/signon-mock/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("signon-mock").join("config.toml"))
    }

    fn apply_env(&mut self) {
        let read = |var: &str| {
            std::env::var(var)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        if let Some(v) = read(ENV_SERVICE_NAME) {
            self.service_name = v;
        }
        if let Some(v) = read(ENV_ROOT_PATH) {
            self.root_path = v;
        }
        if let Some(v) = read(ENV_IDENTITY_PREFIX) {
            self.identity_prefix = v;
        }
        if let Some(v) = read(ENV_SESSION_PREFIX) {
            self.session_prefix = v;
        }
    }

    /// Reject names a bus connection would refuse.
    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.service_name.trim().is_empty() {
            return Err(BrokerError::Configuration(
                "service_name must not be empty".to_string(),
            ));
        }
        for iface in [self.service_interface(), self.session_interface()] {
            if iface.trim().is_empty() || !iface.contains('.') {
                return Err(BrokerError::Configuration(format!(
                    "invalid interface name {iface:?}"
                )));
            }
        }
        let root = self.root_path()?;
        let identity = self.identity_prefix()?;
        let session = self.session_prefix()?;
        if session == ObjectPath::root() {
            return Err(BrokerError::Configuration(
                "session_prefix must not be the root path".to_string(),
            ));
        }
        if session == root || session.is_child_of(&root) || root.is_child_of(&session) {
            return Err(BrokerError::Configuration(format!(
                "session_prefix {session} overlaps root_path {root}"
            )));
        }
        if identity == session {
            return Err(BrokerError::Configuration(
                "identity_prefix and session_prefix must differ".to_string(),
            ));
        }
        Ok(())
    }

    pub fn service_interface(&self) -> String {
        self.service_interface
            .clone()
            .unwrap_or_else(|| format!("{}.AuthService", self.service_name))
    }

    pub fn session_interface(&self) -> String {
        self.session_interface
            .clone()
            .unwrap_or_else(|| format!("{}.AuthSession", self.service_name))
    }

    pub fn root_path(&self) -> Result<ObjectPath, BrokerError> {
        ObjectPath::new(self.root_path.as_str())
    }

    pub fn identity_prefix(&self) -> Result<ObjectPath, BrokerError> {
        ObjectPath::new(self.identity_prefix.as_str())
    }

    pub fn session_prefix(&self) -> Result<ObjectPath, BrokerError> {
        ObjectPath::new(self.session_prefix.as_str())
    }

    /// Render as TOML, with derived interface names filled in.
    pub fn to_toml(&self) -> Result<String> {
        let mut resolved = self.clone();
        resolved.service_interface = Some(self.service_interface());
        resolved.session_interface = Some(self.session_interface());
        toml::to_string_pretty(&resolved).context("Failed to serialize configuration")
    }
}
