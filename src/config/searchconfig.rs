// SPDX-License-Identifier: MIT OR Apache-2.0

//! Search profile file parser
//!
//! The profile file (typically `~/.search/config`) holds one context per
//! application: credentials, an optional explicit host list and optional
//! timeout overrides.
//!
//! ```yaml
//! context: production
//! contexts:
//!   production:
//!     application_id: MYAPP
//!     api_key: 0123456789abcdef
//!   local:
//!     application_id: LOCAL
//!     api_key: dev
//!     hosts:
//!       - url: http://127.0.0.1:7700
//!     read_timeout_ms: 1000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{ClientConfig, HostConfig};
use crate::error::{Result, SearchError};

/// Path to the profile file.
pub const ENV_SEARCHCONFIG: &str = "SEARCHCONFIG";
/// Name of the context to use.
pub const ENV_SEARCH_CONTEXT: &str = "SEARCH_CONTEXT";
pub const ENV_SEARCH_APPLICATION_ID: &str = "SEARCH_APPLICATION_ID";
pub const ENV_SEARCH_API_KEY: &str = "SEARCH_API_KEY";
/// Comma-separated hosts, each accepting any call type.
pub const ENV_SEARCH_HOSTS: &str = "SEARCH_HOSTS";

const ENV_CONTEXT_NAME: &str = "default";

/// The whole profile file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    /// The currently active context name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Map of context names to their configurations
    #[serde(default)]
    pub contexts: HashMap<String, SearchContext>,
}

/// Connection settings for one application
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchContext {
    pub application_id: String,

    pub api_key: String,

    /// Explicit hosts; the application's default hosts are used when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<HostConfig>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,
}

impl SearchConfig {
    /// Load configuration from the default location (~/.search/config)
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The home directory cannot be determined
    /// - The config file cannot be read
    /// - The config file is malformed
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed YAML
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            SearchError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load the profile file at [`config_path`](Self::config_path), if it
    /// exists, and apply the environment overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed
    pub fn load_with_env() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply overrides from `lookup` (usually the process environment).
    ///
    /// Credential and host overrides land in the active context, which is
    /// created if it does not exist yet.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(name) = non_empty(ENV_SEARCH_CONTEXT) {
            self.context = Some(name);
        }

        let application_id = non_empty(ENV_SEARCH_APPLICATION_ID);
        let api_key = non_empty(ENV_SEARCH_API_KEY);
        let hosts = non_empty(ENV_SEARCH_HOSTS).map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(HostConfig::any)
                .collect::<Vec<_>>()
        });
        if application_id.is_none() && api_key.is_none() && hosts.is_none() {
            return;
        }

        let name = self
            .context
            .get_or_insert_with(|| ENV_CONTEXT_NAME.to_string())
            .clone();
        let ctx = self.contexts.entry(name).or_default();
        if let Some(application_id) = application_id {
            ctx.application_id = application_id;
        }
        if let Some(api_key) = api_key {
            ctx.api_key = api_key;
        }
        if let Some(hosts) = hosts {
            ctx.hosts = Some(hosts);
        }
    }

    /// Parse configuration from YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SearchError::Config(format!("Failed to parse config YAML: {}", e)))
    }

    /// Serialize back to YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| SearchError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Get the default config file path (~/.search/config)
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| SearchError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".search").join("config"))
    }

    /// Get the path to the config file, respecting the SEARCHCONFIG environment variable
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined when SEARCHCONFIG is not set
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var(ENV_SEARCHCONFIG) {
            Ok(PathBuf::from(env_path))
        } else {
            Self::default_path()
        }
    }

    /// Get the currently active context
    ///
    /// Returns `None` if no active context is set or if the context doesn't exist
    pub fn active_context(&self) -> Option<&SearchContext> {
        self.context
            .as_ref()
            .and_then(|name| self.contexts.get(name))
    }

    pub fn get_context(&self, name: &str) -> Option<&SearchContext> {
        self.contexts.get(name)
    }

    /// List all available context names
    pub fn context_names(&self) -> Vec<&String> {
        self.contexts.keys().collect()
    }
}

impl SearchContext {
    /// Convert into a validated [`ClientConfig`].
    ///
    /// # Errors
    ///
    /// Returns `SearchError::Config` if credentials are missing or a timeout
    /// is zero.
    pub fn to_client_config(&self) -> Result<ClientConfig> {
        let mut builder = ClientConfig::builder(&self.application_id, &self.api_key);
        if let Some(hosts) = &self.hosts {
            builder = builder.hosts(hosts.clone());
        }
        if let Some(ms) = self.read_timeout_ms {
            builder = builder.read_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.write_timeout_ms {
            builder = builder.write_timeout(Duration::from_millis(ms));
        }
        builder.build()
    }
}
