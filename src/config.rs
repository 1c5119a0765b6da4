//! `config.toml`: policy defaults, SSH defaults and host aliases.
//!
//! ```toml
//! [policy]
//! idempotent = true
//! check_state_first = true
//!
//! [ssh]
//! control_dir = "~/.cache/rigger"
//! connect_timeout_secs = 10
//!
//! [hosts.web1]
//! address = "10.0.0.12"
//! user = "deploy"
//! port = 2222
//! identity_file = "~/.ssh/deploy"
//! ```

use crate::paths;
use anyhow::{Context, Result};
use converge::Policy;
use serde::{Deserialize, Serialize};
use shellkit::SshOptions;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub policy: Policy,
    pub ssh: SshDefaults,
    pub hosts: BTreeMap<String, HostEntry>,
}

/// Settings shared by every remote host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshDefaults {
    /// Where control sockets live; the temp dir when unset
    pub control_dir: Option<String>,
    pub connect_timeout_secs: u32,
}

impl Default for SshDefaults {
    fn default() -> Self {
        Self {
            control_dir: None,
            connect_timeout_secs: 10,
        }
    }
}

/// One `[hosts.<alias>]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostEntry {
    /// Hostname or IP; the alias itself when unset
    pub address: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<String>,
}

/// Where and how to reach a host.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub address: String,
    pub options: SshOptions,
}

impl Config {
    /// Load the user's config, or defaults when there is none.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Resolve `name` to an address and SSH options.
    ///
    /// `name` may be an alias from `[hosts]`, a bare hostname, or
    /// `user@host`.
    pub fn target(&self, name: &str) -> Target {
        let (login, host) = match name.split_once('@') {
            Some((user, host)) => (Some(user.to_string()), host),
            None => (None, name),
        };
        let entry = self.hosts.get(host).cloned().unwrap_or_default();

        let options = SshOptions {
            user: login.or(entry.user),
            port: entry.port,
            identity_file: entry.identity_file.as_deref().map(paths::expand),
            connect_timeout: Some(self.ssh.connect_timeout_secs),
            control_dir: self.ssh.control_dir.as_deref().map(paths::expand),
            ..SshOptions::default()
        };

        Target {
            name: host.to_string(),
            address: entry.address.unwrap_or_else(|| host.to_string()),
            options,
        }
    }
}
