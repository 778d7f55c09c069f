// SDB - Snapshot Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine configuration stored in `~/.sdb.toml`.

use std::{fs, path::Path, path::PathBuf, time::Duration};

use eyre::{Context, Result};
use sdb_common::env::{SDB_API_ROOT, SDB_CONFIG};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default service endpoint.
pub const DEFAULT_API_ROOT: &str = "https://clouddebugger.googleapis.com";

/// Tuning knobs of the sync loop and the HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Delay before the first background tick
    pub initial_delay_ms: u64,
    /// Pause between two background ticks
    pub poll_period_ms: u64,
    /// Whether to long-poll with a wait token
    pub use_wait_token: bool,
    /// Pause between unchanged polls when wait tokens are off
    pub fallback_poll_interval_ms: u64,
    /// Upper bound on concurrent remote calls
    pub max_concurrent_requests: usize,
    /// Read timeout of the long-poll list call
    pub long_timeout_ms: u64,
    /// Read timeout of every other call
    pub short_timeout_ms: u64,
    /// Client version sent with every request
    pub client_version: String,
    /// Service root url
    pub api_root: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2000,
            poll_period_ms: 500,
            use_wait_token: true,
            fallback_poll_interval_ms: 1000,
            max_concurrent_requests: 4,
            long_timeout_ms: 120_000,
            short_timeout_ms: 10_000,
            client_version: format!("sdb/{}", env!("CARGO_PKG_VERSION")),
            api_root: DEFAULT_API_ROOT.to_string(),
        }
    }
}

impl SyncConfig {
    /// Get the config file path. `SDB_CONFIG` wins over `~/.sdb.toml`.
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(SDB_CONFIG) {
            return Ok(PathBuf::from(path));
        }
        let home =
            dirs::home_dir().ok_or_else(|| eyre::eyre!("Unable to determine home directory"))?;
        Ok(home.join(".sdb.toml"))
    }

    /// Load configuration from the default path, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let config = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            info!("Config file not found, creating default at {:?}", config_path);
            let default_config = Self::default();
            default_config.save_to(&config_path)?;
            default_config
        };

        Ok(config.with_env_overrides())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;

        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        fs::write(path, content).with_context(|| format!("Failed to write config file: {path:?}"))?;

        debug!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Applies `SDB_API_ROOT` if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(root) = std::env::var(SDB_API_ROOT) {
            if !root.trim().is_empty() {
                self.api_root = root;
            }
        }
        self
    }

    /// Delay before the first background tick.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Pause between background ticks.
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    /// Pause between unchanged polls in fallback mode.
    pub fn fallback_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_poll_interval_ms)
    }

    /// Read timeout of the long-poll.
    pub fn long_timeout(&self) -> Duration {
        Duration::from_millis(self.long_timeout_ms)
    }

    /// Read timeout of short calls.
    pub fn short_timeout(&self) -> Duration {
        Duration::from_millis(self.short_timeout_ms)
    }

    /// A configuration with no startup delay and tight timings, for tests.
    pub fn immediate() -> Self {
        Self {
            initial_delay_ms: 0,
            poll_period_ms: 1,
            fallback_poll_interval_ms: 1,
            ..Self::default()
        }
    }
}
