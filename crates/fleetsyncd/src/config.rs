//! Daemon configuration file handling

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use fleetsync_client::StoreConfig;
use fleetsync_core::{EntityClass, StoreClock};
use fleetsync_engine::SyncConfig;
use serde::Deserialize;

/// Environment variable overriding `store.password`
pub const PASSWORD_ENV: &str = "FLEETSYNC_STORE_PASSWORD";

/// Top-level daemon configuration (TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonConfig {
    pub store: StoreConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

/// One provider feed, synced on its own schedule
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,

    /// Feed URL returning a JSON array of positions
    pub url: String,

    /// Seconds between the end of one cycle and the start of the next
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Sent as `Authorization: Bearer <token>`
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Class for records that do not state one
    #[serde(default)]
    pub entity_class: Option<EntityClass>,

    /// Offset applied to feed timestamps without one, minutes east of UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Fetch timeout in milliseconds
    #[serde(default = "default_fetch_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

impl ProviderConfig {
    pub fn clock(&self) -> Option<StoreClock> {
        StoreClock::from_offset_minutes(self.utc_offset_minutes)
    }
}

impl DaemonConfig {
    /// Load, apply environment overrides, and validate
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.apply_env(std::env::var(PASSWORD_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// An empty password from the environment is ignored
    pub fn apply_env(&mut self, password: Option<String>) {
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            self.store.credentials.password = password;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.sync.validate()?;

        if self.store.clock().is_none() {
            bail!(
                "store.utc_offset_minutes out of range: {}",
                self.store.utc_offset_minutes
            );
        }
        if self.providers.is_empty() {
            bail!("no [[providers]] configured");
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name.as_str()) {
                bail!("duplicate provider name '{}'", provider.name);
            }
            if provider.interval_secs == 0 {
                bail!("provider '{}': interval_secs must be positive", provider.name);
            }
            if provider.clock().is_none() {
                bail!(
                    "provider '{}': utc_offset_minutes out of range: {}",
                    provider.name,
                    provider.utc_offset_minutes
                );
            }
        }
        Ok(())
    }
}
