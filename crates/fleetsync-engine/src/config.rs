//! Sync cycle configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Retry policy for one sync cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Attempts per cycle before its observations are dropped
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between a failed attempt and the next one, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl SyncConfig {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay_ms: u64::try_from(retry_delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SyncError::Config(
                "max_attempts must be a positive integer".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: SyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.retry_delay(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = SyncConfig::new(0, Duration::from_millis(10));
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }
}
