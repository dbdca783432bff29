//! Record store connection configuration

use std::fmt;
use std::time::Duration;

use fleetsync_core::StoreClock;
use serde::{Deserialize, Serialize};

use crate::encoding::TextEncoding;
use crate::schema::StoreSchema;

/// Login credentials. The password is never printed.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the store application (e.g. "http://erp.local:8180/mge")
    pub base_url: String,

    #[serde(flatten)]
    pub credentials: Credentials,

    /// Encoding of response bodies
    #[serde(default)]
    pub encoding: TextEncoding,

    /// Offset of the store's local clock, in minutes east of UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Table and column names
    #[serde(default)]
    pub schema: StoreSchema,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl StoreConfig {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            encoding: TextEncoding::default(),
            utc_offset_minutes: 0,
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            schema: StoreSchema::default(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Clock for the store's local timestamps, `None` if the offset is invalid
    pub fn clock(&self) -> Option<StoreClock> {
        StoreClock::from_offset_minutes(self.utc_offset_minutes)
    }
}
