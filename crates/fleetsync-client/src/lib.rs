//! fleetsync Record Store Client
//!
//! Provides a session-aware HTTP client for the ERP record store. All calls
//! go through a single authenticated session that is renewed transparently
//! when the store reports it expired.
//!
//! # Example
//!
//! ```rust,no_run
//! use fleetsync_client::{Credentials, StoreClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = StoreClient::new(
//!         "http://erp.local:8180/mge",
//!         Credentials::new("sync", "secret"),
//!     )?;
//!
//!     // Logs in on first use
//!     let result = client.query("SELECT VEHICLE_ID, PLATE FROM FLT_VEHICLE").await?;
//!     for row in result.rows()? {
//!         println!("{:?}", row.text("PLATE"));
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! The `testing` module provides an in-process store speaking the same
//! protocol:
//!
//! ```rust,ignore
//! use fleetsync_client::testing::{MockStore, MockStoreOptions};
//!
//! let store = MockStore::start(MockStoreOptions::default()).await?;
//! let client = store.client()?;
//! ```

mod client;
mod config;
mod encoding;
mod error;
pub mod protocol;
mod rows;
pub mod schema;
mod session;
pub mod sql;
pub mod testing;

pub use client::StoreClient;
pub use config::{Credentials, StoreConfig};
pub use encoding::TextEncoding;
pub use error::{Result, StoreError};
pub use protocol::{SaveRecord, SaveRequest};
pub use rows::{QueryResult, Row};
pub use schema::{EntitySchema, StoreSchema};
