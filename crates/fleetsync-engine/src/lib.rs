//! fleetsync-engine - Position synchronization engine
//!
//! Replicates only new position reports into the record store:
//!
//! 1. resolve external identifiers to store keys ([`resolver`])
//! 2. read the latest persisted observation per key ([`watermark`])
//! 3. keep observations strictly newer than that ([`fleetsync_core::dedup`])
//! 4. bulk-insert vehicles and trackers as two batches ([`writer`])
//!
//! [`SyncProcessor`] runs one cycle of these steps with whole-attempt retry;
//! [`Scheduler`] drives cycles for one provider without overlap.

pub mod config;
pub mod error;
pub mod processor;
pub mod repository;
pub mod resolver;
pub mod scheduler;
pub mod source;
pub mod store;
pub mod watermark;
pub mod writer;

#[cfg(test)]
mod testing;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use processor::{CycleReport, SyncProcessor};
pub use repository::StoreRepository;
pub use scheduler::Scheduler;
pub use source::{PositionSource, StaticSource};
pub use store::PositionStore;
