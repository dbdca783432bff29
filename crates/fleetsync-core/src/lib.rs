//! fleetsync-core - Core types for position synchronization
//!
//! This crate provides the producer-agnostic position model, the record
//! store's timestamp conventions, and the high-water-mark deduplication
//! filter shared by the sync engine and its store client.

pub mod dedup;
pub mod error;
pub mod models;
pub mod normalize;
pub mod time;

pub use dedup::{filter_batch, is_newer, FilterOutcome};
pub use error::RejectReason;
pub use models::*;
pub use normalize::{Normalizer, RawPosition};
pub use time::StoreClock;
