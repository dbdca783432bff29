//! PositionStore trait - the record store seen by the sync processor

use std::collections::BTreeSet;

use async_trait::async_trait;
use fleetsync_client::Result;
use fleetsync_core::{Batch, EntityClass, EntityMapping, StoreClock, Watermarks};

/// Read and write access to persisted positions.
///
/// [`StoreRepository`](crate::StoreRepository) implements this over the
/// record store protocol. Several processors may share one implementation.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Map external identifiers to internal keys; unknown identifiers are absent
    async fn resolve(
        &self,
        class: EntityClass,
        identifiers: &BTreeSet<String>,
    ) -> Result<EntityMapping>;

    /// Latest persisted observed-at per internal key
    async fn last_watermarks(&self, class: EntityClass) -> Result<Watermarks>;

    /// Insert one batch as a single store call; returns rows written
    async fn write_batch(&self, batch: &Batch) -> Result<usize>;

    /// Timestamp convention of stored watermarks
    fn clock(&self) -> StoreClock {
        StoreClock::utc()
    }
}
