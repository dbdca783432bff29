//! StoreRepository - PositionStore over the record store protocol

use std::collections::BTreeSet;

use async_trait::async_trait;
use fleetsync_client::schema::StoreSchema;
use fleetsync_client::{StoreClient, StoreConfig};
use fleetsync_core::{Batch, EntityClass, EntityMapping, StoreClock, Watermarks};

use crate::error::{Result, SyncError};
use crate::store::PositionStore;
use crate::{resolver, watermark, writer};

/// Record store access shared by every provider's processor.
///
/// Cloning shares the underlying client and therefore its session.
#[derive(Debug, Clone)]
pub struct StoreRepository {
    client: StoreClient,
    schema: StoreSchema,
    clock: StoreClock,
}

impl StoreRepository {
    pub fn new(client: StoreClient, schema: StoreSchema, clock: StoreClock) -> Self {
        Self {
            client,
            schema,
            clock,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let clock = config.clock().ok_or_else(|| {
            SyncError::Config(format!(
                "utc_offset_minutes out of range: {}",
                config.utc_offset_minutes
            ))
        })?;
        let client = StoreClient::from_config(config)?;
        Ok(Self::new(client, config.schema.clone(), clock))
    }

    pub fn client(&self) -> &StoreClient {
        &self.client
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }
}

#[async_trait]
impl PositionStore for StoreRepository {
    async fn resolve(
        &self,
        class: EntityClass,
        identifiers: &BTreeSet<String>,
    ) -> fleetsync_client::Result<EntityMapping> {
        match class {
            EntityClass::Vehicle => {
                resolver::resolve_vehicles(&self.client, &self.schema, identifiers).await
            }
            EntityClass::Tracker => {
                resolver::resolve_trackers(&self.client, &self.schema, identifiers).await
            }
        }
    }

    async fn last_watermarks(&self, class: EntityClass) -> fleetsync_client::Result<Watermarks> {
        match class {
            EntityClass::Vehicle => {
                watermark::last_vehicle_watermarks(&self.client, &self.schema).await
            }
            EntityClass::Tracker => {
                watermark::last_tracker_watermarks(&self.client, &self.schema).await
            }
        }
    }

    async fn write_batch(&self, batch: &Batch) -> fleetsync_client::Result<usize> {
        match batch.entity_class {
            EntityClass::Vehicle => {
                writer::write_vehicle_batch(&self.client, &self.schema, &self.clock, batch).await
            }
            EntityClass::Tracker => {
                writer::write_tracker_batch(&self.client, &self.schema, &self.clock, batch).await
            }
        }
    }

    fn clock(&self) -> StoreClock {
        self.clock
    }
}
