//! Sync Processor - one cycle of resolve, filter and write, with retry
//!
//! Each attempt re-reads every lookup, so a retried write is filtered against
//! whatever the store holds by then. After `max_attempts` failures the
//! cycle's observations are dropped; the next cycle starts from fresh data.

use std::sync::Arc;

use fleetsync_client::StoreError;
use fleetsync_core::{filter_batch, Batch, EntityClass, EntityMapping, Observations, Watermarks};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::store::PositionStore;

/// Outcome of a successful cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Attempts used, 0 when there was nothing to sync
    pub attempts: u32,
    pub vehicles_written: usize,
    pub trackers_written: usize,
    /// Observations whose identifier the store does not know
    pub unresolved: usize,
    /// Observations not newer than the stored watermark
    pub stale: usize,
}

impl CycleReport {
    pub fn written(&self) -> usize {
        self.vehicles_written + self.trackers_written
    }
}

/// Runs sync cycles against a shared [`PositionStore`].
///
/// The processor does not schedule itself; callers await one cycle before
/// starting the next for the same provider.
pub struct SyncProcessor {
    store: Arc<dyn PositionStore>,
    config: SyncConfig,
}

impl SyncProcessor {
    pub fn new(store: Arc<dyn PositionStore>, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Sync already-normalized observations, retrying whole attempts.
    ///
    /// Returns [`SyncError::AttemptsExhausted`] once every attempt failed;
    /// the observations are not persisted or requeued in that case.
    pub async fn run_cycle(&self, observations: &Observations) -> Result<CycleReport> {
        if observations.is_empty() {
            debug!("No observations, skipping cycle");
            return Ok(CycleReport::default());
        }

        let max_attempts = self.config.max_attempts;
        let mut attempt = 1;
        loop {
            match self.attempt(observations).await {
                Ok(mut report) => {
                    report.attempts = attempt;
                    info!(
                        attempt,
                        vehicles = report.vehicles_written,
                        trackers = report.trackers_written,
                        unresolved = report.unresolved,
                        stale = report.stale,
                        "Sync cycle complete"
                    );
                    return Ok(report);
                }
                Err(e) if attempt < max_attempts => {
                    warn!(
                        attempt,
                        max_attempts,
                        error = %e,
                        retry_in_ms = self.config.retry_delay_ms,
                        "Sync attempt failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        attempts = attempt,
                        error = %e,
                        dropped = observations.len(),
                        "Sync cycle failed, dropping observations"
                    );
                    return Err(SyncError::AttemptsExhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
            }
        }
    }

    async fn attempt(
        &self,
        observations: &Observations,
    ) -> std::result::Result<CycleReport, StoreError> {
        // every branch runs to completion before a failure is reported
        let (vehicle_mapping, tracker_mapping, vehicle_marks, tracker_marks) = futures::join!(
            self.resolve(EntityClass::Vehicle, observations),
            self.resolve(EntityClass::Tracker, observations),
            self.watermarks(EntityClass::Vehicle, observations),
            self.watermarks(EntityClass::Tracker, observations),
        );
        let (vehicle_mapping, tracker_mapping) = (vehicle_mapping?, tracker_mapping?);
        let (vehicle_marks, tracker_marks) = (vehicle_marks?, tracker_marks?);

        let clock = self.store.clock();
        let vehicles = filter_batch(
            EntityClass::Vehicle,
            observations.get(EntityClass::Vehicle),
            &vehicle_mapping,
            &vehicle_marks,
            &clock,
        );
        let trackers = filter_batch(
            EntityClass::Tracker,
            observations.get(EntityClass::Tracker),
            &tracker_mapping,
            &tracker_marks,
            &clock,
        );

        let (vehicles_written, trackers_written) =
            futures::join!(self.write(&vehicles.batch), self.write(&trackers.batch));

        Ok(CycleReport {
            attempts: 0,
            vehicles_written: vehicles_written?,
            trackers_written: trackers_written?,
            unresolved: vehicles.unresolved + trackers.unresolved,
            stale: vehicles.stale + trackers.stale,
        })
    }

    async fn resolve(
        &self,
        class: EntityClass,
        observations: &Observations,
    ) -> std::result::Result<EntityMapping, StoreError> {
        self.store
            .resolve(class, &observations.identifiers(class))
            .await
    }

    /// An empty class group needs no baseline
    async fn watermarks(
        &self,
        class: EntityClass,
        observations: &Observations,
    ) -> std::result::Result<Watermarks, StoreError> {
        if observations.get(class).is_empty() {
            return Ok(Watermarks::new());
        }
        self.store.last_watermarks(class).await
    }

    async fn write(&self, batch: &Batch) -> std::result::Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        self.store.write_batch(batch).await
    }
}

impl std::fmt::Debug for SyncProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncProcessor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
