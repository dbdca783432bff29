//! Scheduler - drives sync cycles for one provider

use std::sync::Arc;
use std::time::Duration;

use fleetsync_core::Observations;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{Result, SyncError};
use crate::processor::{CycleReport, SyncProcessor};
use crate::source::PositionSource;

/// Fetches from one source and syncs, one cycle at a time.
///
/// The next cycle is scheduled only after the current one settled, so cycles
/// for a provider never overlap. Schedulers for different providers may
/// share one processor and therefore one store session.
pub struct Scheduler {
    source: Arc<dyn PositionSource>,
    processor: Arc<SyncProcessor>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn PositionSource>,
        processor: Arc<SyncProcessor>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            processor,
            interval,
        }
    }

    pub fn provider(&self) -> &str {
        self.source.name()
    }

    /// Fetch once and run one cycle
    pub async fn run_once(&self) -> Result<CycleReport> {
        let span = info_span!("cycle", provider = %self.source.name());
        async {
            let records = self.source.fetch().await?;
            debug!(records = records.len(), "Fetched observations");
            let observations = Observations::from_records(records);
            self.processor.run_cycle(&observations).await
        }
        .instrument(span)
        .await
    }

    /// Run cycles every `interval` until `shutdown` turns true or its sender
    /// is dropped. A cycle in progress is never interrupted.
    ///
    /// Returns the number of cycles run.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> usize {
        info!(
            provider = %self.provider(),
            interval_secs = self.interval.as_secs_f64(),
            "Scheduler started"
        );

        let mut cycles = 0;
        while !*shutdown.borrow_and_update() {
            match self.run_once().await {
                Ok(report) => debug!(provider = %self.provider(), ?report, "Cycle finished"),
                Err(e @ SyncError::Source { .. }) => {
                    warn!(provider = %self.provider(), error = %e, "Fetch failed, skipping cycle")
                }
                // the processor already logged the final failure
                Err(e) => debug!(provider = %self.provider(), error = %e, "Cycle failed"),
            }
            cycles += 1;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(provider = %self.provider(), cycles, "Scheduler stopped");
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::source::StaticSource;
    use crate::testing::ScriptedStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use fleetsync_core::{EntityClass, PositionRecord};

    fn record(minute: u32) -> PositionRecord {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap();
        PositionRecord::new(EntityClass::Vehicle, "ABC1234", ts, -23.5, -46.6)
    }

    fn processor(store: &Arc<ScriptedStore>) -> Arc<SyncProcessor> {
        Arc::new(SyncProcessor::new(store.clone(), SyncConfig::default()).unwrap())
    }

    struct BrokenFeed;

    #[async_trait]
    impl PositionSource for BrokenFeed {
        fn name(&self) -> &str {
            "broken"
        }

        async fn fetch(&self) -> Result<Vec<PositionRecord>> {
            Err(SyncError::source_failed("broken", "connection refused"))
        }
    }

    #[tokio::test]
    async fn test_run_once_syncs_one_snapshot() {
        let store = Arc::new(ScriptedStore::default());
        store.register(EntityClass::Vehicle, "ABC1234", "12");
        let source = Arc::new(StaticSource::new("feed", vec![vec![record(1), record(2)]]));
        let scheduler = Scheduler::new(source.clone(), processor(&store), Duration::from_secs(60));

        let report = scheduler.run_once().await.unwrap();

        assert_eq!(report.vehicles_written, 2);
        assert_eq!(source.remaining(), 0);
    }

    #[tokio::test]
    async fn test_fetch_error_surfaces_as_source_error() {
        let store = Arc::new(ScriptedStore::default());
        let scheduler = Scheduler::new(Arc::new(BrokenFeed), processor(&store), Duration::from_secs(60));

        let err = scheduler.run_once().await.unwrap_err();

        assert!(matches!(err, SyncError::Source { .. }));
        assert_eq!(ScriptedStore::calls(&store.resolve_calls), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_repeats_until_shutdown() {
        let store = Arc::new(ScriptedStore::default());
        store.register(EntityClass::Vehicle, "ABC1234", "12");
        let source = Arc::new(StaticSource::new(
            "feed",
            vec![vec![record(1)], vec![record(2)], vec![record(3)]],
        ));
        let scheduler = Scheduler::new(source.clone(), processor(&store), Duration::from_secs(60));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(scheduler.run(rx));
        // cycles at t=0 and t=60s; shutdown lands before t=120s
        tokio::time::sleep(Duration::from_secs(90)).await;
        tx.send(true).unwrap();
        let cycles = handle.await.unwrap();

        assert_eq!(cycles, 2);
        assert_eq!(store.written().len(), 2);
        assert_eq!(source.remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_does_not_stop_scheduler() {
        let store = Arc::new(ScriptedStore::default());
        let scheduler = Scheduler::new(Arc::new(BrokenFeed), processor(&store), Duration::from_secs(10));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(scheduler.run(rx));
        tokio::time::sleep(Duration::from_secs(25)).await;
        drop(tx);

        assert_eq!(handle.await.unwrap(), 3);
    }
}
