//! Position sources - where a provider's observations come from

use std::collections::VecDeque;

use async_trait::async_trait;
use fleetsync_core::PositionRecord;
use parking_lot::Mutex;

use crate::error::Result;

/// A provider feed yielding normalized observations.
///
/// Records that cannot be normalized are dropped by the source before they
/// reach the processor.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Provider name, used in logs
    fn name(&self) -> &str;

    /// Fetch the observations for one cycle
    async fn fetch(&self) -> Result<Vec<PositionRecord>>;
}

/// Source handing out prepared snapshots in order, then nothing.
///
/// Replays captured feeds and drives schedulers in tests.
#[derive(Debug)]
pub struct StaticSource {
    name: String,
    snapshots: Mutex<VecDeque<Vec<PositionRecord>>>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, snapshots: Vec<Vec<PositionRecord>>) -> Self {
        Self {
            name: name.into(),
            snapshots: Mutex::new(snapshots.into()),
        }
    }

    /// Snapshots not fetched yet
    pub fn remaining(&self) -> usize {
        self.snapshots.lock().len()
    }
}

#[async_trait]
impl PositionSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<PositionRecord>> {
        Ok(self.snapshots.lock().pop_front().unwrap_or_default())
    }
}
