//! In-memory PositionStore with scripted failures

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use fleetsync_client::{Result, StoreError};
use fleetsync_core::{
    Batch, EntityClass, EntityMapping, InternalKey, PositionRecord, StoreClock, Watermarks,
};
use parking_lot::Mutex;

#[derive(Default)]
pub struct ScriptedStore {
    mappings: Mutex<Vec<(EntityClass, String, InternalKey)>>,
    watermarks: Mutex<Vec<(EntityClass, InternalKey, String)>>,
    written: Mutex<Vec<(InternalKey, PositionRecord)>>,
    failing_writes: AtomicUsize,
    failing_lookups: AtomicUsize,
    pub resolve_calls: AtomicUsize,
    pub watermark_calls: AtomicUsize,
    pub write_calls: AtomicUsize,
}

impl ScriptedStore {
    pub fn register(&self, class: EntityClass, identifier: &str, key: &str) {
        self.mappings
            .lock()
            .push((class, identifier.to_string(), InternalKey::new(key)));
    }

    pub fn watermark(&self, class: EntityClass, key: &str, observed_at: &str) {
        self.watermarks
            .lock()
            .push((class, InternalKey::new(key), observed_at.to_string()));
    }

    pub fn fail_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    pub fn fail_lookups(&self, count: usize) {
        self.failing_lookups.store(count, Ordering::SeqCst);
    }

    pub fn written(&self) -> Vec<(InternalKey, PositionRecord)> {
        self.written.lock().clone()
    }

    pub fn calls(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl crate::PositionStore for ScriptedStore {
    async fn resolve(
        &self,
        class: EntityClass,
        identifiers: &BTreeSet<String>,
    ) -> Result<EntityMapping> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.failing_lookups) {
            return Err(StoreError::Timeout);
        }
        Ok(self
            .mappings
            .lock()
            .iter()
            .filter(|(c, id, _)| *c == class && identifiers.contains(id))
            .map(|(_, id, key)| (id.clone(), key.clone()))
            .collect())
    }

    async fn last_watermarks(&self, class: EntityClass) -> Result<Watermarks> {
        self.watermark_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .watermarks
            .lock()
            .iter()
            .filter(|(c, _, _)| *c == class)
            .map(|(_, key, ts)| (key.clone(), ts.clone()))
            .collect())
    }

    async fn write_batch(&self, batch: &Batch) -> Result<usize> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.failing_writes) {
            return Err(StoreError::remote("DatasetSP.save", "deadlock detected"));
        }
        let mut written = self.written.lock();
        for entry in batch.iter() {
            written.push((entry.key.clone(), entry.record.clone()));
        }
        Ok(batch.len())
    }

    fn clock(&self) -> StoreClock {
        StoreClock::utc()
    }
}
