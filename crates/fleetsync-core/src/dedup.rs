//! High-water-mark deduplication
//!
//! An observation is written only if it is strictly newer than the latest
//! row the store already holds for the same entity.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::models::{Batch, EntityClass, EntityMapping, InternalKey, PositionRecord, Watermarks};
use crate::time::StoreClock;

/// Decide whether `candidate` must be written given the stored watermark.
///
/// - no watermark: accept
/// - invalid candidate (`None`): reject
/// - watermark present but unparsable: accept. A corrupt baseline must not
///   stall the sync, even though this can admit a record older than other
///   stored rows.
/// - otherwise: accept iff `candidate` is strictly later. Equal timestamps
///   are rejected so a re-observed position is never inserted twice.
///
/// Both sides are compared at the store's whole-second resolution, since a
/// written candidate comes back truncated as the next watermark.
pub fn is_newer(
    candidate: Option<DateTime<Utc>>,
    watermark: Option<&str>,
    clock: &StoreClock,
) -> bool {
    let Some(watermark) = watermark else {
        return candidate.is_some();
    };
    let Some(candidate) = candidate else {
        return false;
    };

    match clock.parse(watermark) {
        Some(baseline) => clock.truncate(candidate) > clock.truncate(baseline),
        None => {
            debug!(watermark, "Unparsable stored watermark, accepting candidate");
            true
        }
    }
}

/// Result of running one entity class through the filter
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    /// Records to write, in input order
    pub batch: Batch,
    /// Records whose identifier the store does not know
    pub unresolved: usize,
    /// Records not newer than the stored watermark (or repeated within the input)
    pub stale: usize,
}

/// Resolve and deduplicate one class of observations.
///
/// Records with an unknown identifier are dropped (logged only). Exact
/// repeats of an accepted `(key, observed_at)` pair within the same input
/// are dropped as well, since the watermark cannot catch them until the
/// batch is written.
pub fn filter_batch(
    entity_class: EntityClass,
    records: &[PositionRecord],
    mapping: &EntityMapping,
    watermarks: &Watermarks,
    clock: &StoreClock,
) -> FilterOutcome {
    let mut outcome = FilterOutcome {
        batch: Batch::new(entity_class),
        unresolved: 0,
        stale: 0,
    };
    let mut accepted: HashSet<(InternalKey, DateTime<Utc>)> = HashSet::new();

    for record in records {
        let Some(key) = mapping.get(&record.external_identifier) else {
            debug!(
                class = %entity_class,
                identifier = %record.external_identifier,
                "Identifier not registered in store, dropping observation"
            );
            outcome.unresolved += 1;
            continue;
        };

        let watermark = watermarks.get(key);
        if !is_newer(Some(record.observed_at), watermark, clock) {
            debug!(
                class = %entity_class,
                identifier = %record.external_identifier,
                observed_at = %record.observed_at,
                watermark = watermark.unwrap_or(""),
                "Observation not newer than stored watermark"
            );
            outcome.stale += 1;
            continue;
        }

        if !accepted.insert((key.clone(), clock.truncate(record.observed_at))) {
            outcome.stale += 1;
            continue;
        }

        outcome.batch.push(key.clone(), record.clone());
    }

    outcome
}
