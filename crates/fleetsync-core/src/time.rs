//! Record store timestamp conventions
//!
//! The store keeps naive local timestamps at a fixed UTC offset. Reads may
//! come back in several layouts depending on the query path; writes always
//! use `dd/mm/yyyy HH:MM:SS`.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, SubsecRound, TimeZone, Utc};

/// Layout used when writing timestamps to the store
pub const STORE_WRITE_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// Naive layouts accepted when reading store or provider timestamps
const NAIVE_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d%m%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%d/%m/%Y %H:%M",
];

/// Converts between UTC instants and the store's local timestamp strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreClock {
    offset: FixedOffset,
}

impl Default for StoreClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl StoreClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Clock for a store running at UTC
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Clock for a store at `minutes` east of UTC (negative for west).
    ///
    /// Returns `None` for offsets of a day or more.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(Self::new)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Parse a store or provider timestamp.
    ///
    /// RFC 3339 strings carry their own offset; naive layouts are read as
    /// local time at this clock's offset. Returns `None` when nothing matches.
    pub fn parse(&self, raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }

        NAIVE_FORMATS.iter().find_map(|format| {
            NaiveDateTime::parse_from_str(raw, format)
                .ok()
                .and_then(|naive| self.offset.from_local_datetime(&naive).single())
                .map(|local| local.with_timezone(&Utc))
        })
    }

    /// Drop what the store cannot hold: timestamps are written in whole seconds
    pub fn truncate(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        ts.trunc_subsecs(0)
    }

    /// Format an instant as the store's local `dd/mm/yyyy HH:MM:SS`
    pub fn format(&self, ts: DateTime<Utc>) -> String {
        ts.with_timezone(&self.offset)
            .format(STORE_WRITE_FORMAT)
            .to_string()
    }
}
