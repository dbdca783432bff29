//! Position record models

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder written when a provider reports no human-readable location
pub const UNKNOWN_LOCATION: &str = "Unknown location";

/// Observation category. Each class has its own identifier space and tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityClass {
    /// Vehicle, identified by its plate
    Vehicle,
    /// Standalone tracker, identified by its tracker number
    Tracker,
}

impl EntityClass {
    /// Both classes, in processing order
    pub const ALL: [EntityClass; 2] = [EntityClass::Vehicle, EntityClass::Tracker];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityClass::Vehicle => "vehicle",
            EntityClass::Tracker => "tracker",
        }
    }
}

impl fmt::Display for EntityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical, producer-agnostic position report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Which table family this record belongs to
    pub entity_class: EntityClass,
    /// Identifier used to resolve the store's internal key
    pub external_identifier: String,
    /// Identifier literal written to the store (may differ from the external one)
    pub insert_identifier: String,
    /// When the position was observed
    pub observed_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Unit-less passthrough from the provider
    pub speed: f64,
    /// Human-readable location, or [`UNKNOWN_LOCATION`]
    pub location: String,
}

impl PositionRecord {
    /// Create a record whose insert identifier equals its external identifier
    pub fn new(
        entity_class: EntityClass,
        identifier: impl Into<String>,
        observed_at: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        let identifier = identifier.into();
        Self {
            entity_class,
            insert_identifier: identifier.clone(),
            external_identifier: identifier,
            observed_at,
            latitude,
            longitude,
            speed: 0.0,
            location: UNKNOWN_LOCATION.to_string(),
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_insert_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.insert_identifier = identifier.into();
        self
    }

    /// Map link derived from the coordinates
    pub fn map_link(&self) -> String {
        format!(
            "https://www.google.com/maps?q={},{}",
            self.latitude, self.longitude
        )
    }
}

/// One provider's normalized observations for a cycle, split by entity class
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observations {
    pub vehicles: Vec<PositionRecord>,
    pub trackers: Vec<PositionRecord>,
}

impl Observations {
    pub fn new(vehicles: Vec<PositionRecord>, trackers: Vec<PositionRecord>) -> Self {
        Self { vehicles, trackers }
    }

    /// Partition records by their entity class, preserving order
    pub fn from_records(records: impl IntoIterator<Item = PositionRecord>) -> Self {
        let mut observations = Self::default();
        for record in records {
            match record.entity_class {
                EntityClass::Vehicle => observations.vehicles.push(record),
                EntityClass::Tracker => observations.trackers.push(record),
            }
        }
        observations
    }

    pub fn get(&self, class: EntityClass) -> &[PositionRecord] {
        match class {
            EntityClass::Vehicle => &self.vehicles,
            EntityClass::Tracker => &self.trackers,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty() && self.trackers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vehicles.len() + self.trackers.len()
    }

    /// Distinct external identifiers of one class
    pub fn identifiers(&self, class: EntityClass) -> BTreeSet<String> {
        self.get(class)
            .iter()
            .map(|r| r.external_identifier.clone())
            .collect()
    }
}
