//! Provider record normalization
//!
//! Provider connectors hand over loosely-typed JSON. [`RawPosition`] accepts
//! the common spellings and [`Normalizer`] turns it into a
//! [`PositionRecord`], rejecting anything without an identifier, a valid
//! timestamp, or coordinates.

use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::error::RejectReason;
use crate::models::{EntityClass, PositionRecord, UNKNOWN_LOCATION};
use crate::time::StoreClock;

/// A provider position report before validation
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPosition {
    #[serde(default, alias = "class", alias = "entity_class", alias = "type")]
    pub kind: Option<EntityClass>,

    #[serde(
        default,
        alias = "plate",
        alias = "tracker",
        alias = "device",
        deserialize_with = "lenient_string"
    )]
    pub identifier: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub insert_identifier: Option<String>,

    #[serde(
        default,
        alias = "timestamp",
        alias = "date",
        alias = "datetime",
        deserialize_with = "lenient_string"
    )]
    pub observed_at: Option<String>,

    #[serde(default, alias = "lat", deserialize_with = "lenient_number")]
    pub latitude: Option<f64>,

    #[serde(
        default,
        alias = "lon",
        alias = "lng",
        deserialize_with = "lenient_number"
    )]
    pub longitude: Option<f64>,

    #[serde(default, alias = "velocity", deserialize_with = "lenient_number")]
    pub speed: Option<f64>,

    #[serde(default, alias = "address", deserialize_with = "lenient_string")]
    pub location: Option<String>,
}

/// Accepts strings and numbers, trims, and maps blanks to `None`
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts numbers and numeric strings, including a decimal comma
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite()))
}

/// Validates raw provider reports into canonical records
#[derive(Debug, Clone)]
pub struct Normalizer {
    default_class: Option<EntityClass>,
    clock: StoreClock,
}

impl Normalizer {
    /// `clock` interprets provider timestamps that carry no offset
    pub fn new(clock: StoreClock) -> Self {
        Self {
            default_class: None,
            clock,
        }
    }

    /// Class assigned to records that do not state one
    pub fn with_default_class(mut self, class: EntityClass) -> Self {
        self.default_class = Some(class);
        self
    }

    pub fn normalize(&self, raw: RawPosition) -> Result<PositionRecord, RejectReason> {
        let entity_class = raw
            .kind
            .or(self.default_class)
            .ok_or(RejectReason::MissingEntityClass)?;
        let identifier = raw.identifier.ok_or(RejectReason::MissingIdentifier)?;

        let observed_raw = raw.observed_at.ok_or(RejectReason::MissingTimestamp)?;
        let observed_at = self
            .clock
            .parse(&observed_raw)
            .ok_or(RejectReason::InvalidTimestamp(observed_raw))?;

        let (latitude, longitude) = match (raw.latitude, raw.longitude) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return Err(RejectReason::MissingCoordinates),
        };
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(RejectReason::CoordinatesOutOfRange {
                latitude,
                longitude,
            });
        }

        Ok(PositionRecord {
            entity_class,
            insert_identifier: raw.insert_identifier.unwrap_or_else(|| identifier.clone()),
            external_identifier: identifier,
            observed_at,
            latitude,
            longitude,
            speed: raw.speed.unwrap_or(0.0),
            location: raw
                .location
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_string()),
        })
    }

    /// Normalize a feed, dropping and logging rejected entries.
    ///
    /// Returns the accepted records and the number rejected.
    pub fn normalize_all(
        &self,
        raws: impl IntoIterator<Item = RawPosition>,
    ) -> (Vec<PositionRecord>, usize) {
        let mut records = Vec::new();
        let mut rejected = 0;
        for (index, raw) in raws.into_iter().enumerate() {
            match self.normalize(raw) {
                Ok(record) => records.push(record),
                Err(reason) => {
                    debug!(index, %reason, "Dropping provider record");
                    rejected += 1;
                }
            }
        }
        (records, rejected)
    }
}
