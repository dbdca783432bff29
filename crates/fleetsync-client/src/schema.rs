//! Table and column names of the record store
//!
//! Each entity class has a registry table (identifier to internal key) and
//! a position table written through a dataset entity. Deployments with
//! customized tables override the defaults in configuration.

use fleetsync_core::EntityClass;
use serde::{Deserialize, Serialize};

/// Tables and columns for one entity class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    /// Registry table listing the known entities
    pub lookup_table: String,
    /// Internal key column (registry primary key, position foreign key)
    pub key_column: String,
    /// External identifier column in the registry table
    pub identifier_column: String,
    /// Table holding persisted positions
    pub position_table: String,
    /// Dataset entity name used for bulk inserts into the position table
    pub position_entity: String,
    /// Auto-increment sequence of the position table
    pub sequence_column: String,
    pub observed_at_column: String,
    /// Column receiving the insert identifier
    pub identifier_value_column: String,
    pub latitude_column: String,
    pub longitude_column: String,
    pub speed_column: String,
    pub location_column: String,
    pub map_link_column: String,
}

impl EntitySchema {
    /// Default schema for vehicles
    pub fn vehicle() -> Self {
        Self::with_names(
            "FLT_VEHICLE",
            "VEHICLE_ID",
            "PLATE",
            "FLT_VEHICLE_POSITION",
            "VehiclePosition",
        )
    }

    /// Default schema for trackers
    pub fn tracker() -> Self {
        Self::with_names(
            "FLT_TRACKER",
            "TRACKER_ID",
            "TRACKER_NUMBER",
            "FLT_TRACKER_POSITION",
            "TrackerPosition",
        )
    }

    fn with_names(
        lookup_table: &str,
        key_column: &str,
        identifier_column: &str,
        position_table: &str,
        position_entity: &str,
    ) -> Self {
        Self {
            lookup_table: lookup_table.to_string(),
            key_column: key_column.to_string(),
            identifier_column: identifier_column.to_string(),
            position_table: position_table.to_string(),
            position_entity: position_entity.to_string(),
            sequence_column: "SEQ".to_string(),
            observed_at_column: "OBSERVED_AT".to_string(),
            identifier_value_column: identifier_column.to_string(),
            latitude_column: "LATITUDE".to_string(),
            longitude_column: "LONGITUDE".to_string(),
            speed_column: "SPEED".to_string(),
            location_column: "LOCATION".to_string(),
            map_link_column: "MAP_LINK".to_string(),
        }
    }

    /// Position columns written per row, in value-index order
    pub fn position_fields(&self) -> Vec<String> {
        vec![
            self.observed_at_column.clone(),
            self.identifier_value_column.clone(),
            self.latitude_column.clone(),
            self.longitude_column.clone(),
            self.speed_column.clone(),
            self.location_column.clone(),
            self.map_link_column.clone(),
        ]
    }
}

/// Schema for both entity classes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    #[serde(default = "EntitySchema::vehicle")]
    pub vehicle: EntitySchema,
    #[serde(default = "EntitySchema::tracker")]
    pub tracker: EntitySchema,
}

impl Default for StoreSchema {
    fn default() -> Self {
        Self {
            vehicle: EntitySchema::vehicle(),
            tracker: EntitySchema::tracker(),
        }
    }
}

impl StoreSchema {
    pub fn entity(&self, class: EntityClass) -> &EntitySchema {
        match class {
            EntityClass::Vehicle => &self.vehicle,
            EntityClass::Tracker => &self.tracker,
        }
    }

    /// Class whose position entity has the given dataset name
    pub fn class_for_entity(&self, entity_name: &str) -> Option<EntityClass> {
        EntityClass::ALL
            .into_iter()
            .find(|class| self.entity(*class).position_entity == entity_name)
    }
}
