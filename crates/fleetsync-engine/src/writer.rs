//! Batch Writer - one bulk insert per entity class

use fleetsync_client::schema::{EntitySchema, StoreSchema};
use fleetsync_client::{Result, SaveRecord, SaveRequest, StoreClient};
use fleetsync_core::{Batch, EntityClass, StoreClock};
use tracing::{debug, info};

pub async fn write_vehicle_batch(
    client: &StoreClient,
    schema: &StoreSchema,
    clock: &StoreClock,
    batch: &Batch,
) -> Result<usize> {
    debug_assert_eq!(batch.entity_class, EntityClass::Vehicle);
    write_batch(client, &schema.vehicle, clock, batch).await
}

pub async fn write_tracker_batch(
    client: &StoreClient,
    schema: &StoreSchema,
    clock: &StoreClock,
    batch: &Batch,
) -> Result<usize> {
    debug_assert_eq!(batch.entity_class, EntityClass::Tracker);
    write_batch(client, &schema.tracker, clock, batch).await
}

/// Insert `batch` in one store call. An empty batch is a successful no-op.
///
/// The store call is atomic as far as this process can tell: on error
/// nothing of the batch is assumed written.
pub async fn write_batch(
    client: &StoreClient,
    schema: &EntitySchema,
    clock: &StoreClock,
    batch: &Batch,
) -> Result<usize> {
    if batch.is_empty() {
        return Ok(0);
    }

    let request = save_request(schema, clock, batch);
    client.save(&request).await?;

    info!(
        entity = %schema.position_entity,
        rows = batch.len(),
        "Wrote position batch"
    );
    Ok(batch.len())
}

/// Values follow [`EntitySchema::position_fields`] order
fn save_request(schema: &EntitySchema, clock: &StoreClock, batch: &Batch) -> SaveRequest {
    let mut request = SaveRequest::new(schema.position_entity.clone(), schema.position_fields());
    for entry in batch.iter() {
        let record = &entry.record;
        request.push(
            SaveRecord::new(schema.key_column.clone(), entry.key.to_value())
                .value(0, clock.format(record.observed_at))
                .value(1, record.insert_identifier.clone())
                .value(2, record.latitude)
                .value(3, record.longitude)
                .value(4, record.speed)
                .value(5, record.location.clone())
                .value(6, record.map_link()),
        );
    }
    debug!(entity = %schema.position_entity, records = request.records.len(), "Built save request");
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fleetsync_core::{InternalKey, PositionRecord};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_save_request_layout() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 13, 5, 0).unwrap();
        let record = PositionRecord::new(EntityClass::Vehicle, "ABC1234", ts, -23.5, -46.6)
            .with_speed(42.0)
            .with_location("Av. Paulista");
        let mut batch = Batch::new(EntityClass::Vehicle);
        batch.push(InternalKey::numeric("12"), record.clone());
        batch.push(InternalKey::new("007"), record);

        let clock = StoreClock::from_offset_minutes(-180).unwrap();
        let request = save_request(&EntitySchema::vehicle(), &clock, &batch);

        assert_eq!(request.entity_name, "VehiclePosition");
        assert_eq!(request.records.len(), 2);
        assert_eq!(request.records[1].foreign_key.get("VEHICLE_ID"), Some(&json!("007")));
        let row = &request.records[0];
        assert_eq!(row.foreign_key.get("VEHICLE_ID"), Some(&json!(12)));
        assert_eq!(row.get(0), Some(&json!("01/03/2024 10:05:00")));
        assert_eq!(row.get(1), Some(&json!("ABC1234")));
        assert_eq!(row.get(4), Some(&json!(42.0)));
        assert_eq!(row.get(5), Some(&json!("Av. Paulista")));
        assert_eq!(
            row.get(6),
            Some(&json!("https://www.google.com/maps?q=-23.5,-46.6"))
        );
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let client = StoreClient::new(
            "http://127.0.0.1:9/mge",
            fleetsync_client::Credentials::new("u", "p"),
        )
        .unwrap();

        let written = write_tracker_batch(
            &client,
            &StoreSchema::default(),
            &StoreClock::utc(),
            &Batch::new(EntityClass::Tracker),
        )
        .await
        .unwrap();

        assert_eq!(written, 0);
        assert!(!client.is_authenticated());
    }
}
