//! Watermark Store (read side) - latest persisted observation per key

use fleetsync_client::schema::{EntitySchema, StoreSchema};
use fleetsync_client::{Result, StoreClient};
use fleetsync_core::{InternalKey, Watermarks};
use tracing::{debug, warn};

pub async fn last_vehicle_watermarks(
    client: &StoreClient,
    schema: &StoreSchema,
) -> Result<Watermarks> {
    last_watermarks(client, &schema.vehicle).await
}

pub async fn last_tracker_watermarks(
    client: &StoreClient,
    schema: &StoreSchema,
) -> Result<Watermarks> {
    last_watermarks(client, &schema.tracker).await
}

/// Raw observed-at of the newest persisted row for every key.
///
/// One row per key: newest timestamp, ties broken by the highest sequence.
/// Values stay raw so that a corrupt stored timestamp reaches the filter.
pub async fn last_watermarks(client: &StoreClient, schema: &EntitySchema) -> Result<Watermarks> {
    let result = client.query(&watermark_query(schema)).await?;

    let mut watermarks = Watermarks::new();
    for row in result.rows()? {
        let Some(key) = row.text(&schema.key_column) else {
            warn!(table = %schema.position_table, "Skipping position row without key");
            continue;
        };
        // an empty stored timestamp counts as corrupt, not absent
        let observed_at = row.text(&schema.observed_at_column).unwrap_or_default();
        watermarks.insert(InternalKey::new(key), observed_at);
    }

    debug!(
        table = %schema.position_table,
        keys = watermarks.len(),
        "Loaded watermarks"
    );
    Ok(watermarks)
}

/// Rank rows per key by observed-at descending, then sequence descending,
/// so of two rows with the same timestamp the later insert wins.
fn watermark_query(schema: &EntitySchema) -> String {
    format!(
        "SELECT {key}, {ts} FROM (\
         SELECT {key}, {ts}, ROW_NUMBER() OVER (PARTITION BY {key} ORDER BY {ts} DESC, {seq} DESC) AS RN \
         FROM {table}) LATEST WHERE RN = 1",
        key = schema.key_column,
        ts = schema.observed_at_column,
        seq = schema.sequence_column,
        table = schema.position_table,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_query_picks_latest_per_key() {
        assert_eq!(
            watermark_query(&EntitySchema::tracker()),
            "SELECT TRACKER_ID, OBSERVED_AT FROM (\
             SELECT TRACKER_ID, OBSERVED_AT, ROW_NUMBER() OVER \
             (PARTITION BY TRACKER_ID ORDER BY OBSERVED_AT DESC, SEQ DESC) AS RN \
             FROM FLT_TRACKER_POSITION) LATEST WHERE RN = 1"
        );
    }
}
