//! Entity Resolver - external identifier to internal key

use std::collections::BTreeSet;

use fleetsync_client::schema::{EntitySchema, StoreSchema};
use fleetsync_client::{sql, Result, StoreClient};
use fleetsync_core::{EntityMapping, InternalKey};
use tracing::{debug, warn};

/// Identifiers per lookup query; keeps `IN` lists under common store limits
pub const LOOKUP_CHUNK_SIZE: usize = 1000;

pub async fn resolve_vehicles(
    client: &StoreClient,
    schema: &StoreSchema,
    identifiers: &BTreeSet<String>,
) -> Result<EntityMapping> {
    resolve_entities(client, &schema.vehicle, identifiers).await
}

pub async fn resolve_trackers(
    client: &StoreClient,
    schema: &StoreSchema,
    identifiers: &BTreeSet<String>,
) -> Result<EntityMapping> {
    resolve_entities(client, &schema.tracker, identifiers).await
}

/// Look up the internal keys registered for `identifiers`.
///
/// An empty set returns an empty mapping without a store call. Identifiers
/// the store does not know are absent from the result.
pub async fn resolve_entities(
    client: &StoreClient,
    schema: &EntitySchema,
    identifiers: &BTreeSet<String>,
) -> Result<EntityMapping> {
    let mut mapping = EntityMapping::new();
    if identifiers.is_empty() {
        return Ok(mapping);
    }

    let identifiers: Vec<&str> = identifiers.iter().map(String::as_str).collect();
    for chunk in identifiers.chunks(LOOKUP_CHUNK_SIZE) {
        let result = client.query(&lookup_query(schema, chunk)).await?;
        for row in result.rows()? {
            let (Some(key), Some(identifier)) = (
                row.get(&schema.key_column).and_then(InternalKey::from_value),
                row.text(&schema.identifier_column),
            ) else {
                warn!(table = %schema.lookup_table, "Skipping registry row without key or identifier");
                continue;
            };
            mapping.insert(identifier, key);
        }
    }

    debug!(
        table = %schema.lookup_table,
        requested = identifiers.len(),
        resolved = mapping.len(),
        "Resolved identifiers"
    );
    Ok(mapping)
}

fn lookup_query(schema: &EntitySchema, identifiers: &[&str]) -> String {
    format!(
        "SELECT {key}, {ident} FROM {table} WHERE {ident} IN {list}",
        key = schema.key_column,
        ident = schema.identifier_column,
        table = schema.lookup_table,
        list = sql::in_list(identifiers.iter().copied()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_query_quotes_identifiers() {
        let sql = lookup_query(&EntitySchema::vehicle(), &["ABC1234", "O'NEIL"]);
        assert_eq!(
            sql,
            "SELECT VEHICLE_ID, PLATE FROM FLT_VEHICLE WHERE PLATE IN ('ABC1234', 'O''NEIL')"
        );
    }

    #[tokio::test]
    async fn test_empty_set_skips_store() {
        // nothing listens here; any request would fail
        let client = StoreClient::new(
            "http://127.0.0.1:9/mge",
            fleetsync_client::Credentials::new("u", "p"),
        )
        .unwrap();

        let mapping = resolve_vehicles(&client, &StoreSchema::default(), &BTreeSet::new())
            .await
            .unwrap();

        assert!(mapping.is_empty());
        assert!(!client.is_authenticated());
    }
}
