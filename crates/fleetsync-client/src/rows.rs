//! Typed decoding of positional query results

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Deserialize)]
struct FieldMetadata {
    name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawQueryResult {
    #[serde(default)]
    fields_metadata: Vec<FieldMetadata>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

/// Result of a read query: a column list plus positional rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Decode a `DbExplorerSP.executeQuery` response body
    pub fn from_body(body: Value) -> Result<Self> {
        if body.is_null() {
            return Ok(Self::default());
        }
        let raw: RawQueryResult = serde_json::from_value(body)
            .map_err(|e| StoreError::Decode(format!("malformed query result: {}", e)))?;
        Ok(Self {
            columns: raw.fields_metadata.into_iter().map(|f| f.name).collect(),
            rows: raw.rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Project every positional row onto the column names.
    ///
    /// Fails if any row's length differs from the column count.
    pub fn rows(&self) -> Result<Vec<Row>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, values)| {
                if values.len() != self.columns.len() {
                    return Err(StoreError::Decode(format!(
                        "row {} has {} values for {} columns",
                        index,
                        values.len(),
                        self.columns.len()
                    )));
                }
                let fields = self
                    .columns
                    .iter()
                    .map(|c| c.to_ascii_uppercase())
                    .zip(values.iter().cloned())
                    .collect();
                Ok(Row { fields })
            })
            .collect()
    }
}

/// One query row keyed by column name (case-insensitive)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: HashMap<String, Value>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(&column.to_ascii_uppercase())
    }

    /// Column value as text; numbers are rendered, null and blanks are `None`
    pub fn text(&self, column: &str) -> Option<String> {
        match self.get(column)? {
            Value::String(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}
