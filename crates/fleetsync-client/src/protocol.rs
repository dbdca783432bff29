//! Record store wire protocol
//!
//! Every call is `POST service.sbr?serviceName=<op>&outputType=json` with an
//! envelope `{"serviceName", "requestBody"}`. Responses carry a `status`
//! discriminating success, domain error and expired session.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Result, StoreError};

/// Path of the service endpoint, relative to the store base URL
pub const SERVICE_PATH: &str = "service.sbr";

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "JSESSIONID";

/// Service names used by the sync engine
pub mod service {
    pub const LOGIN: &str = "MobileLoginSP.login";
    pub const LOGOUT: &str = "MobileLoginSP.logout";
    pub const EXECUTE_QUERY: &str = "DbExplorerSP.executeQuery";
    pub const SAVE: &str = "DatasetSP.save";
}

/// Outbound envelope
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest<'a> {
    pub service_name: &'a str,
    pub request_body: &'a Value,
}

/// Status reported by the store for a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseStatus {
    /// `"1"`
    Success,
    /// `"0"`: the store rejected the operation
    Error,
    /// `"3"`: session expired or missing
    Unauthorized,
    /// Anything else, kept verbatim
    Other(String),
}

impl ResponseStatus {
    pub fn code(&self) -> &str {
        match self {
            ResponseStatus::Success => "1",
            ResponseStatus::Error => "0",
            ResponseStatus::Unauthorized => "3",
            ResponseStatus::Other(code) => code,
        }
    }

    fn from_code(code: &str) -> Self {
        match code.trim() {
            "1" => ResponseStatus::Success,
            "0" => ResponseStatus::Error,
            "3" => ResponseStatus::Unauthorized,
            other => ResponseStatus::Other(other.to_string()),
        }
    }
}

impl Serialize for ResponseStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for ResponseStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Some deployments send the status as a number
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => ResponseStatus::from_code(&s),
            Value::Number(n) => ResponseStatus::from_code(&n.to_string()),
            other => ResponseStatus::Other(other.to_string()),
        })
    }
}

/// Inbound envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    #[serde(default)]
    pub service_name: Option<String>,
    pub status: ResponseStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub response_body: Option<Value>,
}

impl ServiceResponse {
    pub fn success(body: Value) -> Self {
        Self {
            service_name: None,
            status: ResponseStatus::Success,
            status_message: None,
            response_body: Some(body),
        }
    }

    pub fn failure(status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            service_name: None,
            status,
            status_message: Some(message.into()),
            response_body: None,
        }
    }

    /// Map the envelope to the body or the matching error
    pub fn into_result(self, service: &str) -> Result<Value> {
        let message = self
            .status_message
            .unwrap_or_else(|| format!("status {}", self.status.code()));
        match self.status {
            ResponseStatus::Success => Ok(self.response_body.unwrap_or(Value::Null)),
            ResponseStatus::Unauthorized => Err(StoreError::SessionExpired(message)),
            ResponseStatus::Error | ResponseStatus::Other(_) => {
                Err(StoreError::remote(service, message))
            }
        }
    }
}

/// Login payload for the given credentials
pub fn login_body(username: &str, password: &str) -> Value {
    serde_json::json!({
        "NOMUSU": { "$": username },
        "INTERNO": { "$": password },
    })
}

/// Extract the session token from a login response body.
///
/// Accepts `{"jsessionid": {"$": "..."}}` and `{"jsessionid": "..."}`.
pub fn session_token(body: &Value) -> Option<String> {
    let field = body.get("jsessionid")?;
    let token = match field {
        Value::String(s) => s.as_str(),
        Value::Object(_) => field.get("$")?.as_str()?,
        _ => return None,
    };
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Bulk insert request for `DatasetSP.save`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub entity_name: String,
    pub stand_alone: bool,
    /// Column names; a record's value map is keyed by index into this list
    pub fields: Vec<String>,
    pub records: Vec<SaveRecord>,
}

impl SaveRequest {
    pub fn new(entity_name: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            stand_alone: false,
            fields,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: SaveRecord) {
        self.records.push(record);
    }

    /// Index of a field in [`fields`](Self::fields)
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.eq_ignore_ascii_case(name))
    }
}

/// One inserted row: foreign key plus field-index to value map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecord {
    pub foreign_key: BTreeMap<String, Value>,
    pub values: BTreeMap<String, Value>,
}

impl SaveRecord {
    pub fn new(key_column: impl Into<String>, key: impl Into<Value>) -> Self {
        let mut foreign_key = BTreeMap::new();
        foreign_key.insert(key_column.into(), key.into());
        Self {
            foreign_key,
            values: BTreeMap::new(),
        }
    }

    pub fn value(mut self, index: usize, value: impl Into<Value>) -> Self {
        self.values.insert(index.to_string(), value.into());
        self
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(&index.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_status_from_string_and_number() {
        let resp: ServiceResponse = serde_json::from_value(json!({"status": "1"})).unwrap();
        assert_eq!(resp.status, ResponseStatus::Success);
        let resp: ServiceResponse = serde_json::from_value(json!({"status": 3})).unwrap();
        assert_eq!(resp.status, ResponseStatus::Unauthorized);
        let resp: ServiceResponse = serde_json::from_value(json!({"status": "2"})).unwrap();
        assert_eq!(resp.status, ResponseStatus::Other("2".into()));
    }

    #[test]
    fn test_into_result() {
        let ok = ServiceResponse::success(json!({"x": 1}));
        assert_eq!(ok.into_result("Svc").unwrap(), json!({"x": 1}));

        let expired = ServiceResponse::failure(ResponseStatus::Unauthorized, "Não autorizado");
        assert!(expired.into_result("Svc").unwrap_err().is_session_expired());

        let failed = ServiceResponse::failure(ResponseStatus::Error, "ORA-00942");
        match failed.into_result("Svc").unwrap_err() {
            StoreError::RemoteService { service, message } => {
                assert_eq!(service, "Svc");
                assert_eq!(message, "ORA-00942");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_session_token_shapes() {
        assert_eq!(
            session_token(&json!({"jsessionid": {"$": "abc"}})),
            Some("abc".into())
        );
        assert_eq!(session_token(&json!({"jsessionid": "abc"})), Some("abc".into()));
        assert_eq!(session_token(&json!({"jsessionid": {"$": " "}})), None);
        assert_eq!(session_token(&json!({})), None);
    }

    #[test]
    fn test_save_request_wire_shape() {
        let mut request = SaveRequest::new("VehiclePosition", vec!["PLATE".into(), "SPEED".into()]);
        request.push(SaveRecord::new("VEHICLE_ID", "12").value(0, "ABC1234").value(1, 42.0));

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(
            wire,
            json!({
                "entityName": "VehiclePosition",
                "standAlone": false,
                "fields": ["PLATE", "SPEED"],
                "records": [{
                    "foreignKey": {"VEHICLE_ID": "12"},
                    "values": {"0": "ABC1234", "1": 42.0}
                }]
            })
        );
        assert_eq!(request.field_index("speed"), Some(1));
    }
}
