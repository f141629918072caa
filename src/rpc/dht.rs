/// DHT call shapes: dhtget targets, result entries and dhtput parameters
use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// DHT value namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DhtValueKind {
    /// Single-writer value, signed by its owner
    #[serde(rename = "s")]
    Single,
    /// Multi-writer value, every entry globally signed
    #[serde(rename = "m")]
    Multi,
}

impl DhtValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DhtValueKind::Single => "s",
            DhtValueKind::Multi => "m",
        }
    }
}

/// Address of a DHT item: `(user, resource, kind)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtTarget {
    pub user: String,
    pub resource: String,
    pub kind: DhtValueKind,
}

impl DhtTarget {
    pub fn new(user: impl Into<String>, resource: impl Into<String>, kind: DhtValueKind) -> Self {
        Self {
            user: user.into(),
            resource: resource.into(),
            kind,
        }
    }

    pub fn single(user: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::new(user, resource, DhtValueKind::Single)
    }

    /// Parameters of a `dhtget` call
    pub fn get_params(&self) -> Vec<Value> {
        vec![
            Value::from(self.user.clone()),
            Value::from(self.resource.clone()),
            Value::from(self.kind.as_str()),
        ]
    }

    /// Parameters of a `dhtput` call publishing `value` at `seq`
    pub fn put_params(&self, value: Value, signer: &str, seq: u64) -> Vec<Value> {
        vec![
            Value::from(self.user.clone()),
            Value::from(self.resource.clone()),
            Value::from(self.kind.as_str()),
            value,
            Value::from(signer),
            Value::from(seq),
        ]
    }

    /// Whether an entry published by `signing_user` carries a signature worth checking
    pub fn needs_signature(&self, signing_user: &str) -> bool {
        self.kind == DhtValueKind::Multi || self.user == signing_user
    }
}

impl fmt::Display for DhtTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user, self.resource, self.kind.as_str())
    }
}

/// Signed payload of a DHT entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhtPayload {
    #[serde(default)]
    pub v: Value,
    #[serde(default)]
    pub seq: u64,
    /// Remaining signed members (height, target, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl DhtPayload {
    /// The exact structure the publisher signed
    pub fn signed_value(&self) -> Value {
        let mut signed = self.extra.clone();
        signed.insert("v".to_string(), self.v.clone());
        signed.insert("seq".to_string(), json!(self.seq));
        Value::Object(signed)
    }
}

/// One element of a `dhtget` result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhtEntry {
    pub sig_user: String,
    #[serde(default)]
    pub sig_p: String,
    pub p: DhtPayload,
}

/// Parse a `dhtget` result; only element 0 is authoritative
pub fn parse_get_result(result: Value) -> ClientResult<Option<DhtEntry>> {
    match result {
        Value::Array(mut entries) => {
            if entries.is_empty() {
                return Ok(None);
            }
            let first = entries.swap_remove(0);
            serde_json::from_value(first)
                .map(Some)
                .map_err(|e| ClientError::MalformedResponse(format!("Invalid dhtget entry: {}", e)))
        }
        Value::Null => Ok(None),
        other => Err(ClientError::MalformedResponse(format!(
            "dhtget returned a non-array result: {}",
            other
        ))),
    }
}
