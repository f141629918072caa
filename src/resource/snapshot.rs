/// Persisted form of a resource (flatten/inflate)
use crate::settings::QuerySettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `lastUpdate` of a resource that was never successfully verified
pub const NEVER_UPDATED: f64 = -1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub last_update: f64,
    pub verified: bool,
    #[serde(default)]
    pub query_settings: QuerySettings,
    pub revision_number: Option<u64>,
    pub name: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_id: Option<u64>,
}

impl ResourceSnapshot {
    /// Empty snapshot for a never-fetched resource
    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            last_update: NEVER_UPDATED,
            verified: false,
            query_settings: QuerySettings::new(),
            revision_number: None,
            name: name.into(),
            data: Value::Null,
            latest_id: None,
        }
    }
}
