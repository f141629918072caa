/// Query settings cascade
///
/// A setting is looked up, first match wins, in:
/// 1. the per-call overrides of the refresh in flight
/// 2. the sticky per-resource overrides
/// 3. the global table keyed by (setting, resource kind)
/// 4. the parent user's settings, for kinds owned by a user
/// 5. the process-wide defaults
use crate::error::{ClientError, ClientResult};
use crate::resource::ResourceKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tokio::sync::RwLock;

/// Setting name to value map, as persisted in snapshots
pub type QuerySettings = serde_json::Map<String, Value>;

/// Well-known setting names
pub mod names {
    pub const OUTDATED_LIMIT: &str = "outdatedLimit";
    pub const TIMEOUT: &str = "timeout";
    pub const HOST: &str = "host";
    pub const SIGNATURE_VERIFICATION: &str = "signatureVerification";
    pub const PAGE_SIZE: &str = "pageSize";
}

/// Signature verification policy for DHT results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    /// Accept DHT data without checking signatures
    None,
    /// Deliver immediately, confirm or roll back afterwards
    Background,
    /// Withhold delivery until the signature is checked
    Instant,
}

impl VerificationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationMode::None => "none",
            VerificationMode::Background => "background",
            VerificationMode::Instant => "instant",
        }
    }
}

impl fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(VerificationMode::None),
            "background" => Ok(VerificationMode::Background),
            "instant" => Ok(VerificationMode::Instant),
            other => Err(ClientError::InvalidSetting {
                name: names::SIGNATURE_VERIFICATION.to_string(),
                reason: format!("unknown mode {:?}", other),
            }),
        }
    }
}

/// The per-resource levels of one lookup
#[derive(Debug, Clone, Copy)]
pub struct SettingLayers<'a> {
    pub active: &'a QuerySettings,
    pub sticky: &'a QuerySettings,
    pub kind: ResourceKind,
    /// Settings of the owning user, when the kind has one
    pub parent: Option<&'a QuerySettings>,
}

/// Global levels of the cascade: per-kind table and process-wide defaults
pub struct QuerySettingsResolver {
    by_kind: RwLock<HashMap<String, HashMap<ResourceKind, Value>>>,
    defaults: RwLock<QuerySettings>,
}

impl QuerySettingsResolver {
    pub fn new(defaults: QuerySettings) -> Self {
        Self {
            by_kind: RwLock::new(HashMap::new()),
            defaults: RwLock::new(defaults),
        }
    }

    /// Set a value for every resource of one kind
    pub async fn set_kind_setting(&self, name: &str, kind: ResourceKind, value: Value) {
        self.by_kind
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .insert(kind, value);
    }

    pub async fn remove_kind_setting(&self, name: &str, kind: ResourceKind) {
        if let Some(table) = self.by_kind.write().await.get_mut(name) {
            table.remove(&kind);
        }
    }

    pub async fn set_default(&self, name: &str, value: Value) {
        self.defaults.write().await.insert(name.to_string(), value);
    }

    pub async fn remove_default(&self, name: &str) {
        self.defaults.write().await.remove(name);
    }

    /// Resolve a setting, first match wins
    pub async fn resolve(&self, layers: &SettingLayers<'_>, name: &str) -> ClientResult<Value> {
        if let Some(value) = layers.active.get(name) {
            return Ok(value.clone());
        }

        if let Some(value) = layers.sticky.get(name) {
            return Ok(value.clone());
        }

        if let Some(value) = self
            .by_kind
            .read()
            .await
            .get(name)
            .and_then(|table| table.get(&layers.kind))
        {
            return Ok(value.clone());
        }

        if layers.kind.has_parent_user() {
            if let Some(value) = layers.parent.and_then(|parent| parent.get(name)) {
                return Ok(value.clone());
            }
        }

        if let Some(value) = self.defaults.read().await.get(name) {
            return Ok(value.clone());
        }

        Err(ClientError::UnknownSetting(name.to_string()))
    }
}

/// Read a numeric setting (integers and floats are both accepted)
pub fn as_f64(name: &str, value: &Value) -> ClientResult<f64> {
    value.as_f64().ok_or_else(|| ClientError::InvalidSetting {
        name: name.to_string(),
        reason: format!("expected a number, got {}", value),
    })
}

pub fn as_u64(name: &str, value: &Value) -> ClientResult<u64> {
    match value.as_u64() {
        Some(n) => Ok(n),
        None => value
            .as_f64()
            .filter(|f| *f >= 0.0)
            .map(|f| f as u64)
            .ok_or_else(|| ClientError::InvalidSetting {
                name: name.to_string(),
                reason: format!("expected a non-negative number, got {}", value),
            }),
    }
}

pub fn as_string(name: &str, value: &Value) -> ClientResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ClientError::InvalidSetting {
            name: name.to_string(),
            reason: format!("expected a string, got {}", value),
        })
}

/// Build a settings map from name/value pairs
pub fn overrides<I, K>(pairs: I) -> QuerySettings
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> QuerySettings {
        overrides([(names::OUTDATED_LIMIT, Value::from(90))])
    }

    #[tokio::test]
    async fn test_cascade_order() {
        let resolver = QuerySettingsResolver::new(defaults());
        resolver
            .set_kind_setting(names::OUTDATED_LIMIT, ResourceKind::Profile, Value::from(30))
            .await;

        let active = overrides([(names::OUTDATED_LIMIT, Value::from(0))]);
        let sticky = overrides([(names::OUTDATED_LIMIT, Value::from(10))]);
        let parent = overrides([(names::OUTDATED_LIMIT, Value::from(20))]);
        let empty = QuerySettings::new();

        let mut layers = SettingLayers {
            active: &active,
            sticky: &sticky,
            kind: ResourceKind::Profile,
            parent: Some(&parent),
        };
        assert_eq!(resolver.resolve(&layers, names::OUTDATED_LIMIT).await.unwrap(), 0);

        layers.active = &empty;
        assert_eq!(resolver.resolve(&layers, names::OUTDATED_LIMIT).await.unwrap(), 10);

        layers.sticky = &empty;
        assert_eq!(resolver.resolve(&layers, names::OUTDATED_LIMIT).await.unwrap(), 30);

        resolver
            .remove_kind_setting(names::OUTDATED_LIMIT, ResourceKind::Profile)
            .await;
        assert_eq!(resolver.resolve(&layers, names::OUTDATED_LIMIT).await.unwrap(), 20);

        layers.parent = None;
        assert_eq!(resolver.resolve(&layers, names::OUTDATED_LIMIT).await.unwrap(), 90);
    }

    #[tokio::test]
    async fn test_account_skips_parent_user() {
        let resolver = QuerySettingsResolver::new(defaults());
        let empty = QuerySettings::new();
        let parent = overrides([(names::OUTDATED_LIMIT, Value::from(5))]);

        let layers = SettingLayers {
            active: &empty,
            sticky: &empty,
            kind: ResourceKind::Account,
            parent: Some(&parent),
        };
        assert_eq!(resolver.resolve(&layers, names::OUTDATED_LIMIT).await.unwrap(), 90);
    }

    #[tokio::test]
    async fn test_unknown_setting() {
        let resolver = QuerySettingsResolver::new(QuerySettings::new());
        let empty = QuerySettings::new();
        let layers = SettingLayers {
            active: &empty,
            sticky: &empty,
            kind: ResourceKind::Profile,
            parent: None,
        };

        let err = resolver.resolve(&layers, "nope").await.unwrap_err();
        assert_eq!(err.code(), 32051);
    }

    #[test]
    fn test_verification_mode_parse() {
        assert_eq!("instant".parse::<VerificationMode>().unwrap(), VerificationMode::Instant);
        assert!("eventually".parse::<VerificationMode>().is_err());
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(as_u64("timeout", &Value::from(1500)).unwrap(), 1500);
        assert_eq!(as_f64("outdatedLimit", &Value::from(0.5)).unwrap(), 0.5);
        assert!(as_u64("timeout", &Value::from("soon")).is_err());
    }
}
