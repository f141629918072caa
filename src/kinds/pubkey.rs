/// Public keys, looked up through the daemon's `dumppubkey`
use crate::{
    context::ClientContext,
    error::{ClientError, ClientResult},
    resource::{Resource, ResourceSnapshot},
};
use serde_json::Value;
use std::sync::Arc;

pub(crate) async fn fetch(ctx: &ClientContext, resource: &Arc<Resource>) -> ClientResult<()> {
    let result = ctx
        .rpc(resource, "dumppubkey", vec![Value::from(resource.name())])
        .await?;

    let key = match result.as_str() {
        Some(key) if hex::decode(key).is_ok() => key.to_string(),
        _ => {
            return Err(ClientError::InvalidPublicKey(format!(
                "dumppubkey returned {} for {}",
                result,
                resource.name()
            )))
        }
    };

    let mut state = resource.state.write().await;
    state.data = Value::String(key);
    state.mark_fresh(ctx.now());
    Ok(())
}

/// The hex-encoded key held by a delivered pubkey resource
pub fn key_hex(snapshot: &ResourceSnapshot) -> Option<String> {
    snapshot
        .data
        .as_str()
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

/// Read-only view of a delivered public key
#[derive(Debug, Clone)]
pub struct PubKey<'a>(&'a ResourceSnapshot);

impl<'a> PubKey<'a> {
    pub fn new(snapshot: &'a ResourceSnapshot) -> Self {
        Self(snapshot)
    }

    pub fn username(&self) -> &str {
        &self.0.name
    }

    pub fn key_hex(&self) -> Option<String> {
        key_hex(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_hex() {
        let mut snapshot = ResourceSnapshot::placeholder("alice");
        assert!(key_hex(&snapshot).is_none());

        snapshot.data = Value::from("02abcdef");
        assert_eq!(PubKey::new(&snapshot).key_hex().as_deref(), Some("02abcdef"));
    }
}
