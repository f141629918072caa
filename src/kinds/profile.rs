/// Profile and avatar: single-writer DHT records owned by their user
use crate::{
    context::ClientContext,
    error::ClientResult,
    resource::{Resource, ResourceSnapshot, ResourceState},
    rpc::{DhtEntry, DhtTarget},
};
use serde_json::Value;
use std::sync::Arc;

/// DHT resource names
pub const PROFILE: &str = "profile";
pub const AVATAR: &str = "avatar";

pub(crate) async fn fetch(ctx: &ClientContext, resource: &Arc<Resource>, dht_resource: &str) -> ClientResult<()> {
    let target = DhtTarget::single(resource.name(), dht_resource);
    if !super::fetch_dht(ctx, resource, &target, apply).await? {
        super::mark_empty(ctx, resource).await;
    }
    Ok(())
}

fn apply(state: &mut ResourceState, entry: &DhtEntry, now: f64) {
    state.data = entry.p.v.clone();
    state.revision_number = Some(entry.p.seq);
    state.last_update = now;
}

/// Read-only view of a delivered profile or avatar
#[derive(Debug, Clone)]
pub struct Profile<'a>(&'a ResourceSnapshot);

impl<'a> Profile<'a> {
    pub fn new(snapshot: &'a ResourceSnapshot) -> Self {
        Self(snapshot)
    }

    pub fn username(&self) -> &str {
        &self.0.name
    }

    /// A single profile field, `None` when absent or never fetched
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.data.as_object().and_then(|fields| fields.get(name))
    }

    pub fn all_fields(&self) -> &Value {
        &self.0.data
    }
}
