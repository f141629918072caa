/// Kind-specific retrieval plugged into the resource engine
///
/// Each kind supplies a `fetch` (and, for timelines and message threads, a
/// bounded `fetch_until`). Dispatch is by `ResourceKind`; the returned
/// futures are boxed because fetching a signed resource may satisfy the
/// publisher's public key through the same engine.

pub mod direct_messages;
pub mod followings;
pub mod post;
pub mod profile;
pub mod pubkey;
pub mod timeline;

pub use direct_messages::DirectMessageThread;
pub use profile::Profile;
pub use pubkey::PubKey;
pub use timeline::PostTimeline;

use crate::{
    context::ClientContext,
    error::ClientResult,
    resource::{Resource, ResourceKind},
    rpc::DhtTarget,
    verification::ApplyEntry,
};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Refresh `resource` with its latest state
pub(crate) fn fetch<'a>(ctx: &'a ClientContext, resource: &'a Arc<Resource>) -> BoxFuture<'a, ClientResult<()>> {
    match resource.kind() {
        ResourceKind::Profile => profile::fetch(ctx, resource, profile::PROFILE).boxed(),
        ResourceKind::Avatar => profile::fetch(ctx, resource, profile::AVATAR).boxed(),
        ResourceKind::PubKey => pubkey::fetch(ctx, resource).boxed(),
        ResourceKind::Post => post::fetch(ctx, resource).boxed(),
        ResourceKind::Torrent => timeline::fetch(ctx, resource).boxed(),
        ResourceKind::DirectMessages => direct_messages::fetch(ctx, resource).boxed(),
        ResourceKind::Account => followings::fetch(ctx, resource).boxed(),
    }
}

/// Retrieve the bounded range ending at `max_id` and merge it into `resource`
pub(crate) fn fetch_until<'a>(
    ctx: &'a ClientContext,
    resource: &'a Arc<Resource>,
    max_id: u64,
) -> BoxFuture<'a, ClientResult<()>> {
    match resource.kind() {
        ResourceKind::Torrent => timeline::fetch_until(ctx, resource, max_id).boxed(),
        ResourceKind::DirectMessages => direct_messages::fetch_until(ctx, resource, max_id).boxed(),
        _ => fetch(ctx, resource),
    }
}

/// dhtget `target` and accept the result through the verification pipeline.
///
/// Returns `false` when nothing is stored; the resource is left untouched.
pub(crate) async fn fetch_dht(
    ctx: &ClientContext,
    resource: &Arc<Resource>,
    target: &DhtTarget,
    apply: ApplyEntry,
) -> ClientResult<bool> {
    match ctx.dht_get(resource, target).await? {
        Some(entry) => {
            ctx.verification()
                .accept(ctx, resource, target, entry, apply)
                .await?;
            Ok(true)
        }
        None => {
            debug!("dht resource is empty {}", target);
            Ok(false)
        }
    }
}

/// Record a never-published DHT resource: revision 0, fresh, nothing to verify
pub(crate) async fn mark_empty(ctx: &ClientContext, resource: &Resource) {
    let mut state = resource.state.write().await;
    state.revision_number = Some(0);
    state.mark_fresh(ctx.now());
}

/// Merge `incoming` items into the array held in `data`, keyed and sorted by
/// `id_of`. Items without an id are dropped. Returns the highest id held.
pub(crate) fn merge_items(
    data: &mut Value,
    incoming: Vec<Value>,
    id_of: fn(&Value) -> Option<u64>,
) -> Option<u64> {
    let mut items: BTreeMap<u64, Value> = match data.take() {
        Value::Array(existing) => existing
            .into_iter()
            .filter_map(|item| id_of(&item).map(|id| (id, item)))
            .collect(),
        _ => BTreeMap::new(),
    };

    for item in incoming {
        if let Some(id) = id_of(&item) {
            items.insert(id, item);
        }
    }

    let latest = items.keys().next_back().copied();
    *data = Value::Array(items.into_values().collect());
    latest
}

/// Highest of a known id and a freshly merged one
pub(crate) fn newest_id(known: Option<u64>, merged: Option<u64>) -> Option<u64> {
    match (known, merged) {
        (Some(known), Some(merged)) => Some(known.max(merged)),
        (known, merged) => known.or(merged),
    }
}
