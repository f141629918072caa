/// Individual posts, stored under `post<id>` in their author's namespace
use crate::{
    context::ClientContext,
    error::{ClientError, ClientResult},
    resource::{Resource, ResourceState},
    rpc::{DhtEntry, DhtTarget},
};
use serde_json::Value;
use std::sync::Arc;

pub(crate) async fn fetch(ctx: &ClientContext, resource: &Arc<Resource>) -> ClientResult<()> {
    let id = resource.key().post_id.ok_or_else(|| ClientError::InvalidSetting {
        name: "post".to_string(),
        reason: format!("{} has no post id", resource.key()),
    })?;

    let target = DhtTarget::single(resource.name(), format!("post{}", id));
    if super::fetch_dht(ctx, resource, &target, apply).await? {
        Ok(())
    } else {
        Err(ClientError::EmptyResource)
    }
}

fn apply(state: &mut ResourceState, entry: &DhtEntry, now: f64) {
    state.data = entry.p.v.clone();
    state.revision_number = Some(entry.p.seq);
    state.last_update = now;
}

/// The signed post body (`userpost`) of a delivered post
pub fn user_post(data: &Value) -> Option<&Value> {
    data.get("userpost")
}

/// The author's signature over `userpost`
pub fn user_post_signature(data: &Value) -> Option<&str> {
    data.get("sig_userpost").and_then(Value::as_str)
}

/// Sequence number of a post as seen in a timeline or `getposts` result
pub fn post_id(post: &Value) -> Option<u64> {
    user_post(post).and_then(|p| p.get("k")).and_then(Value::as_u64)
}
