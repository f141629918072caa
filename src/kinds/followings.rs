/// The account resource itself: the list of users an account follows
use crate::{
    context::ClientContext,
    error::{ClientError, ClientResult},
    resource::{Resource, ResourceSnapshot},
};
use serde_json::Value;
use std::sync::Arc;

pub(crate) async fn fetch(ctx: &ClientContext, resource: &Arc<Resource>) -> ClientResult<()> {
    let result = ctx
        .rpc(resource, "getfollowing", vec![Value::from(resource.name())])
        .await?;

    if !result.is_array() {
        return Err(ClientError::MalformedResponse(format!(
            "getfollowing returned a non-array result: {}",
            result
        )));
    }

    let mut state = resource.state.write().await;
    state.data = result;
    state.mark_fresh(ctx.now());
    Ok(())
}

/// Usernames held by a delivered account snapshot
pub fn followings(snapshot: &ResourceSnapshot) -> Vec<String> {
    snapshot
        .data
        .as_array()
        .map(|users| {
            users
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
