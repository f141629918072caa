/// Post timelines ("torrents") of users followed by an account
///
/// The latest post is read from the author's `status` DHT record; older
/// pages come from the daemon's `getposts`. Posts are kept sorted by their
/// sequence number `k`.
use super::post::post_id;
use crate::{
    context::ClientContext,
    error::{ClientError, ClientResult},
    resource::{Resource, ResourceSnapshot, ResourceState},
    rpc::{DhtEntry, DhtTarget},
    settings::{self, names},
};
use serde_json::{json, Value};
use std::sync::Arc;

pub(crate) async fn fetch(ctx: &ClientContext, resource: &Arc<Resource>) -> ClientResult<()> {
    let target = DhtTarget::single(resource.name(), "status");
    if !super::fetch_dht(ctx, resource, &target, apply_status).await? {
        super::mark_empty(ctx, resource).await;
    }
    Ok(())
}

fn apply_status(state: &mut ResourceState, entry: &DhtEntry, now: f64) {
    merge_posts(state, vec![entry.p.v.clone()]);
    state.revision_number = Some(entry.p.seq);
    state.last_update = now;
}

pub(crate) async fn fetch_until(ctx: &ClientContext, resource: &Arc<Resource>, max_id: u64) -> ClientResult<()> {
    let page_size = resource.setting(ctx, names::PAGE_SIZE).await?;
    let page_size = settings::as_u64(names::PAGE_SIZE, &page_size)?;

    let result = ctx
        .rpc(
            resource,
            "getposts",
            vec![
                Value::from(page_size),
                json!([{ "username": resource.name(), "max_id": max_id }]),
            ],
        )
        .await?;

    let Value::Array(posts) = result else {
        return Err(ClientError::MalformedResponse(format!(
            "getposts returned a non-array result: {}",
            result
        )));
    };

    let mut state = resource.state.write().await;
    merge_posts(&mut state, posts);
    Ok(())
}

/// Merge posts into the timeline, keeping `latest_id` at the highest id seen
pub(crate) fn merge_posts(state: &mut ResourceState, posts: Vec<Value>) {
    let merged = super::merge_items(&mut state.data, posts, post_id);
    state.latest_id = super::newest_id(state.latest_id, merged);
}

/// Read-only view of a delivered timeline
#[derive(Debug, Clone)]
pub struct PostTimeline<'a>(&'a ResourceSnapshot);

impl<'a> PostTimeline<'a> {
    pub fn new(snapshot: &'a ResourceSnapshot) -> Self {
        Self(snapshot)
    }

    pub fn username(&self) -> &str {
        &self.0.name
    }

    /// Highest known post sequence number
    pub fn latest_id(&self) -> Option<u64> {
        self.0.latest_id
    }

    /// Id the next post of this user will be published under
    pub fn next_id(&self) -> u64 {
        self.0.latest_id.map_or(1, |id| id + 1)
    }

    /// Posts held, oldest first
    pub fn posts(&self) -> &[Value] {
        self.0.data.as_array().map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(k: u64) -> Value {
        json!({"sig_userpost": "00", "userpost": {"n": "bob", "k": k, "msg": format!("post {}", k)}})
    }

    #[test]
    fn test_merge_keeps_highest_latest_id() {
        let mut state = ResourceState::default();
        state.latest_id = Some(9);

        merge_posts(&mut state, vec![post(3), post(5)]);
        assert_eq!(state.latest_id, Some(9));

        merge_posts(&mut state, vec![post(12)]);
        assert_eq!(state.latest_id, Some(12));
        assert_eq!(state.data.as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_timeline_view() {
        let mut snapshot = ResourceSnapshot::placeholder("bob");
        assert_eq!(PostTimeline::new(&snapshot).next_id(), 1);
        assert!(PostTimeline::new(&snapshot).posts().is_empty());

        snapshot.data = json!([post(1), post(2)]);
        snapshot.latest_id = Some(2);
        let timeline = PostTimeline::new(&snapshot);
        assert_eq!(timeline.next_id(), 3);
        assert_eq!(timeline.posts().len(), 2);
    }
}
