/// Write operations issued by an account
///
/// Profile and avatar updates republish the DHT record at the next revision.
/// Posts, replies, retwists and direct messages consume the next post id of
/// the account's own timeline; those run under the account's write lock so
/// two writes never claim the same id.
use super::Account;
use crate::{
    context::ClientContext,
    error::{ClientError, ClientResult},
    kinds::{self, post, profile, PostTimeline},
    resource::{Resource, ResourceSnapshot},
    rpc::DhtTarget,
    settings::{self, names, QuerySettings},
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Settings forcing a refresh regardless of the cached copy
fn force_refresh() -> QuerySettings {
    settings::overrides([(names::OUTDATED_LIMIT, Value::from(0))])
}

impl Account {
    /// Create a wallet user on the daemon (`createwalletuser`)
    pub async fn create_user(&self, ctx: &ClientContext, name: &str) -> ClientResult<Value> {
        let result = self
            .rpc(ctx, "createwalletuser", vec![Value::from(name)])
            .await?;
        info!("wallet user {} created", name);
        Ok(result)
    }

    /// Broadcast the registration of a wallet user (`sendnewusertransaction`)
    pub async fn propagate_user(&self, ctx: &ClientContext, name: &str) -> ClientResult<Value> {
        let result = self
            .rpc(ctx, "sendnewusertransaction", vec![Value::from(name)])
            .await?;
        info!("registration of {} propagated", name);
        Ok(result)
    }

    /// Follow `users`, then deliver the refreshed followings
    pub async fn follow(&self, ctx: &ClientContext, users: &[String]) -> ClientResult<Vec<String>> {
        self.rpc(ctx, "follow", vec![Value::from(self.name()), json!(users)])
            .await?;
        self.followings(ctx, force_refresh()).await
    }

    /// Unfollow `users`, then deliver the refreshed followings
    pub async fn unfollow(&self, ctx: &ClientContext, users: &[String]) -> ClientResult<Vec<String>> {
        self.rpc(ctx, "unfollow", vec![Value::from(self.name()), json!(users)])
            .await?;
        self.followings(ctx, force_refresh()).await
    }

    /// Replace the account's profile
    pub async fn update_profile(&self, ctx: &ClientContext, data: Value) -> ClientResult<ResourceSnapshot> {
        let resource = ctx.user(self.name()).await.profile();
        self.republish(ctx, &resource, profile::PROFILE, |_| data.clone())
            .await
    }

    /// Merge `fields` into the current profile and republish it
    pub async fn update_profile_fields(
        &self,
        ctx: &ClientContext,
        fields: Map<String, Value>,
    ) -> ClientResult<ResourceSnapshot> {
        let resource = ctx.user(self.name()).await.profile();
        self.republish(ctx, &resource, profile::PROFILE, |current| {
            let mut merged = current.as_object().cloned().unwrap_or_default();
            for (name, value) in &fields {
                merged.insert(name.clone(), value.clone());
            }
            Value::Object(merged)
        })
        .await
    }

    /// Replace the account's avatar
    pub async fn update_avatar(&self, ctx: &ClientContext, data: Value) -> ClientResult<ResourceSnapshot> {
        let resource = ctx.user(self.name()).await.avatar();
        self.republish(ctx, &resource, profile::AVATAR, |_| data.clone())
            .await
    }

    /// Read the current record, build the new value from it and dhtput it at
    /// the next revision. A never-published record is treated as revision 0.
    async fn republish<F>(
        &self,
        ctx: &ClientContext,
        resource: &Arc<Resource>,
        dht_resource: &str,
        build: F,
    ) -> ClientResult<ResourceSnapshot>
    where
        F: Fn(&Value) -> Value,
    {
        let current = match resource.satisfy(ctx, QuerySettings::new()).await {
            Ok(current) => current,
            Err(e) if e.is_empty_resource() => {
                debug!("{} never published, starting at revision 0", resource.key());
                kinds::mark_empty(ctx, resource).await;
                resource.flatten().await
            }
            Err(e) => return Err(e),
        };

        let value = build(&current.data);
        let seq = current.revision_number.unwrap_or(0) + 1;
        let target = DhtTarget::single(self.name(), dht_resource);

        self.rpc(ctx, "dhtput", target.put_params(value.clone(), self.name(), seq))
            .await?;
        info!("{} published at revision {}", target, seq);

        {
            let mut state = resource.state.write().await;
            state.data = value;
            state.revision_number = Some(seq);
            state.mark_fresh(ctx.now());
        }
        Ok(resource.flatten().await)
    }

    /// Publish a new post and deliver the refreshed own timeline
    pub async fn post(&self, ctx: &ClientContext, msg: &str) -> ClientResult<ResourceSnapshot> {
        self.publish_with_next_id(ctx, "newpostmsg", |name, id| {
            vec![Value::from(name), Value::from(id), Value::from(msg)]
        })
        .await
    }

    /// Publish a reply to `username`'s post `post_id`
    pub async fn reply(
        &self,
        ctx: &ClientContext,
        username: &str,
        post_id: u64,
        msg: &str,
    ) -> ClientResult<ResourceSnapshot> {
        self.publish_with_next_id(ctx, "newpostmsg", |name, id| {
            vec![
                Value::from(name),
                Value::from(id),
                Value::from(msg),
                Value::from(username),
                Value::from(post_id),
            ]
        })
        .await
    }

    /// Retwist `username`'s post `post_id`, carrying the author's signature
    pub async fn retwist(&self, ctx: &ClientContext, username: &str, post_id: u64) -> ClientResult<ResourceSnapshot> {
        let original = ctx
            .user(username)
            .await
            .post(post_id)
            .await
            .satisfy(ctx, QuerySettings::new())
            .await?;

        let (Some(user_post), Some(signature)) = (
            post::user_post(&original.data),
            post::user_post_signature(&original.data),
        ) else {
            let err = ClientError::MalformedResponse(format!(
                "post {} of {} carries no signed userpost",
                post_id, username
            ));
            ctx.report_error(self.resource.key(), &err);
            return Err(err);
        };
        let retwisted = json!({ "sig_userpost": signature, "userpost": user_post });

        self.publish_with_next_id(ctx, "newrtmsg", |name, id| {
            vec![Value::from(name), Value::from(id), retwisted.clone()]
        })
        .await
    }

    /// Send a direct message to `peer` and deliver the refreshed thread
    pub async fn send_direct_message(
        &self,
        ctx: &ClientContext,
        peer: &str,
        msg: &str,
    ) -> ClientResult<ResourceSnapshot> {
        let _write = self.write_lock.lock().await;
        let id = self.claim_next_id(ctx).await?;

        self.rpc(
            ctx,
            "newdirectmsg",
            vec![
                Value::from(self.name()),
                Value::from(id),
                Value::from(peer),
                Value::from(msg),
            ],
        )
        .await?;
        self.record_published_id(id).await;

        self.direct_messages(peer)
            .await
            .satisfy(ctx, force_refresh())
            .await
    }

    /// Run a timeline write at the next post id, then refresh the own timeline
    async fn publish_with_next_id<P>(&self, ctx: &ClientContext, method: &str, params: P) -> ClientResult<ResourceSnapshot>
    where
        P: FnOnce(&str, u64) -> Vec<Value>,
    {
        let _write = self.write_lock.lock().await;
        let id = self.claim_next_id(ctx).await?;

        self.rpc(ctx, method, params(self.name(), id)).await?;
        debug!("{} published post {} via {}", self.name(), id, method);
        self.record_published_id(id).await;

        self.torrent(self.name())
            .await
            .satisfy(ctx, force_refresh())
            .await
    }

    /// Next post id of the freshly read own timeline; call with the write lock held
    async fn claim_next_id(&self, ctx: &ClientContext) -> ClientResult<u64> {
        let timeline = self
            .torrent(self.name())
            .await
            .satisfy(ctx, force_refresh())
            .await?;
        Ok(PostTimeline::new(&timeline).next_id())
    }

    /// Remember a consumed id so the next write moves past it even if the
    /// DHT has not caught up yet
    async fn record_published_id(&self, id: u64) {
        let timeline = self.torrent(self.name()).await;
        let mut state = timeline.state.write().await;
        state.latest_id = kinds::newest_id(state.latest_id, Some(id));
    }
}
