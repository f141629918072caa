/// Staleness and dedup engine shared by every resource kind
use crate::{
    context::ClientContext,
    error::{ClientError, ClientResult},
    kinds, metrics,
    resource::{Resource, ResourceSnapshot, NEVER_UPDATED},
    settings::{self, names, QuerySettings, SettingLayers},
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// What a refresh should retrieve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Query {
    /// The latest state, honouring the cache
    Latest,
    /// A bounded range ending at the given item id
    Until(u64),
}

/// Clears the in-flight flag even if the refresh future is dropped
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Resource {
    /// Resolve a setting through the cascade for this resource
    pub async fn setting(&self, ctx: &ClientContext, name: &str) -> ClientResult<Value> {
        let (active, sticky) = {
            let state = self.state.read().await;
            (state.active_query_settings.clone(), state.query_settings.clone())
        };
        let parent = if self.kind().has_parent_user() {
            ctx.user_settings(self.name()).await
        } else {
            None
        };

        let layers = SettingLayers {
            active: &active,
            sticky: &sticky,
            kind: self.kind(),
            parent: parent.as_ref(),
        };
        ctx.settings().resolve(&layers, name).await
    }

    /// Deliver the resource, refreshing it first when the cached copy is stale.
    ///
    /// Callers arriving while a refresh is in flight wait for it and then
    /// re-check staleness, so they observe that single refresh.
    pub async fn satisfy(
        self: &Arc<Self>,
        ctx: &ClientContext,
        overrides: QuerySettings,
    ) -> ClientResult<ResourceSnapshot> {
        self.run(ctx, overrides, Query::Latest, true).await
    }

    /// `satisfy` for lookups made on behalf of another resource, which
    /// reports any failure under its own key
    pub(crate) async fn satisfy_unreported(
        self: &Arc<Self>,
        ctx: &ClientContext,
        overrides: QuerySettings,
    ) -> ClientResult<ResourceSnapshot> {
        self.run(ctx, overrides, Query::Latest, false).await
    }

    /// Fetch the bounded range ending at `max_id` and deliver the resource
    pub async fn satisfy_until(
        self: &Arc<Self>,
        ctx: &ClientContext,
        max_id: u64,
        overrides: QuerySettings,
    ) -> ClientResult<ResourceSnapshot> {
        if !self.kind().supports_history() {
            return Err(ClientError::InvalidSetting {
                name: "until".to_string(),
                reason: format!("{} has no history", self.kind()),
            });
        }
        self.run(ctx, overrides, Query::Until(max_id), true).await
    }

    async fn run(
        self: &Arc<Self>,
        ctx: &ClientContext,
        overrides: QuerySettings,
        query: Query,
        report: bool,
    ) -> ClientResult<ResourceSnapshot> {
        if self.is_updating() {
            debug!("update in progress {}", self.key());
        }

        let result = {
            let _guard = self.refresh.lock().await;
            let _in_flight = InFlight::enter(&self.updating);

            self.state.write().await.active_query_settings = overrides;
            let result = self.refresh_locked(ctx, query).await;
            self.state.write().await.active_query_settings.clear();
            result
        };

        if let Err(e) = &result {
            metrics::record_refresh_error(self.kind().as_str(), e.code());
            // recoverable; writers treat it as revision 0
            if e.is_empty_resource() {
                debug!("dht resource is empty {}", self.key());
            } else if report {
                ctx.report_error(self.key(), e);
            } else {
                debug!("refresh of {} failed: {}", self.key(), e);
            }
        }
        result
    }

    async fn refresh_locked(self: &Arc<Self>, ctx: &ClientContext, query: Query) -> ClientResult<ResourceSnapshot> {
        match query {
            Query::Latest => {
                let limit = self.setting(ctx, names::OUTDATED_LIMIT).await?;
                let limit = settings::as_f64(names::OUTDATED_LIMIT, &limit)?;
                let outdated_cutoff = ctx.now() - limit;

                // data delivered ahead of its signature check counts as fresh
                let refreshed_at = self.state.read().await.refreshed_at();
                if refreshed_at != NEVER_UPDATED && refreshed_at > outdated_cutoff {
                    debug!("resource present in cache {}", self.key());
                    metrics::record_cache_access(self.kind().as_str(), true);
                    return Ok(self.flatten().await);
                }

                debug!("resource not in cache, querying {}", self.key());
                metrics::record_cache_access(self.kind().as_str(), false);
                kinds::fetch(ctx, self).await?;
            }
            Query::Until(max_id) => {
                debug!("querying {} until {}", self.key(), max_id);
                kinds::fetch_until(ctx, self, max_id).await?;
            }
        }

        Ok(self.flatten().await)
    }
}
