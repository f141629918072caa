/// Locally controlled accounts
///
/// An account is the identity able to issue writes. Besides its own resource
/// (the users it follows) it holds the post timelines of the users it reads
/// and its direct message threads, both created lazily per peer. Write
/// operations live in `writes`.

mod writes;

use crate::{
    context::ClientContext,
    error::{ClientError, ClientResult},
    kinds,
    resource::{Resource, ResourceKey, ResourceKind, ResourceSnapshot},
    settings::QuerySettings,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

const DEFAULT_WALLET_TYPE: &str = "server";

fn default_wallet_type() -> String {
    DEFAULT_WALLET_TYPE.to_string()
}

/// Persisted form of an account, nested collections included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    #[serde(flatten)]
    pub resource: ResourceSnapshot,
    #[serde(rename = "wallettype", default = "default_wallet_type")]
    pub wallet_type: String,
    #[serde(rename = "directmessages", default)]
    pub direct_messages: Vec<ResourceSnapshot>,
    #[serde(default)]
    pub torrents: Vec<ResourceSnapshot>,
}

pub struct Account {
    resource: Arc<Resource>,
    wallet_type: RwLock<String>,
    direct_messages: RwLock<HashMap<String, Arc<Resource>>>,
    torrents: RwLock<HashMap<String, Arc<Resource>>>,
    /// Serializes sequence-number assignment for this account's writes
    write_lock: Mutex<()>,
}

impl Account {
    pub fn new(name: &str) -> Self {
        Self {
            resource: Arc::new(Resource::new(ResourceKey::new(ResourceKind::Account, name))),
            wallet_type: RwLock::new(default_wallet_type()),
            direct_messages: RwLock::new(HashMap::new()),
            torrents: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        self.resource.name()
    }

    /// The account's own resource (its followings)
    pub fn resource(&self) -> Arc<Resource> {
        Arc::clone(&self.resource)
    }

    pub async fn wallet_type(&self) -> String {
        self.wallet_type.read().await.clone()
    }

    /// Users this account follows
    pub async fn followings(&self, ctx: &ClientContext, overrides: QuerySettings) -> ClientResult<Vec<String>> {
        let snapshot = self.resource.satisfy(ctx, overrides).await?;
        Ok(kinds::followings::followings(&snapshot))
    }

    /// Get or lazily create the timeline of `username` as read by this account
    pub async fn torrent(&self, username: &str) -> Arc<Resource> {
        lazy_entry(&self.torrents, username, || {
            ResourceKey::new(ResourceKind::Torrent, username).owned_by(self.name())
        })
        .await
    }

    /// Get or lazily create the message thread with `peer`
    pub async fn direct_messages(&self, peer: &str) -> Arc<Resource> {
        lazy_entry(&self.direct_messages, peer, || {
            ResourceKey::new(ResourceKind::DirectMessages, peer).owned_by(self.name())
        })
        .await
    }

    /// Latest messages exchanged with `peer`
    pub async fn latest_direct_messages(
        &self,
        ctx: &ClientContext,
        peer: &str,
        overrides: QuerySettings,
    ) -> ClientResult<ResourceSnapshot> {
        self.direct_messages(peer).await.satisfy(ctx, overrides).await
    }

    /// Messages exchanged with `peer` up to and including `max_id`
    pub async fn direct_messages_until(
        &self,
        ctx: &ClientContext,
        peer: &str,
        max_id: u64,
        overrides: QuerySettings,
    ) -> ClientResult<ResourceSnapshot> {
        self.direct_messages(peer)
            .await
            .satisfy_until(ctx, max_id, overrides)
            .await
    }

    /// Seed every followed timeline with the daemon's last known post id.
    ///
    /// Returns the users whose timelines were activated.
    pub async fn activate_torrents(&self, ctx: &ClientContext) -> ClientResult<Vec<String>> {
        let result = self
            .rpc(ctx, "getlasthave", vec![Value::from(self.name())])
            .await?;

        let Value::Object(last_have) = result else {
            let err = ClientError::MalformedResponse(format!(
                "getlasthave returned a non-object result: {}",
                result
            ));
            ctx.report_error(self.resource.key(), &err);
            return Err(err);
        };

        let mut activated = Vec::with_capacity(last_have.len());
        for (username, last_id) in last_have {
            let Some(last_id) = last_id.as_u64() else {
                continue;
            };

            let torrent = self.torrent(&username).await;
            {
                let mut state = torrent.state.write().await;
                state.latest_id = kinds::newest_id(state.latest_id, Some(last_id));
                state.mark_fresh(ctx.now());
            }
            info!("torrent for {} activated on {}", username, self.name());
            activated.push(username);
        }

        Ok(activated)
    }

    /// Call a daemon method as this account, reporting failures to the sink
    async fn rpc(&self, ctx: &ClientContext, method: &str, params: Vec<Value>) -> ClientResult<Value> {
        let result = ctx.rpc(&self.resource, method, params).await;
        if let Err(e) = &result {
            ctx.report_error(self.resource.key(), e);
        }
        result
    }

    pub async fn flatten(&self) -> AccountSnapshot {
        AccountSnapshot {
            resource: self.resource.flatten().await,
            wallet_type: self.wallet_type().await,
            direct_messages: flatten_all(&self.direct_messages).await,
            torrents: flatten_all(&self.torrents).await,
        }
    }

    pub async fn inflate(&self, snapshot: AccountSnapshot) {
        self.resource.inflate(snapshot.resource).await;
        *self.wallet_type.write().await = snapshot.wallet_type;

        for thread in snapshot.direct_messages {
            self.direct_messages(&thread.name).await.inflate(thread).await;
        }
        for timeline in snapshot.torrents {
            self.torrent(&timeline.name).await.inflate(timeline).await;
        }
    }

    /// Trim the account and everything it holds; returns how many entries were dropped
    pub async fn trim(&self, cutoff: Option<f64>) -> usize {
        let mut held: Vec<Arc<Resource>> = self.direct_messages.read().await.values().cloned().collect();
        held.extend(self.torrents.read().await.values().cloned());
        held.push(Arc::clone(&self.resource));

        let mut dropped = 0;
        for resource in held {
            if resource.trim(cutoff).await {
                dropped += 1;
            }
        }
        dropped
    }
}

async fn lazy_entry(
    map: &RwLock<HashMap<String, Arc<Resource>>>,
    name: &str,
    key: impl FnOnce() -> ResourceKey,
) -> Arc<Resource> {
    if let Some(resource) = map.read().await.get(name) {
        return Arc::clone(resource);
    }

    let mut entries = map.write().await;
    Arc::clone(
        entries
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Resource::new(key()))),
    )
}

async fn flatten_all(map: &RwLock<HashMap<String, Arc<Resource>>>) -> Vec<ResourceSnapshot> {
    let resources: Vec<Arc<Resource>> = map.read().await.values().cloned().collect();
    let mut snapshots = Vec::with_capacity(resources.len());
    for resource in resources {
        snapshots.push(resource.flatten().await);
    }
    snapshots.sort_by(|a, b| a.name.cmp(&b.name));
    snapshots
}
