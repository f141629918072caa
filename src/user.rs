/// A network user and the resources cached on their behalf
use crate::{
    resource::{Resource, ResourceKey, ResourceKind, ResourceSnapshot},
    settings::QuerySettings,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Persisted form of a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSnapshot {
    pub name: String,
    #[serde(default)]
    pub query_settings: QuerySettings,
    pub profile: ResourceSnapshot,
    pub avatar: ResourceSnapshot,
    pub pubkey: ResourceSnapshot,
    #[serde(default)]
    pub posts: BTreeMap<u64, ResourceSnapshot>,
}

pub struct User {
    name: String,
    /// Sticky settings inherited by every resource of this user
    query_settings: RwLock<QuerySettings>,
    profile: Arc<Resource>,
    avatar: Arc<Resource>,
    pubkey: Arc<Resource>,
    posts: RwLock<HashMap<u64, Arc<Resource>>>,
}

impl User {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            query_settings: RwLock::new(QuerySettings::new()),
            profile: Arc::new(Resource::new(ResourceKey::new(ResourceKind::Profile, name))),
            avatar: Arc::new(Resource::new(ResourceKey::new(ResourceKind::Avatar, name))),
            pubkey: Arc::new(Resource::new(ResourceKey::new(ResourceKind::PubKey, name))),
            posts: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profile(&self) -> Arc<Resource> {
        Arc::clone(&self.profile)
    }

    pub fn avatar(&self) -> Arc<Resource> {
        Arc::clone(&self.avatar)
    }

    pub fn pubkey(&self) -> Arc<Resource> {
        Arc::clone(&self.pubkey)
    }

    /// Get or lazily create the post with sequence number `id`
    pub async fn post(&self, id: u64) -> Arc<Resource> {
        if let Some(post) = self.posts.read().await.get(&id) {
            return Arc::clone(post);
        }

        let mut posts = self.posts.write().await;
        Arc::clone(posts.entry(id).or_insert_with(|| {
            Arc::new(Resource::new(
                ResourceKey::new(ResourceKind::Post, self.name.clone()).with_post_id(id),
            ))
        }))
    }

    pub async fn query_settings(&self) -> QuerySettings {
        self.query_settings.read().await.clone()
    }

    pub async fn set_query_settings(&self, settings: QuerySettings) {
        let mut current = self.query_settings.write().await;
        for (name, value) in settings {
            current.insert(name, value);
        }
    }

    pub async fn flatten(&self) -> UserSnapshot {
        let posts: Vec<(u64, Arc<Resource>)> = self
            .posts
            .read()
            .await
            .iter()
            .map(|(id, post)| (*id, Arc::clone(post)))
            .collect();

        let mut flat_posts = BTreeMap::new();
        for (id, post) in posts {
            flat_posts.insert(id, post.flatten().await);
        }

        UserSnapshot {
            name: self.name.clone(),
            query_settings: self.query_settings().await,
            profile: self.profile.flatten().await,
            avatar: self.avatar.flatten().await,
            pubkey: self.pubkey.flatten().await,
            posts: flat_posts,
        }
    }

    pub async fn inflate(&self, snapshot: UserSnapshot) {
        *self.query_settings.write().await = snapshot.query_settings;
        self.profile.inflate(snapshot.profile).await;
        self.avatar.inflate(snapshot.avatar).await;
        self.pubkey.inflate(snapshot.pubkey).await;

        for (id, post) in snapshot.posts {
            self.post(id).await.inflate(post).await;
        }
    }

    /// Trim every resource of this user; returns how many were dropped
    pub async fn trim(&self, cutoff: Option<f64>) -> usize {
        let mut dropped = 0;
        for resource in [&self.profile, &self.avatar, &self.pubkey] {
            if resource.trim(cutoff).await {
                dropped += 1;
            }
        }

        let posts: Vec<Arc<Resource>> = self.posts.read().await.values().cloned().collect();
        for post in posts {
            if post.trim(cutoff).await {
                dropped += 1;
            }
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_posts_created_lazily() {
        let user = User::new("alice");
        let first = user.post(7).await;
        let again = user.post(7).await;
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(first.key().post_id, Some(7));
    }

    #[tokio::test]
    async fn test_snapshot_restores_posts() {
        let user = User::new("alice");
        {
            let post = user.post(3).await;
            let mut state = post.state.write().await;
            state.data = json!({"userpost": {"k": 3, "msg": "hello"}});
            state.revision_number = Some(1);
            state.mark_fresh(100.0);
        }

        let snapshot = user.flatten().await;
        let encoded = serde_json::to_string(&snapshot).unwrap();
        let decoded: UserSnapshot = serde_json::from_str(&encoded).unwrap();

        let restored = User::new("alice");
        restored.inflate(decoded).await;
        let post = restored.post(3).await.state().await;
        assert_eq!(post.data["userpost"]["msg"], "hello");
        assert_eq!(post.last_update, 100.0);
    }

    #[tokio::test]
    async fn test_trim_counts_dropped_entries() {
        let user = User::new("alice");
        user.profile.state.write().await.mark_fresh(500.0);
        user.post(1).await;

        // avatar, pubkey and the post were never refreshed
        assert_eq!(user.trim(Some(100.0)).await, 3);
        assert!(user.profile.state().await.verified);
    }
}
