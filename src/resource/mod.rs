/// Cached, versioned, optionally-signed resources
///
/// One `Resource` exists per identity `(kind, name[, owner or post id])`.
/// The staleness/dedup engine lives in `engine`, the persisted form in
/// `snapshot`.

mod engine;
pub mod snapshot;

pub use snapshot::{ResourceSnapshot, NEVER_UPDATED};

use crate::settings::QuerySettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};

/// Closed set of resource kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Profile,
    Avatar,
    PubKey,
    Post,
    /// A user's post timeline, as followed by an account
    Torrent,
    /// A direct message thread between an account and a peer
    DirectMessages,
    Account,
}

impl ResourceKind {
    /// Tag used as the per-kind settings key and in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Profile => "profile",
            ResourceKind::Avatar => "avatar",
            ResourceKind::PubKey => "pubkey",
            ResourceKind::Post => "post",
            ResourceKind::Torrent => "torrent",
            ResourceKind::DirectMessages => "directmessages",
            ResourceKind::Account => "account",
        }
    }

    /// Whether the settings cascade consults the owning user
    pub fn has_parent_user(&self) -> bool {
        !matches!(self, ResourceKind::Account)
    }

    /// Whether the kind exposes a bounded historical read
    pub fn supports_history(&self) -> bool {
        matches!(self, ResourceKind::Torrent | ResourceKind::DirectMessages)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    /// User the content belongs to
    pub name: String,
    /// Account holding the resource, for account-scoped kinds
    pub owner: Option<String>,
    pub post_id: Option<u64>,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            owner: None,
            post_id: None,
        }
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_post_id(mut self, id: u64) -> Self {
        self.post_id = Some(id);
        self
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)?;
        if let Some(owner) = &self.owner {
            write!(f, " (held by {})", owner)?;
        }
        if let Some(id) = self.post_id {
            write!(f, " #{}", id)?;
        }
        Ok(())
    }
}

/// Mutable state of a resource
#[derive(Debug, Clone)]
pub struct ResourceState {
    pub data: Value,
    pub revision_number: Option<u64>,
    pub verified: bool,
    /// Unix seconds of the last successful refresh, `NEVER_UPDATED` if none
    pub last_update: f64,
    /// Sticky per-resource overrides
    pub query_settings: QuerySettings,
    /// Overrides of the refresh in flight; empty when idle
    pub active_query_settings: QuerySettings,
    /// Highest known item id, for timelines and message threads
    pub latest_id: Option<u64>,
    /// Refresh time of data delivered while its signature check is still
    /// running; never persisted
    pub pending_since: Option<f64>,
}

impl Default for ResourceState {
    fn default() -> Self {
        Self {
            data: Value::Null,
            revision_number: None,
            verified: false,
            last_update: NEVER_UPDATED,
            query_settings: QuerySettings::new(),
            active_query_settings: QuerySettings::new(),
            latest_id: None,
            pending_since: None,
        }
    }
}

impl ResourceState {
    /// Record a successful, verified refresh at `now`
    pub fn mark_fresh(&mut self, now: f64) {
        self.verified = true;
        self.last_update = now;
        self.pending_since = None;
    }

    /// When the held data was last refreshed, counting data whose
    /// verification is pending
    pub fn refreshed_at(&self) -> f64 {
        self.pending_since.unwrap_or(self.last_update)
    }
}

/// A cached resource plus its in-flight guard
pub struct Resource {
    key: ResourceKey,
    pub(crate) state: RwLock<ResourceState>,
    /// Held for the whole refresh; the single dedup guard
    refresh: Mutex<()>,
    updating: AtomicBool,
}

impl Resource {
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            state: RwLock::new(ResourceState::default()),
            refresh: Mutex::new(()),
            updating: AtomicBool::new(false),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn kind(&self) -> ResourceKind {
        self.key.kind
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    /// True while a refresh is in flight
    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst)
    }

    /// Copy of the current state
    pub async fn state(&self) -> ResourceState {
        self.state.read().await.clone()
    }

    pub async fn last_update(&self) -> f64 {
        self.state.read().await.last_update
    }

    /// Add sticky overrides for this resource
    pub async fn set_query_settings(&self, settings: QuerySettings) {
        let mut state = self.state.write().await;
        for (name, value) in settings {
            state.query_settings.insert(name, value);
        }
    }

    /// Structural snapshot, used for persistence and rollback
    pub async fn flatten(&self) -> ResourceSnapshot {
        let state = self.state.read().await;
        ResourceSnapshot {
            last_update: state.last_update,
            verified: state.verified,
            query_settings: state.query_settings.clone(),
            revision_number: state.revision_number,
            name: self.key.name.clone(),
            data: state.data.clone(),
            latest_id: state.latest_id,
        }
    }

    /// Restore from a snapshot; unverified data is never considered fresh
    pub async fn inflate(&self, snapshot: ResourceSnapshot) {
        let mut state = self.state.write().await;
        state.last_update = if snapshot.verified {
            snapshot.last_update
        } else {
            NEVER_UPDATED
        };
        state.verified = snapshot.verified;
        state.query_settings = snapshot.query_settings;
        state.revision_number = snapshot.revision_number;
        state.data = snapshot.data;
        state.latest_id = snapshot.latest_id;
        state.pending_since = None;
    }

    /// Build a resource straight from a snapshot
    pub async fn from_snapshot(key: ResourceKey, snapshot: ResourceSnapshot) -> Self {
        let resource = Self::new(key);
        resource.inflate(snapshot).await;
        resource
    }

    /// Drop the cached state if it was refreshed before `cutoff`, or always
    /// when no cutoff is given. Returns whether the entry was dropped.
    ///
    /// A resource with a refresh in flight is left alone.
    pub async fn trim(&self, cutoff: Option<f64>) -> bool {
        if self.is_updating() {
            return false;
        }

        let mut state = self.state.write().await;
        if self.is_updating() {
            return false;
        }
        let stale = match cutoff {
            Some(cutoff) => cutoff > state.refreshed_at(),
            None => true,
        };
        if stale {
            *state = ResourceState::default();
        }
        stale
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("key", &self.key)
            .field("updating", &self.is_updating())
            .finish()
    }
}
