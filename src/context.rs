/// Client context and dependency injection
use crate::{
    account::{Account, AccountSnapshot},
    config::ClientConfig,
    crypto::{Secp256k1Verifier, SignatureVerifier},
    error::{ClientError, ClientResult},
    gate::DhtQueryGate,
    resource::{Resource, ResourceKey, ResourceKind},
    rpc::{dht, DhtEntry, DhtTarget, HttpRpcTransport, RpcEndpoint, RpcTransport},
    settings::{self, names, QuerySettings, QuerySettingsResolver},
    user::{User, UserSnapshot},
    verification::SignatureVerificationPipeline,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Wall clock in unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// Receives every error raised by a resource operation
pub trait ErrorSink: Send + Sync {
    fn report(&self, key: &ResourceKey, error: &ClientError);
}

/// Default sink: logs the error body
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorSink;

impl ErrorSink for LogErrorSink {
    fn report(&self, key: &ResourceKey, error: &ClientError) {
        let body = error.to_body();
        warn!("{}: error {} ({})", key, body.code, body.message);
    }
}

/// Whole-cache snapshot, as written by `save_to`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientSnapshot {
    #[serde(default)]
    pub users: Vec<UserSnapshot>,
    #[serde(default)]
    pub accounts: Vec<AccountSnapshot>,
}

struct ContextInner {
    config: ClientConfig,
    settings: QuerySettingsResolver,
    transport: Arc<dyn RpcTransport>,
    gate: DhtQueryGate,
    verification: SignatureVerificationPipeline,
    verifier: Arc<dyn SignatureVerifier>,
    clock: Arc<dyn Clock>,
    error_sink: Arc<dyn ErrorSink>,
    users: RwLock<HashMap<String, Arc<User>>>,
    accounts: RwLock<HashMap<String, Arc<Account>>>,
}

/// Client context holding all shared services and caches
#[derive(Clone)]
pub struct ClientContext {
    inner: Arc<ContextInner>,
}

/// Assembles a `ClientContext`, swapping in collaborators where needed
pub struct ClientContextBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn RpcTransport>>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
    clock: Option<Arc<dyn Clock>>,
    error_sink: Option<Arc<dyn ErrorSink>>,
}

impl ClientContextBuilder {
    pub fn transport(mut self, transport: Arc<dyn RpcTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    pub fn build(self) -> ClientResult<ClientContext> {
        self.config.validate()?;

        let transport: Arc<dyn RpcTransport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpRpcTransport::new()?),
        };

        let settings = QuerySettingsResolver::new(self.config.default_settings());
        let gate = DhtQueryGate::new(self.config.dht.max_queries);

        info!(
            "Twister client ready (max {} DHT queries, {} verification)",
            self.config.dht.max_queries, self.config.dht.signature_verification
        );

        Ok(ClientContext {
            inner: Arc::new(ContextInner {
                config: self.config,
                settings,
                transport,
                gate,
                verification: SignatureVerificationPipeline::new(),
                verifier: self.verifier.unwrap_or_else(|| Arc::new(Secp256k1Verifier::new())),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                error_sink: self.error_sink.unwrap_or_else(|| Arc::new(LogErrorSink)),
                users: RwLock::new(HashMap::new()),
                accounts: RwLock::new(HashMap::new()),
            }),
        })
    }
}

impl ClientContext {
    /// Create a context talking to the configured daemon over HTTP
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientContextBuilder {
        ClientContextBuilder {
            config,
            transport: None,
            verifier: None,
            clock: None,
            error_sink: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn settings(&self) -> &QuerySettingsResolver {
        &self.inner.settings
    }

    pub fn gate(&self) -> &DhtQueryGate {
        &self.inner.gate
    }

    pub fn verification(&self) -> &SignatureVerificationPipeline {
        &self.inner.verification
    }

    pub fn signature_verifier(&self) -> &dyn SignatureVerifier {
        self.inner.verifier.as_ref()
    }

    pub fn now(&self) -> f64 {
        self.inner.clock.now()
    }

    pub fn report_error(&self, key: &ResourceKey, error: &ClientError) {
        self.inner.error_sink.report(key, error);
    }

    // ========== Settings ==========

    pub async fn set_kind_setting(&self, name: &str, kind: ResourceKind, value: Value) {
        self.inner.settings.set_kind_setting(name, kind, value).await;
    }

    pub async fn set_default_setting(&self, name: &str, value: Value) {
        self.inner.settings.set_default(name, value).await;
    }

    /// Sticky settings of a user, inherited by the user's resources
    pub async fn set_user_settings(&self, name: &str, settings: QuerySettings) {
        self.user(name).await.set_query_settings(settings).await;
    }

    /// Settings of an already-known user; unknown users contribute nothing
    pub async fn user_settings(&self, name: &str) -> Option<QuerySettings> {
        let user = self.inner.users.read().await.get(name).cloned()?;
        Some(user.query_settings().await)
    }

    // ========== Registries ==========

    /// Get or lazily create a user
    pub async fn user(&self, name: &str) -> Arc<User> {
        if let Some(user) = self.inner.users.read().await.get(name) {
            return Arc::clone(user);
        }

        let mut users = self.inner.users.write().await;
        Arc::clone(
            users
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(User::new(name))),
        )
    }

    /// Get or lazily create a locally controlled account
    pub async fn account(&self, name: &str) -> Arc<Account> {
        if let Some(account) = self.inner.accounts.read().await.get(name) {
            return Arc::clone(account);
        }

        let mut accounts = self.inner.accounts.write().await;
        Arc::clone(
            accounts
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Account::new(name))),
        )
    }

    pub async fn known_users(&self) -> Vec<String> {
        self.inner.users.read().await.keys().cloned().collect()
    }

    // ========== Remote calls ==========

    /// Host and timeout for a call made on behalf of `resource`
    async fn endpoint(&self, resource: &Resource) -> ClientResult<RpcEndpoint> {
        let host = resource.setting(self, names::HOST).await?;
        let timeout = resource.setting(self, names::TIMEOUT).await?;

        Ok(RpcEndpoint {
            host: settings::as_string(names::HOST, &host)?,
            timeout: Duration::from_millis(settings::as_u64(names::TIMEOUT, &timeout)?),
        })
    }

    /// Call a daemon method with `resource`'s settings
    pub async fn rpc(&self, resource: &Resource, method: &str, params: Vec<Value>) -> ClientResult<Value> {
        let endpoint = self.endpoint(resource).await?;
        debug!("{} calling {}", resource.key(), method);
        self.inner.transport.call(&endpoint, method, params).await
    }

    /// Admission-controlled dhtget; `None` when nothing is stored
    pub async fn dht_get(&self, resource: &Resource, target: &DhtTarget) -> ClientResult<Option<DhtEntry>> {
        let endpoint = self.endpoint(resource).await?;
        let transport = Arc::clone(&self.inner.transport);

        let result = self
            .inner
            .gate
            .admit(|| async move { transport.call(&endpoint, "dhtget", target.get_params()).await })
            .await?;
        debug!("dhtget result for {}: {}", target, result);

        dht::parse_get_result(result)
    }

    // ========== Persistence ==========

    /// Snapshot every cached user and account
    pub async fn flatten(&self) -> ClientSnapshot {
        let users: Vec<Arc<User>> = self.inner.users.read().await.values().cloned().collect();
        let accounts: Vec<Arc<Account>> = self.inner.accounts.read().await.values().cloned().collect();

        let mut snapshot = ClientSnapshot::default();
        for user in users {
            snapshot.users.push(user.flatten().await);
        }
        for account in accounts {
            snapshot.accounts.push(account.flatten().await);
        }
        snapshot
    }

    /// Restore cached users and accounts from a snapshot
    pub async fn inflate(&self, snapshot: ClientSnapshot) {
        for user_snapshot in snapshot.users {
            let user = self.user(&user_snapshot.name).await;
            user.inflate(user_snapshot).await;
        }
        for account_snapshot in snapshot.accounts {
            let account = self.account(&account_snapshot.resource.name).await;
            account.inflate(account_snapshot).await;
        }
    }

    pub async fn save_to(&self, path: impl AsRef<Path>) -> ClientResult<()> {
        let path = path.as_ref();
        let snapshot = self.flatten().await;
        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        tokio::fs::write(path, bytes).await?;

        info!(
            "Saved {} users and {} accounts to {:?}",
            snapshot.users.len(),
            snapshot.accounts.len(),
            path
        );
        Ok(())
    }

    pub async fn load_from(&self, path: impl AsRef<Path>) -> ClientResult<()> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let snapshot: ClientSnapshot = serde_json::from_slice(&bytes)?;

        info!(
            "Loaded {} users and {} accounts from {:?}",
            snapshot.users.len(),
            snapshot.accounts.len(),
            path
        );
        self.inflate(snapshot).await;
        Ok(())
    }

    /// Drop every cached entry refreshed before `cutoff` (all of them when
    /// `None`). Returns the number of entries dropped.
    pub async fn trim(&self, cutoff: Option<f64>) -> usize {
        let users: Vec<Arc<User>> = self.inner.users.read().await.values().cloned().collect();
        let accounts: Vec<Arc<Account>> = self.inner.accounts.read().await.values().cloned().collect();

        let mut dropped = 0;
        for user in users {
            dropped += user.trim(cutoff).await;
        }
        for account in accounts {
            dropped += account.trim(cutoff).await;
        }
        dropped
    }
}
