#![allow(dead_code)]

/// Shared harness for integration tests: a scripted daemon, a manual clock
/// and an error sink that records what it receives

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use twister_client::{
    crypto::MessageSigner,
    rpc::{RpcEndpoint, RpcTransport},
    settings::names,
    ClientConfig, ClientContext, ClientError, ClientResult, Clock, ErrorSink, ResourceKey,
    VerificationMode,
};

pub const BASE_TIME: f64 = 1_700_000_000.0;

type Handler = Box<dyn Fn(&[Value]) -> ClientResult<Value> + Send + Sync>;

/// Daemon stand-in answering each method from a scripted handler
#[derive(Default)]
pub struct MockTransport {
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    delay: Mutex<Duration>,
    dht_active: AtomicUsize,
    dht_peak: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on<F>(&self, method: &str, handler: F)
    where
        F: Fn(&[Value]) -> ClientResult<Value> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap()
            .insert(method.to_string(), Box::new(handler));
    }

    pub fn respond(&self, method: &str, value: Value) {
        self.on(method, move |_| Ok(value.clone()));
    }

    pub fn fail(&self, method: &str, error: ClientError) {
        self.on(method, move |_| Err(error.clone()));
    }

    /// Answer dhtget per DHT resource name (`profile`, `status`, `post3`, ...)
    pub fn dht(&self, resources: HashMap<String, Value>) {
        self.on("dhtget", move |params| {
            let resource = params.get(1).and_then(Value::as_str).unwrap_or_default();
            Ok(resources.get(resource).cloned().unwrap_or_else(|| json!([])))
        });
    }

    /// Every call is held this long before it is answered
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn calls(&self, method: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls(method).len()
    }

    /// Highest number of dhtget calls observed in flight at once
    pub fn dht_peak(&self) -> usize {
        self.dht_peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(&self, _endpoint: &RpcEndpoint, method: &str, params: Vec<Value>) -> ClientResult<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        let is_dht = method == "dhtget";
        if is_dht {
            let now = self.dht_active.fetch_add(1, Ordering::SeqCst) + 1;
            self.dht_peak.fetch_max(now, Ordering::SeqCst);
        }

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = match self.handlers.lock().unwrap().get(method) {
            Some(handler) => handler(&params),
            None => Err(ClientError::from_rpc(-32601, "Method not found".to_string(), None)),
        };

        if is_dht {
            self.dht_active.fetch_sub(1, Ordering::SeqCst);
        }
        result
    }
}

/// Clock moved by hand
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(now: f64) -> Arc<Self> {
        Arc::new(Self { now: Mutex::new(now) })
    }

    pub fn set(&self, now: f64) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock().unwrap() += secs;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap()
    }
}

/// Sink keeping `(resource, code)` for every report
#[derive(Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<(ResourceKey, i64)>>,
}

impl RecordingSink {
    pub fn codes(&self) -> Vec<i64> {
        self.reports.lock().unwrap().iter().map(|(_, code)| *code).collect()
    }

    pub fn reports(&self) -> Vec<(ResourceKey, i64)> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, key: &ResourceKey, error: &ClientError) {
        self.reports.lock().unwrap().push((key.clone(), error.code()));
    }
}

pub struct Harness {
    pub ctx: ClientContext,
    pub transport: Arc<MockTransport>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<RecordingSink>,
}

pub fn harness(mode: VerificationMode) -> Harness {
    harness_with(mode, |_| {})
}

pub fn harness_with(mode: VerificationMode, tweak: impl FnOnce(&mut ClientConfig)) -> Harness {
    let mut config = ClientConfig::default();
    config.dht.signature_verification = mode;
    tweak(&mut config);

    let transport = MockTransport::new();
    let clock = ManualClock::new(BASE_TIME);
    let sink = Arc::new(RecordingSink::default());

    let ctx = ClientContext::builder(config)
        .transport(transport.clone())
        .clock(clock.clone())
        .error_sink(sink.clone())
        .build()
        .unwrap();

    Harness {
        ctx,
        transport,
        clock,
        sink,
    }
}

pub fn signer(seed: u8) -> MessageSigner {
    MessageSigner::new(&[seed; 32]).unwrap()
}

/// A dhtget result whose single entry is signed by `signer` as `sig_user`
pub fn signed_result(signer: &MessageSigner, sig_user: &str, value: Value, seq: u64) -> Value {
    let payload = json!({ "v": value, "seq": seq, "height": 1000 });
    let sig_p = signer.sign(&payload).unwrap();
    json!([{ "sig_user": sig_user, "sig_p": sig_p, "p": payload }])
}

pub fn dht_map<const N: usize>(entries: [(&str, Value); N]) -> HashMap<String, Value> {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Per-call override forcing a refresh
pub fn force() -> twister_client::QuerySettings {
    twister_client::settings::overrides([(names::OUTDATED_LIMIT, Value::from(0))])
}

pub fn limit(secs: u64) -> twister_client::QuerySettings {
    twister_client::settings::overrides([(names::OUTDATED_LIMIT, Value::from(secs))])
}

/// A post as it appears in `status` records and `getposts` results
pub fn user_post(user: &str, k: u64, msg: &str) -> Value {
    json!({
        "sig_userpost": format!("{:02x}", k),
        "userpost": { "n": user, "k": k, "msg": msg, "time": 1_400_000_000u64 + k }
    })
}
