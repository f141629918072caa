/// JSON-RPC collaborator
///
/// The daemon is reached through the narrow `RpcTransport` interface; the
/// HTTP implementation lives in `http`, DHT call shapes in `dht`.

pub mod dht;
pub mod http;

pub use dht::{DhtEntry, DhtPayload, DhtTarget, DhtValueKind};
pub use http::HttpRpcTransport;

use crate::error::ClientResult;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Where and how long to talk to the daemon, resolved per call from settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    pub host: String,
    pub timeout: Duration,
}

/// Executes named remote procedures against the daemon
///
/// Transport failures are synthesized into the reserved 32090-32092 codes;
/// structured remote errors come back as `ClientError::Protocol`.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, endpoint: &RpcEndpoint, method: &str, params: Vec<Value>) -> ClientResult<Value>;
}
