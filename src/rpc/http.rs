/// HTTP JSON-RPC transport for the twister daemon
use crate::{
    error::{ClientError, ClientResult},
    metrics,
    rpc::{RpcEndpoint, RpcTransport},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// JSON-RPC 2.0 request envelope
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a [Value],
    id: u64,
}

/// Remote error member
#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// JSON-RPC 2.0 response envelope
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// reqwest-backed transport
#[derive(Clone)]
pub struct HttpRpcTransport {
    http_client: reqwest::Client,
}

impl HttpRpcTransport {
    /// Create a new transport
    pub fn new() -> ClientResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("twister-client/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| ClientError::HostUnreachable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    async fn call(&self, endpoint: &RpcEndpoint, method: &str, params: Vec<Value>) -> ClientResult<Value> {
        let shown = Value::Array(params.clone());
        debug!("calling JSON-RPC {} {}", method, shown);

        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params: &params,
            id: 0,
        };

        let response = self
            .http_client
            .post(&endpoint.host)
            .timeout(endpoint.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("RPC host {} not reachable: {}", endpoint.host, e);
                metrics::RPC_CALLS_TOTAL.with_label_values(&[method, "unreachable"]).inc();
                ClientError::HostUnreachable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            metrics::RPC_CALLS_TOTAL.with_label_values(&[method, "http_error"]).inc();
            return Err(ClientError::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::MalformedResponse(e.to_string()))?;

        let parsed = decode_response(&body);
        let outcome = match &parsed {
            Ok(_) => "ok",
            Err(ClientError::MalformedResponse(_)) => "malformed",
            Err(_) => "rpc_error",
        };
        metrics::RPC_CALLS_TOTAL.with_label_values(&[method, outcome]).inc();

        parsed
    }
}

/// Decode a JSON-RPC response body into its result or error
fn decode_response(body: &str) -> ClientResult<Value> {
    let response: RpcResponse =
        serde_json::from_str(body).map_err(|e| ClientError::MalformedResponse(e.to_string()))?;

    if let Some(error) = response.error {
        return Err(ClientError::from_rpc(error.code, error.message, error.data));
    }

    Ok(response.result.unwrap_or(Value::Null))
}
