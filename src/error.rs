/// Unified error types for the twister client
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Reserved error codes surfaced to callers
pub mod codes {
    pub const SIGNATURE_VERIFICATION_FAILED: i64 = 32050;
    pub const UNKNOWN_SETTING: i64 = 32051;
    pub const EMPTY_RESOURCE: i64 = 32052;
    pub const HOST_UNREACHABLE: i64 = 32090;
    pub const HTTP_STATUS: i64 = 32091;
    pub const MALFORMED_RESPONSE: i64 = 32092;
    /// Local failures that never travel over the wire
    pub const LOCAL: i64 = 32099;
}

/// Main error type for the client
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// DHT resource signature could not be verified
    #[error("DHT resource signature could not be verified")]
    SignatureVerificationFailed,

    /// No cascade level provides a value for the requested setting
    #[error("Unknown query setting was requested: {0}")]
    UnknownSetting(String),

    /// Setting exists but has the wrong shape
    #[error("Query setting {name} is invalid: {reason}")]
    InvalidSetting { name: String, reason: String },

    /// DHT resource is logically empty (never published)
    #[error("DHT resource is empty")]
    EmptyResource,

    /// Transport could not reach the RPC host
    #[error("Host not reachable: {0}")]
    HostUnreachable(String),

    /// RPC host answered with a non-success HTTP status
    #[error("Request was not processed successfully (http error: {0})")]
    HttpStatus(u16),

    /// RPC response body could not be parsed
    #[error("An error occurred while parsing the JSON response body: {0}")]
    MalformedResponse(String),

    /// Remote method returned a structured error
    #[error("RPC error {code}: {message}")]
    Protocol {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// Public key could not be decoded
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Snapshot (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(String),
}

/// Wire shape of an error, as delivered to error sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ClientError {
    /// Map a structured RPC error onto the typed variants, passing unknown codes through
    pub fn from_rpc(code: i64, message: String, data: Option<Value>) -> Self {
        match code {
            codes::SIGNATURE_VERIFICATION_FAILED => ClientError::SignatureVerificationFailed,
            codes::EMPTY_RESOURCE => ClientError::EmptyResource,
            _ => ClientError::Protocol {
                code,
                message,
                data,
            },
        }
    }

    /// Numeric error code
    pub fn code(&self) -> i64 {
        match self {
            ClientError::SignatureVerificationFailed => codes::SIGNATURE_VERIFICATION_FAILED,
            ClientError::UnknownSetting(_) => codes::UNKNOWN_SETTING,
            ClientError::EmptyResource => codes::EMPTY_RESOURCE,
            ClientError::HostUnreachable(_) => codes::HOST_UNREACHABLE,
            ClientError::HttpStatus(_) => codes::HTTP_STATUS,
            ClientError::MalformedResponse(_) => codes::MALFORMED_RESPONSE,
            ClientError::Protocol { code, .. } => *code,
            ClientError::InvalidSetting { .. }
            | ClientError::InvalidPublicKey(_)
            | ClientError::Serialization(_)
            | ClientError::Io(_) => codes::LOCAL,
        }
    }

    /// True for the recoverable "nothing published yet" condition
    pub fn is_empty_resource(&self) -> bool {
        self.code() == codes::EMPTY_RESOURCE
    }

    pub fn to_body(&self) -> ErrorBody {
        let data = match self {
            ClientError::HostUnreachable(reason) => Some(Value::String(reason.clone())),
            ClientError::HttpStatus(status) => Some(Value::from(*status)),
            ClientError::Protocol { data, .. } => data.clone(),
            _ => None,
        };
        let message = match self {
            ClientError::Protocol { message, .. } => message.clone(),
            other => other.to_string(),
        };

        ErrorBody {
            code: self.code(),
            message,
            data,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e.to_string())
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
