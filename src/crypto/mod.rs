/// Cryptography module for DHT signature checks
///
/// The pipeline only depends on the `SignatureVerifier` trait; the default
/// implementation checks secp256k1 ECDSA signatures.

pub mod secp256k1;

pub use secp256k1::{MessageSigner, Secp256k1Verifier};

use crate::error::ClientResult;
use serde_json::Value;

/// External crypto collaborator: checks a publisher's signature over a DHT payload
pub trait SignatureVerifier: Send + Sync {
    /// `Ok(false)` for a well-formed but wrong signature, `Err` for undecodable input
    fn verify(&self, public_key_hex: &str, message: &Value, signature_hex: &str) -> ClientResult<bool>;
}
