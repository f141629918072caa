/// secp256k1 message signing and verification
///
/// Messages are the canonical JSON encoding (sorted keys) of the signed DHT
/// payload, hashed with SHA-256.

use crate::crypto::SignatureVerifier;
use crate::error::{ClientError, ClientResult};
use k256::ecdsa::{
    signature::hazmat::{PrehashSigner, PrehashVerifier},
    Signature, SigningKey, VerifyingKey,
};
use k256::SecretKey;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Digest of the canonical message encoding
pub fn message_digest(message: &Value) -> ClientResult<[u8; 32]> {
    let canonical_json = serde_json::to_vec(message)?;
    Ok(Sha256::digest(&canonical_json).into())
}

/// Default verifier for the signature pipeline
#[derive(Debug, Default, Clone, Copy)]
pub struct Secp256k1Verifier;

impl Secp256k1Verifier {
    pub fn new() -> Self {
        Self
    }
}

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(&self, public_key_hex: &str, message: &Value, signature_hex: &str) -> ClientResult<bool> {
        let key_bytes = hex::decode(public_key_hex)
            .map_err(|e| ClientError::InvalidPublicKey(format!("Invalid hex public key: {}", e)))?;
        let verifying_key = VerifyingKey::from_sec1_bytes(&key_bytes)
            .map_err(|e| ClientError::InvalidPublicKey(e.to_string()))?;

        let signature_bytes = match hex::decode(signature_hex) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(false),
        };
        let signature = match Signature::from_slice(&signature_bytes) {
            Ok(sig) => sig.normalize_s().unwrap_or(sig),
            Err(_) => return Ok(false),
        };

        let digest = message_digest(message)?;
        Ok(verifying_key.verify_prehash(&digest, &signature).is_ok())
    }
}

/// Signs messages the way publishers do; used to produce DHT fixtures
pub struct MessageSigner {
    signing_key: SigningKey,
}

impl MessageSigner {
    /// Create a new signer from a private key (32 bytes)
    pub fn new(private_key: &[u8]) -> ClientResult<Self> {
        if private_key.len() != 32 {
            return Err(ClientError::InvalidPublicKey(
                "Private key must be exactly 32 bytes".to_string(),
            ));
        }

        let secret_key = SecretKey::from_slice(private_key)
            .map_err(|e| ClientError::InvalidPublicKey(format!("Invalid private key: {}", e)))?;

        Ok(Self {
            signing_key: SigningKey::from(secret_key),
        })
    }

    /// Create a signer from hex-encoded private key
    pub fn from_hex(hex_key: &str) -> ClientResult<Self> {
        let key_bytes = hex::decode(hex_key)
            .map_err(|e| ClientError::InvalidPublicKey(format!("Invalid hex private key: {}", e)))?;

        Self::new(&key_bytes)
    }

    /// Sign a message, returning the 64-byte compact signature as hex
    pub fn sign(&self, message: &Value) -> ClientResult<String> {
        let digest = message_digest(message)?;
        let signature: Signature = self
            .signing_key
            .sign_prehash(&digest)
            .map_err(|e| ClientError::Serialization(format!("Signing failed: {}", e)))?;
        Ok(hex::encode(signature.to_bytes()))
    }

    /// Public key in compressed SEC1 form (33 bytes, hex-encoded)
    pub fn public_key_hex(&self) -> String {
        let verifying_key = self.signing_key.verifying_key();
        hex::encode(verifying_key.to_encoded_point(true).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signer_invalid_key_length() {
        assert!(MessageSigner::new(&[1u8; 16]).is_err());
    }

    #[test]
    fn test_public_key_extraction() {
        let signer = MessageSigner::new(&[42u8; 32]).unwrap();
        assert_eq!(signer.public_key_hex().len(), 66);
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = MessageSigner::new(&[42u8; 32]).unwrap();
        let message = json!({"v": {"bio": "hello"}, "seq": 3});
        let signature = signer.sign(&message).unwrap();

        let verifier = Secp256k1Verifier::new();
        assert!(verifier.verify(&signer.public_key_hex(), &message, &signature).unwrap());
    }

    #[test]
    fn test_tampered_message_rejected() {
        let signer = MessageSigner::new(&[42u8; 32]).unwrap();
        let signature = signer.sign(&json!({"v": "a", "seq": 1})).unwrap();

        let verifier = Secp256k1Verifier::new();
        let tampered = json!({"v": "b", "seq": 1});
        assert!(!verifier.verify(&signer.public_key_hex(), &tampered, &signature).unwrap());
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let signer = MessageSigner::new(&[7u8; 32]).unwrap();
        let signature = signer.sign(&json!({"seq": 1, "v": "x"})).unwrap();

        let reordered: Value = serde_json::from_str(r#"{"v": "x", "seq": 1}"#).unwrap();
        let verifier = Secp256k1Verifier::new();
        assert!(verifier.verify(&signer.public_key_hex(), &reordered, &signature).unwrap());
    }

    #[test]
    fn test_garbage_signature_is_rejection_not_error() {
        let signer = MessageSigner::new(&[42u8; 32]).unwrap();
        let verifier = Secp256k1Verifier::new();
        assert!(!verifier.verify(&signer.public_key_hex(), &json!(1), "zz").unwrap());
    }

    #[test]
    fn test_bad_public_key_is_error() {
        let verifier = Secp256k1Verifier::new();
        assert!(verifier.verify("00", &json!(1), "00").is_err());
    }
}
