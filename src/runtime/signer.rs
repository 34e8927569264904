//! Ed25519 agent identity and event signing (§4.6).
//!
//! No teacher source used ed25519 directly (the sibling `mentisdb` crate pulled
//! in `ed25519-dalek` but its implementation wasn't part of the retrieved pack),
//! so this module is original code written idiomatically against the same
//! crate version the manifest already named.

use crate::runtime::error::OrchestrationError;
use crate::runtime::model::Event;
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;

/// An agent's signing identity. `pubkey()` is the value published as
/// `Event::author_key` and as the `p` tag naming this agent.
pub struct Signer {
    signing_key: SigningKey,
}

impl Signer {
    /// Generate a fresh keypair, e.g. when bootstrapping an agent that has no
    /// persisted identity yet.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Load a signing key from its 32-byte hex encoding, as stored in an
    /// `AgentDefinition::signing_key`.
    pub fn from_hex(hex_key: &str) -> Result<Self, OrchestrationError> {
        let bytes = hex::decode(hex_key)
            .map_err(|e| OrchestrationError::Configuration(format!("invalid signing key hex: {}", e)))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| OrchestrationError::Configuration("signing key must be 32 bytes".to_string()))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Public key, hex-encoded, used as an agent's identity.
    pub fn pubkey(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Compute the id and signature for an otherwise-complete event and return
    /// it signed. The id is the hex-encoded SHA-256 of a canonical
    /// serialisation of the event's content, kind, tags, and timestamp, kept
    /// independent of the signature itself so the id is stable before
    /// signing.
    pub fn sign_event(
        &self,
        content: String,
        kind: u32,
        tags: Vec<Vec<String>>,
        created_at: i64,
    ) -> Event {
        let author_key = self.pubkey();
        let id = compute_event_id(&author_key, created_at, kind, &tags, &content);
        let signature: Signature = self.signing_key.sign(id.as_bytes());
        Event {
            id,
            author_key,
            content,
            kind,
            tags,
            created_at,
            sig: hex::encode(signature.to_bytes()),
        }
    }
}

/// Verify that `event.sig` is a valid signature by `event.author_key` over
/// `event.id`, and that `event.id` matches the recomputed id. Both checks are
/// required: a valid signature over a stale id would otherwise pass.
pub fn verify_event(event: &Event) -> Result<(), OrchestrationError> {
    let expected_id = compute_event_id(
        &event.author_key,
        event.created_at,
        event.kind,
        &event.tags,
        &event.content,
    );
    if expected_id != event.id {
        return Err(OrchestrationError::Protocol(format!(
            "event id mismatch: expected {}, got {}",
            expected_id, event.id
        )));
    }

    let pubkey_bytes = hex::decode(&event.author_key)
        .map_err(|e| OrchestrationError::Protocol(format!("invalid author key hex: {}", e)))?;
    let pubkey_bytes: [u8; 32] = pubkey_bytes
        .try_into()
        .map_err(|_| OrchestrationError::Protocol("author key must be 32 bytes".to_string()))?;
    let verifying_key = VerifyingKey::from_bytes(&pubkey_bytes)
        .map_err(|e| OrchestrationError::Protocol(format!("invalid author key: {}", e)))?;

    let sig_bytes = hex::decode(&event.sig)
        .map_err(|e| OrchestrationError::Protocol(format!("invalid signature hex: {}", e)))?;
    let sig_bytes: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| OrchestrationError::Protocol("signature must be 64 bytes".to_string()))?;
    let signature = Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(event.id.as_bytes(), &signature)
        .map_err(|e| OrchestrationError::Protocol(format!("signature verification failed: {}", e)))
}

fn compute_event_id(
    author_key: &str,
    created_at: i64,
    kind: u32,
    tags: &[Vec<String>],
    content: &str,
) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(author_key.as_bytes());
    hasher.update(created_at.to_be_bytes());
    hasher.update(kind.to_be_bytes());
    for tag in tags {
        for part in tag {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([1u8]);
    }
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trips() {
        let signer = Signer::generate();
        let event = signer.sign_event("hello".to_string(), 1, vec![], 1234);
        assert_eq!(event.author_key, signer.pubkey());
        verify_event(&event).unwrap();
    }

    #[test]
    fn tampered_content_fails_verification() {
        let signer = Signer::generate();
        let mut event = signer.sign_event("hello".to_string(), 1, vec![], 1234);
        event.content = "tampered".to_string();
        assert!(verify_event(&event).is_err());
    }

    #[test]
    fn hex_round_trip_preserves_identity() {
        let signer = Signer::generate();
        let hex_key = signer.to_hex();
        let reloaded = Signer::from_hex(&hex_key).unwrap();
        assert_eq!(signer.pubkey(), reloaded.pubkey());
    }

    #[test]
    fn tampered_id_fails_verification() {
        let signer = Signer::generate();
        let mut event = signer.sign_event("hello".to_string(), 1, vec![], 1234);
        event.id = "0".repeat(64);
        assert!(verify_event(&event).is_err());
    }
}
