//! Credential sealing. The core only needs a key-opaque `seal`/`unseal`
//! pair; production key management is out of scope. This is a
//! deterministic XOR-stream stand-in keyed off `FLEET_SEAL_KEY`, sufficient
//! for the invariant the core actually depends on: sealing is reversible
//! and the plaintext never touches the store.

use sha2::{Digest, Sha256};

pub struct Sealer {
    key_stream_seed: [u8; 32],
}

impl Sealer {
    pub fn new(seal_key: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(seal_key.as_bytes());
        let digest = hasher.finalize();
        let mut key_stream_seed = [0u8; 32];
        key_stream_seed.copy_from_slice(&digest);
        Self { key_stream_seed }
    }

    fn key_stream(&self, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let mut block = self.key_stream_seed;
        while out.len() < len {
            let mut hasher = Sha256::new();
            hasher.update(block);
            let digest = hasher.finalize();
            block.copy_from_slice(&digest);
            out.extend_from_slice(&digest);
        }
        out.truncate(len);
        out
    }

    pub fn seal(&self, plaintext: &[u8]) -> Vec<u8> {
        let stream = self.key_stream(plaintext.len());
        plaintext.iter().zip(stream.iter()).map(|(p, k)| p ^ k).collect()
    }

    /// XOR is its own inverse.
    pub fn unseal(&self, sealed: &[u8]) -> Vec<u8> {
        self.seal(sealed)
    }

    pub fn seal_json<T: serde::Serialize>(&self, value: &T) -> crate::Result<Vec<u8>> {
        let bytes = serde_json::to_vec(value)?;
        Ok(self.seal(&bytes))
    }

    pub fn unseal_json<T: serde::de::DeserializeOwned>(&self, sealed: &[u8]) -> crate::Result<T> {
        let bytes = self.unseal(sealed);
        serde_json::from_slice(&bytes).map_err(crate::AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_unseal_round_trips() {
        let sealer = Sealer::new("test-key");
        let plaintext = b"client_secret=abc123";
        let sealed = sealer.seal(plaintext);
        assert_ne!(sealed, plaintext);
        assert_eq!(sealer.unseal(&sealed), plaintext);
    }

    #[test]
    fn different_keys_produce_different_ciphertext() {
        let a = Sealer::new("key-a");
        let b = Sealer::new("key-b");
        assert_ne!(a.seal(b"same input"), b.seal(b"same input"));
    }
}
