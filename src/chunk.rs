use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 hash as hex string, used to address chunks and manifests.
pub type ContentId = String;

/// A content-addressed slice of published data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: ContentId,
    pub data: Vec<u8>,
}

impl Chunk {
    /// Create a chunk from raw bytes; the id is computed from them.
    pub fn new(data: Vec<u8>) -> Self {
        let id = compute_hash(&data);
        Self { id, data }
    }

    /// Check that the id still names the bytes.
    pub fn verify(&self) -> bool {
        compute_hash(&self.data) == self.id
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Compute the SHA-256 hex digest of some data.
pub fn compute_hash(data: &[u8]) -> ContentId {
    hex::encode(hash_bytes(data))
}

/// Raw SHA-256 digest, for signing paths that need bytes rather than hex.
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_bytes_share_an_id() {
        let a = Chunk::new(b"decentralized".to_vec());
        let b = Chunk::new(b"decentralized".to_vec());
        assert_eq!(a.id, b.id);
        assert!(a.verify());
    }

    #[test]
    fn id_is_hex_sha256() {
        // sha256("abc")
        assert_eq!(
            compute_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn tampered_chunk_fails_verify() {
        let mut c = Chunk::new(b"original".to_vec());
        c.data[0] ^= 0xff;
        assert!(!c.verify());
    }
}
