use thiserror::Error;

#[derive(Error, Debug)]
pub enum DdsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Chunk not found: {0}")]
    ChunkNotFound(String),

    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),

    #[error("Content unavailable: no peer advertises {0}")]
    ContentUnavailable(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Chain linkage error: {0}")]
    ChainLinkage(String),

    #[error("Corruption: {0}")]
    Corruption(String),

    #[error("Transport error from peer {peer}: {reason}")]
    Transport { peer: String, reason: String },

    #[error("Unhandled {kind} request for {id} at peer {peer}")]
    UnhandledRequest {
        peer: String,
        kind: String,
        id: String,
    },

    #[error("All {} peer(s) failed to supply {id}: {}", .failures.len(), .failures.join("; "))]
    AllPeersFailed { id: String, failures: Vec<String> },

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Content {content_id} stored locally but not advertised: {reason}")]
    Advertise { content_id: String, reason: String },

    #[error("Block not found at index {0}")]
    BlockNotFound(u64),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),
}

impl DdsError {
    /// True for absence errors that another source may still satisfy.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DdsError::ChunkNotFound(_)
                | DdsError::ManifestNotFound(_)
                | DdsError::ContentUnavailable(_)
                | DdsError::AllPeersFailed { .. }
        )
    }

    /// True for failures a retrieval loop may fall back over.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DdsError::ChunkNotFound(_)
                | DdsError::ManifestNotFound(_)
                | DdsError::Transport { .. }
                | DdsError::UnhandledRequest { .. }
                | DdsError::Corruption(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DdsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_error_lists_failures() {
        let err = DdsError::AllPeersFailed {
            id: "abc".into(),
            failures: vec!["p1: timeout".into(), "p2: missing chunk".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("All 2 peer(s)"));
        assert!(msg.contains("p2: missing chunk"));
        assert!(err.is_not_found());
    }

    #[test]
    fn integrity_errors_are_not_recoverable() {
        assert!(!DdsError::InvalidSignature("bad".into()).is_recoverable());
        assert!(!DdsError::ChainLinkage("gap".into()).is_recoverable());
        assert!(DdsError::Transport {
            peer: "p".into(),
            reason: "down".into()
        }
        .is_recoverable());
    }
}
