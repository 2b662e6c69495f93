use crate::chunk::{compute_hash, ContentId};
use serde::{Deserialize, Serialize};

/// Reassembly recipe for a piece of published content.
///
/// The manifest id is derived from the ordered chunk ids and the total
/// size, never from the raw bytes, so it can be checked without reading
/// any chunk. A content update yields a new manifest; manifests are never
/// edited in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub id: ContentId,
    pub chunk_ids: Vec<ContentId>,
    pub total_size: u64,
    pub original_content_hash: ContentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl Manifest {
    pub fn new(
        chunk_ids: Vec<ContentId>,
        total_size: u64,
        original_content_hash: ContentId,
        content_type: Option<String>,
    ) -> Self {
        let id = Self::compute_id(&chunk_ids, total_size, content_type.as_deref());
        Self {
            id,
            chunk_ids,
            total_size,
            original_content_hash,
            content_type,
        }
    }

    /// Hash over the ordered chunk ids, the size and the optional type tag.
    pub fn compute_id(
        chunk_ids: &[ContentId],
        total_size: u64,
        content_type: Option<&str>,
    ) -> ContentId {
        let mut payload = String::with_capacity(chunk_ids.len() * 65 + 32);
        for id in chunk_ids {
            payload.push_str(id);
            payload.push('\n');
        }
        payload.push_str(&format!("size:{}", total_size));
        if let Some(kind) = content_type {
            payload.push_str(&format!("\ntype:{}", kind));
        }
        compute_hash(payload.as_bytes())
    }

    /// Recompute the id from the recorded fields.
    pub fn verify(&self) -> bool {
        Self::compute_id(&self.chunk_ids, self.total_size, self.content_type.as_deref()) == self.id
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_ids.len()
    }
}
