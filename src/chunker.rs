use crate::chunk::{compute_hash, Chunk};
use crate::error::{DdsError, Result};
use crate::manifest::Manifest;

/// Default chunk size: 256 KiB
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Splits content into chunks of a fixed size.
///
/// Splitting is purely offset based: chunk `i` covers
/// `i * chunk_size .. min((i + 1) * chunk_size, len)`, so the last chunk may
/// be shorter and the same input always yields the same chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(DdsError::MalformedInput(
                "chunk size must be greater than zero".into(),
            ));
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split data into ordered chunks. Empty input yields no chunks.
    pub fn chunk_content(&self, data: &[u8]) -> Vec<Chunk> {
        data.chunks(self.chunk_size)
            .map(|piece| Chunk::new(piece.to_vec()))
            .collect()
    }

    /// Build the manifest describing `chunks` as a split of `original`.
    pub fn generate_manifest(
        &self,
        chunks: &[Chunk],
        original: &[u8],
        content_type: Option<String>,
    ) -> Result<Manifest> {
        let covered: usize = chunks.iter().map(Chunk::len).sum();
        if covered != original.len() {
            return Err(DdsError::MalformedInput(format!(
                "chunks cover {} bytes but original content has {}",
                covered,
                original.len()
            )));
        }
        let chunk_ids = chunks.iter().map(|c| c.id.clone()).collect();
        Ok(Manifest::new(
            chunk_ids,
            original.len() as u64,
            compute_hash(original),
            content_type,
        ))
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Concatenate chunks in manifest order and check the result.
///
/// `chunks` must be positionally aligned with `manifest.chunk_ids`. Every
/// chunk must hash to its id, and the output must match the manifest's
/// size and original content hash.
pub fn reassemble(manifest: &Manifest, chunks: &[Chunk]) -> Result<Vec<u8>> {
    if chunks.len() != manifest.chunk_ids.len() {
        return Err(DdsError::Corruption(format!(
            "manifest {} lists {} chunks, got {}",
            manifest.id,
            manifest.chunk_ids.len(),
            chunks.len()
        )));
    }

    for (expected, chunk) in manifest.chunk_ids.iter().zip(chunks) {
        if &chunk.id != expected || !chunk.verify() {
            return Err(DdsError::Corruption(format!(
                "chunk {} does not match manifest entry {}",
                chunk.id, expected
            )));
        }
    }

    // total_size is untrusted until it agrees with the chunks we hold.
    let covered: usize = chunks.iter().map(Chunk::len).sum();
    if covered as u64 != manifest.total_size {
        return Err(DdsError::Corruption(format!(
            "chunks hold {} bytes, manifest {} declares {}",
            covered, manifest.id, manifest.total_size
        )));
    }

    let mut data = Vec::with_capacity(covered);
    for chunk in chunks {
        data.extend_from_slice(&chunk.data);
    }
    if compute_hash(&data) != manifest.original_content_hash {
        return Err(DdsError::Corruption(format!(
            "reassembled content hash mismatch for manifest {}",
            manifest.id
        )));
    }
    Ok(data)
}
