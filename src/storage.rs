use crate::chunk::{Chunk, ContentId};
use crate::error::{DdsError, Result};
use crate::manifest::Manifest;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

/// Content-addressed persistence for chunks and manifests.
///
/// Stores are idempotent: writing an id that is already present is a
/// successful no-op, since equal ids imply equal bytes. Nothing is ever
/// evicted by the store itself.
pub trait StorageBackend: Send + Sync {
    fn store_chunk(&self, chunk: &Chunk) -> Result<()>;

    fn get_chunk(&self, id: &str) -> Result<Chunk>;

    fn store_manifest(&self, manifest: &Manifest) -> Result<()>;

    fn get_manifest(&self, id: &str) -> Result<Manifest>;

    fn has_chunk(&self, id: &str) -> bool {
        self.get_chunk(id).is_ok()
    }

    fn has_manifest(&self, id: &str) -> bool {
        self.get_manifest(id).is_ok()
    }
}

/// In-memory store, one per node.
#[derive(Default)]
pub struct MemoryStorage {
    chunks: RwLock<HashMap<ContentId, Chunk>>,
    manifests: RwLock<HashMap<ContentId, Manifest>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn manifest_count(&self) -> usize {
        self.manifests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl StorageBackend for MemoryStorage {
    fn store_chunk(&self, chunk: &Chunk) -> Result<()> {
        if !chunk.verify() {
            return Err(DdsError::Corruption(format!(
                "refusing chunk whose data does not hash to {}",
                chunk.id
            )));
        }
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(chunk.id.clone())
            .or_insert_with(|| chunk.clone());
        Ok(())
    }

    fn get_chunk(&self, id: &str) -> Result<Chunk> {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| DdsError::ChunkNotFound(id.into()))
    }

    fn store_manifest(&self, manifest: &Manifest) -> Result<()> {
        if !manifest.verify() {
            return Err(DdsError::Corruption(format!(
                "refusing manifest whose fields do not hash to {}",
                manifest.id
            )));
        }
        self.manifests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(manifest.id.clone())
            .or_insert_with(|| manifest.clone());
        Ok(())
    }

    fn get_manifest(&self, id: &str) -> Result<Manifest> {
        self.manifests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| DdsError::ManifestNotFound(id.into()))
    }

    fn has_chunk(&self, id: &str) -> bool {
        self.chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    fn has_manifest(&self, id: &str) -> bool {
        self.manifests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }
}

/// On-disk store.
///
/// Chunks are LZ4-compressed files under `chunks/<prefix>/<id>`, manifests
/// are JSON under `manifests/<prefix>/<id>.json`. Every first write of an id
/// is recorded in `log/append.jsonl`.
pub struct FsStorage {
    dir: PathBuf,
}

/// One line of the append log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: u64,
    pub kind: ObjectKind,
    pub id: ContentId,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Chunk,
    Manifest,
}

impl FsStorage {
    /// Open or create a store at the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir.join("chunks"))?;
        fs::create_dir_all(dir.join("manifests"))?;
        fs::create_dir_all(dir.join("log"))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn chunk_count(&self) -> Result<usize> {
        count_files(&self.dir.join("chunks"))
    }

    pub fn manifest_count(&self) -> Result<usize> {
        count_files(&self.dir.join("manifests"))
    }

    /// Total bytes used by chunk files (compressed).
    pub fn disk_usage(&self) -> Result<u64> {
        let mut total = 0u64;
        for prefix in fs::read_dir(self.dir.join("chunks"))? {
            for entry in fs::read_dir(prefix?.path())? {
                total += entry?.metadata()?.len();
            }
        }
        Ok(total)
    }

    /// Every logged write, oldest first.
    pub fn log_entries(&self) -> Result<Vec<LogEntry>> {
        let path = self.log_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        fs::read_to_string(path)?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(DdsError::from))
            .collect()
    }

    fn chunk_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self.dir.join("chunks").join(prefix(id)?).join(id))
    }

    fn manifest_path(&self, id: &str) -> Result<PathBuf> {
        Ok(self
            .dir
            .join("manifests")
            .join(prefix(id)?)
            .join(format!("{}.json", id)))
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join("log").join("append.jsonl")
    }

    fn write_object(&self, path: &Path, bytes: &[u8], kind: ObjectKind, id: &str) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, bytes)?;
        self.append_log(kind, id)
    }

    fn append_log(&self, kind: ObjectKind, id: &str) -> Result<()> {
        let entry = LogEntry {
            sequence: self.next_sequence()?,
            kind,
            id: id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        f.write_all(line.as_bytes())?;
        Ok(())
    }

    fn next_sequence(&self) -> Result<u64> {
        let path = self.log_path();
        if !path.exists() {
            return Ok(1);
        }
        Ok(fs::read_to_string(path)?.lines().count() as u64 + 1)
    }
}

impl StorageBackend for FsStorage {
    fn store_chunk(&self, chunk: &Chunk) -> Result<()> {
        if !chunk.verify() {
            return Err(DdsError::Corruption(format!(
                "refusing chunk whose data does not hash to {}",
                chunk.id
            )));
        }
        let path = self.chunk_path(&chunk.id)?;
        let packed = compress_prepend_size(&chunk.data);
        self.write_object(&path, &packed, ObjectKind::Chunk, &chunk.id)
    }

    fn get_chunk(&self, id: &str) -> Result<Chunk> {
        let path = self.chunk_path(id)?;
        if !path.exists() {
            return Err(DdsError::ChunkNotFound(id.into()));
        }
        let data = decompress_size_prepended(&fs::read(&path)?)
            .map_err(|e| DdsError::Corruption(format!("chunk {} unreadable: {}", id, e)))?;
        let chunk = Chunk {
            id: id.to_string(),
            data,
        };
        if !chunk.verify() {
            return Err(DdsError::Corruption(format!(
                "chunk integrity check failed: {}",
                id
            )));
        }
        Ok(chunk)
    }

    fn store_manifest(&self, manifest: &Manifest) -> Result<()> {
        if !manifest.verify() {
            return Err(DdsError::Corruption(format!(
                "refusing manifest whose fields do not hash to {}",
                manifest.id
            )));
        }
        let path = self.manifest_path(&manifest.id)?;
        let data = serde_json::to_vec_pretty(manifest)?;
        self.write_object(&path, &data, ObjectKind::Manifest, &manifest.id)
    }

    fn get_manifest(&self, id: &str) -> Result<Manifest> {
        let path = self.manifest_path(id)?;
        if !path.exists() {
            return Err(DdsError::ManifestNotFound(id.into()));
        }
        let manifest: Manifest = serde_json::from_slice(&fs::read(&path)?)?;
        if manifest.id != id || !manifest.verify() {
            return Err(DdsError::Corruption(format!(
                "manifest integrity check failed: {}",
                id
            )));
        }
        Ok(manifest)
    }

    fn has_chunk(&self, id: &str) -> bool {
        self.chunk_path(id).map(|p| p.exists()).unwrap_or(false)
    }

    fn has_manifest(&self, id: &str) -> bool {
        self.manifest_path(id).map(|p| p.exists()).unwrap_or(false)
    }
}

/// First two hex characters of an id, used as a directory fan-out (like git).
fn prefix(id: &str) -> Result<&str> {
    if id.len() < 2 || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(DdsError::MalformedInput(format!(
            "not a content id: {:?}",
            id
        )));
    }
    Ok(&id[..2])
}

fn count_files(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for prefix in fs::read_dir(dir)? {
        count += fs::read_dir(prefix?.path())?.count();
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunker;

    fn sample() -> (Vec<Chunk>, Manifest) {
        let chunker = Chunker::new(4).unwrap();
        let data = b"content addressed bytes";
        let chunks = chunker.chunk_content(data);
        let manifest = chunker.generate_manifest(&chunks, data, None).unwrap();
        (chunks, manifest)
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStorage::new();
        let (chunks, manifest) = sample();
        for c in &chunks {
            store.store_chunk(c).unwrap();
        }
        store.store_manifest(&manifest).unwrap();

        assert_eq!(store.get_chunk(&chunks[0].id).unwrap(), chunks[0]);
        assert_eq!(store.get_manifest(&manifest.id).unwrap(), manifest);
        assert!(store.has_manifest(&manifest.id));
    }

    #[test]
    fn memory_store_is_idempotent() {
        let store = MemoryStorage::new();
        let chunk = Chunk::new(b"same".to_vec());
        store.store_chunk(&chunk).unwrap();
        store.store_chunk(&chunk).unwrap();
        assert_eq!(store.chunk_count(), 1);
    }

    #[test]
    fn missing_ids_are_not_found() {
        let store = MemoryStorage::new();
        assert!(matches!(
            store.get_chunk("ab"),
            Err(DdsError::ChunkNotFound(_))
        ));
        assert!(matches!(
            store.get_manifest("ab"),
            Err(DdsError::ManifestNotFound(_))
        ));
    }

    #[test]
    fn mislabelled_chunk_is_refused() {
        let store = MemoryStorage::new();
        let mut chunk = Chunk::new(b"honest".to_vec());
        chunk.data = b"forged".to_vec();
        assert!(store.store_chunk(&chunk).is_err());
        assert_eq!(store.chunk_count(), 0);
    }

    #[test]
    fn fs_store_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStorage::open(tmp.path()).unwrap();
        let (chunks, manifest) = sample();
        for c in &chunks {
            store.store_chunk(c).unwrap();
        }
        store.store_manifest(&manifest).unwrap();

        let reopened = FsStorage::open(tmp.path()).unwrap();
        for c in &chunks {
            assert_eq!(reopened.get_chunk(&c.id).unwrap().data, c.data);
        }
        assert_eq!(reopened.get_manifest(&manifest.id).unwrap(), manifest);
    }

    #[test]
    fn fs_store_dedups_and_logs_first_write_only() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStorage::open(tmp.path()).unwrap();
        let chunk = Chunk::new(b"same data".to_vec());
        store.store_chunk(&chunk).unwrap();
        store.store_chunk(&chunk).unwrap();

        assert_eq!(store.chunk_count().unwrap(), 1);
        let log = store.log_entries().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].sequence, 1);
        assert_eq!(log[0].kind, ObjectKind::Chunk);
        assert_eq!(log[0].id, chunk.id);
    }

    #[test]
    fn fs_store_detects_tampered_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStorage::open(tmp.path()).unwrap();
        let chunk = Chunk::new(b"original".to_vec());
        store.store_chunk(&chunk).unwrap();

        let path = store.chunk_path(&chunk.id).unwrap();
        fs::write(&path, compress_prepend_size(b"tampered")).unwrap();
        assert!(matches!(
            store.get_chunk(&chunk.id),
            Err(DdsError::Corruption(_))
        ));
    }

    #[test]
    fn fs_store_rejects_path_like_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FsStorage::open(tmp.path()).unwrap();
        assert!(matches!(
            store.get_chunk("../etc"),
            Err(DdsError::MalformedInput(_))
        ));
    }
}
