//! Ingestion orchestration.
//!
//! Ties the pipeline together: ensure the knowledge base scaffold, land the
//! input files (upload set or repository clone) in the source tree, chunk
//! their text, and hand the chunks to the vector index. Each call returns
//! the number of chunks indexed.
//!
//! Writes against one knowledge base are serialized through [`KbLocks`]
//! so concurrent ingestion calls for the same name cannot interleave.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::chunk::chunk;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::kb::KnowledgeBaseStore;
use crate::repo::{CloneRequest, RepositoryAcquirer};
use crate::vectorstore::{DocChunk, VectorIndex};

/// File extensions accepted into a knowledge base. Anything else is
/// skipped silently, both for uploads and cloned repositories.
pub const SUPPORTED_EXTS: &[&str] = &["txt", "md", "py", "java", "sql", "json", "csv"];

/// Whether a path's extension is in the supported set (case-insensitive).
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SUPPORTED_EXTS.contains(&e.as_str()))
}

/// An uploaded file: its (possibly nested) relative name and raw bytes.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content: Vec<u8>,
}

/// Per-knowledge-base write serialization. Two concurrent ingestion calls
/// for the same name queue behind one async mutex; different names do not
/// contend.
#[derive(Default)]
pub struct KbLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KbLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, name: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("lock registry poisoned");
            map.entry(name.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Save an upload set into the knowledge base and index its chunks.
/// Unsupported file types are skipped, not errors. Returns the number of
/// chunks indexed.
pub async fn ingest_files(
    config: &Config,
    locks: &KbLocks,
    name: &str,
    files: &[UploadFile],
) -> Result<usize> {
    let _guard = locks.acquire(name).await;

    let store = KnowledgeBaseStore::new(config);
    store.ensure(name)?;
    let source_dir = store.source_dir(name);

    let mut saved = Vec::new();
    for file in files {
        let relative = Path::new(&file.name);
        // Names that escape the source tree are skipped like any other
        // unsupported input.
        if relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            tracing::warn!(file = %file.name, "skipping upload with non-relative name");
            continue;
        }
        if !is_supported(relative) {
            continue;
        }

        let target = source_dir.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Directory(format!("create {}: {}", parent.display(), e)))?;
        }
        std::fs::write(&target, &file.content)
            .map_err(|e| Error::Directory(format!("write {}: {}", target.display(), e)))?;
        saved.push(target);
    }

    let count = index_documents(config, &source_dir, &store.vector_dir(name), &saved).await?;
    tracing::info!(kb = name, files = saved.len(), chunks = count, "ingested upload set");
    Ok(count)
}

/// Clone a repository into the knowledge base and index its chunks.
/// Returns the number of chunks indexed.
pub async fn ingest_repository(
    config: &Config,
    locks: &KbLocks,
    name: &str,
    req: &CloneRequest,
) -> Result<usize> {
    let _guard = locks.acquire(name).await;

    let store = KnowledgeBaseStore::new(config);
    store.ensure(name)?;
    let source_dir = store.source_dir(name);

    let acquirer = RepositoryAcquirer::new(&config.git);
    let saved = acquirer
        .fetch_into(&store.kb_root(name), &source_dir, req)
        .await?;

    let count = index_documents(config, &source_dir, &store.vector_dir(name), &saved).await?;
    tracing::info!(kb = name, url = %req.url, files = saved.len(), chunks = count, "ingested repository");
    Ok(count)
}

/// Read, chunk, and index the given files. Unreadable files are skipped;
/// file bytes are decoded lossily so mixed encodings cannot abort a run.
/// Chunk metadata records the path relative to the source dir.
async fn index_documents(
    config: &Config,
    source_dir: &Path,
    vector_dir: &Path,
    paths: &[std::path::PathBuf],
) -> Result<usize> {
    let mut chunks: Vec<DocChunk> = Vec::new();
    for path in paths {
        let Ok(bytes) = std::fs::read(path) else {
            continue;
        };
        let content = String::from_utf8_lossy(&bytes);
        let source = path
            .strip_prefix(source_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();
        for text in chunk(&content) {
            chunks.push(DocChunk {
                text,
                source: source.clone(),
            });
        }
    }

    VectorIndex::new(config).add(vector_dir, &chunks).await?;
    Ok(chunks.len())
}
