//! Knowledge base identity and lifecycle.
//!
//! A knowledge base named `n` owns two directory trees under the data root:
//! `kb/<n>/source` (raw ingested files, mirroring their original layout)
//! and `vectorstore/<n>` (persisted index state). The two exist together or
//! not at all: [`KnowledgeBaseStore::delete`] only reports success once both
//! are gone. The store keeps no in-memory state, so it is always consistent
//! with the filesystem at call time.

use std::path::PathBuf;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fsutil;

pub struct KnowledgeBaseStore {
    data_dir: PathBuf,
}

impl KnowledgeBaseStore {
    pub fn new(config: &Config) -> Self {
        Self {
            data_dir: config.storage.data_dir.clone(),
        }
    }

    /// Root of one knowledge base: `<data_dir>/kb/<name>`.
    pub fn kb_root(&self, name: &str) -> PathBuf {
        self.data_dir.join("kb").join(name)
    }

    /// Raw ingested files: `<data_dir>/kb/<name>/source`.
    pub fn source_dir(&self, name: &str) -> PathBuf {
        self.kb_root(name).join("source")
    }

    /// Persisted index state: `<data_dir>/vectorstore/<name>`.
    pub fn vector_dir(&self, name: &str) -> PathBuf {
        self.data_dir.join("vectorstore").join(name)
    }

    /// Idempotently create both directories for `name`.
    pub fn ensure(&self, name: &str) -> Result<()> {
        for dir in [self.source_dir(name), self.vector_dir(name)] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| Error::Directory(format!("create {}: {}", dir.display(), e)))?;
        }
        Ok(())
    }

    /// All knowledge base names, sorted. Empty when the root is missing.
    pub fn list(&self) -> Result<Vec<String>> {
        let base = self.data_dir.join("kb");
        if !base.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&base)
            .map_err(|e| Error::Directory(format!("read {}: {}", base.display(), e)))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry =
                entry.map_err(|e| Error::Directory(format!("read {}: {}", base.display(), e)))?;
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove both directories for `name`.
    ///
    /// Tolerates filesystems that deny deletion of in-use or read-only
    /// entries by escalating through permission relaxation and an external
    /// forced-removal command. Returns `true` only when both trees are
    /// verifiably gone; a missing knowledge base deletes trivially.
    pub fn delete(&self, name: &str) -> bool {
        let root = self.kb_root(name);
        let vectors = self.vector_dir(name);

        if !root.exists() && !vectors.exists() {
            return true;
        }

        let root_gone = fsutil::remove_tree(&root);
        let vectors_gone = fsutil::remove_tree(&vectors);
        if !root_gone || !vectors_gone {
            tracing::error!(kb = name, "failed to delete knowledge base completely");
        }
        root_gone && vectors_gone
    }
}
