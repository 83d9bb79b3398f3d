use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration. Loaded once at startup and passed by
/// reference into each component; there is no process-wide singleton.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root under which `kb/<name>/source` and `vectorstore/<name>` live.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Deserialize, Clone)]
pub struct OllamaConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used to embed chunks and queries. Must stay the same for the
    /// lifetime of a collection; see the model stamp in the vector index.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Model used for answer generation.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_embed_retries")]
    pub embed_max_retries: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            request_timeout_secs: default_request_timeout(),
            embed_max_retries: default_embed_retries(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}
fn default_chat_model() -> String {
    "deepseek-r1:1.5b".to_string()
}
fn default_request_timeout() -> u64 {
    120
}
fn default_embed_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConfig {
    /// Upper bound for a single clone attempt; the child process is killed
    /// when it expires and the attempt counts as recoverable.
    #[serde(default = "default_clone_timeout")]
    pub clone_timeout_secs: u64,
    /// Bound for the `ls-remote` reachability probe of mirror candidates.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_retry_base")]
    pub retry_base_secs: f64,
    #[serde(default = "default_retry_max")]
    pub retry_max_secs: f64,
    /// Mirror prefixes substituted for `https://github.com/`, tried in
    /// order. Empty disables URL acceleration.
    #[serde(default)]
    pub accelerators: Vec<String>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            clone_timeout_secs: default_clone_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            retry_base_secs: default_retry_base(),
            retry_max_secs: default_retry_max(),
            accelerators: Vec::new(),
        }
    }
}

fn default_clone_timeout() -> u64 {
    300
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_retry_base() -> f64 {
    2.0
}
fn default_retry_max() -> f64 {
    60.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default number of chunks retrieved per query when the caller does
    /// not specify one.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.ollama.embedding_model.trim().is_empty() {
        anyhow::bail!("ollama.embedding_model must not be empty");
    }
    if config.ollama.chat_model.trim().is_empty() {
        anyhow::bail!("ollama.chat_model must not be empty");
    }
    if config.ollama.request_timeout_secs == 0 {
        anyhow::bail!("ollama.request_timeout_secs must be > 0");
    }
    if config.git.clone_timeout_secs == 0 {
        anyhow::bail!("git.clone_timeout_secs must be > 0");
    }
    if config.git.connect_timeout_secs == 0 {
        anyhow::bail!("git.connect_timeout_secs must be > 0");
    }
    if config.git.retry_base_secs < 0.0 || config.git.retry_max_secs < config.git.retry_base_secs {
        anyhow::bail!("git retry delays must satisfy 0 <= retry_base_secs <= retry_max_secs");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"").unwrap();
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.retrieval.top_k, 4);
        assert!(config.git.accelerators.is_empty());
    }

    #[test]
    fn rejects_zero_timeouts() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"[git]\nclone_timeout_secs = 0\n").unwrap();
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn rejects_empty_model() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"[ollama]\nembedding_model = \"\"\n").unwrap();
        assert!(load_config(f.path()).is_err());
    }
}
