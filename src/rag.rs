//! Retrieval-augmented answering.
//!
//! Retrieves the chunks nearest to a question, renders them into a numbered
//! context block, and asks the generation service to answer strictly from
//! that context. The generation call is a single attempt: retry policy
//! belongs to the caller or the generation client, not this layer.

use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::vectorstore::{ScoredChunk, VectorIndex};

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the provided context to answer the \
     question. Cite sources as file paths if relevant. If the answer is not \
     in the context, say you don't know.";

/// Longest snippet echoed back in the source list.
const SNIPPET_CHARS: usize = 300;

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    fn user(content: String) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }
}

/// A citation accompanying an answer: the chunk's source path and a short
/// excerpt, in retrieval order.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

/// Thin client for the generation service (Ollama `/api/chat`).
pub struct ChatClient {
    base_url: String,
    model: String,
    timeout: Duration,
}

impl ChatClient {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.ollama.base_url.trim_end_matches('/').to_string(),
            model: config.ollama.chat_model.clone(),
            timeout: Duration::from_secs(config.ollama.request_timeout_secs),
        }
    }

    /// Send the prompt and extract the plain-text reply.
    pub async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::GenerationFailed(e.to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": 0.2 },
        });

        let response = client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                Error::GenerationFailed(format!(
                    "generation connection error (is Ollama running at {}?): {}",
                    self.base_url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::GenerationFailed(format!(
                "generation API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::GenerationFailed(e.to_string()))?;
        json.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                Error::GenerationFailed("invalid chat response: missing message content".to_string())
            })
    }
}

/// Answer `question` from the knowledge base whose index lives at
/// `vector_dir`. Returns the generated text plus the retrieved sources in
/// descending-score order. An empty index produces an answer grounded in an
/// empty context block, not an error.
pub async fn answer(
    config: &Config,
    vector_dir: &Path,
    question: &str,
    top_k: usize,
) -> Result<Answer> {
    let index = VectorIndex::new(config);
    let hits = index.search(vector_dir, question, top_k).await?;

    let context = render_context(&hits);
    let messages = [
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!("Context:\n{}\n\nQuestion: {}", context, question)),
    ];

    let text = ChatClient::new(config).generate(&messages).await?;

    let sources = hits
        .iter()
        .map(|hit| SourceRef {
            source: hit.source.clone(),
            snippet: truncate_chars(&hit.text, SNIPPET_CHARS),
        })
        .collect();

    Ok(Answer { text, sources })
}

/// Render retrieved chunks as `[i] (source)\n<text>`, blank-line separated,
/// best match first.
fn render_context(hits: &[ScoredChunk]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("[{}] ({})\n{}", i + 1, hit.source, hit.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
