//! Model runtime abstraction.
//!
//! The router depends on a callable runtime surface instead of a concrete
//! client; implementations are `OllamaRuntime` (real API) and `MockRuntime`
//! (scripted responses and failure injection for tests).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{HubError, HubResult};

/// One locally available model as reported by the runtime.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub modified_at: String,
}

/// Chat role for multi-turn requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One chat turn.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling knobs passed through to the runtime.
#[derive(Clone, Debug, Default)]
pub struct GenerateOptions {
    pub temperature: Option<f32>,
    pub num_predict: Option<i32>,
}

/// Runtime reply with the token counters the runtime reports, when any.
#[derive(Clone, Debug)]
pub struct RuntimeReply {
    pub text: String,
    pub prompt_eval_count: Option<u64>,
    pub eval_count: Option<u64>,
}

impl RuntimeReply {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            prompt_eval_count: None,
            eval_count: None,
        }
    }
}

/// Local model runtime: chat, completion, embeddings, vision, and model
/// management.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> HubResult<RuntimeReply>;

    async fn chat(
        &self,
        model: &str,
        turns: &[ChatTurn],
        opts: &GenerateOptions,
    ) -> HubResult<RuntimeReply>;

    async fn embed(&self, model: &str, text: &str) -> HubResult<Vec<f32>>;

    /// Vision request: prompt plus one base64-encoded image.
    async fn vision(
        &self,
        model: &str,
        prompt: &str,
        image_base64: &str,
    ) -> HubResult<RuntimeReply>;

    async fn list_models(&self) -> HubResult<Vec<ModelEntry>>;

    async fn model_info(&self, model: &str) -> HubResult<serde_json::Value>;

    /// Idempotent pull of a model into the local inventory.
    async fn pull(&self, model: &str) -> HubResult<()>;
}

/// Scripted runtime for tests: a fixed inventory, canned replies per model,
/// and an injectable number of leading failures.
pub struct MockRuntime {
    models: Mutex<Vec<ModelEntry>>,
    replies: Mutex<HashMap<String, String>>,
    fail_first: AtomicUsize,
    pub calls: AtomicUsize,
    pub list_calls: AtomicUsize,
}

impl MockRuntime {
    pub fn new(model_names: &[&str]) -> Self {
        let models = model_names
            .iter()
            .map(|name| ModelEntry {
                name: name.to_string(),
                size: 1,
                digest: None,
                modified_at: crate::clock::utc_now_iso(),
            })
            .collect();
        Self {
            models: Mutex::new(models),
            replies: Mutex::new(HashMap::new()),
            fail_first: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Scripts the reply for one model; unscripted models echo the prompt.
    pub fn with_reply(self, model: &str, reply: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(model.to_string(), reply.to_string());
        self
    }

    /// Makes the next `n` invocations fail with a retryable error.
    pub fn fail_next(&self, n: usize) {
        self.fail_first.store(n, Ordering::SeqCst);
    }

    fn invoke(&self, model: &str, prompt: &str) -> HubResult<RuntimeReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(HubError::BackendUnavailable(
                "mock: connection refused".into(),
            ));
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(model)
            .cloned()
            .unwrap_or_else(|| format!("echo: {}", prompt));
        Ok(RuntimeReply {
            text: reply,
            prompt_eval_count: Some(prompt.len() as u64),
            eval_count: Some(8),
        })
    }
}

#[async_trait]
impl ModelRuntime for MockRuntime {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        _opts: &GenerateOptions,
    ) -> HubResult<RuntimeReply> {
        self.invoke(model, prompt)
    }

    async fn chat(
        &self,
        model: &str,
        turns: &[ChatTurn],
        _opts: &GenerateOptions,
    ) -> HubResult<RuntimeReply> {
        let prompt = turns.last().map(|t| t.content.as_str()).unwrap_or("");
        self.invoke(model, prompt)
    }

    async fn embed(&self, _model: &str, text: &str) -> HubResult<Vec<f32>> {
        Ok(vec![text.len() as f32, 0.5, 0.25])
    }

    async fn vision(
        &self,
        model: &str,
        prompt: &str,
        _image_base64: &str,
    ) -> HubResult<RuntimeReply> {
        self.invoke(model, prompt)
    }

    async fn list_models(&self) -> HubResult<Vec<ModelEntry>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.models.lock().unwrap().clone())
    }

    async fn model_info(&self, model: &str) -> HubResult<serde_json::Value> {
        let known = self
            .models
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.name == model);
        if known {
            Ok(serde_json::json!({ "name": model, "format": "mock" }))
        } else {
            Err(HubError::NotFound(format!("model {}", model)))
        }
    }

    async fn pull(&self, model: &str) -> HubResult<()> {
        let mut models = self.models.lock().unwrap();
        if !models.iter().any(|m| m.name == model) {
            models.push(ModelEntry {
                name: model.to_string(),
                size: 1,
                digest: None,
                modified_at: crate::clock::utc_now_iso(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: scripted replies come back for their model; others echo.
    #[tokio::test]
    async fn scripted_and_echo_replies() {
        let rt = MockRuntime::new(&["a"]).with_reply("a", "canned");
        let opts = GenerateOptions::default();
        assert_eq!(rt.generate("a", "x", &opts).await.unwrap().text, "canned");
        assert_eq!(rt.generate("b", "x", &opts).await.unwrap().text, "echo: x");
    }

    /// **Scenario**: fail_next injects exactly n retryable failures.
    #[tokio::test]
    async fn failure_injection() {
        let rt = MockRuntime::new(&["a"]);
        rt.fail_next(2);
        let opts = GenerateOptions::default();
        assert!(rt.generate("a", "x", &opts).await.is_err());
        assert!(rt.generate("a", "x", &opts).await.is_err());
        assert!(rt.generate("a", "x", &opts).await.is_ok());
    }

    /// **Scenario**: pull is idempotent.
    #[tokio::test]
    async fn pull_idempotent() {
        let rt = MockRuntime::new(&[]);
        rt.pull("m").await.unwrap();
        rt.pull("m").await.unwrap();
        assert_eq!(rt.list_models().await.unwrap().len(), 1);
    }
}
