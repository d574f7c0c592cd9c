//! Ollama-backed `ModelRuntime`.
//!
//! Every request runs under the configured deadline; driver failures are
//! classified into the hub taxonomy so the router can decide what to retry.

use std::time::Duration;

use async_trait::async_trait;
use ollama_rs::generation::chat::{request::ChatMessageRequest, ChatMessage};
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::generation::images::Image;
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;

use crate::error::{HubError, HubResult};
use crate::model::runtime::{
    ChatRole, ChatTurn, GenerateOptions, ModelEntry, ModelRuntime, RuntimeReply,
};

/// `ModelRuntime` over a local Ollama endpoint.
pub struct OllamaRuntime {
    client: Ollama,
    timeout: Duration,
}

impl OllamaRuntime {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        let base = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };
        Self {
            client: Ollama::new(base, port),
            timeout,
        }
    }

    fn options(opts: &GenerateOptions) -> Option<ModelOptions> {
        if opts.temperature.is_none() && opts.num_predict.is_none() {
            return None;
        }
        let mut options = ModelOptions::default();
        if let Some(t) = opts.temperature {
            options = options.temperature(t);
        }
        if let Some(n) = opts.num_predict {
            options = options.num_predict(n);
        }
        Some(options)
    }

    async fn bounded<T, F>(&self, what: &str, fut: F) -> HubResult<T>
    where
        F: std::future::Future<Output = Result<T, ollama_rs::error::OllamaError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(map_runtime_err(what, &e)),
            Err(_) => Err(HubError::Timeout(format!(
                "model runtime {} exceeded {:?}",
                what, self.timeout
            ))),
        }
    }

    async fn send_chat(
        &self,
        model: &str,
        messages: Vec<ChatMessage>,
        opts: &GenerateOptions,
    ) -> HubResult<RuntimeReply> {
        let mut request = ChatMessageRequest::new(model.to_string(), messages);
        if let Some(options) = Self::options(opts) {
            request = request.options(options);
        }
        let response = self
            .bounded("chat", self.client.send_chat_messages(request))
            .await?;
        let (prompt_eval_count, eval_count) = match &response.final_data {
            Some(data) => (
                Some(data.prompt_eval_count as u64),
                Some(data.eval_count as u64),
            ),
            None => (None, None),
        };
        Ok(RuntimeReply {
            text: response.message.content,
            prompt_eval_count,
            eval_count,
        })
    }
}

#[async_trait]
impl ModelRuntime for OllamaRuntime {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> HubResult<RuntimeReply> {
        self.send_chat(model, vec![ChatMessage::user(prompt.to_string())], opts)
            .await
    }

    async fn chat(
        &self,
        model: &str,
        turns: &[ChatTurn],
        opts: &GenerateOptions,
    ) -> HubResult<RuntimeReply> {
        let messages = turns
            .iter()
            .map(|t| match t.role {
                ChatRole::System => ChatMessage::system(t.content.clone()),
                ChatRole::User => ChatMessage::user(t.content.clone()),
                ChatRole::Assistant => ChatMessage::assistant(t.content.clone()),
            })
            .collect();
        self.send_chat(model, messages, opts).await
    }

    async fn embed(&self, model: &str, text: &str) -> HubResult<Vec<f32>> {
        let request = GenerateEmbeddingsRequest::new(
            model.to_string(),
            EmbeddingsInput::Single(text.to_string()),
        );
        let response = self
            .bounded("embed", self.client.generate_embeddings(request))
            .await?;
        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| HubError::Internal("runtime returned no embedding".into()))
    }

    async fn vision(
        &self,
        model: &str,
        prompt: &str,
        image_base64: &str,
    ) -> HubResult<RuntimeReply> {
        let message = ChatMessage::user(prompt.to_string())
            .with_images(vec![Image::from_base64(image_base64)]);
        self.send_chat(model, vec![message], &GenerateOptions::default())
            .await
    }

    async fn list_models(&self) -> HubResult<Vec<ModelEntry>> {
        let models = self
            .bounded("list", self.client.list_local_models())
            .await?;
        Ok(models
            .into_iter()
            .map(|m| ModelEntry {
                name: m.name,
                size: m.size,
                digest: None,
                modified_at: m.modified_at,
            })
            .collect())
    }

    async fn model_info(&self, model: &str) -> HubResult<serde_json::Value> {
        let info = self
            .bounded("info", self.client.show_model_info(model.to_string()))
            .await?;
        serde_json::to_value(info)
            .map_err(|e| HubError::Internal(format!("model info encode: {}", e)))
    }

    async fn pull(&self, model: &str) -> HubResult<()> {
        self.bounded("pull", self.client.pull_model(model.to_string(), false))
            .await?;
        Ok(())
    }
}

/// Classifies driver errors: connection-level failures are retryable
/// (`BackendUnavailable`/`Timeout`), missing models are `NotFound`, the rest
/// is `Internal`.
fn map_runtime_err(what: &str, e: &ollama_rs::error::OllamaError) -> HubError {
    let text = format!("model runtime {}: {}", what, e);
    let lowered = text.to_lowercase();
    if lowered.contains("timed out") || lowered.contains("timeout") {
        HubError::Timeout(text)
    } else if lowered.contains("connection refused")
        || lowered.contains("connection reset")
        || lowered.contains("connect error")
        || lowered.contains("error sending request")
        || lowered.contains("dns error")
    {
        HubError::BackendUnavailable(text)
    } else if lowered.contains("not found") {
        HubError::NotFound(text)
    } else {
        HubError::Internal(text)
    }
}
