//! Task-class routing with availability probing, fallback, and bounded
//! exponential retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::error::{HubError, HubResult};
use crate::model::inventory::InventoryCache;
use crate::model::runtime::{ChatTurn, GenerateOptions, ModelRuntime, RuntimeReply};

/// Classes a request can be routed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskClass {
    Reasoning,
    Coding,
    Vision,
    Chat,
    Embedding,
    General,
}

impl TaskClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskClass::Reasoning => "reasoning",
            TaskClass::Coding => "coding",
            TaskClass::Vision => "vision",
            TaskClass::Chat => "chat",
            TaskClass::Embedding => "embedding",
            TaskClass::General => "general",
        }
    }
}

impl std::str::FromStr for TaskClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reasoning" => Ok(TaskClass::Reasoning),
            "coding" => Ok(TaskClass::Coding),
            "vision" => Ok(TaskClass::Vision),
            "chat" => Ok(TaskClass::Chat),
            "embedding" => Ok(TaskClass::Embedding),
            "general" => Ok(TaskClass::General),
            _ => Err(format!("unknown task class: {}", s)),
        }
    }
}

/// Class-to-model table plus the shared fallback.
#[derive(Clone, Debug)]
pub struct RoutingTable {
    map: HashMap<TaskClass, String>,
    pub fallback: String,
}

impl RoutingTable {
    pub fn new(map: HashMap<TaskClass, String>, fallback: impl Into<String>) -> Self {
        Self {
            map,
            fallback: fallback.into(),
        }
    }

    pub fn primary(&self, class: TaskClass) -> &str {
        self.map
            .get(&class)
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }

    pub fn set(&mut self, class: TaskClass, model: impl Into<String>) {
        self.map.insert(class, model.into());
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert(TaskClass::Reasoning, "qwq".to_string());
        map.insert(TaskClass::Coding, "qwen2.5-coder".to_string());
        map.insert(TaskClass::Vision, "llama3.2-vision".to_string());
        map.insert(TaskClass::Chat, "llama3.1".to_string());
        map.insert(TaskClass::Embedding, "nomic-embed-text".to_string());
        map.insert(TaskClass::General, "llama3.1".to_string());
        Self {
            map,
            fallback: "llama3.1".to_string(),
        }
    }
}

/// Per-call routing options.
#[derive(Clone, Debug, Default)]
pub struct RouteOptions {
    /// Explicit model override; skips the class table but not the
    /// availability check.
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub num_predict: Option<i32>,
}

impl RouteOptions {
    fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            temperature: self.temperature,
            num_predict: self.num_predict,
        }
    }
}

/// Successful routing outcome.
#[derive(Clone, Debug, serde::Serialize)]
pub struct RouteOutcome {
    pub model: String,
    pub response: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub downgraded: bool,
}

/// Routes requests to the runtime by task class.
pub struct ModelRouter {
    runtime: Arc<dyn ModelRuntime>,
    inventory: InventoryCache,
    table: RwLock<RoutingTable>,
    retries: u32,
}

impl ModelRouter {
    pub fn new(
        runtime: Arc<dyn ModelRuntime>,
        inventory: InventoryCache,
        table: RoutingTable,
        retries: u32,
    ) -> Self {
        Self {
            runtime,
            inventory,
            table: RwLock::new(table),
            retries: retries.max(1),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ModelRuntime> {
        &self.runtime
    }

    /// Selects the model for a call: explicit override, else the class
    /// primary, downgrading to the fallback when unavailable.
    async fn select(&self, class: TaskClass, requested: Option<&str>) -> HubResult<(String, bool)> {
        let (primary, fallback) = {
            let table = self.table.read().await;
            (
                requested
                    .map(str::to_string)
                    .unwrap_or_else(|| table.primary(class).to_string()),
                table.fallback.clone(),
            )
        };
        if self.inventory.contains(&primary).await? {
            return Ok((primary, false));
        }
        if primary != fallback && self.inventory.contains(&fallback).await? {
            tracing::warn!(
                class = class.as_str(),
                requested = primary.as_str(),
                fallback = fallback.as_str(),
                "model_downgraded"
            );
            return Ok((fallback, true));
        }
        // One forced refresh before giving up; the inventory may be stale.
        let entries = self.inventory.entries(true).await?;
        for candidate in [&primary, &fallback] {
            if entries.iter().any(|e| {
                e.name == *candidate || e.name.split(':').next() == Some(candidate.as_str())
            }) {
                let downgraded = candidate != &primary;
                return Ok((candidate.clone(), downgraded));
            }
        }
        Err(HubError::BackendUnavailable(format!(
            "no available model for class {} (tried {}, {})",
            class.as_str(),
            primary,
            fallback
        )))
    }

    /// Bounded exponential retry: up to `retries` attempts with `2^k` second
    /// delays, retrying only connection-level failures.
    async fn with_retry<T, F, Fut>(&self, mut attempt: F) -> HubResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = HubResult<T>>,
    {
        let mut last = None;
        for k in 0..self.retries {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    if k + 1 < self.retries {
                        let delay = Duration::from_secs(1u64 << k);
                        tracing::debug!(attempt = k + 1, ?delay, error = %e, "retrying model call");
                        tokio::time::sleep(delay).await;
                    }
                    last = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| HubError::Internal("retry loop without attempts".into())))
    }

    /// Routes a single-prompt request under `class`.
    pub async fn route(
        &self,
        class: TaskClass,
        prompt: &str,
        opts: &RouteOptions,
    ) -> HubResult<RouteOutcome> {
        let (model, downgraded) = self.select(class, opts.model.as_deref()).await?;
        let started = Instant::now();
        let generate_opts = opts.generate_options();
        let reply = self
            .with_retry(|| self.runtime.generate(&model, prompt, &generate_opts))
            .await?;
        Ok(outcome(model, reply, started, downgraded))
    }

    /// Multi-turn chat; class defaults to `chat` unless overridden.
    pub async fn chat(
        &self,
        turns: &[ChatTurn],
        opts: &RouteOptions,
    ) -> HubResult<RouteOutcome> {
        let (model, downgraded) = self.select(TaskClass::Chat, opts.model.as_deref()).await?;
        let started = Instant::now();
        let generate_opts = opts.generate_options();
        let reply = self
            .with_retry(|| self.runtime.chat(&model, turns, &generate_opts))
            .await?;
        Ok(outcome(model, reply, started, downgraded))
    }

    pub async fn embed(&self, text: &str, model: Option<&str>) -> HubResult<(String, Vec<f32>)> {
        let (model, _) = self.select(TaskClass::Embedding, model).await?;
        let vector = self
            .with_retry(|| self.runtime.embed(&model, text))
            .await?;
        Ok((model, vector))
    }

    pub async fn vision(
        &self,
        image_base64: &str,
        prompt: &str,
        model: Option<&str>,
    ) -> HubResult<RouteOutcome> {
        let (model, downgraded) = self.select(TaskClass::Vision, model).await?;
        let started = Instant::now();
        let reply = self
            .with_retry(|| self.runtime.vision(&model, prompt, image_base64))
            .await?;
        Ok(outcome(model, reply, started, downgraded))
    }

    pub async fn list(&self, force_refresh: bool) -> HubResult<Vec<crate::model::ModelEntry>> {
        self.inventory.entries(force_refresh).await
    }

    pub async fn info(&self, model: &str) -> HubResult<serde_json::Value> {
        self.runtime.model_info(model).await
    }

    /// Pulls a model and refreshes the inventory on success.
    pub async fn pull(&self, model: &str) -> HubResult<()> {
        self.runtime.pull(model).await?;
        self.inventory.invalidate().await;
        let _ = self.inventory.entries(true).await?;
        Ok(())
    }

    /// Per-process override of a class default.
    pub async fn set_default(&self, class: TaskClass, model: impl Into<String>) {
        self.table.write().await.set(class, model);
    }

    pub async fn primary_for(&self, class: TaskClass) -> String {
        self.table.read().await.primary(class).to_string()
    }
}

fn outcome(
    model: String,
    reply: RuntimeReply,
    started: Instant,
    downgraded: bool,
) -> RouteOutcome {
    RouteOutcome {
        model,
        response: reply.text,
        duration_ms: started.elapsed().as_millis() as u64,
        prompt_eval_count: reply.prompt_eval_count,
        eval_count: reply.eval_count,
        downgraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::inventory::DEFAULT_INVENTORY_TTL;
    use crate::model::runtime::MockRuntime;
    use std::sync::atomic::Ordering;

    fn router_with(models: &[&str], retries: u32) -> (Arc<MockRuntime>, ModelRouter) {
        let runtime = Arc::new(MockRuntime::new(models));
        let inventory =
            InventoryCache::new(runtime.clone(), DEFAULT_INVENTORY_TTL);
        let mut table = RoutingTable::default();
        table.set(TaskClass::Reasoning, "qwq-reasoning");
        table.fallback = "llama-fallback".to_string();
        let router = ModelRouter::new(runtime.clone(), inventory, table, retries);
        (runtime, router)
    }

    /// **Scenario**: primary available means the primary is selected.
    #[tokio::test]
    async fn selects_primary_when_available() {
        let (_rt, router) = router_with(&["qwq-reasoning", "llama-fallback"], 3);
        let out = router
            .route(TaskClass::Reasoning, "p", &RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(out.model, "qwq-reasoning");
        assert!(!out.downgraded);
    }

    /// **Scenario**: primary missing means the fallback is selected and
    /// marked as a downgrade.
    #[tokio::test]
    async fn falls_back_when_primary_missing() {
        let (_rt, router) = router_with(&["llama-fallback"], 3);
        let out = router
            .route(TaskClass::Reasoning, "p", &RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(out.model, "llama-fallback");
        assert!(out.downgraded);
    }

    /// **Scenario**: both missing fails with BackendUnavailable.
    #[tokio::test]
    async fn both_missing_is_backend_unavailable() {
        let (_rt, router) = router_with(&["unrelated"], 2);
        let err = router
            .route(TaskClass::Reasoning, "p", &RouteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "backend_unavailable");
    }

    /// **Scenario**: retryable failures retry up to the bound, then succeed.
    #[tokio::test(start_paused = true)]
    async fn retries_connection_failures() {
        let (rt, router) = router_with(&["qwq-reasoning"], 3);
        rt.fail_next(2);
        let out = router
            .route(TaskClass::Reasoning, "p", &RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(out.model, "qwq-reasoning");
        assert_eq!(rt.calls.load(Ordering::SeqCst), 3);
    }

    /// **Scenario**: retries exhaust and the final error propagates.
    #[tokio::test(start_paused = true)]
    async fn retries_exhaust() {
        let (rt, router) = router_with(&["qwq-reasoning"], 3);
        rt.fail_next(10);
        let err = router
            .route(TaskClass::Reasoning, "p", &RouteOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(rt.calls.load(Ordering::SeqCst), 3);
    }

    /// **Scenario**: explicit opts.model wins over the class table.
    #[tokio::test]
    async fn explicit_model_override() {
        let (_rt, router) = router_with(&["custom", "qwq-reasoning"], 3);
        let opts = RouteOptions {
            model: Some("custom".to_string()),
            ..Default::default()
        };
        let out = router.route(TaskClass::Reasoning, "p", &opts).await.unwrap();
        assert_eq!(out.model, "custom");
    }

    /// **Scenario**: set_default changes routing for later calls.
    #[tokio::test]
    async fn set_default_applies() {
        let (_rt, router) = router_with(&["new-default"], 3);
        router.set_default(TaskClass::Reasoning, "new-default").await;
        let out = router
            .route(TaskClass::Reasoning, "p", &RouteOptions::default())
            .await
            .unwrap();
        assert_eq!(out.model, "new-default");
    }

    /// **Scenario**: pull refreshes the inventory so the model is visible.
    #[tokio::test]
    async fn pull_refreshes_inventory() {
        let (_rt, router) = router_with(&[], 3);
        router.pull("fresh").await.unwrap();
        let entries = router.list(false).await.unwrap();
        assert!(entries.iter().any(|e| e.name == "fresh"));
    }
}
