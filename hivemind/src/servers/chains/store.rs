//! Chain persistence: the graph is the source of truth, the live map is a
//! write-through cache keyed by chain id.
//!
//! `add_step` and `conclude` serialize per chain through the cached entry's
//! lock. Cold lookups hydrate from the graph; terminal chains whose export
//! already landed are evicted opportunistically.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Value};

use crate::error::{HubError, HubResult};
use crate::graph::{Direction, EntityRef, GraphStore, PropMap};
use crate::notebook::NotebookVault;
use crate::servers::chains::chain::{ChainStatus, ReasoningChain, ReasoningStep, StepType};
use crate::servers::chains::export::export_chain;

pub const CHAIN_LABEL: &str = "ReasoningChain";
pub const STEP_LABEL: &str = "ReasoningStep";
pub const HAS_STEP: &str = "HAS_STEP";
pub const BRANCHED_TO: &str = "BRANCHED_TO";

/// Chain store over the graph backend and the notebook vault.
pub struct ChainStore {
    graph: Arc<dyn GraphStore>,
    vault: Arc<NotebookVault>,
    live: DashMap<String, Arc<tokio::sync::Mutex<ReasoningChain>>>,
}

impl ChainStore {
    pub fn new(graph: Arc<dyn GraphStore>, vault: Arc<NotebookVault>) -> Self {
        Self {
            graph,
            vault,
            live: DashMap::new(),
        }
    }

    /// Creates a chain, persists it, and caches it live.
    pub async fn start(
        &self,
        prompt: &str,
        context: Option<String>,
        goal: Option<String>,
        tags: Vec<String>,
        branch_from: Option<String>,
    ) -> HubResult<ReasoningChain> {
        self.evict_exported();
        let mut chain = ReasoningChain::new(prompt);
        chain.context = context;
        chain.goal = goal;
        chain.tags = tags;
        chain.branch_from = branch_from.clone();
        self.graph
            .create_entity(CHAIN_LABEL, chain_to_props(&chain))
            .await?;
        if let Some(parent) = branch_from {
            self.graph
                .create_relationship(
                    &EntityRef::new(CHAIN_LABEL, &parent),
                    BRANCHED_TO,
                    &EntityRef::new(CHAIN_LABEL, &chain.id),
                    None,
                )
                .await?;
        }
        self.cache(chain.clone());
        Ok(chain)
    }

    /// Appends a step under the per-chain lock and persists it.
    pub async fn add_step(
        &self,
        chain_id: &str,
        thought: &str,
        step_type: StepType,
        confidence: Option<f64>,
        data: Option<Value>,
    ) -> HubResult<ReasoningStep> {
        let entry = self.live_entry(chain_id).await?;
        let mut chain = entry.lock().await;
        let step = chain
            .add_step(thought, step_type, confidence, data)?
            .clone();
        let step_id = format!("{}-step-{}", chain_id, step.step_number);
        self.graph
            .create_entity(STEP_LABEL, step_to_props(&step_id, &step))
            .await?;
        self.graph
            .create_relationship(
                &EntityRef::new(CHAIN_LABEL, chain_id),
                HAS_STEP,
                &EntityRef::new(STEP_LABEL, &step_id),
                Some(prop_map(&[("order", json!(step.step_number))])),
            )
            .await?;
        let updated_at = chain.updated_at.clone();
        self.graph
            .update_entity(
                CHAIN_LABEL,
                chain_id,
                prop_map(&[("updated_at", json!(updated_at))]),
            )
            .await?;
        Ok(step)
    }

    /// Terminal transition. The status persists before the export; export
    /// failure degrades to a warning and is retried on the next access.
    pub async fn conclude(
        &self,
        chain_id: &str,
        conclusion: &str,
        success: bool,
        confidence: Option<f64>,
    ) -> HubResult<ReasoningChain> {
        let entry = self.live_entry(chain_id).await?;
        let mut chain = entry.lock().await;
        chain.conclude(conclusion, success, confidence)?;
        self.graph
            .update_entity(CHAIN_LABEL, chain_id, terminal_props(&chain))
            .await?;
        match export_chain(&self.vault, &chain).await {
            Ok(_) => {
                chain.exported = true;
                let _ = self
                    .graph
                    .update_entity(
                        CHAIN_LABEL,
                        chain_id,
                        prop_map(&[("exported", json!(true))]),
                    )
                    .await;
            }
            Err(e) => {
                tracing::warn!(chain = chain_id, error = %e, "chain export deferred");
            }
        }
        Ok(chain.clone())
    }

    /// Fetches a chain, hydrating from the graph on a cold lookup. A
    /// terminal chain with a pending export is exported here.
    pub async fn get(&self, chain_id: &str, include_steps: bool) -> HubResult<ReasoningChain> {
        let entry = self.live_entry(chain_id).await?;
        let mut chain = entry.lock().await;
        if chain.is_terminal() && !chain.exported {
            if export_chain(&self.vault, &chain).await.is_ok() {
                chain.exported = true;
                let _ = self
                    .graph
                    .update_entity(
                        CHAIN_LABEL,
                        chain_id,
                        prop_map(&[("exported", json!(true))]),
                    )
                    .await;
            }
        }
        let mut snapshot = chain.clone();
        if !include_steps {
            snapshot.steps.clear();
        }
        Ok(snapshot)
    }

    /// Lists chain summaries (no steps) straight from the graph.
    pub async fn list(
        &self,
        status: Option<ChainStatus>,
        limit: usize,
    ) -> HubResult<Vec<ReasoningChain>> {
        let mut filter = PropMap::new();
        if let Some(status) = status {
            filter.insert("status".to_string(), json!(status.as_str()));
        }
        let rows = self
            .graph
            .find_entities(CHAIN_LABEL, &filter, limit, true)
            .await?;
        rows.into_iter()
            .map(|props| chain_from_props(props, Vec::new()))
            .collect()
    }

    /// Copies a prefix of the chain into a new branch and persists it fully.
    pub async fn branch(
        &self,
        chain_id: &str,
        at_step: Option<u32>,
    ) -> HubResult<ReasoningChain> {
        let entry = self.live_entry(chain_id).await?;
        let child = {
            let chain = entry.lock().await;
            chain.branch(at_step)?
        };
        self.graph
            .create_entity(CHAIN_LABEL, chain_to_props(&child))
            .await?;
        for step in &child.steps {
            let step_id = format!("{}-step-{}", child.id, step.step_number);
            self.graph
                .create_entity(STEP_LABEL, step_to_props(&step_id, step))
                .await?;
            self.graph
                .create_relationship(
                    &EntityRef::new(CHAIN_LABEL, &child.id),
                    HAS_STEP,
                    &EntityRef::new(STEP_LABEL, &step_id),
                    Some(prop_map(&[("order", json!(step.step_number))])),
                )
                .await?;
        }
        self.graph
            .create_relationship(
                &EntityRef::new(CHAIN_LABEL, chain_id),
                BRANCHED_TO,
                &EntityRef::new(CHAIN_LABEL, &child.id),
                None,
            )
            .await?;
        self.cache(child.clone());
        Ok(child)
    }

    fn cache(&self, chain: ReasoningChain) {
        self.live
            .insert(chain.id.clone(), Arc::new(tokio::sync::Mutex::new(chain)));
    }

    /// Drops terminal chains whose export already landed; they rehydrate
    /// from the graph when touched again.
    fn evict_exported(&self) {
        self.live.retain(|_, entry| match entry.try_lock() {
            Ok(chain) => !(chain.is_terminal() && chain.exported),
            Err(_) => true,
        });
    }

    async fn live_entry(
        &self,
        chain_id: &str,
    ) -> HubResult<Arc<tokio::sync::Mutex<ReasoningChain>>> {
        if let Some(entry) = self.live.get(chain_id) {
            return Ok(entry.clone());
        }
        let chain = self.hydrate(chain_id).await?;
        let entry = self
            .live
            .entry(chain_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(chain)));
        Ok(entry.clone())
    }

    async fn hydrate(&self, chain_id: &str) -> HubResult<ReasoningChain> {
        let props = self
            .graph
            .get_entity(CHAIN_LABEL, chain_id)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("chain {}", chain_id)))?;
        let mut steps: Vec<(u32, ReasoningStep)> = Vec::new();
        for related in self
            .graph
            .relationships_for(CHAIN_LABEL, chain_id, Direction::Out, Some(HAS_STEP))
            .await?
        {
            let order = related
                .rel_props
                .get("order")
                .and_then(Value::as_u64)
                .unwrap_or(0) as u32;
            steps.push((order, step_from_props(&related.other)?));
        }
        steps.sort_by_key(|(order, _)| *order);
        chain_from_props(props, steps.into_iter().map(|(_, s)| s).collect())
    }
}

fn prop_map(pairs: &[(&str, Value)]) -> PropMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn chain_to_props(chain: &ReasoningChain) -> PropMap {
    let mut props = prop_map(&[
        ("id", json!(chain.id)),
        ("prompt", json!(chain.prompt)),
        ("status", json!(chain.status.as_str())),
        ("tags", json!(chain.tags)),
        ("created_at", json!(chain.created_at)),
        ("updated_at", json!(chain.updated_at)),
        ("exported", json!(chain.exported)),
    ]);
    if let Some(goal) = &chain.goal {
        props.insert("goal".to_string(), json!(goal));
    }
    if let Some(context) = &chain.context {
        props.insert("context".to_string(), json!(context));
    }
    if let Some(branch_from) = &chain.branch_from {
        props.insert("branch_from".to_string(), json!(branch_from));
    }
    if let Some(conclusion) = &chain.conclusion {
        props.insert("conclusion".to_string(), json!(conclusion));
    }
    if let Some(confidence) = chain.confidence {
        props.insert("confidence".to_string(), json!(confidence));
    }
    if let Some(completed_at) = &chain.completed_at {
        props.insert("completed_at".to_string(), json!(completed_at));
    }
    props
}

fn terminal_props(chain: &ReasoningChain) -> PropMap {
    let mut props = prop_map(&[
        ("status", json!(chain.status.as_str())),
        ("updated_at", json!(chain.updated_at)),
    ]);
    if let Some(conclusion) = &chain.conclusion {
        props.insert("conclusion".to_string(), json!(conclusion));
    }
    if let Some(confidence) = chain.confidence {
        props.insert("confidence".to_string(), json!(confidence));
    }
    if let Some(completed_at) = &chain.completed_at {
        props.insert("completed_at".to_string(), json!(completed_at));
    }
    props
}

fn chain_from_props(props: PropMap, steps: Vec<ReasoningStep>) -> HubResult<ReasoningChain> {
    let get_str = |key: &str| props.get(key).and_then(Value::as_str).map(str::to_string);
    let id = get_str("id").ok_or_else(|| HubError::Internal("chain without id".into()))?;
    let status = get_str("status")
        .as_deref()
        .map(ChainStatus::from_str)
        .transpose()
        .map_err(HubError::Internal)?
        .unwrap_or(ChainStatus::InProgress);
    Ok(ReasoningChain {
        id,
        prompt: get_str("prompt").unwrap_or_default(),
        goal: get_str("goal"),
        context: get_str("context"),
        tags: props
            .get("tags")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        status,
        steps,
        conclusion: get_str("conclusion"),
        confidence: props.get("confidence").and_then(Value::as_f64),
        branch_from: get_str("branch_from"),
        created_at: get_str("created_at").unwrap_or_default(),
        updated_at: get_str("updated_at").unwrap_or_default(),
        completed_at: get_str("completed_at"),
        exported: props
            .get("exported")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

fn step_to_props(step_id: &str, step: &ReasoningStep) -> PropMap {
    let mut props = prop_map(&[
        ("id", json!(step_id)),
        ("step_number", json!(step.step_number)),
        ("thought", json!(step.thought)),
        ("step_type", json!(step.step_type.as_str())),
        ("created_at", json!(step.created_at)),
    ]);
    if let Some(confidence) = step.confidence {
        props.insert("confidence".to_string(), json!(confidence));
    }
    if let Some(data) = &step.data {
        props.insert("data_json".to_string(), json!(data.to_string()));
    }
    props
}

fn step_from_props(props: &PropMap) -> HubResult<ReasoningStep> {
    let step_type = props
        .get("step_type")
        .and_then(Value::as_str)
        .map(StepType::from_str)
        .transpose()
        .map_err(HubError::Internal)?
        .unwrap_or(StepType::Observation);
    Ok(ReasoningStep {
        step_number: props
            .get("step_number")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        thought: props
            .get("thought")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        step_type,
        confidence: props.get("confidence").and_then(Value::as_f64),
        data: props
            .get("data_json")
            .and_then(Value::as_str)
            .and_then(|raw| serde_json::from_str(raw).ok()),
        created_at: props
            .get("created_at")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InMemoryGraph;

    fn store() -> (tempfile::TempDir, Arc<NotebookVault>, ChainStore) {
        let dir = tempfile::tempdir().unwrap();
        let vault = Arc::new(NotebookVault::new(dir.path()));
        let graph: Arc<dyn GraphStore> = Arc::new(InMemoryGraph::new());
        let store = ChainStore::new(graph, vault.clone());
        (dir, vault, store)
    }

    /// **Scenario**: the full lifecycle — start, two steps, conclude — lands
    /// terminal in the graph and exported in the vault.
    #[tokio::test]
    async fn full_lifecycle() {
        let (_dir, vault, store) = store();
        let chain = store
            .start("Capital of France?", None, None, Vec::new(), None)
            .await
            .unwrap();
        let s1 = store
            .add_step(&chain.id, "Recall facts", StepType::Observation, None, None)
            .await
            .unwrap();
        let s2 = store
            .add_step(
                &chain.id,
                "Paris is the capital",
                StepType::Inference,
                Some(0.9),
                None,
            )
            .await
            .unwrap();
        assert_eq!((s1.step_number, s2.step_number), (1, 2));

        let concluded = store
            .conclude(&chain.id, "Paris", true, None)
            .await
            .unwrap();
        assert_eq!(concluded.status, ChainStatus::Completed);
        assert!(concluded.exported);

        let name = crate::servers::chains::export::export_name(&concluded);
        let (fm, body) = vault.read(&name).await.unwrap();
        assert_eq!(fm.get_str("status"), Some("completed"));
        let conclusion = body.find("## Conclusion").unwrap();
        assert!(body[conclusion..].contains("Paris"));
    }

    /// **Scenario**: a cold lookup hydrates steps in order from the graph.
    #[tokio::test]
    async fn cold_hydration() {
        let (_dir, _vault, store) = store();
        let chain = store
            .start("q", None, None, Vec::new(), None)
            .await
            .unwrap();
        for i in 0..3 {
            store
                .add_step(&chain.id, &format!("s{}", i), StepType::Analysis, None, None)
                .await
                .unwrap();
        }
        // Drop the live entry to force hydration.
        store.live.remove(&chain.id);
        let fetched = store.get(&chain.id, true).await.unwrap();
        assert_eq!(fetched.steps.len(), 3);
        let numbers: Vec<u32> = fetched.steps.iter().map(|s| s.step_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        let summary = store.get(&chain.id, false).await.unwrap();
        assert!(summary.steps.is_empty());
    }

    /// **Scenario**: list filters by status, newest first.
    #[tokio::test]
    async fn list_by_status() {
        let (_dir, _vault, store) = store();
        let a = store.start("a", None, None, Vec::new(), None).await.unwrap();
        let _b = store.start("b", None, None, Vec::new(), None).await.unwrap();
        store.conclude(&a.id, "done", true, None).await.unwrap();

        let done = store.list(Some(ChainStatus::Completed), 10).await.unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id, a.id);
        let open = store.list(Some(ChainStatus::InProgress), 10).await.unwrap();
        assert_eq!(open.len(), 1);
        let all = store.list(None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    /// **Scenario**: branching persists the child with its copied steps and
    /// a BRANCHED_TO edge from the parent.
    #[tokio::test]
    async fn branch_persists() {
        let (_dir, _vault, store) = store();
        let parent = store.start("q", None, None, Vec::new(), None).await.unwrap();
        store
            .add_step(&parent.id, "one", StepType::Observation, None, None)
            .await
            .unwrap();
        store
            .add_step(&parent.id, "two", StepType::Inference, None, None)
            .await
            .unwrap();
        let child = store.branch(&parent.id, Some(1)).await.unwrap();
        assert_eq!(child.steps.len(), 1);
        assert_eq!(child.branch_from.as_deref(), Some(parent.id.as_str()));

        store.live.remove(&child.id);
        let rehydrated = store.get(&child.id, true).await.unwrap();
        assert_eq!(rehydrated.steps.len(), 1);

        let edges = store
            .graph
            .relationships_for(CHAIN_LABEL, &parent.id, Direction::Out, Some(BRANCHED_TO))
            .await
            .unwrap();
        assert_eq!(edges.len(), 1);
    }

    /// **Scenario**: add_step against a missing chain is NotFound.
    #[tokio::test]
    async fn missing_chain() {
        let (_dir, _vault, store) = store();
        let err = store
            .add_step("ghost", "x", StepType::Analysis, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }
}
