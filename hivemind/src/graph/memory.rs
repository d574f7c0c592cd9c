//! In-memory graph backend. Not persistent.
//!
//! Used by tests and by standalone mode when no bolt endpoint is configured.
//! Implements the full `GraphStore` contract, including bounded traversal,
//! over a single `RwLock`-guarded adjacency structure.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::clock::utc_now_iso;
use crate::error::{HubError, HubResult};
use crate::graph::store::{
    clamp_depth, require_id, Direction, EntityRef, GraphHealth, GraphPath, GraphStore,
    NodeSummary, PropMap, RelStat, RelatedEntity, Subgraph, SubgraphNode, SubgraphRel,
    DEFAULT_NODE_CAP,
};

type NodeKey = (String, String);

#[derive(Clone, Debug)]
struct StoredRel {
    from: NodeKey,
    rel_type: String,
    to: NodeKey,
    props: PropMap,
}

#[derive(Default)]
struct Inner {
    nodes: HashMap<NodeKey, PropMap>,
    rels: Vec<StoredRel>,
}

impl Inner {
    fn neighbors(&self, key: &NodeKey) -> Vec<(NodeKey, &StoredRel)> {
        let mut out = Vec::new();
        for rel in &self.rels {
            if &rel.from == key {
                out.push((rel.to.clone(), rel));
            } else if &rel.to == key {
                out.push((rel.from.clone(), rel));
            }
        }
        out
    }

    /// Depth-first enumeration of simple paths between two nodes, edges
    /// traversed in either direction, bounded by `max_depth`.
    fn simple_paths(
        &self,
        from: &NodeKey,
        to: &NodeKey,
        max_depth: usize,
        limit: usize,
    ) -> Vec<GraphPath> {
        let mut found = Vec::new();
        let mut stack = vec![from.clone()];
        let mut rel_trail: Vec<String> = Vec::new();
        self.dfs_paths(from, to, max_depth, limit, &mut stack, &mut rel_trail, &mut found);
        found.sort_by_key(|p| p.length);
        found.truncate(limit);
        found
    }

    #[allow(clippy::too_many_arguments)]
    fn dfs_paths(
        &self,
        current: &NodeKey,
        target: &NodeKey,
        remaining: usize,
        limit: usize,
        node_trail: &mut Vec<NodeKey>,
        rel_trail: &mut Vec<String>,
        found: &mut Vec<GraphPath>,
    ) {
        if current == target && !rel_trail.is_empty() {
            found.push(GraphPath {
                length: rel_trail.len(),
                nodes: node_trail.iter().map(|k| self.summarize(k)).collect(),
                relationships: rel_trail.clone(),
            });
            return;
        }
        if remaining == 0 || found.len() >= limit.saturating_mul(4) {
            return;
        }
        for (next, rel) in self.neighbors(current) {
            if node_trail.contains(&next) {
                continue;
            }
            node_trail.push(next.clone());
            rel_trail.push(rel.rel_type.clone());
            self.dfs_paths(&next, target, remaining - 1, limit, node_trail, rel_trail, found);
            node_trail.pop();
            rel_trail.pop();
        }
    }

    fn summarize(&self, key: &NodeKey) -> NodeSummary {
        let name = self
            .nodes
            .get(key)
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        NodeSummary {
            label: key.0.clone(),
            id: key.1.clone(),
            name,
        }
    }
}

/// In-memory `GraphStore`. One lock over the whole structure; good enough
/// for tests and single-host standalone use.
pub struct InMemoryGraph {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryGraph {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    fn stamp_create(props: &mut PropMap) {
        let now = utc_now_iso();
        props
            .entry("created_at".to_string())
            .or_insert_with(|| Value::String(now.clone()));
        props
            .entry("updated_at".to_string())
            .or_insert_with(|| Value::String(now));
    }

    fn matches(props: &PropMap, wanted: &PropMap) -> bool {
        wanted.iter().all(|(k, v)| props.get(k) == Some(v))
    }
}

impl Default for InMemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    async fn create_entity(&self, label: &str, mut props: PropMap) -> HubResult<PropMap> {
        let id = require_id(&props)?;
        let key = (label.to_string(), id.clone());
        let mut inner = self.inner.write().await;
        if inner.nodes.contains_key(&key) {
            return Err(HubError::Duplicate(format!("{}:{}", label, id)));
        }
        Self::stamp_create(&mut props);
        inner.nodes.insert(key, props.clone());
        Ok(props)
    }

    async fn create_entities(&self, label: &str, batch: Vec<PropMap>) -> HubResult<usize> {
        // Validate the whole batch before touching the map so a partial
        // failure leaves no residue (transactional per the contract).
        let mut prepared = Vec::with_capacity(batch.len());
        let mut seen = HashSet::new();
        for mut props in batch {
            let id = require_id(&props)?;
            if !seen.insert(id.clone()) {
                return Err(HubError::Duplicate(format!("{}:{}", label, id)));
            }
            Self::stamp_create(&mut props);
            prepared.push(((label.to_string(), id), props));
        }
        let mut inner = self.inner.write().await;
        for (key, _) in &prepared {
            if inner.nodes.contains_key(key) {
                return Err(HubError::Duplicate(format!("{}:{}", key.0, key.1)));
            }
        }
        let n = prepared.len();
        for (key, props) in prepared {
            inner.nodes.insert(key, props);
        }
        Ok(n)
    }

    async fn get_entity(&self, label: &str, id: &str) -> HubResult<Option<PropMap>> {
        let inner = self.inner.read().await;
        Ok(inner.nodes.get(&(label.to_string(), id.to_string())).cloned())
    }

    async fn find_entities(
        &self,
        label: &str,
        match_props: &PropMap,
        limit: usize,
        newest_first: bool,
    ) -> HubResult<Vec<PropMap>> {
        let inner = self.inner.read().await;
        let mut hits: Vec<PropMap> = inner
            .nodes
            .iter()
            .filter(|((l, _), props)| l == label && Self::matches(props, match_props))
            .map(|(_, props)| props.clone())
            .collect();
        if newest_first {
            hits.sort_by(|a, b| {
                let ka = a.get("created_at").and_then(Value::as_str).unwrap_or("");
                let kb = b.get("created_at").and_then(Value::as_str).unwrap_or("");
                kb.cmp(ka)
            });
        }
        hits.truncate(limit);
        Ok(hits)
    }

    async fn update_entity(&self, label: &str, id: &str, props: PropMap) -> HubResult<PropMap> {
        let key = (label.to_string(), id.to_string());
        let mut inner = self.inner.write().await;
        let existing = inner
            .nodes
            .get_mut(&key)
            .ok_or_else(|| HubError::NotFound(format!("{}:{}", label, id)))?;
        for (k, v) in props {
            if k == "created_at" {
                continue;
            }
            existing.insert(k, v);
        }
        existing.insert("updated_at".to_string(), Value::String(utc_now_iso()));
        Ok(existing.clone())
    }

    async fn delete_entity(&self, label: &str, id: &str) -> HubResult<bool> {
        let key = (label.to_string(), id.to_string());
        let mut inner = self.inner.write().await;
        let removed = inner.nodes.remove(&key).is_some();
        if removed {
            inner.rels.retain(|r| r.from != key && r.to != key);
        }
        Ok(removed)
    }

    async fn count_entities(&self, label: &str) -> HubResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.nodes.keys().filter(|(l, _)| l == label).count() as u64)
    }

    async fn create_relationship(
        &self,
        from: &EntityRef,
        rel_type: &str,
        to: &EntityRef,
        props: Option<PropMap>,
    ) -> HubResult<PropMap> {
        let from_key = (from.label.clone(), from.id.clone());
        let to_key = (to.label.clone(), to.id.clone());
        let mut inner = self.inner.write().await;
        if !inner.nodes.contains_key(&from_key) {
            return Err(HubError::NotFound(from.to_string()));
        }
        if !inner.nodes.contains_key(&to_key) {
            return Err(HubError::NotFound(to.to_string()));
        }
        let mut props = props.unwrap_or_default();
        props
            .entry("created_at".to_string())
            .or_insert_with(|| Value::String(utc_now_iso()));
        inner.rels.push(StoredRel {
            from: from_key,
            rel_type: rel_type.to_string(),
            to: to_key,
            props: props.clone(),
        });
        Ok(props)
    }

    async fn relationships_for(
        &self,
        label: &str,
        id: &str,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> HubResult<Vec<RelatedEntity>> {
        let key = (label.to_string(), id.to_string());
        let inner = self.inner.read().await;
        let mut out = Vec::new();
        for rel in &inner.rels {
            if let Some(t) = rel_type {
                if rel.rel_type != t {
                    continue;
                }
            }
            let (other_key, dir) = if rel.from == key {
                (&rel.to, Direction::Out)
            } else if rel.to == key {
                (&rel.from, Direction::In)
            } else {
                continue;
            };
            let wanted = match direction {
                Direction::Both => true,
                d => d == dir,
            };
            if !wanted {
                continue;
            }
            let other = inner.nodes.get(other_key).cloned().unwrap_or_default();
            out.push(RelatedEntity {
                rel_type: rel.rel_type.clone(),
                rel_props: rel.props.clone(),
                direction: dir,
                other,
                other_labels: vec![other_key.0.clone()],
            });
        }
        Ok(out)
    }

    async fn find_relationship(
        &self,
        from: &EntityRef,
        rel_type: &str,
        to: &EntityRef,
    ) -> HubResult<Option<PropMap>> {
        let from_key = (from.label.clone(), from.id.clone());
        let to_key = (to.label.clone(), to.id.clone());
        let inner = self.inner.read().await;
        Ok(inner
            .rels
            .iter()
            .find(|r| r.from == from_key && r.to == to_key && r.rel_type == rel_type)
            .map(|r| r.props.clone()))
    }

    async fn update_relationship(
        &self,
        from: &EntityRef,
        rel_type: &str,
        to: &EntityRef,
        props: PropMap,
    ) -> HubResult<PropMap> {
        let from_key = (from.label.clone(), from.id.clone());
        let to_key = (to.label.clone(), to.id.clone());
        let mut inner = self.inner.write().await;
        let rel = inner
            .rels
            .iter_mut()
            .find(|r| r.from == from_key && r.to == to_key && r.rel_type == rel_type)
            .ok_or_else(|| {
                HubError::NotFound(format!("{} -[{}]-> {}", from, rel_type, to))
            })?;
        for (k, v) in props {
            rel.props.insert(k, v);
        }
        Ok(rel.props.clone())
    }

    async fn delete_relationship(
        &self,
        from: &EntityRef,
        rel_type: &str,
        to: &EntityRef,
    ) -> HubResult<bool> {
        let from_key = (from.label.clone(), from.id.clone());
        let to_key = (to.label.clone(), to.id.clone());
        let mut inner = self.inner.write().await;
        let before = inner.rels.len();
        inner
            .rels
            .retain(|r| !(r.from == from_key && r.to == to_key && r.rel_type == rel_type));
        Ok(inner.rels.len() < before)
    }

    async fn delete_relationships_for(&self, label: &str, id: &str) -> HubResult<u64> {
        let key = (label.to_string(), id.to_string());
        let mut inner = self.inner.write().await;
        let before = inner.rels.len();
        inner.rels.retain(|r| r.from != key && r.to != key);
        Ok((before - inner.rels.len()) as u64)
    }

    async fn count_relationships_for(
        &self,
        label: &str,
        id: &str,
        rel_type: Option<&str>,
    ) -> HubResult<u64> {
        let key = (label.to_string(), id.to_string());
        let inner = self.inner.read().await;
        Ok(inner
            .rels
            .iter()
            .filter(|r| r.from == key || r.to == key)
            .filter(|r| rel_type.map_or(true, |t| r.rel_type == t))
            .count() as u64)
    }

    async fn connected(
        &self,
        label: &str,
        id: &str,
        max_depth: usize,
    ) -> HubResult<Vec<SubgraphNode>> {
        let depth = clamp_depth(max_depth);
        let start = (label.to_string(), id.to_string());
        let inner = self.inner.read().await;
        if !inner.nodes.contains_key(&start) {
            return Err(HubError::NotFound(format!("{}:{}", label, id)));
        }
        let mut seen: HashSet<NodeKey> = HashSet::new();
        seen.insert(start.clone());
        let mut queue: VecDeque<(NodeKey, usize)> = VecDeque::new();
        queue.push_back((start.clone(), 0));
        let mut out = Vec::new();
        while let Some((key, d)) = queue.pop_front() {
            if d >= depth {
                continue;
            }
            for (next, _) in inner.neighbors(&key) {
                if seen.insert(next.clone()) {
                    if let Some(props) = inner.nodes.get(&next) {
                        out.push(SubgraphNode {
                            labels: vec![next.0.clone()],
                            props: props.clone(),
                        });
                    }
                    if out.len() >= DEFAULT_NODE_CAP {
                        return Ok(out);
                    }
                    queue.push_back((next, d + 1));
                }
            }
        }
        Ok(out)
    }

    async fn shortest_path(
        &self,
        from: &EntityRef,
        to: &EntityRef,
        max_depth: usize,
    ) -> HubResult<Option<GraphPath>> {
        let depth = clamp_depth(max_depth);
        let inner = self.inner.read().await;
        let from_key = (from.label.clone(), from.id.clone());
        let to_key = (to.label.clone(), to.id.clone());
        if !inner.nodes.contains_key(&from_key) || !inner.nodes.contains_key(&to_key) {
            return Ok(None);
        }
        // BFS with parent pointers so the first hit is a minimal path.
        let mut parent: HashMap<NodeKey, (NodeKey, String)> = HashMap::new();
        let mut queue: VecDeque<(NodeKey, usize)> = VecDeque::new();
        queue.push_back((from_key.clone(), 0));
        let mut seen = HashSet::new();
        seen.insert(from_key.clone());
        while let Some((key, d)) = queue.pop_front() {
            if key == to_key {
                let mut nodes = vec![inner.summarize(&key)];
                let mut rels = Vec::new();
                let mut cursor = key;
                while let Some((prev, rel)) = parent.get(&cursor) {
                    rels.push(rel.clone());
                    nodes.push(inner.summarize(prev));
                    cursor = prev.clone();
                }
                nodes.reverse();
                rels.reverse();
                return Ok(Some(GraphPath {
                    length: rels.len(),
                    nodes,
                    relationships: rels,
                }));
            }
            if d >= depth {
                continue;
            }
            for (next, rel) in inner.neighbors(&key) {
                if seen.insert(next.clone()) {
                    parent.insert(next.clone(), (key.clone(), rel.rel_type.clone()));
                    queue.push_back((next, d + 1));
                }
            }
        }
        Ok(None)
    }

    async fn all_paths(
        &self,
        from: &EntityRef,
        to: &EntityRef,
        max_depth: usize,
        limit: usize,
    ) -> HubResult<Vec<GraphPath>> {
        let depth = clamp_depth(max_depth);
        let inner = self.inner.read().await;
        let from_key = (from.label.clone(), from.id.clone());
        let to_key = (to.label.clone(), to.id.clone());
        if !inner.nodes.contains_key(&from_key) || !inner.nodes.contains_key(&to_key) {
            return Ok(Vec::new());
        }
        Ok(inner.simple_paths(&from_key, &to_key, depth, limit))
    }

    async fn subgraph(
        &self,
        label: &str,
        id: &str,
        radius: usize,
        node_cap: usize,
    ) -> HubResult<Subgraph> {
        let depth = clamp_depth(radius);
        let cap = if node_cap == 0 { DEFAULT_NODE_CAP } else { node_cap };
        let start = (label.to_string(), id.to_string());
        let inner = self.inner.read().await;
        if !inner.nodes.contains_key(&start) {
            return Err(HubError::NotFound(format!("{}:{}", label, id)));
        }
        let mut seen: HashSet<NodeKey> = HashSet::new();
        seen.insert(start.clone());
        let mut queue: VecDeque<(NodeKey, usize)> = VecDeque::new();
        queue.push_back((start.clone(), 0));
        while let Some((key, d)) = queue.pop_front() {
            if d >= depth || seen.len() >= cap {
                continue;
            }
            for (next, _) in inner.neighbors(&key) {
                if seen.len() >= cap {
                    break;
                }
                if seen.insert(next.clone()) {
                    queue.push_back((next, d + 1));
                }
            }
        }
        let nodes = seen
            .iter()
            .filter_map(|k| {
                inner.nodes.get(k).map(|props| SubgraphNode {
                    labels: vec![k.0.clone()],
                    props: props.clone(),
                })
            })
            .collect();
        let relationships = inner
            .rels
            .iter()
            .filter(|r| seen.contains(&r.from) && seen.contains(&r.to))
            .map(|r| SubgraphRel {
                from: r.from.1.clone(),
                rel_type: r.rel_type.clone(),
                to: r.to.1.clone(),
            })
            .collect();
        Ok(Subgraph {
            nodes,
            relationships,
        })
    }

    async fn rel_stats(&self, label: &str, id: &str) -> HubResult<Vec<RelStat>> {
        let key = (label.to_string(), id.to_string());
        let inner = self.inner.read().await;
        let mut counts: HashMap<(String, String), u64> = HashMap::new();
        for rel in &inner.rels {
            let other = if rel.from == key {
                &rel.to
            } else if rel.to == key {
                &rel.from
            } else {
                continue;
            };
            *counts
                .entry((rel.rel_type.clone(), other.0.clone()))
                .or_insert(0) += 1;
        }
        let mut stats: Vec<RelStat> = counts
            .into_iter()
            .map(|((rel_type, neighbor_label), count)| RelStat {
                rel_type,
                neighbor_label,
                count,
            })
            .collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count).then(a.rel_type.cmp(&b.rel_type)));
        Ok(stats)
    }

    async fn search_by_text(
        &self,
        label: &str,
        query: &str,
        fields: &[String],
        limit: usize,
    ) -> HubResult<Vec<PropMap>> {
        let needle = query.to_lowercase();
        let inner = self.inner.read().await;
        let mut hits = Vec::new();
        for ((l, _), props) in inner.nodes.iter() {
            if l != label {
                continue;
            }
            let matched = fields.iter().any(|f| {
                props
                    .get(f)
                    .and_then(Value::as_str)
                    .map(|s| s.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            });
            if matched {
                hits.push(props.clone());
                if hits.len() >= limit {
                    break;
                }
            }
        }
        Ok(hits)
    }

    async fn health(&self) -> GraphHealth {
        let started = Instant::now();
        let _ = self.inner.read().await;
        GraphHealth::Healthy {
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(pairs: &[(&str, Value)]) -> PropMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    async fn seeded() -> InMemoryGraph {
        let g = InMemoryGraph::new();
        for id in ["p1", "p2", "p3"] {
            g.create_entity("Person", props(&[("id", json!(id))]))
                .await
                .unwrap();
        }
        g.create_relationship(
            &EntityRef::new("Person", "p1"),
            "KNOWS",
            &EntityRef::new("Person", "p2"),
            None,
        )
        .await
        .unwrap();
        g.create_relationship(
            &EntityRef::new("Person", "p2"),
            "KNOWS",
            &EntityRef::new("Person", "p3"),
            None,
        )
        .await
        .unwrap();
        g
    }

    /// **Scenario**: create then get round-trips properties and stamps timestamps.
    #[tokio::test]
    async fn create_then_get() {
        let g = InMemoryGraph::new();
        let created = g
            .create_entity(
                "Person",
                props(&[("id", json!("p1")), ("name", json!("Alice"))]),
            )
            .await
            .unwrap();
        assert!(created.get("created_at").is_some());
        let got = g.get_entity("Person", "p1").await.unwrap().unwrap();
        assert_eq!(got.get("name"), Some(&json!("Alice")));
        assert_eq!(got.get("created_at"), created.get("created_at"));
    }

    /// **Scenario**: duplicate (label, id) is rejected; same id under another
    /// label is fine.
    #[tokio::test]
    async fn duplicate_detection_is_label_scoped() {
        let g = InMemoryGraph::new();
        g.create_entity("Person", props(&[("id", json!("x"))]))
            .await
            .unwrap();
        let err = g
            .create_entity("Person", props(&[("id", json!("x"))]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "duplicate");
        g.create_entity("Project", props(&[("id", json!("x"))]))
            .await
            .unwrap();
    }

    /// **Scenario**: batch create is all-or-nothing.
    #[tokio::test]
    async fn batch_create_rolls_back_on_duplicate() {
        let g = InMemoryGraph::new();
        g.create_entity("Person", props(&[("id", json!("p1"))]))
            .await
            .unwrap();
        let batch = vec![
            props(&[("id", json!("p9"))]),
            props(&[("id", json!("p1"))]),
        ];
        assert!(g.create_entities("Person", batch).await.is_err());
        assert_eq!(g.get_entity("Person", "p9").await.unwrap(), None);
        assert_eq!(g.count_entities("Person").await.unwrap(), 1);
    }

    /// **Scenario**: update merges, preserves created_at, refreshes updated_at.
    #[tokio::test]
    async fn update_merges_and_refreshes() {
        let g = InMemoryGraph::new();
        let created = g
            .create_entity("Person", props(&[("id", json!("p1")), ("a", json!(1))]))
            .await
            .unwrap();
        let updated = g
            .update_entity(
                "Person",
                "p1",
                props(&[("b", json!(2)), ("created_at", json!("hax"))]),
            )
            .await
            .unwrap();
        assert_eq!(updated.get("a"), Some(&json!(1)));
        assert_eq!(updated.get("b"), Some(&json!(2)));
        assert_eq!(updated.get("created_at"), created.get("created_at"));
        let ca = updated.get("created_at").unwrap().as_str().unwrap();
        let ua = updated.get("updated_at").unwrap().as_str().unwrap();
        assert!(ua >= ca);
    }

    /// **Scenario**: deleting an endpoint detaches its relationships.
    #[tokio::test]
    async fn delete_is_detaching() {
        let g = seeded().await;
        assert!(g.delete_entity("Person", "p2").await.unwrap());
        assert_eq!(
            g.count_relationships_for("Person", "p1", None).await.unwrap(),
            0
        );
        assert!(!g.delete_entity("Person", "p2").await.unwrap());
    }

    /// **Scenario**: relationship creation requires both endpoints.
    #[tokio::test]
    async fn relationship_requires_endpoints() {
        let g = InMemoryGraph::new();
        g.create_entity("Person", props(&[("id", json!("p1"))]))
            .await
            .unwrap();
        let err = g
            .create_relationship(
                &EntityRef::new("Person", "p1"),
                "KNOWS",
                &EntityRef::new("Person", "ghost"),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    /// **Scenario**: relationships_for respects direction and type filters.
    #[tokio::test]
    async fn relationships_for_filters() {
        let g = seeded().await;
        let out = g
            .relationships_for("Person", "p2", Direction::Out, None)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].other.get("id"), Some(&json!("p3")));
        let incoming = g
            .relationships_for("Person", "p2", Direction::In, Some("KNOWS"))
            .await
            .unwrap();
        assert_eq!(incoming.len(), 1);
        let both = g
            .relationships_for("Person", "p2", Direction::Both, None)
            .await
            .unwrap();
        assert_eq!(both.len(), 2);
    }

    /// **Scenario**: shortest path across two hops returns length 2 and the
    /// edge types in order.
    #[tokio::test]
    async fn shortest_path_two_hops() {
        let g = seeded().await;
        let path = g
            .shortest_path(
                &EntityRef::new("Person", "p1"),
                &EntityRef::new("Person", "p3"),
                5,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(path.length, 2);
        assert_eq!(
            path.nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            vec!["p1", "p2", "p3"]
        );
        assert_eq!(path.relationships, vec!["KNOWS", "KNOWS"]);
    }

    /// **Scenario**: shortest_path is None exactly when all_paths is empty.
    #[tokio::test]
    async fn path_absence_agreement() {
        let g = seeded().await;
        g.create_entity("Person", props(&[("id", json!("island"))]))
            .await
            .unwrap();
        let sp = g
            .shortest_path(
                &EntityRef::new("Person", "p1"),
                &EntityRef::new("Person", "island"),
                6,
            )
            .await
            .unwrap();
        let all = g
            .all_paths(
                &EntityRef::new("Person", "p1"),
                &EntityRef::new("Person", "island"),
                6,
                100,
            )
            .await
            .unwrap();
        assert!(sp.is_none());
        assert!(all.is_empty());

        let sp = g
            .shortest_path(
                &EntityRef::new("Person", "p1"),
                &EntityRef::new("Person", "p3"),
                6,
            )
            .await
            .unwrap();
        let all = g
            .all_paths(
                &EntityRef::new("Person", "p1"),
                &EntityRef::new("Person", "p3"),
                6,
                100,
            )
            .await
            .unwrap();
        assert!(sp.is_some());
        assert!(!all.is_empty());
        assert_eq!(all[0].length, sp.unwrap().length);
    }

    /// **Scenario**: depth bound hides distant nodes from connected().
    #[tokio::test]
    async fn connected_depth_bound() {
        let g = seeded().await;
        let near = g.connected("Person", "p1", 1).await.unwrap();
        assert_eq!(near.len(), 1);
        let far = g.connected("Person", "p1", 2).await.unwrap();
        assert_eq!(far.len(), 2);
    }

    /// **Scenario**: rel_stats aggregates by (type, neighbor label), sorted by
    /// count descending.
    #[tokio::test]
    async fn rel_stats_sorted() {
        let g = seeded().await;
        g.create_entity("Project", props(&[("id", json!("proj"))]))
            .await
            .unwrap();
        g.create_relationship(
            &EntityRef::new("Person", "p2"),
            "WORKS_ON",
            &EntityRef::new("Project", "proj"),
            None,
        )
        .await
        .unwrap();
        let stats = g.rel_stats("Person", "p2").await.unwrap();
        assert_eq!(stats[0].rel_type, "KNOWS");
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[1].rel_type, "WORKS_ON");
        assert_eq!(stats[1].neighbor_label, "Project");
    }

    /// **Scenario**: text search is case-insensitive, OR across fields.
    #[tokio::test]
    async fn text_search() {
        let g = InMemoryGraph::new();
        g.create_entity(
            "Note",
            props(&[("id", json!("n1")), ("title", json!("Rust BFS notes"))]),
        )
        .await
        .unwrap();
        g.create_entity(
            "Note",
            props(&[("id", json!("n2")), ("body", json!("nothing here"))]),
        )
        .await
        .unwrap();
        let hits = g
            .search_by_text(
                "Note",
                "bfs",
                &["title".to_string(), "body".to_string()],
                10,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].get("id"), Some(&json!("n1")));
    }

    /// **Scenario**: subgraph within radius 1 of p2 holds all three people and
    /// both edges.
    #[tokio::test]
    async fn subgraph_radius_one() {
        let g = seeded().await;
        let sub = g.subgraph("Person", "p2", 1, 0).await.unwrap();
        assert_eq!(sub.nodes.len(), 3);
        assert_eq!(sub.relationships.len(), 2);
    }
}
