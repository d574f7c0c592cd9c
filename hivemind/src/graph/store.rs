//! Graph store abstraction: entity CRUD, relationship ops, and traversal.
//!
//! Sub-servers depend on `GraphStore` instead of a concrete driver;
//! implementations are `Neo4jGraph` (bolt driver, production) and
//! `InMemoryGraph` (tests and standalone mode). Both enforce the same
//! semantics: (label, id) uniqueness, timestamp stamping, detach-delete.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HubResult;

/// Open-ended property mapping for nodes and relationships. Values are
/// scalars, timestamps (as strings), or lists of scalars.
pub type PropMap = serde_json::Map<String, Value>;

/// Depth bound applied to every traversal regardless of caller input.
pub const MAX_TRAVERSAL_DEPTH: usize = 10;

/// Node cap for connected-set and subgraph queries.
pub const DEFAULT_NODE_CAP: usize = 500;

/// A (label, id) pair addressing one entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub label: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(label: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.label, self.id)
    }
}

/// Edge direction relative to the anchor entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    Both,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Both => "both",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "both" => Ok(Direction::Both),
            _ => Err(format!("unknown direction: {} (use in, out, or both)", s)),
        }
    }
}

/// One relationship attached to an anchor entity, with the entity on the
/// other end. No ordering is guaranteed across results.
#[derive(Clone, Debug)]
pub struct RelatedEntity {
    pub rel_type: String,
    pub rel_props: PropMap,
    /// Direction of the edge relative to the anchor.
    pub direction: Direction,
    pub other: PropMap,
    pub other_labels: Vec<String>,
}

/// Compact node view used in path and connected-set results.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct NodeSummary {
    pub label: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// A path between two entities: `length` edges, `length + 1` nodes.
#[derive(Clone, Debug, serde::Serialize)]
pub struct GraphPath {
    pub length: usize,
    pub nodes: Vec<NodeSummary>,
    pub relationships: Vec<String>,
}

/// Node within a subgraph or connected-set result.
#[derive(Clone, Debug)]
pub struct SubgraphNode {
    pub labels: Vec<String>,
    pub props: PropMap,
}

/// Edge within a subgraph result, endpoints addressed by entity id.
#[derive(Clone, Debug, serde::Serialize)]
pub struct SubgraphRel {
    pub from: String,
    pub rel_type: String,
    pub to: String,
}

/// Neighborhood of radius `r` around an anchor entity.
#[derive(Clone, Debug)]
pub struct Subgraph {
    pub nodes: Vec<SubgraphNode>,
    pub relationships: Vec<SubgraphRel>,
}

/// Aggregated relationship statistic, sorted by count descending.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct RelStat {
    pub rel_type: String,
    pub neighbor_label: String,
    pub count: u64,
}

/// Outcome of a backend health probe.
#[derive(Clone, Debug)]
pub enum GraphHealth {
    Healthy { latency_ms: u64 },
    Unhealthy { reason: String, latency_ms: u64 },
}

impl GraphHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, GraphHealth::Healthy { .. })
    }

    pub fn latency_ms(&self) -> u64 {
        match self {
            GraphHealth::Healthy { latency_ms } => *latency_ms,
            GraphHealth::Unhealthy { latency_ms, .. } => *latency_ms,
        }
    }
}

/// Property graph backend: nodes keyed by (label, id), directed typed edges.
///
/// Semantics shared by all implementations:
///
/// - `create_entity` requires `props.id` (string) and fails `Duplicate` when
///   (label, id) exists; `created_at`/`updated_at` are stamped when absent.
/// - `update_entity` merges and refreshes `updated_at`; `NotFound` if absent.
/// - `delete_entity` detaches the node from every relationship first.
/// - Relationship creation requires both endpoints and stamps `created_at`.
/// - Traversal is bounded by [`MAX_TRAVERSAL_DEPTH`] and node caps; paths
///   treat edges as traversable in either direction.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // Entities.

    async fn create_entity(&self, label: &str, props: PropMap) -> HubResult<PropMap>;

    /// Atomic batch insert: any failure rolls back the whole batch.
    async fn create_entities(&self, label: &str, batch: Vec<PropMap>) -> HubResult<usize>;

    async fn get_entity(&self, label: &str, id: &str) -> HubResult<Option<PropMap>>;

    /// Equality match on `match_props`, up to `limit` results. Ordering is
    /// unspecified unless `newest_first` requests `created_at` descending.
    async fn find_entities(
        &self,
        label: &str,
        match_props: &PropMap,
        limit: usize,
        newest_first: bool,
    ) -> HubResult<Vec<PropMap>>;

    async fn update_entity(&self, label: &str, id: &str, props: PropMap) -> HubResult<PropMap>;

    /// Detach-deletes the node. Returns whether a node was removed.
    async fn delete_entity(&self, label: &str, id: &str) -> HubResult<bool>;

    async fn count_entities(&self, label: &str) -> HubResult<u64>;

    // Relationships.

    async fn create_relationship(
        &self,
        from: &EntityRef,
        rel_type: &str,
        to: &EntityRef,
        props: Option<PropMap>,
    ) -> HubResult<PropMap>;

    async fn relationships_for(
        &self,
        label: &str,
        id: &str,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> HubResult<Vec<RelatedEntity>>;

    async fn find_relationship(
        &self,
        from: &EntityRef,
        rel_type: &str,
        to: &EntityRef,
    ) -> HubResult<Option<PropMap>>;

    async fn update_relationship(
        &self,
        from: &EntityRef,
        rel_type: &str,
        to: &EntityRef,
        props: PropMap,
    ) -> HubResult<PropMap>;

    async fn delete_relationship(
        &self,
        from: &EntityRef,
        rel_type: &str,
        to: &EntityRef,
    ) -> HubResult<bool>;

    /// Removes every relationship touching (label, id); returns how many.
    async fn delete_relationships_for(&self, label: &str, id: &str) -> HubResult<u64>;

    async fn count_relationships_for(
        &self,
        label: &str,
        id: &str,
        rel_type: Option<&str>,
    ) -> HubResult<u64>;

    // Traversal.

    /// Distinct nodes reachable via any edge within `max_depth` steps,
    /// excluding the anchor, capped at [`DEFAULT_NODE_CAP`].
    async fn connected(
        &self,
        label: &str,
        id: &str,
        max_depth: usize,
    ) -> HubResult<Vec<SubgraphNode>>;

    async fn shortest_path(
        &self,
        from: &EntityRef,
        to: &EntityRef,
        max_depth: usize,
    ) -> HubResult<Option<GraphPath>>;

    /// All simple paths up to `max_depth`, ordered by length ascending,
    /// truncated at `limit`.
    async fn all_paths(
        &self,
        from: &EntityRef,
        to: &EntityRef,
        max_depth: usize,
        limit: usize,
    ) -> HubResult<Vec<GraphPath>>;

    async fn subgraph(
        &self,
        label: &str,
        id: &str,
        radius: usize,
        node_cap: usize,
    ) -> HubResult<Subgraph>;

    /// (type, neighbor label, count) triples sorted by count descending.
    async fn rel_stats(&self, label: &str, id: &str) -> HubResult<Vec<RelStat>>;

    /// Case-insensitive substring match over the listed property fields,
    /// OR across fields.
    async fn search_by_text(
        &self,
        label: &str,
        query: &str,
        fields: &[String],
        limit: usize,
    ) -> HubResult<Vec<PropMap>>;

    // Health.

    async fn health(&self) -> GraphHealth;
}

/// Extracts the required `id` property from a create payload.
pub(crate) fn require_id(props: &PropMap) -> HubResult<String> {
    props
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            crate::error::HubError::InvalidInput("entity properties must include a string id".into())
        })
}

/// Clamps a caller-supplied depth to the traversal bound; zero means one hop.
pub(crate) fn clamp_depth(depth: usize) -> usize {
    depth.clamp(1, MAX_TRAVERSAL_DEPTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Direction parses its three wire forms and rejects junk.
    #[test]
    fn direction_from_str() {
        assert_eq!("in".parse::<Direction>().unwrap(), Direction::In);
        assert_eq!("out".parse::<Direction>().unwrap(), Direction::Out);
        assert_eq!("both".parse::<Direction>().unwrap(), Direction::Both);
        assert!("sideways".parse::<Direction>().is_err());
    }

    /// **Scenario**: require_id accepts a string id and rejects anything else.
    #[test]
    fn require_id_validation() {
        let mut props = PropMap::new();
        assert!(require_id(&props).is_err());
        props.insert("id".into(), serde_json::json!(42));
        assert!(require_id(&props).is_err());
        props.insert("id".into(), serde_json::json!("p1"));
        assert_eq!(require_id(&props).unwrap(), "p1");
    }

    /// **Scenario**: Depths clamp into [1, MAX_TRAVERSAL_DEPTH].
    #[test]
    fn depth_clamping() {
        assert_eq!(clamp_depth(0), 1);
        assert_eq!(clamp_depth(3), 3);
        assert_eq!(clamp_depth(99), MAX_TRAVERSAL_DEPTH);
    }

    /// **Scenario**: EntityRef displays as label:id for error messages.
    #[test]
    fn entity_ref_display() {
        let r = EntityRef::new("Person", "p1");
        assert_eq!(r.to_string(), "Person:p1");
    }
}
