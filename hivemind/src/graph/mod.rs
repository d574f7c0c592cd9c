//! Property graph backend: session pool, entity/relationship CRUD, traversal.
//!
//! Sub-servers depend on [`GraphStore`]; production wires [`Neo4jGraph`] over
//! a [`GraphPool`], tests and standalone mode use [`InMemoryGraph`].

mod memory;
mod neo4j;
mod pool;
mod store;

pub use memory::InMemoryGraph;
pub use neo4j::Neo4jGraph;
pub use pool::{GraphPool, GraphPoolSettings};
pub use store::{
    Direction, EntityRef, GraphHealth, GraphPath, GraphStore, NodeSummary, PropMap, RelStat,
    RelatedEntity, Subgraph, SubgraphNode, SubgraphRel, DEFAULT_NODE_CAP, MAX_TRAVERSAL_DEPTH,
};
