//! Bolt-backed `GraphStore` over the session pool.
//!
//! Cypher text is assembled from sanitized identifiers (labels, relationship
//! types, field names); every value travels as a bolt parameter. Timestamps
//! are stamped client-side so semantics match `InMemoryGraph` exactly.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::BoxFuture;
use neo4rs::{
    query, BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltString, BoltType, Query,
};
use serde_json::Value;

use crate::clock::utc_now_iso;
use crate::error::{HubError, HubResult};
use crate::graph::pool::{map_driver_err, GraphPool};
use crate::graph::store::{
    clamp_depth, require_id, Direction, EntityRef, GraphHealth, GraphPath, GraphStore,
    NodeSummary, PropMap, RelStat, RelatedEntity, Subgraph, SubgraphNode, SubgraphRel,
    DEFAULT_NODE_CAP,
};

/// `GraphStore` implementation over a pooled bolt connection.
pub struct Neo4jGraph {
    pool: GraphPool,
}

impl Neo4jGraph {
    pub fn new(pool: GraphPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &GraphPool {
        &self.pool
    }
}

/// Labels, relationship types, and field names are interpolated into Cypher
/// text, so they must be plain identifiers.
fn ident(name: &str) -> HubResult<&str> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if head_ok && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(HubError::InvalidInput(format!(
            "invalid identifier: {:?}",
            name
        )))
    }
}

/// JSON value to bolt parameter. Nulls return `None` and are omitted, which
/// matches the backend's no-null-properties model.
fn to_bolt(value: &Value) -> Option<BoltType> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(BoltType::Boolean(BoltBoolean::new(*b))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(BoltType::Integer(BoltInteger::new(i)))
            } else {
                n.as_f64().map(|f| BoltType::Float(BoltFloat::new(f)))
            }
        }
        Value::String(s) => Some(BoltType::String(BoltString::from(s.as_str()))),
        Value::Array(items) => {
            let mut list = BoltList::default();
            for item in items {
                if let Some(t) = to_bolt(item) {
                    list.push(t);
                }
            }
            Some(BoltType::List(list))
        }
        Value::Object(map) => Some(BoltType::Map(map_to_bolt(map))),
    }
}

fn map_to_bolt(map: &PropMap) -> BoltMap {
    let mut out = BoltMap::default();
    for (k, v) in map {
        if let Some(t) = to_bolt(v) {
            out.put(BoltString::from(k.as_str()), t);
        }
    }
    out
}

fn string_list(values: &[String]) -> BoltType {
    let mut list = BoltList::default();
    for v in values {
        list.push(BoltType::String(BoltString::from(v.as_str())));
    }
    BoltType::List(list)
}

fn row_props(row: &neo4rs::Row, column: &str) -> HubResult<PropMap> {
    let map: HashMap<String, Value> = row
        .get(column)
        .map_err(|e| HubError::Internal(format!("row column {}: {}", column, e)))?;
    Ok(map.into_iter().collect())
}

fn row_value<T: for<'de> serde::Deserialize<'de>>(
    row: &neo4rs::Row,
    column: &str,
) -> HubResult<T> {
    row.get(column)
        .map_err(|e| HubError::Internal(format!("row column {}: {}", column, e)))
}

fn path_from_row(row: &neo4rs::Row) -> HubResult<GraphPath> {
    let ids: Vec<String> = row_value(row, "ids")?;
    let labels: Vec<String> = row_value(row, "node_labels")?;
    let names: Vec<Option<String>> = row_value(row, "names")?;
    let rel_types: Vec<String> = row_value(row, "rel_types")?;
    let nodes = ids
        .into_iter()
        .zip(labels)
        .zip(names)
        .map(|((id, label), name)| NodeSummary { label, id, name })
        .collect();
    Ok(GraphPath {
        length: rel_types.len(),
        nodes,
        relationships: rel_types,
    })
}

/// Runs a query inside a pooled read transaction and folds every row.
async fn collect_rows<'a, T, F>(pool: &'a GraphPool, q: Query, mut fold: F) -> HubResult<Vec<T>>
where
    T: Send,
    F: FnMut(&neo4rs::Row) -> HubResult<T> + Send + 'static,
{
    pool.run_read(move |txn: &mut neo4rs::Txn| {
        Box::pin(async move {
            let mut stream = txn.execute(q).await.map_err(map_driver_err)?;
            let mut out = Vec::new();
            while let Some(row) = stream.next(txn.handle()).await.map_err(map_driver_err)? {
                out.push(fold(&row)?);
            }
            Ok(out)
        }) as BoxFuture<'_, HubResult<Vec<T>>>
    })
    .await
}

#[async_trait]
impl GraphStore for Neo4jGraph {
    async fn create_entity(&self, label: &str, mut props: PropMap) -> HubResult<PropMap> {
        let label = ident(label)?.to_string();
        let id = require_id(&props)?;
        let now = utc_now_iso();
        props
            .entry("created_at".to_string())
            .or_insert_with(|| Value::String(now.clone()));
        props
            .entry("updated_at".to_string())
            .or_insert_with(|| Value::String(now));
        let check = query(&format!(
            "MATCH (n:{} {{id: $id}}) RETURN count(n) AS c",
            label
        ))
        .param("id", id.as_str());
        let create = query(&format!(
            "CREATE (n:{}) SET n = $props RETURN properties(n) AS props",
            label
        ))
        .param("props", BoltType::Map(map_to_bolt(&props)));
        let dup = format!("{}:{}", label, id);
        self.pool
            .run_write(move |txn: &mut neo4rs::Txn| {
                Box::pin(async move {
                    let mut stream = txn.execute(check).await.map_err(map_driver_err)?;
                    let existing = match stream.next(txn.handle()).await.map_err(map_driver_err)? {
                        Some(row) => row_value::<i64>(&row, "c")?,
                        None => 0,
                    };
                    if existing > 0 {
                        return Err(HubError::Duplicate(dup));
                    }
                    let mut stream = txn.execute(create).await.map_err(map_driver_err)?;
                    match stream.next(txn.handle()).await.map_err(map_driver_err)? {
                        Some(row) => row_props(&row, "props"),
                        None => Err(HubError::Internal("create returned no row".into())),
                    }
                }) as BoxFuture<'_, HubResult<PropMap>>
            })
            .await
    }

    async fn create_entities(&self, label: &str, batch: Vec<PropMap>) -> HubResult<usize> {
        let label = ident(label)?.to_string();
        let now = utc_now_iso();
        let mut ids = Vec::with_capacity(batch.len());
        let mut items = BoltList::default();
        for mut props in batch {
            let id = require_id(&props)?;
            if ids.contains(&id) {
                return Err(HubError::Duplicate(format!("{}:{}", label, id)));
            }
            ids.push(id);
            props
                .entry("created_at".to_string())
                .or_insert_with(|| Value::String(now.clone()));
            props
                .entry("updated_at".to_string())
                .or_insert_with(|| Value::String(now.clone()));
            items.push(BoltType::Map(map_to_bolt(&props)));
        }
        let n = ids.len();
        if n == 0 {
            return Ok(0);
        }
        let check = query(&format!(
            "MATCH (n:{}) WHERE n.id IN $ids RETURN collect(n.id) AS existing",
            label
        ))
        .param("ids", string_list(&ids));
        let insert = query(&format!(
            "UNWIND $batch AS props CREATE (n:{}) SET n = props",
            label
        ))
        .param("batch", BoltType::List(items));
        let label_for_err = label.clone();
        self.pool
            .run_write(move |txn: &mut neo4rs::Txn| {
                Box::pin(async move {
                    let mut stream = txn.execute(check).await.map_err(map_driver_err)?;
                    if let Some(row) = stream.next(txn.handle()).await.map_err(map_driver_err)? {
                        let existing: Vec<String> = row_value(&row, "existing")?;
                        if let Some(id) = existing.first() {
                            return Err(HubError::Duplicate(format!(
                                "{}:{}",
                                label_for_err, id
                            )));
                        }
                    }
                    txn.run(insert).await.map_err(map_driver_err)?;
                    Ok(n)
                }) as BoxFuture<'_, HubResult<usize>>
            })
            .await
    }

    async fn get_entity(&self, label: &str, id: &str) -> HubResult<Option<PropMap>> {
        let label = ident(label)?;
        let q = query(&format!(
            "MATCH (n:{} {{id: $id}}) RETURN properties(n) AS props LIMIT 1",
            label
        ))
        .param("id", id);
        let rows = collect_rows(&self.pool, q, |row| row_props(row, "props")).await?;
        Ok(rows.into_iter().next())
    }

    async fn find_entities(
        &self,
        label: &str,
        match_props: &PropMap,
        limit: usize,
        newest_first: bool,
    ) -> HubResult<Vec<PropMap>> {
        let label = ident(label)?;
        let mut clauses = Vec::new();
        for key in match_props.keys() {
            let key = ident(key)?;
            clauses.push(format!("n.{} = $match.{}", key, key));
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let order = if newest_first {
            " ORDER BY n.created_at DESC"
        } else {
            ""
        };
        let q = query(&format!(
            "MATCH (n:{}){} RETURN properties(n) AS props{} LIMIT {}",
            label,
            where_clause,
            order,
            limit.max(1)
        ))
        .param("match", BoltType::Map(map_to_bolt(match_props)));
        collect_rows(&self.pool, q, |row| row_props(row, "props")).await
    }

    async fn update_entity(&self, label: &str, id: &str, mut props: PropMap) -> HubResult<PropMap> {
        let label = ident(label)?;
        props.remove("created_at");
        props.insert("updated_at".to_string(), Value::String(utc_now_iso()));
        let q = query(&format!(
            "MATCH (n:{} {{id: $id}}) SET n += $props RETURN properties(n) AS props",
            label
        ))
        .param("id", id)
        .param("props", BoltType::Map(map_to_bolt(&props)));
        let rows = collect_rows(&self.pool, q, |row| row_props(row, "props")).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| HubError::NotFound(format!("{}:{}", label, id)))
    }

    async fn delete_entity(&self, label: &str, id: &str) -> HubResult<bool> {
        let label = ident(label)?;
        let q = query(&format!(
            "MATCH (n:{} {{id: $id}}) DETACH DELETE n RETURN count(*) AS removed",
            label
        ))
        .param("id", id);
        let rows = collect_rows(&self.pool, q, |row| row_value::<i64>(row, "removed")).await?;
        Ok(rows.first().copied().unwrap_or(0) > 0)
    }

    async fn count_entities(&self, label: &str) -> HubResult<u64> {
        let label = ident(label)?;
        let q = query(&format!("MATCH (n:{}) RETURN count(n) AS c", label));
        let rows = collect_rows(&self.pool, q, |row| row_value::<i64>(row, "c")).await?;
        Ok(rows.first().copied().unwrap_or(0).max(0) as u64)
    }

    async fn create_relationship(
        &self,
        from: &EntityRef,
        rel_type: &str,
        to: &EntityRef,
        props: Option<PropMap>,
    ) -> HubResult<PropMap> {
        let from_label = ident(&from.label)?;
        let to_label = ident(&to.label)?;
        let rel_type = ident(rel_type)?;
        let mut props = props.unwrap_or_default();
        props
            .entry("created_at".to_string())
            .or_insert_with(|| Value::String(utc_now_iso()));
        let q = query(&format!(
            "MATCH (a:{} {{id: $from}}), (b:{} {{id: $to}}) \
             CREATE (a)-[r:{}]->(b) SET r = $props RETURN properties(r) AS props",
            from_label, to_label, rel_type
        ))
        .param("from", from.id.as_str())
        .param("to", to.id.as_str())
        .param("props", BoltType::Map(map_to_bolt(&props)));
        let rows = collect_rows(&self.pool, q, |row| row_props(row, "props")).await?;
        rows.into_iter().next().ok_or_else(|| {
            HubError::NotFound(format!("endpoint missing for {} -> {}", from, to))
        })
    }

    async fn relationships_for(
        &self,
        label: &str,
        id: &str,
        direction: Direction,
        rel_type: Option<&str>,
    ) -> HubResult<Vec<RelatedEntity>> {
        let label = ident(label)?;
        let typ = match rel_type {
            Some(t) => format!(":{}", ident(t)?),
            None => String::new(),
        };
        let pattern = match direction {
            Direction::Out => format!("(n:{} {{id: $id}})-[r{}]->(m)", label, typ),
            Direction::In => format!("(n:{} {{id: $id}})<-[r{}]-(m)", label, typ),
            Direction::Both => format!("(n:{} {{id: $id}})-[r{}]-(m)", label, typ),
        };
        let q = query(&format!(
            "MATCH {} RETURN type(r) AS rel_type, properties(r) AS rel_props, \
             properties(m) AS other, labels(m) AS other_labels, \
             startNode(r) = n AS outgoing",
            pattern
        ))
        .param("id", id);
        collect_rows(&self.pool, q, |row| {
            let outgoing: bool = row_value(row, "outgoing")?;
            Ok(RelatedEntity {
                rel_type: row_value(row, "rel_type")?,
                rel_props: row_props(row, "rel_props")?,
                direction: if outgoing { Direction::Out } else { Direction::In },
                other: row_props(row, "other")?,
                other_labels: row_value(row, "other_labels")?,
            })
        })
        .await
    }

    async fn find_relationship(
        &self,
        from: &EntityRef,
        rel_type: &str,
        to: &EntityRef,
    ) -> HubResult<Option<PropMap>> {
        let from_label = ident(&from.label)?;
        let to_label = ident(&to.label)?;
        let rel_type = ident(rel_type)?;
        let q = query(&format!(
            "MATCH (a:{} {{id: $from}})-[r:{}]->(b:{} {{id: $to}}) \
             RETURN properties(r) AS props LIMIT 1",
            from_label, rel_type, to_label
        ))
        .param("from", from.id.as_str())
        .param("to", to.id.as_str());
        let rows = collect_rows(&self.pool, q, |row| row_props(row, "props")).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_relationship(
        &self,
        from: &EntityRef,
        rel_type: &str,
        to: &EntityRef,
        props: PropMap,
    ) -> HubResult<PropMap> {
        let from_label = ident(&from.label)?;
        let to_label = ident(&to.label)?;
        let rel_ident = ident(rel_type)?;
        let q = query(&format!(
            "MATCH (a:{} {{id: $from}})-[r:{}]->(b:{} {{id: $to}}) \
             SET r += $props RETURN properties(r) AS props",
            from_label, rel_ident, to_label
        ))
        .param("from", from.id.as_str())
        .param("to", to.id.as_str())
        .param("props", BoltType::Map(map_to_bolt(&props)));
        let rows = collect_rows(&self.pool, q, |row| row_props(row, "props")).await?;
        rows.into_iter().next().ok_or_else(|| {
            HubError::NotFound(format!("{} -[{}]-> {}", from, rel_type, to))
        })
    }

    async fn delete_relationship(
        &self,
        from: &EntityRef,
        rel_type: &str,
        to: &EntityRef,
    ) -> HubResult<bool> {
        let from_label = ident(&from.label)?;
        let to_label = ident(&to.label)?;
        let rel_type = ident(rel_type)?;
        let q = query(&format!(
            "MATCH (a:{} {{id: $from}})-[r:{}]->(b:{} {{id: $to}}) \
             DELETE r RETURN count(*) AS removed",
            from_label, rel_type, to_label
        ))
        .param("from", from.id.as_str())
        .param("to", to.id.as_str());
        let rows = collect_rows(&self.pool, q, |row| row_value::<i64>(row, "removed")).await?;
        Ok(rows.first().copied().unwrap_or(0) > 0)
    }

    async fn delete_relationships_for(&self, label: &str, id: &str) -> HubResult<u64> {
        let label = ident(label)?;
        let q = query(&format!(
            "MATCH (n:{} {{id: $id}})-[r]-() DELETE r RETURN count(*) AS removed",
            label
        ))
        .param("id", id);
        let rows = collect_rows(&self.pool, q, |row| row_value::<i64>(row, "removed")).await?;
        Ok(rows.first().copied().unwrap_or(0).max(0) as u64)
    }

    async fn count_relationships_for(
        &self,
        label: &str,
        id: &str,
        rel_type: Option<&str>,
    ) -> HubResult<u64> {
        let label = ident(label)?;
        let typ = match rel_type {
            Some(t) => format!(":{}", ident(t)?),
            None => String::new(),
        };
        let q = query(&format!(
            "MATCH (n:{} {{id: $id}})-[r{}]-() RETURN count(r) AS c",
            label, typ
        ))
        .param("id", id);
        let rows = collect_rows(&self.pool, q, |row| row_value::<i64>(row, "c")).await?;
        Ok(rows.first().copied().unwrap_or(0).max(0) as u64)
    }

    async fn connected(
        &self,
        label: &str,
        id: &str,
        max_depth: usize,
    ) -> HubResult<Vec<SubgraphNode>> {
        let label = ident(label)?;
        let depth = clamp_depth(max_depth);
        let anchor = self.get_entity(label, id).await?;
        if anchor.is_none() {
            return Err(HubError::NotFound(format!("{}:{}", label, id)));
        }
        let q = query(&format!(
            "MATCH (a:{} {{id: $id}})-[*1..{}]-(m) WHERE m <> a \
             WITH DISTINCT m LIMIT {} \
             RETURN properties(m) AS props, labels(m) AS node_labels",
            label, depth, DEFAULT_NODE_CAP
        ))
        .param("id", id);
        collect_rows(&self.pool, q, |row| {
            Ok(SubgraphNode {
                labels: row_value(row, "node_labels")?,
                props: row_props(row, "props")?,
            })
        })
        .await
    }

    async fn shortest_path(
        &self,
        from: &EntityRef,
        to: &EntityRef,
        max_depth: usize,
    ) -> HubResult<Option<GraphPath>> {
        let from_label = ident(&from.label)?;
        let to_label = ident(&to.label)?;
        let depth = clamp_depth(max_depth);
        let q = query(&format!(
            "MATCH (a:{} {{id: $from}}), (b:{} {{id: $to}}), \
             p = shortestPath((a)-[*..{}]-(b)) \
             RETURN [n IN nodes(p) | n.id] AS ids, \
                    [n IN nodes(p) | head(labels(n))] AS node_labels, \
                    [n IN nodes(p) | n.name] AS names, \
                    [r IN relationships(p) | type(r)] AS rel_types \
             LIMIT 1",
            from_label, to_label, depth
        ))
        .param("from", from.id.as_str())
        .param("to", to.id.as_str());
        let rows = collect_rows(&self.pool, q, path_from_row).await?;
        Ok(rows.into_iter().next())
    }

    async fn all_paths(
        &self,
        from: &EntityRef,
        to: &EntityRef,
        max_depth: usize,
        limit: usize,
    ) -> HubResult<Vec<GraphPath>> {
        let from_label = ident(&from.label)?;
        let to_label = ident(&to.label)?;
        let depth = clamp_depth(max_depth);
        let q = query(&format!(
            "MATCH p = (a:{} {{id: $from}})-[*..{}]-(b:{} {{id: $to}}) \
             RETURN [n IN nodes(p) | n.id] AS ids, \
                    [n IN nodes(p) | head(labels(n))] AS node_labels, \
                    [n IN nodes(p) | n.name] AS names, \
                    [r IN relationships(p) | type(r)] AS rel_types \
             ORDER BY length(p) LIMIT {}",
            from_label, depth, to_label,
            limit.max(1)
        ))
        .param("from", from.id.as_str())
        .param("to", to.id.as_str());
        collect_rows(&self.pool, q, path_from_row).await
    }

    async fn subgraph(
        &self,
        label: &str,
        id: &str,
        radius: usize,
        node_cap: usize,
    ) -> HubResult<Subgraph> {
        let label = ident(label)?;
        let depth = clamp_depth(radius);
        let cap = if node_cap == 0 { DEFAULT_NODE_CAP } else { node_cap };
        let anchor = self.get_entity(label, id).await?;
        if anchor.is_none() {
            return Err(HubError::NotFound(format!("{}:{}", label, id)));
        }
        let nodes_q = query(&format!(
            "MATCH (a:{} {{id: $id}})-[*0..{}]-(m) \
             WITH DISTINCT m LIMIT {} \
             RETURN properties(m) AS props, labels(m) AS node_labels, m.id AS mid",
            label, depth, cap
        ))
        .param("id", id);
        let collected = collect_rows(&self.pool, nodes_q, |row| {
            let mid: Option<String> = row_value(row, "mid")?;
            Ok((
                SubgraphNode {
                    labels: row_value(row, "node_labels")?,
                    props: row_props(row, "props")?,
                },
                mid,
            ))
        })
        .await?;
        let ids: Vec<String> = collected.iter().filter_map(|(_, id)| id.clone()).collect();
        let nodes = collected.into_iter().map(|(n, _)| n).collect();
        let rels_q = query(
            "MATCH (a)-[r]->(b) WHERE a.id IN $ids AND b.id IN $ids \
             RETURN a.id AS from, type(r) AS rel_type, b.id AS to",
        )
        .param("ids", string_list(&ids));
        let relationships = collect_rows(&self.pool, rels_q, |row| {
            Ok(SubgraphRel {
                from: row_value(row, "from")?,
                rel_type: row_value(row, "rel_type")?,
                to: row_value(row, "to")?,
            })
        })
        .await?;
        Ok(Subgraph {
            nodes,
            relationships,
        })
    }

    async fn rel_stats(&self, label: &str, id: &str) -> HubResult<Vec<RelStat>> {
        let label = ident(label)?;
        let q = query(&format!(
            "MATCH (n:{} {{id: $id}})-[r]-(m) \
             RETURN type(r) AS rel_type, head(labels(m)) AS neighbor_label, \
             count(*) AS cnt ORDER BY cnt DESC, rel_type",
            label
        ))
        .param("id", id);
        collect_rows(&self.pool, q, |row| {
            Ok(RelStat {
                rel_type: row_value(row, "rel_type")?,
                neighbor_label: row_value(row, "neighbor_label")?,
                count: row_value::<i64>(row, "cnt")?.max(0) as u64,
            })
        })
        .await
    }

    async fn search_by_text(
        &self,
        label: &str,
        query_text: &str,
        fields: &[String],
        limit: usize,
    ) -> HubResult<Vec<PropMap>> {
        let label = ident(label)?;
        if fields.is_empty() {
            return Err(HubError::InvalidInput("search fields must not be empty".into()));
        }
        let mut clauses = Vec::with_capacity(fields.len());
        for field in fields {
            let field = ident(field)?;
            clauses.push(format!(
                "toLower(coalesce(toString(n.{}), '')) CONTAINS $needle",
                field
            ));
        }
        let q = query(&format!(
            "MATCH (n:{}) WHERE {} RETURN properties(n) AS props LIMIT {}",
            label,
            clauses.join(" OR "),
            limit.max(1)
        ))
        .param("needle", query_text.to_lowercase().as_str());
        collect_rows(&self.pool, q, |row| row_props(row, "props")).await
    }

    async fn health(&self) -> GraphHealth {
        self.pool.health().await
    }
}
