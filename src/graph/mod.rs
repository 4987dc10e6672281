//! `RedisGraph` client module.
//!
//! Provides graph-based storage for concept relationships, complementing
//! the vector store: Qdrant holds concept payloads and embeddings,
//! `RedisGraph` holds the relationship graph used for spreading activation
//! and traversal/export (§4.2, §4.3).

use crate::core::types::ConceptId;
use crate::memory::types::ConceptRelationType;
use redis::{Client, RedisError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Graph not found: {0}")]
    GraphNotFound(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;

/// One outgoing edge from a concept, as seen during spreading activation.
#[derive(Debug, Clone)]
pub struct ConceptEdge {
    pub target: ConceptId,
    pub strength: f32,
    pub relationship_type: ConceptRelationType,
}

/// `RedisGraph`-backed store of concept relationships.
pub struct ConceptGraph {
    client: Client,
    graph_name: String,
}

impl ConceptGraph {
    /// # Errors
    /// Returns [`GraphError::Redis`] if the connection URL is malformed.
    pub fn connect(redis_url: &str, graph_name: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self {
            client,
            graph_name: graph_name.to_string(),
        })
    }

    /// Merge a relationship edge between two concepts, creating nodes if
    /// they don't already exist and overwriting the edge's weight.
    ///
    /// # Errors
    /// Returns [`GraphError::Redis`] if the `GRAPH.QUERY` command fails.
    pub async fn merge_edge(
        &self,
        source: ConceptId,
        target: ConceptId,
        strength: f32,
        relationship_type: ConceptRelationType,
    ) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let type_str = format!("{relationship_type:?}");
        let query = format!(
            "MERGE (a:Concept {{id: '{source}'}}) \
                 MERGE (b:Concept {{id: '{target}'}}) \
                 MERGE (a)-[r:RELATED {{type: '{type_str}'}}]->(b) \
                 SET r.weight = {strength}"
        );

        let _: () = redis::cmd("GRAPH.QUERY")
            .arg(&self.graph_name)
            .arg(query)
            .query_async(&mut conn)
            .await?;

        Ok(())
    }

    /// Outgoing neighbors of `concept`, or both directions when
    /// `bidirectional` (§4.3 spreading activation honors the
    /// `SpreadingConfig::bidirectional` flag).
    ///
    /// # Errors
    /// Returns [`GraphError::Redis`] if the `GRAPH.QUERY` command fails.
    pub async fn neighbors(&self, concept: ConceptId, bidirectional: bool) -> Result<Vec<ConceptEdge>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let id_str = concept.to_string();

        let query = if bidirectional {
            format!(
                "MATCH (a:Concept {{id: '{id_str}'}})-[r:RELATED]->(b:Concept) \
                 RETURN b.id, r.weight, r.type \
                 UNION \
                 MATCH (a:Concept {{id: '{id_str}'}})<-[r:RELATED]-(b:Concept) \
                 RETURN b.id, r.weight, r.type"
            )
        } else {
            format!(
                "MATCH (a:Concept {{id: '{id_str}'}})-[r:RELATED]->(b:Concept) \
                 RETURN b.id, r.weight, r.type"
            )
        };

        let result: redis::Value = redis::cmd("GRAPH.QUERY")
            .arg(&self.graph_name)
            .arg(query)
            .query_async(&mut conn)
            .await?;

        let mut edges = Vec::new();
        if let redis::Value::Array(sections) = result {
            if sections.len() >= 2 {
                if let redis::Value::Array(ref rows) = sections[1] {
                    for row in rows {
                        if let redis::Value::Array(ref fields) = row {
                            if fields.len() >= 2 {
                                let id_opt = Self::extract_string(&fields[0]);
                                let weight_opt = Self::extract_float(&fields[1]);
                                if let (Some(id_str), Some(weight)) = (id_opt, weight_opt) {
                                    if let Ok(uuid) = uuid::Uuid::parse_str(&id_str) {
                                        edges.push(ConceptEdge {
                                            target: ConceptId(uuid),
                                            strength: weight,
                                            relationship_type: ConceptRelationType::RelatedTo,
                                        });
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(edges)
    }

    fn extract_string(value: &redis::Value) -> Option<String> {
        match value {
            redis::Value::BulkString(bytes) => String::from_utf8(bytes.clone()).ok(),
            redis::Value::SimpleString(s) => Some(s.clone()),
            redis::Value::Array(items) if !items.is_empty() => Self::extract_string(&items[0]),
            _ => None,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn extract_float(value: &redis::Value) -> Option<f32> {
        match value {
            redis::Value::Double(d) => Some(*d as f32),
            redis::Value::Int(i) => Some(*i as f32),
            redis::Value::BulkString(bytes) => String::from_utf8(bytes.clone())
                .ok()
                .and_then(|s| s.parse::<f32>().ok()),
            redis::Value::SimpleString(s) => s.parse::<f32>().ok(),
            redis::Value::Array(items) if !items.is_empty() => Self::extract_float(&items[0]),
            _ => None,
        }
    }

    /// Export the concept graph to `GraphML` for external visualization.
    ///
    /// # Errors
    /// Returns [`GraphError::Redis`] if either `GRAPH.QUERY` call fails.
    pub async fn export_graphml(&self) -> Result<String> {
        use std::fmt::Write;

        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let nodes_query = "MATCH (n:Concept) RETURN n.id";
        let nodes_result: redis::Value = redis::cmd("GRAPH.QUERY")
            .arg(&self.graph_name)
            .arg(nodes_query)
            .query_async(&mut conn)
            .await?;

        let mut node_ids: Vec<String> = Vec::new();
        if let redis::Value::Array(sections) = &nodes_result {
            if sections.len() >= 2 {
                if let redis::Value::Array(ref rows) = sections[1] {
                    for row in rows {
                        if let redis::Value::Array(ref fields) = row {
                            if let Some(id) = fields.first().and_then(Self::extract_string) {
                                node_ids.push(id);
                            }
                        }
                    }
                }
            }
        }

        let edges_query =
            "MATCH (a:Concept)-[r:RELATED]->(b:Concept) RETURN a.id, b.id, r.weight, r.type";
        let edges_result: redis::Value = redis::cmd("GRAPH.QUERY")
            .arg(&self.graph_name)
            .arg(edges_query)
            .query_async(&mut conn)
            .await?;

        let mut edges: Vec<(String, String, f32, String)> = Vec::new();
        if let redis::Value::Array(sections) = &edges_result {
            if sections.len() >= 2 {
                if let redis::Value::Array(ref rows) = sections[1] {
                    for row in rows {
                        if let redis::Value::Array(ref fields) = row {
                            if fields.len() >= 4 {
                                let source = Self::extract_string(&fields[0]);
                                let target = Self::extract_string(&fields[1]);
                                let weight = Self::extract_float(&fields[2]).unwrap_or(0.0);
                                let edge_type = Self::extract_string(&fields[3])
                                    .unwrap_or_else(|| "Unknown".to_string());
                                if let (Some(s), Some(t)) = (source, target) {
                                    edges.push((s, t, weight, edge_type));
                                }
                            }
                        }
                    }
                }
            }
        }

        let mut xml = String::new();
        xml.push_str(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns"
         xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
         xsi:schemaLocation="http://graphml.graphdrawing.org/xmlns
         http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd">
  <key id="weight" for="edge" attr.name="weight" attr.type="double"/>
  <key id="type" for="edge" attr.name="type" attr.type="string"/>
  <graph id="cortexd" edgedefault="directed">
"#,
        );

        for id in &node_ids {
            let _ = writeln!(xml, "    <node id=\"{id}\"/>");
        }

        for (i, (source, target, weight, edge_type)) in edges.iter().enumerate() {
            let _ = writeln!(
                xml,
                "    <edge id=\"e{i}\" source=\"{source}\" target=\"{target}\">"
            );
            let _ = writeln!(xml, "      <data key=\"weight\">{weight}</data>");
            let _ = writeln!(xml, "      <data key=\"type\">{edge_type}</data>");
            xml.push_str("    </edge>\n");
        }

        xml.push_str("  </graph>\n</graphml>\n");

        tracing::info!(
            nodes = node_ids.len(),
            edges = edges.len(),
            "exported concept graph to GraphML"
        );

        Ok(xml)
    }
}

impl std::fmt::Debug for ConceptGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptGraph")
            .field("client", &self.client)
            .field("graph_name", &self.graph_name)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn connect_rejects_malformed_url() {
        assert!(ConceptGraph::connect("not a url", "concepts").is_err());
    }
}
