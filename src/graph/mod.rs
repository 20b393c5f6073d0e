//! Knowledge Graph: an authoritative labeled directed multigraph over two
//! node kinds (memory, entity), persisted as a single JSON document.
//!
//! Unlike a derived visualization structure, this graph is a source of
//! truth: entities and relationships created here are never regenerated
//! from the Record Store. Adjacency is a hand-rolled forward+reverse
//! `HashMap`, guarded by a `parking_lot::RwLock` — no external graph crate,
//! matching the rest of this corpus.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MemoryError, Result};
use crate::types::{CreatedBy, Edge, EdgeType, Entity, EntityStatus, EntityType};

/// Ids containing these characters are rejected on insert; a malformed
/// snapshot from an older format may still contain them, in which case the
/// load-time sanity sweep strips the offending nodes instead of failing.
static MALFORMED_ID_SIGIL: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>"'`\\]"#).unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNode {
    pub id: String,
    pub memory_type: String,
    pub project: Option<String>,
    pub source_role: Option<String>,
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: String,
    pub entity_type: EntityType,
    pub name: String,
    pub status: EntityStatus,
    #[serde(default)]
    pub attrs: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum GraphNode {
    Memory(MemoryNode),
    Entity(EntityNode),
}

impl GraphNode {
    pub fn id(&self) -> &str {
        match self {
            GraphNode::Memory(m) => &m.id,
            GraphNode::Entity(e) => &e.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct GraphSnapshot {
    nodes: Vec<GraphNode>,
    edges: Vec<Edge>,
}

#[derive(Default)]
struct GraphState {
    nodes: HashMap<String, GraphNode>,
    forward: HashMap<String, Vec<Edge>>,
    reverse: HashMap<String, Vec<Edge>>,
}

/// The Knowledge Graph. Cheap to clone (shares the lock and the snapshot
/// path); every mutating call takes the exclusive lock and snapshots to
/// disk before releasing it.
pub struct KnowledgeGraph {
    state: RwLock<GraphState>,
    snapshot_path: Option<PathBuf>,
}

impl KnowledgeGraph {
    /// Build an empty graph that is never persisted, for tests.
    pub fn in_memory() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            snapshot_path: None,
        }
    }

    /// Load `knowledge_graph.json` at `path` if it exists, else start empty.
    /// Malformed nodes (ids containing regex sigils, empty names) from an
    /// older snapshot format are dropped during load rather than rejected.
    pub fn open(path: &Path) -> Result<Self> {
        let mut state = GraphState::default();
        if path.exists() {
            let text = std::fs::read_to_string(path)?;
            let snapshot: GraphSnapshot = serde_json::from_str(&text)?;
            for node in snapshot.nodes {
                if MALFORMED_ID_SIGIL.is_match(node.id()) {
                    tracing::warn!(id = node.id(), "dropping malformed node on snapshot load");
                    continue;
                }
                state.nodes.insert(node.id().to_string(), node);
            }
            for edge in snapshot.edges {
                if state.nodes.contains_key(&edge.source) && state.nodes.contains_key(&edge.target) {
                    state.forward.entry(edge.source.clone()).or_default().push(edge.clone());
                    state.reverse.entry(edge.target.clone()).or_default().push(edge);
                }
            }
        }
        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    fn snapshot(&self, state: &GraphState) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let nodes: Vec<GraphNode> = state.nodes.values().cloned().collect();
        let edges: Vec<Edge> = state.forward.values().flatten().cloned().collect();
        let snapshot = GraphSnapshot { nodes, edges };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    fn reject_malformed(id: &str) -> Result<()> {
        if id.is_empty() || MALFORMED_ID_SIGIL.is_match(id) {
            return Err(MemoryError::Validation(format!("malformed node id: {id}")));
        }
        Ok(())
    }

    pub fn add_memory_node(&self, id: &str, memory_type: &str, project: Option<String>, source_role: Option<String>, attrs: Map<String, Value>) -> Result<()> {
        Self::reject_malformed(id)?;
        let mut state = self.state.write();
        state.nodes.insert(
            id.to_string(),
            GraphNode::Memory(MemoryNode {
                id: id.to_string(),
                memory_type: memory_type.to_string(),
                project,
                source_role,
                attrs,
            }),
        );
        self.snapshot(&state)
    }

    pub fn add_entity_node(&self, entity: &Entity) -> Result<()> {
        Self::reject_malformed(&entity.id)?;
        if entity.name.trim().is_empty() {
            return Err(MemoryError::Validation("entity name must not be empty".into()));
        }
        let mut state = self.state.write();
        state.nodes.insert(
            entity.id.clone(),
            GraphNode::Entity(EntityNode {
                id: entity.id.clone(),
                entity_type: entity.entity_type,
                name: entity.name.clone(),
                status: entity.status,
                attrs: Map::new(),
            }),
        );
        self.snapshot(&state)
    }

    pub fn update_node_attr(&self, id: &str, key: &str, value: Value) -> Result<()> {
        let mut state = self.state.write();
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| MemoryError::NotFound(id.to_string()))?;
        match node {
            GraphNode::Memory(m) => {
                m.attrs.insert(key.to_string(), value);
            }
            GraphNode::Entity(e) => {
                e.attrs.insert(key.to_string(), value);
            }
        }
        self.snapshot(&state)
    }

    pub fn remove_node(&self, id: &str) -> Result<()> {
        let mut state = self.state.write();
        state.nodes.remove(id);
        state.forward.remove(id);
        state.reverse.remove(id);
        for edges in state.forward.values_mut() {
            edges.retain(|e| e.target != id);
        }
        for edges in state.reverse.values_mut() {
            edges.retain(|e| e.source != id);
        }
        self.snapshot(&state)
    }

    /// Adds `edge`; if `edge.bidirectional` and the edge type has a reverse
    /// label, the reverse edge is also written.
    pub fn add_edge(&self, edge: Edge) -> Result<()> {
        let mut state = self.state.write();
        if !state.nodes.contains_key(&edge.source) {
            return Err(MemoryError::NotFound(edge.source.clone()));
        }
        if !state.nodes.contains_key(&edge.target) {
            return Err(MemoryError::NotFound(edge.target.clone()));
        }
        let reverse_edge = if edge.bidirectional {
            edge.edge_type.reverse().map(|rev| Edge {
                source: edge.target.clone(),
                target: edge.source.clone(),
                edge_type: rev,
                strength: edge.strength,
                confidence: edge.confidence,
                created_at: edge.created_at,
                created_by: edge.created_by,
                evidence: edge.evidence.clone(),
                bidirectional: false,
            })
        } else {
            None
        };

        state.forward.entry(edge.source.clone()).or_default().push(edge.clone());
        state.reverse.entry(edge.target.clone()).or_default().push(edge);

        if let Some(rev) = reverse_edge {
            state.forward.entry(rev.source.clone()).or_default().push(rev.clone());
            state.reverse.entry(rev.target.clone()).or_default().push(rev);
        }

        self.snapshot(&state)
    }

    pub fn node(&self, id: &str) -> Option<GraphNode> {
        self.state.read().nodes.get(id).cloned()
    }

    pub fn successors(&self, id: &str) -> Vec<Edge> {
        self.state.read().forward.get(id).cloned().unwrap_or_default()
    }

    pub fn predecessors(&self, id: &str) -> Vec<Edge> {
        self.state.read().reverse.get(id).cloned().unwrap_or_default()
    }

    pub fn edges_of_type(&self, edge_type: EdgeType) -> Vec<Edge> {
        self.state
            .read()
            .forward
            .values()
            .flatten()
            .filter(|e| e.edge_type == edge_type)
            .cloned()
            .collect()
    }

    /// BFS over memory-typed neighbors (through entity mentions) up to
    /// `depth` hops, intentionally graph-only with no vector fallback.
    pub fn related_memories(&self, id: &str, depth: usize) -> Vec<String> {
        let state = self.state.read();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(id.to_string());
        let mut frontier = vec![id.to_string()];
        let mut found: Vec<String> = Vec::new();

        for _ in 0..depth {
            let mut next = Vec::new();
            for node_id in &frontier {
                let neighbors = state
                    .forward
                    .get(node_id)
                    .into_iter()
                    .flatten()
                    .map(|e| e.target.clone())
                    .chain(state.reverse.get(node_id).into_iter().flatten().map(|e| e.source.clone()));
                for neighbor in neighbors {
                    if visited.insert(neighbor.clone()) {
                        if matches!(state.nodes.get(&neighbor), Some(GraphNode::Memory(_))) {
                            found.push(neighbor.clone());
                        }
                        next.push(neighbor);
                    }
                }
            }
            frontier = next;
        }
        found
    }

    pub fn memories_by_entity(&self, entity_id: &str) -> Vec<String> {
        self.state
            .read()
            .reverse
            .get(entity_id)
            .into_iter()
            .flatten()
            .filter(|e| e.edge_type == EdgeType::Mentions)
            .map(|e| e.source.clone())
            .collect()
    }

    /// Fuzzy-matches `goal_name` case-insensitively against `goal` entity
    /// names, then returns memories blocked on it via `blocked_by`.
    pub fn blockers_for(&self, goal_name: &str) -> Vec<String> {
        let state = self.state.read();
        let needle = goal_name.to_lowercase();
        let goal_id = state.nodes.values().find_map(|n| match n {
            GraphNode::Entity(e) if e.entity_type == EntityType::Goal && e.name.to_lowercase().contains(&needle) => {
                Some(e.id.clone())
            }
            _ => None,
        });
        let Some(goal_id) = goal_id else {
            return Vec::new();
        };
        state
            .reverse
            .get(&goal_id)
            .into_iter()
            .flatten()
            .filter(|e| e.edge_type == EdgeType::BlockedBy)
            .map(|e| e.source.clone())
            .collect()
    }

    /// Memories that `task_name` (type `task_type`, default `"phase"`)
    /// requires. Empty for a first-in-chain phase with no `requires` edges.
    pub fn requirements_for(&self, task_name: &str) -> Vec<String> {
        let state = self.state.read();
        let needle = task_name.to_lowercase();
        let task_id = state.nodes.values().find_map(|n| match n {
            GraphNode::Entity(e) if e.name.to_lowercase().contains(&needle) => Some(e.id.clone()),
            _ => None,
        });
        let Some(task_id) = task_id else {
            return Vec::new();
        };
        state
            .forward
            .get(&task_id)
            .into_iter()
            .flatten()
            .filter(|e| e.edge_type == EdgeType::Requires)
            .map(|e| e.target.clone())
            .collect()
    }

    pub fn contradictions(&self, memory_id: &str) -> Vec<String> {
        self.state
            .read()
            .forward
            .get(memory_id)
            .into_iter()
            .flatten()
            .filter(|e| e.edge_type == EdgeType::Contradicts)
            .map(|e| e.target.clone())
            .collect()
    }

    /// Entities sorted by total (in + out) edge count, descending.
    pub fn hub_entities(&self, limit: usize) -> Vec<(String, usize)> {
        let state = self.state.read();
        let mut degree: HashMap<String, usize> = HashMap::new();
        for (id, node) in &state.nodes {
            if matches!(node, GraphNode::Entity(_)) {
                let out = state.forward.get(id).map(|v| v.len()).unwrap_or(0);
                let in_ = state.reverse.get(id).map(|v| v.len()).unwrap_or(0);
                degree.insert(id.clone(), out + in_);
            }
        }
        let mut list: Vec<(String, usize)> = degree.into_iter().collect();
        list.sort_by(|a, b| b.1.cmp(&a.1));
        list.truncate(limit);
        list
    }

    /// Unweighted BFS shortest path; `None` if unreachable.
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_string()]);
        }
        let state = self.state.read();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(from.to_string());
        let mut queue: VecDeque<Vec<String>> = VecDeque::new();
        queue.push_back(vec![from.to_string()]);

        while let Some(path) = queue.pop_front() {
            let last = path.last().unwrap().clone();
            let neighbors = state
                .forward
                .get(&last)
                .into_iter()
                .flatten()
                .map(|e| e.target.clone());
            for neighbor in neighbors {
                if neighbor == to {
                    let mut full = path.clone();
                    full.push(neighbor);
                    return Some(full);
                }
                if visited.insert(neighbor.clone()) {
                    let mut next = path.clone();
                    next.push(neighbor);
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Walks reverse `supersedes` edges (i.e. forward `precedes`-from-newer
    /// direction is modeled as `new -supersedes-> old`, so the current
    /// version is found by following edges *into* each node via
    /// `supersedes`) until no newer version exists. Detects cycles.
    pub fn current_version(&self, memory_id: &str) -> Result<String> {
        let state = self.state.read();
        let mut current = memory_id.to_string();
        let mut visited = HashSet::new();
        visited.insert(current.clone());

        loop {
            let newer = state
                .reverse
                .get(&current)
                .into_iter()
                .flatten()
                .find(|e| e.edge_type == EdgeType::Supersedes)
                .map(|e| e.source.clone());
            match newer {
                Some(next) if visited.insert(next.clone()) => {
                    current = next;
                }
                Some(_) => {
                    return Err(MemoryError::Validation(format!(
                        "cycle detected in supersedes chain at {current}"
                    )));
                }
                None => return Ok(current),
            }
        }
    }

    /// `validations` is read from `attrs["validation_count"]` before the
    /// increment; returns the new confidence, matching the formula
    /// `min(0.95, 0.5 + 0.1 * validations)`.
    pub fn validate_memory(&self, memory_id: &str, now: DateTime<Utc>) -> Result<f64> {
        let mut state = self.state.write();
        let node = state
            .nodes
            .get_mut(memory_id)
            .ok_or_else(|| MemoryError::NotFound(memory_id.to_string()))?;
        let attrs = match node {
            GraphNode::Memory(m) => &mut m.attrs,
            GraphNode::Entity(_) => {
                return Err(MemoryError::Validation("not a memory node".into()));
            }
        };
        let validations = attrs
            .get("validation_count")
            .and_then(Value::as_i64)
            .unwrap_or(0)
            + 1;
        let confidence = (0.5 + 0.1 * validations as f64).min(0.95);
        attrs.insert("validation_count".into(), Value::from(validations));
        attrs.insert("last_validated".into(), Value::from(now.to_rfc3339()));
        attrs.insert("confidence".into(), serde_json::json!(confidence));
        self.snapshot(&state)?;
        Ok(confidence)
    }

    /// ASCII tree of the 1-hop neighborhood around `id`.
    pub fn visualize_neighborhood(&self, id: &str) -> String {
        let state = self.state.read();
        let Some(node) = state.nodes.get(id) else {
            return format!("{id} (not found)");
        };
        let label = |n: &GraphNode| -> String {
            match n {
                GraphNode::Memory(m) => format!("[memory] {} ({})", m.id, m.memory_type),
                GraphNode::Entity(e) => format!("[entity] {} ({})", e.name, e.entity_type),
            }
        };
        let mut out = String::new();
        out.push_str(&label(node));
        out.push('\n');
        for edge in state.forward.get(id).into_iter().flatten() {
            if let Some(target) = state.nodes.get(&edge.target) {
                out.push_str(&format!("  --{}--> {}\n", edge.edge_type, label(target)));
            }
        }
        for edge in state.reverse.get(id).into_iter().flatten() {
            if let Some(source) = state.nodes.get(&edge.source) {
                out.push_str(&format!("  <--{}-- {}\n", edge.edge_type, label(source)));
            }
        }
        out
    }

    pub fn node_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.state.read().forward.values().map(|v| v.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{entity_id, CreatedBy};

    fn edge(source: &str, target: &str, edge_type: EdgeType, bidirectional: bool) -> Edge {
        Edge {
            source: source.to_string(),
            target: target.to_string(),
            edge_type,
            strength: 1.0,
            confidence: 1.0,
            created_at: Utc::now(),
            created_by: CreatedBy::Auto,
            evidence: None,
            bidirectional,
        }
    }

    fn sample_entity(entity_type: EntityType, name: &str) -> Entity {
        Entity {
            id: entity_id(entity_type, name),
            entity_type,
            name: name.to_string(),
            status: EntityStatus::Active,
            priority: None,
            description: None,
        }
    }

    #[test]
    fn add_edge_rejects_missing_endpoints() {
        let graph = KnowledgeGraph::in_memory();
        graph.add_memory_node("mem_a", "fact", None, None, Map::new()).unwrap();
        let err = graph.add_edge(edge("mem_a", "mem_missing", EdgeType::Mentions, false)).unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(_)));
    }

    #[test]
    fn bidirectional_edge_writes_reverse_pair() {
        let graph = KnowledgeGraph::in_memory();
        graph.add_memory_node("mem_a", "fact", None, None, Map::new()).unwrap();
        graph.add_memory_node("mem_b", "fact", None, None, Map::new()).unwrap();
        graph.add_edge(edge("mem_a", "mem_b", EdgeType::Supersedes, true)).unwrap();
        let succ = graph.successors("mem_b");
        assert_eq!(succ.len(), 1);
        assert_eq!(succ[0].edge_type, EdgeType::Precedes);
    }

    #[test]
    fn entity_add_is_idempotent_by_canonical_id() {
        let graph = KnowledgeGraph::in_memory();
        let a = sample_entity(EntityType::Goal, "Ship MVP");
        let b = sample_entity(EntityType::Goal, "ship mvp");
        assert_eq!(a.id, b.id);
        graph.add_entity_node(&a).unwrap();
        graph.add_entity_node(&b).unwrap();
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn blockers_for_fuzzy_matches_goal_name() {
        let graph = KnowledgeGraph::in_memory();
        let goal = sample_entity(EntityType::Goal, "Ship the MVP release");
        graph.add_entity_node(&goal).unwrap();
        graph.add_memory_node("mem_blocker", "solution", None, None, Map::new()).unwrap();
        graph.add_edge(edge("mem_blocker", &goal.id, EdgeType::BlockedBy, false)).unwrap();

        let blockers = graph.blockers_for("ship the mvp");
        assert_eq!(blockers, vec!["mem_blocker".to_string()]);
    }

    #[test]
    fn current_version_follows_supersedes_chain() {
        let graph = KnowledgeGraph::in_memory();
        graph.add_memory_node("mem_v1", "fact", None, None, Map::new()).unwrap();
        graph.add_memory_node("mem_v2", "fact", None, None, Map::new()).unwrap();
        graph.add_memory_node("mem_v3", "fact", None, None, Map::new()).unwrap();
        graph.add_edge(edge("mem_v2", "mem_v1", EdgeType::Supersedes, false)).unwrap();
        graph.add_edge(edge("mem_v3", "mem_v2", EdgeType::Supersedes, false)).unwrap();

        assert_eq!(graph.current_version("mem_v1").unwrap(), "mem_v3");
        assert_eq!(graph.current_version("mem_v3").unwrap(), "mem_v3");
    }

    #[test]
    fn current_version_detects_cycle() {
        let graph = KnowledgeGraph::in_memory();
        graph.add_memory_node("mem_a", "fact", None, None, Map::new()).unwrap();
        graph.add_memory_node("mem_b", "fact", None, None, Map::new()).unwrap();
        graph.add_edge(edge("mem_b", "mem_a", EdgeType::Supersedes, false)).unwrap();
        graph.add_edge(edge("mem_a", "mem_b", EdgeType::Supersedes, false)).unwrap();

        assert!(graph.current_version("mem_a").is_err());
    }

    #[test]
    fn validate_memory_raises_confidence_and_caps_at_095() {
        let graph = KnowledgeGraph::in_memory();
        graph.add_memory_node("mem_a", "fact", None, None, Map::new()).unwrap();
        let now = Utc::now();
        for _ in 0..10 {
            graph.validate_memory("mem_a", now).unwrap();
        }
        let conf = graph.validate_memory("mem_a", now).unwrap();
        assert!(conf <= 0.95);
    }

    #[test]
    fn shortest_path_finds_direct_and_transitive_routes() {
        let graph = KnowledgeGraph::in_memory();
        graph.add_memory_node("mem_a", "fact", None, None, Map::new()).unwrap();
        graph.add_memory_node("mem_b", "fact", None, None, Map::new()).unwrap();
        graph.add_memory_node("mem_c", "fact", None, None, Map::new()).unwrap();
        graph.add_edge(edge("mem_a", "mem_b", EdgeType::RelatedTo, false)).unwrap();
        graph.add_edge(edge("mem_b", "mem_c", EdgeType::RelatedTo, false)).unwrap();

        let path = graph.shortest_path("mem_a", "mem_c").unwrap();
        assert_eq!(path, vec!["mem_a", "mem_b", "mem_c"]);
        assert!(graph.shortest_path("mem_c", "mem_a").is_none());
    }

    #[test]
    fn remove_node_strips_dangling_edges() {
        let graph = KnowledgeGraph::in_memory();
        graph.add_memory_node("mem_a", "fact", None, None, Map::new()).unwrap();
        graph.add_memory_node("mem_b", "fact", None, None, Map::new()).unwrap();
        graph.add_edge(edge("mem_a", "mem_b", EdgeType::RelatedTo, false)).unwrap();
        graph.remove_node("mem_b").unwrap();
        assert!(graph.successors("mem_a").is_empty());
    }

    #[test]
    fn malformed_id_is_rejected_on_insert() {
        let graph = KnowledgeGraph::in_memory();
        let err = graph.add_memory_node("mem_<script>", "fact", None, None, Map::new()).unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }
}
