//! The Memory Engine: the coordinator every caller goes through.
//!
//! Owns the three coupled stores (Record Store, Vector Index, Knowledge
//! Graph) plus the embedder, and implements the composite scoring formula,
//! auto-extraction, and the cross-store consistency rules that bind them.

mod contradiction;
mod extraction;
mod scoring;
mod stopwords;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::embedding::{cosine_similarity, Embedder, TfIdfEmbedder};
use crate::error::{MemoryError, Result};
use crate::graph::KnowledgeGraph;
use crate::storage::{queries, AggregateCounts, FieldValue, ScanFilters, Storage};
use crate::types::{
    clamp_importance, entity_id, new_memory_id, AccessLogRow, CreatedBy, Edge, EdgeType, Entity,
    EntityStatus, EntityType, Memory, MemoryStatus, MemoryType, Priority, StorageConfig,
};
use crate::vector::{VectorFilter, VectorIndex, VectorMetadata};

pub use contradiction::ConflictReason;

/// Result of a `remember` call: either the write went through, or the
/// contradiction scan (only run when requested) found issues and nothing
/// was written.
#[derive(Debug)]
pub enum RememberOutcome {
    Written { id: String },
    ConflictsFound { conflicts: Vec<ConflictInfo> },
}

#[derive(Debug, Clone)]
pub struct ConflictInfo {
    pub memory_id: String,
    pub content: String,
    pub similarity: f32,
    pub reasons: Vec<String>,
}

/// One scored result from `recall`/`context`, matching the spec's result
/// field contract verbatim.
#[derive(Debug, Clone)]
pub struct RecallResult {
    pub id: String,
    pub content: String,
    pub memory_type: String,
    pub project: Option<String>,
    pub source_role: Option<String>,
    pub importance: f32,
    pub relevance: f32,
    pub similarity: f32,
    pub freshness: f32,
    pub role_affinity: f32,
    pub keyword_boost: f32,
    pub keyword_matches: usize,
    pub access_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ClusterCandidate {
    pub ids: Vec<String>,
    pub topic: String,
}

#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub total: i64,
    pub active: i64,
    pub archived: i64,
    pub by_type: Vec<(String, i64)>,
    pub by_project: Vec<(Option<String>, i64)>,
    pub graph_nodes: usize,
    pub graph_edges: usize,
}

/// The coordinator. Cheap to clone: `Storage` and `VectorIndex` wrap a
/// shared connection, `KnowledgeGraph` wraps a shared lock, and the
/// embedder is boxed behind an `Arc`.
#[derive(Clone)]
pub struct MemoryEngine {
    storage: Storage,
    vector: VectorIndex,
    graph: Arc<KnowledgeGraph>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryEngine {
    pub fn open(config: crate::types::EngineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let storage = Storage::open(StorageConfig {
            db_path: config.data_dir.join("memories.db").to_string_lossy().to_string(),
            storage_mode: config.storage_mode,
        })?;
        if let Some(warning) = storage.storage_mode_warning() {
            tracing::warn!("{warning}");
        }
        let vector = VectorIndex::new(storage.clone(), config.embedding_dim);
        let graph = Arc::new(KnowledgeGraph::open(&config.data_dir.join("knowledge_graph.json"))?);
        let embedder: Arc<dyn Embedder> = Arc::new(TfIdfEmbedder::new(config.embedding_dim));
        Ok(Self { storage, vector, graph, embedder })
    }

    /// In-memory engine with no filesystem footprint, for tests.
    pub fn in_memory(dimensions: usize) -> Result<Self> {
        let storage = Storage::open_in_memory()?;
        let vector = VectorIndex::new(storage.clone(), dimensions);
        let graph = Arc::new(KnowledgeGraph::in_memory());
        let embedder: Arc<dyn Embedder> = Arc::new(TfIdfEmbedder::new(dimensions));
        Ok(Self { storage, vector, graph, embedder })
    }

    // ---- remember -------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip(self, content, metadata), fields(project = ?project))]
    pub fn remember(
        &self,
        content: &str,
        memory_type: &str,
        importance: f32,
        project: Option<String>,
        source_role: Option<String>,
        metadata: Option<Value>,
        check_conflicts: bool,
        supersede: &[String],
    ) -> Result<RememberOutcome> {
        if content.trim().is_empty() {
            return Err(MemoryError::Validation("content must not be empty".into()));
        }
        let importance = clamp_importance(importance);
        let memory_type = MemoryType::from(memory_type);

        if check_conflicts {
            let conflicts = self.scan_conflicts(content, project.as_deref())?;
            if !conflicts.is_empty() {
                return Ok(RememberOutcome::ConflictsFound { conflicts });
            }
        }

        let now = Utc::now();
        let id = new_memory_id();

        for old_id in supersede {
            let mut old = self.storage.with_connection(|conn| queries::get_by_id(conn, old_id))?;
            old.metadata["superseded_by"] = json!(id.clone());
            self.storage.with_connection(|conn| {
                queries::update_fields(
                    conn,
                    old_id,
                    &[
                        ("status", FieldValue::Text(MemoryStatus::Superseded.as_str().to_string())),
                        ("metadata", FieldValue::Text(old.metadata.to_string())),
                    ],
                )
            })?;
            self.vector.delete(old_id)?;
        }

        let embedding = self.embedder.embed(content)?;

        let memory = Memory {
            id: id.clone(),
            content: content.to_string(),
            memory_type: memory_type.clone(),
            project: project.clone(),
            source_role: source_role.clone(),
            importance,
            created_at: now,
            accessed_at: now,
            access_count: 0,
            surface_count: 0,
            validated: false,
            status: MemoryStatus::Active,
            metadata: metadata.unwrap_or_else(|| json!({})),
        };

        self.storage.with_connection(|conn| queries::insert(conn, &memory))?;

        if let Err(e) = self.vector.upsert(
            &id,
            &embedding,
            &VectorMetadata {
                memory_type: Some(memory_type.as_str().to_string()),
                project: project.clone(),
                source_role: source_role.clone(),
                importance: Some(importance),
            },
        ) {
            self.rollback_record(&id);
            return Err(e);
        }

        let impact = if importance >= 0.7 {
            "high"
        } else if importance >= 0.4 {
            "medium"
        } else {
            "low"
        };
        let mut attrs = Map::new();
        attrs.insert("confidence".into(), json!(importance));
        attrs.insert("impact".into(), json!(impact));
        if let Err(e) = self.graph.add_memory_node(
            &id,
            memory_type.as_str(),
            project.clone(),
            source_role.clone(),
            attrs,
        ) {
            self.rollback_record(&id);
            if let Err(e2) = self.vector.delete(&id) {
                tracing::warn!(error = %e2, id = %id, "failed to roll back vector entry after graph write failure");
            }
            return Err(e);
        }

        for old_id in supersede {
            if let Err(e) = self.graph.add_edge(Edge {
                source: id.clone(),
                target: old_id.clone(),
                edge_type: EdgeType::Supersedes,
                strength: 1.0,
                confidence: 1.0,
                created_at: now,
                created_by: CreatedBy::Auto,
                evidence: None,
                bidirectional: true,
            }) {
                tracing::warn!(error = %e, old_id = %old_id, "failed to add supersedes edge");
            }
        }

        if let Err(e) = self.run_auto_extraction(&id, content, &memory_type, now) {
            tracing::warn!(error = %e, id = %id, "auto-extraction failed");
        }

        Ok(RememberOutcome::Written { id })
    }

    /// Deletes the Record row written at the start of `remember` when a
    /// later tri-store write (vector or graph) fails, so a failed `remember`
    /// never leaves an orphan active record behind.
    fn rollback_record(&self, id: &str) {
        if let Err(e) = self.storage.with_connection(|conn| queries::delete(conn, id)) {
            tracing::warn!(error = %e, id = %id, "failed to roll back record after tri-store write failure");
        }
    }

    fn run_auto_extraction(
        &self,
        memory_id: &str,
        content: &str,
        memory_type: &MemoryType,
        now: DateTime<Utc>,
    ) -> Result<()> {
        for found in extraction::extract_entities(content) {
            let eid = entity_id(found.entity_type, &found.name);
            let entity = Entity {
                id: eid.clone(),
                entity_type: found.entity_type,
                name: found.name,
                status: EntityStatus::Active,
                priority: None,
                description: None,
            };
            self.graph.add_entity_node(&entity)?;
            self.graph.add_edge(Edge {
                source: memory_id.to_string(),
                target: eid,
                edge_type: EdgeType::Mentions,
                strength: 0.5,
                confidence: 0.6,
                created_at: now,
                created_by: CreatedBy::Auto,
                evidence: None,
                bidirectional: false,
            })?;
        }

        for hit in extraction::extract_patterns(content, memory_type) {
            let eid = entity_id(hit.entity.entity_type, &hit.entity.name);
            let entity = Entity {
                id: eid.clone(),
                entity_type: hit.entity.entity_type,
                name: hit.entity.name,
                status: EntityStatus::Active,
                priority: None,
                description: None,
            };
            self.graph.add_entity_node(&entity)?;
            self.graph.add_edge(Edge {
                source: memory_id.to_string(),
                target: eid,
                edge_type: hit.edge_type,
                strength: 0.7,
                confidence: hit.confidence,
                created_at: now,
                created_by: CreatedBy::Auto,
                evidence: None,
                bidirectional: false,
            })?;
        }

        for hit in extraction::scan_relationship_keywords(content) {
            for entity_type in EntityType::all() {
                let candidate = extraction::candidate_entity_id(*entity_type, &hit.target_slug);
                if self.graph.node(&candidate).is_some() {
                    self.graph.add_edge(Edge {
                        source: memory_id.to_string(),
                        target: candidate,
                        edge_type: hit.edge_type,
                        strength: 0.6,
                        confidence: hit.confidence,
                        created_at: now,
                        created_by: CreatedBy::Auto,
                        evidence: None,
                        bidirectional: false,
                    })?;
                    break;
                }
            }
        }

        Ok(())
    }

    // ---- contradiction scan ---------------------------------------------

    fn scan_conflicts(&self, content: &str, project: Option<&str>) -> Result<Vec<ConflictInfo>> {
        let embedding = self.embedder.embed(content)?;
        let filter = project.map(|p| VectorFilter::Project(p.to_string()));
        let neighbors = self.vector.top_k(&embedding, 10, filter.as_ref())?;

        let mut conflicts = Vec::new();
        for (id, distance) in neighbors {
            let similarity = 1.0 - distance;
            if similarity < 0.5 {
                continue;
            }
            let Some(existing) = self.storage.with_connection(|conn| queries::try_get_by_id(conn, &id))? else {
                continue;
            };
            if existing.status != MemoryStatus::Active {
                continue;
            }
            let reasons = contradiction::detect_conflicts(
                content,
                &existing.content,
                similarity,
                existing.memory_type.is_update_prone(),
            );
            if !reasons.is_empty() {
                conflicts.push(ConflictInfo {
                    memory_id: existing.id,
                    content: existing.content,
                    similarity,
                    reasons: reasons.iter().map(ConflictReason::describe).collect(),
                });
            }
        }
        Ok(conflicts)
    }

    // ---- recall / context -------------------------------------------------

    #[tracing::instrument(skip(self, query), fields(project = ?project))]
    pub fn recall(
        &self,
        query: &str,
        limit: usize,
        project: Option<&str>,
        memory_types: &[String],
        current_role: Option<&str>,
        hybrid_search: bool,
    ) -> Result<Vec<RecallResult>> {
        let query_embedding = self.embedder.embed(query)?;
        let keywords: Vec<String> = if hybrid_search {
            extract_keywords(query)
        } else {
            Vec::new()
        };

        let filter = if let Some(p) = project {
            Some(VectorFilter::Project(p.to_string()))
        } else if memory_types.len() == 1 {
            Some(VectorFilter::MemoryType(memory_types[0].clone()))
        } else {
            None
        };

        let neighbors = self.vector.top_k(&query_embedding, limit * 2, filter.as_ref())?;
        let now = Utc::now();

        let mut results = Vec::new();
        for (id, distance) in neighbors {
            let similarity = 1.0 - distance;
            let Some(mut memory) = self.storage.with_connection(|conn| queries::try_get_by_id(conn, &id))? else {
                continue;
            };
            if memory.status != MemoryStatus::Active {
                continue;
            }

            let reference_time = memory.created_at.max(memory.accessed_at);
            let age_days = ((now - reference_time).num_seconds() as f32 / 86_400.0).max(0.0);

            memory.accessed_at = now;
            memory.access_count += 1;
            memory.surface_count += 1;
            let mut became_validated = false;
            if memory.surface_count >= 5 && !memory.validated {
                memory.validated = true;
                became_validated = true;
            }
            self.storage.with_connection(|conn| {
                queries::update_fields(
                    conn,
                    &id,
                    &[
                        ("accessed_at", FieldValue::Text(now.to_rfc3339())),
                        ("access_count", FieldValue::Int(memory.access_count)),
                        ("surface_count", FieldValue::Int(memory.surface_count)),
                        ("validated", FieldValue::Bool(memory.validated)),
                    ],
                )
            })?;
            if became_validated {
                if let Err(e) = self.graph.validate_memory(&id, now) {
                    tracing::warn!(error = %e, id = %id, "implicit validation failed");
                }
            }

            let keyword_overlap = scoring::keyword_overlap(&memory.content, &keywords);
            let same_role = current_role.is_some() && memory.source_role.as_deref() == current_role;

            let input = scoring::ScoringInput {
                similarity,
                age_days,
                access_count: memory.access_count as u32,
                importance: memory.importance,
                keyword_overlap,
                same_role,
            };
            let relevance = scoring::score(input);
            let freshness = (-0.023 * age_days).exp();
            let keyword_boost = 1.0 + 0.25 * keyword_overlap;
            let role_affinity = if same_role { 1.15 } else { 1.0 };
            let keyword_matches = keywords
                .iter()
                .filter(|kw| memory.content.to_lowercase().contains(kw.as_str()))
                .count();

            self.storage.with_connection(|conn| {
                queries::append_access_log(
                    conn,
                    &AccessLogRow {
                        memory_id: id.clone(),
                        query: Some(query.to_string()),
                        role: current_role.map(str::to_string),
                        project: project.map(str::to_string),
                        relevance: Some(relevance as f64),
                        timestamp: now,
                    },
                )
            })
            .unwrap_or_else(|e| tracing::warn!(error = %e, "access log append failed"));

            results.push(RecallResult {
                id: id.clone(),
                content: memory.content,
                memory_type: memory.memory_type.as_str().to_string(),
                project: memory.project,
                source_role: memory.source_role,
                importance: memory.importance,
                relevance,
                similarity,
                freshness,
                role_affinity,
                keyword_boost,
                keyword_matches,
                access_count: memory.access_count,
                created_at: memory.created_at,
            });
        }

        if memory_types.len() > 1 {
            let allowed: HashSet<&str> = memory_types.iter().map(String::as_str).collect();
            results.retain(|r| allowed.contains(r.memory_type.as_str()));
        }

        results.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.access_count.cmp(&a.access_count))
                .then(b.created_at.cmp(&a.created_at))
        });
        results.truncate(limit);
        Ok(results)
    }

    pub fn context(
        &self,
        query: &str,
        cwd: Option<&str>,
        limit: usize,
        current_role: Option<&str>,
    ) -> Result<Vec<RecallResult>> {
        let Some(project) = cwd.and_then(detect_project) else {
            return self.recall(query, limit, None, &[], current_role, true);
        };

        let mut scoped = self.recall(query, limit, Some(&project), &[], current_role, true)?;
        let universal = self.recall(query, limit, None, &[], current_role, true)?;

        let mut seen: HashSet<String> = scoped.iter().map(|r| r.id.clone()).collect();
        for r in universal {
            if r.project.is_none() && seen.insert(r.id.clone()) {
                scoped.push(r);
            }
        }
        scoped.truncate(limit);
        Ok(scoped)
    }

    // ---- related / get_by_entity ------------------------------------------

    pub fn related(&self, memory_id: &str, limit: usize) -> Result<Vec<Memory>> {
        let ids = self.graph.related_memories(memory_id, 2);
        let mut out = Vec::new();
        for id in ids.into_iter().take(limit) {
            if let Some(m) = self.storage.with_connection(|conn| queries::try_get_by_id(conn, &id))? {
                out.push(m);
            }
        }
        Ok(out)
    }

    pub fn get_by_entity(&self, entity_type: EntityType, entity_name: &str, limit: usize) -> Result<Vec<Memory>> {
        let eid = entity_id(entity_type, entity_name);
        let ids = self.graph.memories_by_entity(&eid);
        let mut out = Vec::new();
        for id in ids.into_iter().take(limit) {
            if let Some(m) = self.storage.with_connection(|conn| queries::try_get_by_id(conn, &id))? {
                out.push(m);
            }
        }
        Ok(out)
    }

    // ---- consolidation ------------------------------------------------------

    pub fn consolidate_candidates(&self, threshold: f32, min_cluster: usize) -> Result<Vec<ClusterCandidate>> {
        let active = self.storage.with_connection(|conn| {
            queries::scan(
                conn,
                &ScanFilters { status: Some(MemoryStatus::Active), ..Default::default() },
                i64::MAX,
                true,
            )
        })?;

        let mut vectors = Vec::new();
        for m in &active {
            if let Some(v) = self.vector.get(&m.id)? {
                vectors.push((m.id.clone(), m.content.clone(), v));
            }
        }

        let mut assigned: HashSet<String> = HashSet::new();
        let mut clusters = Vec::new();
        for i in 0..vectors.len() {
            if assigned.contains(&vectors[i].0) {
                continue;
            }
            let mut cluster = vec![i];
            for j in (i + 1)..vectors.len() {
                if assigned.contains(&vectors[j].0) {
                    continue;
                }
                if cosine_similarity(&vectors[i].2, &vectors[j].2) >= threshold {
                    cluster.push(j);
                }
            }
            if cluster.len() >= min_cluster {
                for &idx in &cluster {
                    assigned.insert(vectors[idx].0.clone());
                }
                let ids: Vec<String> = cluster.iter().map(|&idx| vectors[idx].0.clone()).collect();
                let topic = topic_label(cluster.iter().map(|&idx| vectors[idx].1.as_str()));
                clusters.push(ClusterCandidate { ids, topic });
            }
        }
        clusters.sort_by(|a, b| b.ids.len().cmp(&a.ids.len()));
        Ok(clusters)
    }

    pub fn consolidate(&self, ids: &[String], content: &str, memory_type: &str, importance: f32) -> Result<String> {
        if ids.is_empty() {
            return Err(MemoryError::Validation("consolidate requires at least one source id".into()));
        }
        let first = self.storage.with_connection(|conn| queries::get_by_id(conn, &ids[0]))?;
        let outcome = self.remember(
            content,
            memory_type,
            importance,
            first.project,
            None,
            None,
            false,
            &[],
        )?;
        let RememberOutcome::Written { id: new_id } = outcome else {
            return Err(MemoryError::StorageError("consolidate: unexpected conflict result".into()));
        };

        for old_id in ids {
            let mut old = self.storage.with_connection(|conn| queries::get_by_id(conn, old_id))?;
            old.metadata["consolidated_into"] = json!(new_id.clone());
            self.storage.with_connection(|conn| {
                queries::update_fields(conn, old_id, &[("metadata", FieldValue::Text(old.metadata.to_string()))])
            })?;
            self.vector.delete(old_id)?;
        }
        Ok(new_id)
    }

    // ---- lifecycle ----------------------------------------------------------

    pub fn validate_memory(&self, id: &str) -> Result<f64> {
        let confidence = self.graph.validate_memory(id, Utc::now())?;
        self.storage.with_connection(|conn| {
            queries::update_fields(conn, id, &[("validated", FieldValue::Bool(true))])
        })?;
        Ok(confidence)
    }

    pub fn get_current_memory(&self, id: &str) -> Result<Memory> {
        let current_id = self.graph.current_version(id)?;
        self.storage.with_connection(|conn| queries::get_by_id(conn, &current_id))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn link(
        &self,
        source: &str,
        target: &str,
        edge_type: EdgeType,
        strength: f32,
        confidence: f32,
        evidence: Option<String>,
        bidirectional: bool,
    ) -> Result<()> {
        self.graph.add_edge(Edge {
            source: source.to_string(),
            target: target.to_string(),
            edge_type,
            strength,
            confidence,
            created_at: Utc::now(),
            created_by: CreatedBy::User,
            evidence,
            bidirectional,
        })
    }

    pub fn add_entity(
        &self,
        entity_type: EntityType,
        name: &str,
        status: EntityStatus,
        priority: Option<Priority>,
        description: Option<String>,
    ) -> Result<Entity> {
        let entity = Entity {
            id: entity_id(entity_type, name),
            entity_type,
            name: name.to_string(),
            status,
            priority,
            description,
        };
        self.graph.add_entity_node(&entity)?;
        Ok(entity)
    }

    pub fn update(
        &self,
        id: &str,
        content: Option<&str>,
        memory_type: Option<&str>,
        importance: Option<f32>,
    ) -> Result<()> {
        let mut fields: Vec<(&str, FieldValue)> = Vec::new();
        if let Some(mt) = memory_type {
            fields.push(("memory_type", FieldValue::Text(mt.to_string())));
        }
        if let Some(imp) = importance {
            fields.push(("importance", FieldValue::Real(clamp_importance(imp) as f64)));
        }
        if let Some(c) = content {
            if c.trim().is_empty() {
                return Err(MemoryError::Validation("content must not be empty".into()));
            }
            fields.push(("content", FieldValue::Text(c.to_string())));
        }
        if !fields.is_empty() {
            self.storage.with_connection(|conn| queries::update_fields(conn, id, &fields))?;
        }
        if let Some(c) = content {
            let embedding = self.embedder.embed(c)?;
            let memory = self.storage.with_connection(|conn| queries::get_by_id(conn, id))?;
            self.vector.upsert(
                id,
                &embedding,
                &VectorMetadata {
                    memory_type: Some(memory.memory_type.as_str().to_string()),
                    project: memory.project,
                    source_role: memory.source_role,
                    importance: Some(memory.importance),
                },
            )?;
        }
        Ok(())
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.storage.with_connection(|conn| queries::delete(conn, id))?;
        self.vector.delete(id)?;
        self.graph.remove_node(id)?;
        Ok(())
    }

    // ---- graph pass-throughs --------------------------------------------

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    // ---- stats / maintenance ----------------------------------------------

    pub fn get_stats(&self) -> Result<EngineStats> {
        let AggregateCounts { total, active, archived, by_type, by_project } =
            self.storage.with_connection(|conn| queries::aggregate_counts(conn))?;
        Ok(EngineStats {
            total,
            active,
            archived,
            by_type,
            by_project,
            graph_nodes: self.graph.node_count(),
            graph_edges: self.graph.edge_count(),
        })
    }

    pub fn validation_candidates(&self, limit: usize) -> Result<Vec<Memory>> {
        let active = self.storage.with_connection(|conn| {
            queries::scan(
                conn,
                &ScanFilters { status: Some(MemoryStatus::Active), ..Default::default() },
                i64::MAX,
                true,
            )
        })?;
        let since = Utc::now() - chrono::Duration::days(30);
        let mut scored = Vec::new();
        for m in active {
            if m.access_count < 3 {
                continue;
            }
            let (count, avg_relevance) =
                self.storage.with_connection(|conn| queries::access_stats_since(conn, &m.id, since))?;
            if count == 0 {
                continue;
            }
            let score = m.access_count as f64 * avg_relevance;
            scored.push((score, m));
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored.into_iter().map(|(_, m)| m).collect())
    }

    pub fn prune_candidates(&self, limit: usize) -> Result<Vec<Memory>> {
        let active = self.storage.with_connection(|conn| {
            queries::scan(
                conn,
                &ScanFilters { status: Some(MemoryStatus::Active), ..Default::default() },
                i64::MAX,
                true,
            )
        })?;
        let cutoff = Utc::now() - chrono::Duration::days(30);
        let mut candidates: Vec<Memory> = active
            .into_iter()
            .filter(|m| {
                m.created_at < cutoff
                    && m.access_count < 3
                    && m.importance < 0.7
                    && !m.metadata.get("archived").and_then(Value::as_bool).unwrap_or(false)
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.importance
                .partial_cmp(&b.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.access_count.cmp(&b.access_count))
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    pub fn get_recent_memories(&self, limit: usize, project: Option<&str>) -> Result<Vec<Memory>> {
        self.storage.with_connection(|conn| {
            queries::scan(
                conn,
                &ScanFilters {
                    project: project.map(str::to_string),
                    status: Some(MemoryStatus::Active),
                    ..Default::default()
                },
                limit as i64,
                true,
            )
        })
    }
}

fn extract_keywords(query: &str) -> Vec<String> {
    static TOKEN: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"\b[a-zA-Z0-9]+\b").unwrap());
    TOKEN
        .find_iter(&query.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|t| t.len() > 2 && !stopwords::is_stopword(t))
        .collect()
}

fn detect_project(cwd: &str) -> Option<String> {
    for pattern in [
        r"^/mnt/dev/ai/([^/]+)",
        r"^/home/[^/]+/projects/([^/]+)",
        r"^/workspace/([^/]+)",
    ] {
        if let Ok(re) = regex::Regex::new(pattern) {
            if let Some(caps) = re.captures(cwd) {
                return Some(caps[1].to_string());
            }
        }
    }
    None
}

/// Top-5 content words of length > 4 by frequency, for cluster topic labels.
fn topic_label<'a>(contents: impl Iterator<Item = &'a str>) -> String {
    let mut freq: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for content in contents {
        for word in content.to_lowercase().split_whitespace() {
            let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            if cleaned.len() > 4 && !stopwords::is_stopword(&cleaned) {
                *freq.entry(cleaned).or_insert(0) += 1;
            }
        }
    }
    let mut words: Vec<(String, usize)> = freq.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1));
    words.into_iter().take(5).map(|(w, _)| w).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remember_then_recall_round_trips() {
        let engine = MemoryEngine::in_memory(128).unwrap();
        let outcome = engine
            .remember("We use SQLite for local storage", "decision", 0.8, None, None, None, false, &[])
            .unwrap();
        let RememberOutcome::Written { id } = outcome else { panic!("expected write") };

        let results = engine.recall("SQLite storage", 5, None, &[], None, true).unwrap();
        assert!(results.iter().any(|r| r.id == id));
    }

    #[test]
    fn supersede_marks_old_memory_and_links_edge() {
        let engine = MemoryEngine::in_memory(128).unwrap();
        let RememberOutcome::Written { id: old } = engine
            .remember("Use Python for scripts", "decision", 0.6, None, None, None, false, &[])
            .unwrap()
        else {
            panic!()
        };
        let RememberOutcome::Written { id: new } = engine
            .remember("Use Rust for scripts", "decision", 0.6, None, None, None, false, &[old.clone()])
            .unwrap()
        else {
            panic!()
        };
        let old_record = engine.storage.with_connection(|conn| queries::get_by_id(conn, &old)).unwrap();
        assert_eq!(old_record.status, MemoryStatus::Superseded);
        assert_eq!(engine.get_current_memory(&old).unwrap().id, new);
    }

    #[test]
    fn check_conflicts_blocks_write_on_opposition() {
        let engine = MemoryEngine::in_memory(128).unwrap();
        engine
            .remember("Always use SQLite for local storage", "decision", 0.8, None, None, None, false, &[])
            .unwrap();
        let outcome = engine
            .remember(
                "Never use SQLite, prefer PostgreSQL instead",
                "decision",
                0.8,
                None,
                None,
                None,
                true,
                &[],
            )
            .unwrap();
        assert!(matches!(outcome, RememberOutcome::ConflictsFound { .. }));
    }

    #[test]
    fn empty_content_is_rejected() {
        let engine = MemoryEngine::in_memory(128).unwrap();
        let err = engine.remember("   ", "fact", 0.5, None, None, None, false, &[]).unwrap_err();
        assert!(matches!(err, MemoryError::Validation(_)));
    }

    #[test]
    fn delete_removes_from_all_three_stores() {
        let engine = MemoryEngine::in_memory(128).unwrap();
        let RememberOutcome::Written { id } = engine
            .remember("Temporary note", "fact", 0.3, None, None, None, false, &[])
            .unwrap()
        else {
            panic!()
        };
        engine.delete(&id).unwrap();
        assert!(engine.storage.with_connection(|conn| queries::try_get_by_id(conn, &id)).unwrap().is_none());
        assert!(engine.vector.get(&id).unwrap().is_none());
        assert!(engine.graph.node(&id).is_none());
    }

    #[test]
    fn context_merges_project_and_universal_scopes() {
        let engine = MemoryEngine::in_memory(128).unwrap();
        engine
            .remember(
                "Project alpha uses feature flags for rollout",
                "fact",
                0.5,
                Some("alpha".into()),
                None,
                None,
                false,
                &[],
            )
            .unwrap();
        engine
            .remember("Always write tests before shipping", "preference", 0.5, None, None, None, false, &[])
            .unwrap();

        let results = engine.context("rollout", Some("/mnt/dev/ai/alpha/src"), 5, None).unwrap();
        assert!(results.iter().any(|r| r.project.as_deref() == Some("alpha")));
    }

    #[test]
    fn detect_project_matches_known_prefixes() {
        assert_eq!(detect_project("/mnt/dev/ai/memnesis/src"), Some("memnesis".to_string()));
        assert_eq!(detect_project("/home/alice/projects/widget"), Some("widget".to_string()));
        assert_eq!(detect_project("/etc/nowhere"), None);
    }
}
