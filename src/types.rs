//! Core data model: memories, entities, graph edges, and configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of hex characters appended to the `mem_` id prefix.
pub const MEMORY_ID_HEX_LEN: usize = 12;

/// Embedding dimensionality. Fixed per Open Question decision in DESIGN.md:
/// the Vector Index refuses to load a store whose persisted width differs.
pub const EMBEDDING_DIM: usize = 768;

/// Open-valued memory type. The curated set gets real enum ergonomics;
/// anything else round-trips through `Other` without losing data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemoryType {
    Fact,
    Preference,
    Decision,
    Solution,
    Philosophy,
    Pattern,
    Other(String),
}

impl MemoryType {
    pub fn as_str(&self) -> &str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Preference => "preference",
            MemoryType::Decision => "decision",
            MemoryType::Solution => "solution",
            MemoryType::Philosophy => "philosophy",
            MemoryType::Pattern => "pattern",
            MemoryType::Other(s) => s.as_str(),
        }
    }

    /// The curated family used by the contradiction scan's "very similar,
    /// may be an update" heuristic.
    pub fn is_update_prone(&self) -> bool {
        matches!(
            self,
            MemoryType::Fact | MemoryType::Preference | MemoryType::Decision | MemoryType::Pattern
        )
    }
}

impl From<&str> for MemoryType {
    fn from(s: &str) -> Self {
        match s {
            "fact" => MemoryType::Fact,
            "preference" => MemoryType::Preference,
            "decision" => MemoryType::Decision,
            "solution" => MemoryType::Solution,
            "philosophy" => MemoryType::Philosophy,
            "pattern" => MemoryType::Pattern,
            other => MemoryType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for MemoryType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MemoryType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(MemoryType::from(s.as_str()))
    }
}

/// Memory lifecycle status. Only `Active` memories are searchable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryStatus {
    Active,
    Superseded,
    Archived,
    Experimental,
}

impl MemoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryStatus::Active => "active",
            MemoryStatus::Superseded => "superseded",
            MemoryStatus::Archived => "archived",
            MemoryStatus::Experimental => "experimental",
        }
    }
}

impl fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryStatus {
    type Err = crate::error::MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MemoryStatus::Active),
            "superseded" => Ok(MemoryStatus::Superseded),
            "archived" => Ok(MemoryStatus::Archived),
            "experimental" => Ok(MemoryStatus::Experimental),
            other => Err(crate::error::MemoryError::Validation(format!(
                "unknown memory status: {other}"
            ))),
        }
    }
}

impl Default for MemoryStatus {
    fn default() -> Self {
        MemoryStatus::Active
    }
}

/// A stored textual memory, as held by the Record Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub memory_type: MemoryType,
    pub project: Option<String>,
    pub source_role: Option<String>,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
    pub access_count: i64,
    pub surface_count: i64,
    pub validated: bool,
    pub status: MemoryStatus,
    pub metadata: serde_json::Value,
}

/// Clamp importance to the spec's [0, 1] invariant.
pub fn clamp_importance(importance: f32) -> f32 {
    importance.clamp(0.0, 1.0)
}

/// Generate a new memory id: `mem_` followed by 12 random hex chars.
pub fn new_memory_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; (MEMORY_ID_HEX_LEN + 1) / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    let hex = hex::encode(bytes);
    format!("mem_{}", &hex[..MEMORY_ID_HEX_LEN])
}

/// Entity kind for graph nodes of kind "entity".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Project,
    Episode,
    Phase,
    Tool,
    Concept,
    Goal,
    Blocker,
    Pattern,
    DecisionPoint,
    Person,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Project => "project",
            EntityType::Episode => "episode",
            EntityType::Phase => "phase",
            EntityType::Tool => "tool",
            EntityType::Concept => "concept",
            EntityType::Goal => "goal",
            EntityType::Blocker => "blocker",
            EntityType::Pattern => "pattern",
            EntityType::DecisionPoint => "decision_point",
            EntityType::Person => "person",
        }
    }

    pub fn all() -> &'static [EntityType] {
        &[
            EntityType::Project,
            EntityType::Episode,
            EntityType::Phase,
            EntityType::Tool,
            EntityType::Concept,
            EntityType::Goal,
            EntityType::Blocker,
            EntityType::Pattern,
            EntityType::DecisionPoint,
            EntityType::Person,
        ]
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = crate::error::MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(EntityType::Project),
            "episode" => Ok(EntityType::Episode),
            "phase" => Ok(EntityType::Phase),
            "tool" => Ok(EntityType::Tool),
            "concept" => Ok(EntityType::Concept),
            "goal" => Ok(EntityType::Goal),
            "blocker" => Ok(EntityType::Blocker),
            "pattern" => Ok(EntityType::Pattern),
            "decision_point" => Ok(EntityType::DecisionPoint),
            "person" => Ok(EntityType::Person),
            other => Err(crate::error::MemoryError::Validation(format!(
                "unknown entity type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Active,
    Achieved,
    Abandoned,
}

impl Default for EntityStatus {
    fn default() -> Self {
        EntityStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
}

/// Slugify a display name the way entity ids do: lowercase, spaces to
/// underscores. Deterministic so `(type, name)` always yields the same id.
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Canonical entity id: `entity:<type>:<slug>`.
pub fn entity_id(entity_type: EntityType, name: &str) -> String {
    format!("entity:{}:{}", entity_type.as_str(), slugify(name))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub entity_type: EntityType,
    pub name: String,
    pub status: EntityStatus,
    pub priority: Option<Priority>,
    pub description: Option<String>,
}

/// Who/what created a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatedBy {
    Auto,
    Assistant,
    User,
}

/// The 20-label relationship vocabulary, grouped into 5 families, with a
/// reverse-pair table. This is the spec's authoritative edge-type contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    // Temporal
    Supersedes,
    Precedes,
    EvolvedFrom,
    ActiveDuring,
    // Causal
    CausedBy,
    ResultedIn,
    MotivatedBy,
    BlockedBy,
    EnabledBy,
    TriggeredBy,
    // Structural
    PartOf,
    Contains,
    InstanceOf,
    PhaseOf,
    VersionOf,
    // Dependency
    Requires,
    Enables,
    Blocks,
    ConflictsWith,
    DependsOn,
    // Semantic
    SimilarTo,
    RelatedTo,
    ExampleOf,
    Contradicts,
    Reinforces,
    AppliesTo,
    Mentions,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Supersedes => "supersedes",
            EdgeType::Precedes => "precedes",
            EdgeType::EvolvedFrom => "evolved_from",
            EdgeType::ActiveDuring => "active_during",
            EdgeType::CausedBy => "caused_by",
            EdgeType::ResultedIn => "resulted_in",
            EdgeType::MotivatedBy => "motivated_by",
            EdgeType::BlockedBy => "blocked_by",
            EdgeType::EnabledBy => "enabled_by",
            EdgeType::TriggeredBy => "triggered_by",
            EdgeType::PartOf => "part_of",
            EdgeType::Contains => "contains",
            EdgeType::InstanceOf => "instance_of",
            EdgeType::PhaseOf => "phase_of",
            EdgeType::VersionOf => "version_of",
            EdgeType::Requires => "requires",
            EdgeType::Enables => "enables",
            EdgeType::Blocks => "blocks",
            EdgeType::ConflictsWith => "conflicts_with",
            EdgeType::DependsOn => "depends_on",
            EdgeType::SimilarTo => "similar_to",
            EdgeType::RelatedTo => "related_to",
            EdgeType::ExampleOf => "example_of",
            EdgeType::Contradicts => "contradicts",
            EdgeType::Reinforces => "reinforces",
            EdgeType::AppliesTo => "applies_to",
            EdgeType::Mentions => "mentions",
        }
    }

    /// The reverse label, if the vocabulary defines one for this edge type.
    pub fn reverse(&self) -> Option<EdgeType> {
        match self {
            EdgeType::Supersedes => Some(EdgeType::Precedes),
            EdgeType::Precedes => Some(EdgeType::Supersedes),
            EdgeType::CausedBy => Some(EdgeType::ResultedIn),
            EdgeType::ResultedIn => Some(EdgeType::CausedBy),
            EdgeType::BlockedBy => Some(EdgeType::Blocks),
            EdgeType::Blocks => Some(EdgeType::BlockedBy),
            EdgeType::PartOf => Some(EdgeType::Contains),
            EdgeType::Contains => Some(EdgeType::PartOf),
            EdgeType::Requires => Some(EdgeType::Enables),
            EdgeType::Enables => Some(EdgeType::Requires),
            _ => None,
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EdgeType {
    type Err = crate::error::MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "supersedes" => EdgeType::Supersedes,
            "precedes" => EdgeType::Precedes,
            "evolved_from" => EdgeType::EvolvedFrom,
            "active_during" => EdgeType::ActiveDuring,
            "caused_by" => EdgeType::CausedBy,
            "resulted_in" => EdgeType::ResultedIn,
            "motivated_by" => EdgeType::MotivatedBy,
            "blocked_by" => EdgeType::BlockedBy,
            "enabled_by" => EdgeType::EnabledBy,
            "triggered_by" => EdgeType::TriggeredBy,
            "part_of" => EdgeType::PartOf,
            "contains" => EdgeType::Contains,
            "instance_of" => EdgeType::InstanceOf,
            "phase_of" => EdgeType::PhaseOf,
            "version_of" => EdgeType::VersionOf,
            "requires" => EdgeType::Requires,
            "enables" => EdgeType::Enables,
            "blocks" => EdgeType::Blocks,
            "conflicts_with" => EdgeType::ConflictsWith,
            "depends_on" => EdgeType::DependsOn,
            "similar_to" => EdgeType::SimilarTo,
            "related_to" => EdgeType::RelatedTo,
            "example_of" => EdgeType::ExampleOf,
            "contradicts" => EdgeType::Contradicts,
            "reinforces" => EdgeType::Reinforces,
            "applies_to" => EdgeType::AppliesTo,
            "mentions" => EdgeType::Mentions,
            other => {
                return Err(crate::error::MemoryError::Validation(format!(
                    "unknown relation type: {other}"
                )))
            }
        })
    }
}

/// Attributes carried by every graph edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub edge_type: EdgeType,
    pub strength: f32,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub created_by: CreatedBy,
    pub evidence: Option<String>,
    pub bidirectional: bool,
}

/// An access-log row: one per memory returned from a `recall`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessLogRow {
    pub memory_id: String,
    pub query: Option<String>,
    pub role: Option<String>,
    pub project: Option<String>,
    pub relevance: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Storage mode, mirroring the teacher's local-vs-cloud-safe pragma split.
/// Cloud sync itself is out of scope; the mode still controls WAL vs DELETE
/// journaling so a data directory placed in a synced folder degrades safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    Local,
    CloudSafe,
}

impl Default for StorageMode {
    fn default() -> Self {
        StorageMode::Local
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub db_path: String,
    pub storage_mode: StorageMode,
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            storage_mode: StorageMode::Local,
        }
    }
}

/// Top-level engine configuration: where data lives and which embedder to use.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: std::path::PathBuf,
    pub storage_mode: StorageMode,
    pub embedding_dim: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".memnesis")
            .join("data");
        Self {
            data_dir,
            storage_mode: StorageMode::Local,
            embedding_dim: EMBEDDING_DIM,
        }
    }
}
