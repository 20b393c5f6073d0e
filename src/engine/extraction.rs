//! Auto-extraction run on every `remember`: known-entity name scanning,
//! goal/blocker/pattern regex extraction, and relationship keyword scanning.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{entity_id, slugify, EntityType};

/// A candidate entity mention pulled out of free text.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedEntity {
    pub entity_type: EntityType,
    pub name: String,
}

const MIN_NAME_LEN: usize = 5;
const MAX_NAME_LEN: usize = 50;

/// Curated set of known projects/tools/concepts the extractor recognizes
/// case-insensitively. Kept small and explicit rather than learned.
const KNOWN_ENTITIES: &[(&str, EntityType)] = &[
    ("rust", EntityType::Tool),
    ("python", EntityType::Tool),
    ("sqlite", EntityType::Tool),
    ("postgresql", EntityType::Tool),
    ("typescript", EntityType::Tool),
    ("javascript", EntityType::Tool),
    ("react", EntityType::Tool),
    ("vue", EntityType::Tool),
    ("docker", EntityType::Tool),
    ("kubernetes", EntityType::Tool),
    ("vector search", EntityType::Concept),
    ("knowledge graph", EntityType::Concept),
    ("embedding", EntityType::Concept),
    ("consolidation", EntityType::Concept),
    ("implicit validation", EntityType::Concept),
    ("ingestion", EntityType::Phase),
    ("retrieval", EntityType::Phase),
    ("consolidation phase", EntityType::Phase),
];

static EPISODE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bEP\d{3}[A-Z]?\b").unwrap());
static PROJECT_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/mnt/dev/(?:ai|video)/([A-Za-z0-9_-]+)").unwrap());

static GOAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:goal:|objective:|primary goal|aiming to)\s*([^\n.;]{3,80})").unwrap()
});
static BLOCKER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:blocker:|blocked by|obstacle:|stuck on|prevents)\s*([^\n.;]{3,80})")
        .unwrap()
});
static SOLUTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:pattern:|approach:|best practice:)\s*([^\n.;]{3,80})").unwrap()
});

fn clean_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim().trim_end_matches(|c: char| c.is_ascii_punctuation());
    if trimmed.len() < MIN_NAME_LEN {
        return None;
    }
    let truncated: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    Some(truncated)
}

/// Scan `content` for known entity names, episode codes, and project paths.
/// Order-preserving, deduplicated by `(type, name)`.
pub fn extract_entities(content: &str) -> Vec<ExtractedEntity> {
    let lower = content.to_lowercase();
    let mut found = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (name, entity_type) in KNOWN_ENTITIES {
        if lower.contains(name) {
            let key = (*entity_type, name.to_string());
            if seen.insert(key) {
                found.push(ExtractedEntity { entity_type: *entity_type, name: name.to_string() });
            }
        }
    }

    for m in EPISODE_CODE.find_iter(content) {
        let name = m.as_str().to_uppercase();
        let key = (EntityType::Concept, name.clone());
        if seen.insert(key) {
            found.push(ExtractedEntity { entity_type: EntityType::Concept, name });
        }
    }

    for caps in PROJECT_PATH.captures_iter(content) {
        let name = caps[1].to_string();
        let key = (EntityType::Project, name.clone());
        if seen.insert(key) {
            found.push(ExtractedEntity { entity_type: EntityType::Project, name });
        }
    }

    found
}

/// One goal/blocker/pattern hit: an entity to create plus the relationship
/// from the memory being ingested to it, at most two per family.
pub struct PatternHit {
    pub entity: ExtractedEntity,
    pub edge_type: crate::types::EdgeType,
    pub confidence: f64,
}

pub fn extract_patterns(content: &str, memory_type: &crate::types::MemoryType) -> Vec<PatternHit> {
    let mut hits = Vec::new();

    for caps in GOAL_PATTERN.captures_iter(content).take(2) {
        if let Some(name) = clean_name(&caps[1]) {
            hits.push(PatternHit {
                entity: ExtractedEntity { entity_type: EntityType::Goal, name },
                edge_type: crate::types::EdgeType::MotivatedBy,
                confidence: 0.8,
            });
        }
    }

    for caps in BLOCKER_PATTERN.captures_iter(content).take(2) {
        if let Some(name) = clean_name(&caps[1]) {
            hits.push(PatternHit {
                entity: ExtractedEntity { entity_type: EntityType::Blocker, name },
                edge_type: crate::types::EdgeType::BlockedBy,
                confidence: 0.7,
            });
        }
    }

    let is_solution_like = matches!(
        memory_type.as_str(),
        "solution" | "pattern"
    );
    if is_solution_like {
        for caps in SOLUTION_PATTERN.captures_iter(content).take(2) {
            if let Some(name) = clean_name(&caps[1]) {
                hits.push(PatternHit {
                    entity: ExtractedEntity { entity_type: EntityType::Pattern, name },
                    edge_type: crate::types::EdgeType::ExampleOf,
                    confidence: 0.9,
                });
            }
        }
    }

    hits
}

/// Closed keyword -> relation-type map for the relationship keyword scan.
const RELATION_KEYWORDS: &[(&str, crate::types::EdgeType)] = &[
    ("because", crate::types::EdgeType::MotivatedBy),
    ("motivated by", crate::types::EdgeType::MotivatedBy),
    ("caused by", crate::types::EdgeType::CausedBy),
    ("results in", crate::types::EdgeType::ResultedIn),
    ("leads to", crate::types::EdgeType::ResultedIn),
    ("blocks", crate::types::EdgeType::Blocks),
    ("prevents", crate::types::EdgeType::Blocks),
    ("enables", crate::types::EdgeType::Enables),
    ("unlocks", crate::types::EdgeType::Enables),
    ("requires", crate::types::EdgeType::Requires),
    ("needs", crate::types::EdgeType::Requires),
    ("depends on", crate::types::EdgeType::DependsOn),
    ("supersedes", crate::types::EdgeType::Supersedes),
    ("replaces", crate::types::EdgeType::Supersedes),
    ("instead of", crate::types::EdgeType::Supersedes),
    ("evolved from", crate::types::EdgeType::EvolvedFrom),
    ("contradicts", crate::types::EdgeType::Contradicts),
    ("conflicts with", crate::types::EdgeType::Contradicts),
    ("reinforces", crate::types::EdgeType::Reinforces),
    ("supports", crate::types::EdgeType::Reinforces),
    ("similar to", crate::types::EdgeType::SimilarTo),
];

/// A hit from the relationship keyword scan: the keyword matched, the
/// relation it maps to, and the free-text phrase following it (used to
/// build the candidate target's canonical id for lookup by the caller).
pub struct KeywordHit {
    pub edge_type: crate::types::EdgeType,
    pub target_slug: String,
    pub confidence: f64,
}

/// Scans for closed relationship keywords and slugifies the phrase that
/// follows each one, for the caller to resolve against known entities.
pub fn scan_relationship_keywords(content: &str) -> Vec<KeywordHit> {
    let lower = content.to_lowercase();
    let mut hits = Vec::new();
    for (keyword, edge_type) in RELATION_KEYWORDS {
        if let Some(pos) = lower.find(keyword) {
            let after = &content[pos + keyword.len()..];
            let phrase: String = after
                .trim_start()
                .split(|c: char| c == '.' || c == ';' || c == '\n')
                .next()
                .unwrap_or("")
                .chars()
                .take(40)
                .collect();
            if !phrase.trim().is_empty() {
                hits.push(KeywordHit {
                    edge_type: *edge_type,
                    target_slug: slugify(phrase.trim()),
                    confidence: 0.6,
                });
            }
        }
    }
    hits
}

/// Builds the canonical id a [`KeywordHit`] would resolve to under a given
/// entity type, mirroring [`entity_id`].
pub fn candidate_entity_id(entity_type: EntityType, slug: &str) -> String {
    entity_id(entity_type, slug)
}
