//! Contradiction scan: flags candidate conflicts between new content and an
//! existing similar memory using a small curated signal set, not a model.

use once_cell::sync::Lazy;

/// Curated opposition pairs; matching is symmetric so only one direction of
/// each pair needs to be listed, but the duplicated reverse entries are kept
/// to mirror the original source's explicit table.
static OPPOSITION_PAIRS: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("don't", "do"),
        ("do", "don't"),
        ("never", "always"),
        ("always", "never"),
        ("avoid", "use"),
        ("use", "avoid"),
        ("disable", "enable"),
        ("enable", "disable"),
        ("prefer", "avoid"),
        ("instead of", "use"),
        ("sqlite", "postgresql"),
        ("postgresql", "sqlite"),
        ("typescript", "javascript"),
        ("javascript", "typescript"),
        ("react", "vue"),
        ("vue", "react"),
    ]
});

const NEGATION_TOKENS: &[&str] = &["not", "never", "avoid"];

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictReason {
    OppositionPair(&'static str, &'static str),
    AsymmetricNegation,
    VerySimilarMayBeUpdate,
}

impl ConflictReason {
    pub fn describe(&self) -> String {
        match self {
            ConflictReason::OppositionPair(a, b) => {
                format!("opposing terms \"{a}\" / \"{b}\" found across the two memories")
            }
            ConflictReason::AsymmetricNegation => {
                "one memory negates a claim the other makes without negation".to_string()
            }
            ConflictReason::VerySimilarMayBeUpdate => {
                "very similar content of an update-prone type — may be an update".to_string()
            }
        }
    }
}

fn opposition_pair_match(new_lower: &str, existing_lower: &str) -> Option<ConflictReason> {
    OPPOSITION_PAIRS.iter().find_map(|(a, b)| {
        if new_lower.contains(a) && existing_lower.contains(b) {
            Some(ConflictReason::OppositionPair(a, b))
        } else {
            None
        }
    })
}

fn asymmetric_negation(new_lower: &str, existing_lower: &str) -> bool {
    let new_has = NEGATION_TOKENS.iter().any(|t| new_lower.contains(t));
    let existing_has = NEGATION_TOKENS.iter().any(|t| existing_lower.contains(t));
    new_has != existing_has
}

/// Evaluate one candidate pair. `similarity` is the cosine similarity already
/// computed by the caller's recall step; `existing_is_update_prone` reflects
/// [`crate::types::MemoryType::is_update_prone`] on the existing memory.
pub fn detect_conflicts(
    new_content: &str,
    existing_content: &str,
    similarity: f32,
    existing_is_update_prone: bool,
) -> Vec<ConflictReason> {
    if similarity < 0.5 {
        return Vec::new();
    }
    let new_lower = new_content.to_lowercase();
    let existing_lower = existing_content.to_lowercase();

    let mut reasons = Vec::new();
    if let Some(r) = opposition_pair_match(&new_lower, &existing_lower) {
        reasons.push(r);
    }
    if asymmetric_negation(&new_lower, &existing_lower) {
        reasons.push(ConflictReason::AsymmetricNegation);
    }
    if similarity > 0.55 && existing_is_update_prone {
        reasons.push(ConflictReason::VerySimilarMayBeUpdate);
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposition_pair_is_detected() {
        let reasons =
            detect_conflicts("Always use SQLite for local storage", "Never use SQLite, prefer PostgreSQL", 0.6, false);
        assert!(reasons.iter().any(|r| matches!(r, ConflictReason::OppositionPair(..))));
    }

    #[test]
    fn low_similarity_short_circuits() {
        let reasons = detect_conflicts("always use SQLite", "never use SQLite", 0.2, false);
        assert!(reasons.is_empty());
    }

    #[test]
    fn asymmetric_negation_is_flagged() {
        let reasons = detect_conflicts(
            "We should never ship without tests",
            "We should ship without tests",
            0.7,
            false,
        );
        assert!(reasons.contains(&ConflictReason::AsymmetricNegation));
    }

    #[test]
    fn very_similar_update_prone_type_is_flagged() {
        let reasons = detect_conflicts(
            "The database choice is SQLite for the local store",
            "The database choice is SQLite for the local store",
            0.9,
            true,
        );
        assert!(reasons.contains(&ConflictReason::VerySimilarMayBeUpdate));
    }
}
