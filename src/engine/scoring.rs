//! Composite relevance scoring for hybrid search.
//!
//! Combines raw vector similarity with recency decay, reinforcement from
//! repeated access, stored importance, keyword overlap, and role affinity
//! into a single `relevance` used to rank recall results.

/// Inputs to [`score`], already resolved to plain numbers so the formula
/// itself stays free of any storage/graph lookups.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput {
    /// Raw cosine similarity in `[-1, 1]`.
    pub similarity: f32,
    /// Age of the memory in days at the time of scoring.
    pub age_days: f32,
    /// Number of recorded accesses (reinforcement count).
    pub access_count: u32,
    /// Stored importance in `[0, 1]`.
    pub importance: f32,
    /// Fraction of query keywords present in the memory content, `[0, 1]`.
    pub keyword_overlap: f32,
    /// Whether the querying role matches the memory's `source_role`.
    pub same_role: bool,
}

/// `relevance = base_score * importance_factor * keyword_boost * role_affinity`
/// where `base_score = 0.55*similarity_weight + 0.15*decay_factor + reinforcement_contribution`.
pub fn score(input: ScoringInput) -> f32 {
    let similarity_weight = input.similarity.max(0.0).powf(1.3);
    let decay_factor = (-0.023 * input.age_days).exp();
    let reinforcement = 1.0 + 0.1 * (1.0 + input.access_count as f32).ln();
    let reinforcement_contribution = (reinforcement * 0.10).min(0.12);

    let base_score = 0.55 * similarity_weight + 0.15 * decay_factor + reinforcement_contribution;

    let importance_factor = 0.5 + 0.5 * input.importance;
    let keyword_boost = 1.0 + 0.25 * input.keyword_overlap;
    let role_affinity = if input.same_role { 1.15 } else { 1.0 };

    base_score * importance_factor * keyword_boost * role_affinity
}

/// Fraction of `query_keywords` that appear verbatim in `content` (case-insensitive).
pub fn keyword_overlap(content: &str, query_keywords: &[String]) -> f32 {
    if query_keywords.is_empty() {
        return 0.0;
    }
    let content_lower = content.to_lowercase();
    let hits = query_keywords
        .iter()
        .filter(|kw| content_lower.contains(&kw.to_lowercase()))
        .count();
    hits as f32 / query_keywords.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> ScoringInput {
        ScoringInput {
            similarity: 0.8,
            age_days: 0.0,
            access_count: 0,
            importance: 0.5,
            keyword_overlap: 0.0,
            same_role: false,
        }
    }

    #[test]
    fn higher_similarity_yields_higher_score() {
        let low = score(ScoringInput { similarity: 0.2, ..base_input() });
        let high = score(ScoringInput { similarity: 0.9, ..base_input() });
        assert!(high > low);
    }

    #[test]
    fn older_memories_score_lower_all_else_equal() {
        let fresh = score(ScoringInput { age_days: 0.0, ..base_input() });
        let old = score(ScoringInput { age_days: 200.0, ..base_input() });
        assert!(fresh > old);
    }

    #[test]
    fn reinforcement_contribution_is_capped() {
        let few = score(ScoringInput { access_count: 1, ..base_input() });
        let many = score(ScoringInput { access_count: 10_000, ..base_input() });
        assert!(many >= few);
        assert!(many - few < 0.05);
    }

    #[test]
    fn role_affinity_boosts_matching_role() {
        let other_role = score(ScoringInput { same_role: false, ..base_input() });
        let same_role = score(ScoringInput { same_role: true, ..base_input() });
        assert!((same_role / other_role - 1.15).abs() < 0.001);
    }

    #[test]
    fn negative_similarity_is_clamped_to_zero_weight() {
        let negative = score(ScoringInput { similarity: -0.9, ..base_input() });
        let zero = score(ScoringInput { similarity: 0.0, ..base_input() });
        assert!((negative - zero).abs() < 0.0001);
    }

    #[test]
    fn keyword_overlap_counts_case_insensitive_substring_hits() {
        let kws = vec!["Rust".to_string(), "async".to_string(), "missing".to_string()];
        let overlap = keyword_overlap("We debated Rust vs async runtimes", &kws);
        assert!((overlap - 2.0 / 3.0).abs() < 0.001);
    }
}
