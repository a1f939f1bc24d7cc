//! Secondary re-ranking of similarity results.
//!
//! ```text
//! score = vector_weight * similarity
//!       + lexical_weight * lexical
//!       + recency_weight * 2^(-age / half_life)
//!       + sum(boosts)
//! ```
//!
//! `lexical` is the share of distinct query terms found in the chunk: a term
//! listed in the `keywords` metadata entry counts fully, a term only present
//! in the chunk text counts half. Age is read from the RFC 3339 `updated_at`
//! metadata entry; records without a parseable timestamp get no recency
//! bonus. A boost applies when the record metadata contains the boost's
//! `key=value` pair.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::domain::models::{compare_scores_desc, RankedChunk, RankingConfig, ScoredChunk};

/// Metadata key holding the record's last update time.
pub const UPDATED_AT_KEY: &str = "updated_at";

/// Metadata key holding comma-separated extracted keywords.
pub const KEYWORDS_KEY: &str = "keywords";

const CONTENT_MATCH_WEIGHT: f32 = 0.5;

#[derive(Debug, Clone)]
struct MetadataBoost {
    key: String,
    value: String,
    weight: f32,
}

#[derive(Debug, Clone)]
pub struct Ranker {
    vector_weight: f32,
    lexical_weight: f32,
    recency_weight: f32,
    half_life_hours: f64,
    boosts: Vec<MetadataBoost>,
}

impl Ranker {
    /// Boost entries without a `=` are ignored.
    pub fn from_config(config: &RankingConfig) -> Self {
        let boosts = config
            .metadata_boosts
            .iter()
            .filter_map(|(pair, weight)| {
                let (key, value) = pair.split_once('=')?;
                Some(MetadataBoost {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                    weight: *weight,
                })
            })
            .collect();

        Self {
            vector_weight: config.vector_weight,
            lexical_weight: config.lexical_weight,
            recency_weight: config.recency_weight,
            half_life_hours: config.half_life_hours,
            boosts,
        }
    }

    /// Same weights with a different lexical weight.
    pub fn with_lexical_weight(mut self, weight: f32) -> Self {
        self.lexical_weight = weight;
        self
    }

    pub fn lexical_weight(&self) -> f32 {
        self.lexical_weight
    }

    #[allow(clippy::float_cmp)]
    pub fn is_identity(&self) -> bool {
        self.vector_weight == 1.0
            && self.lexical_weight == 0.0
            && self.recency_weight == 0.0
            && self.boosts.iter().all(|b| b.weight == 0.0)
    }

    /// Re-rank candidates for `query` relative to `now`, best first, ties by
    /// `chunk_id`. NaN scores sort last.
    pub fn rank(
        &self,
        candidates: Vec<ScoredChunk>,
        query: &str,
        now: DateTime<Utc>,
    ) -> Vec<RankedChunk> {
        let query_terms = if self.lexical_weight == 0.0 {
            BTreeSet::new()
        } else {
            terms(query)
        };

        let mut ranked: Vec<RankedChunk> = candidates
            .into_iter()
            .map(|candidate| {
                let lexical = if query_terms.is_empty() {
                    0.0
                } else {
                    self.lexical_weight * lexical_score(&query_terms, &candidate)
                };
                let score = self.vector_weight * candidate.score
                    + lexical
                    + self.bonus(&candidate, now);
                RankedChunk {
                    chunk_id: candidate.chunk_id,
                    document_id: candidate.document_id,
                    score,
                    similarity: candidate.score,
                    content: candidate.content,
                    metadata: candidate.metadata,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            compare_scores_desc(a.score, b.score).then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        ranked
    }

    fn bonus(&self, candidate: &ScoredChunk, now: DateTime<Utc>) -> f32 {
        let mut bonus = 0.0;

        if self.recency_weight != 0.0 && self.half_life_hours > 0.0 {
            if let Some(updated_at) = candidate
                .metadata
                .get(UPDATED_AT_KEY)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            {
                let age_hours = (now - updated_at.with_timezone(&Utc))
                    .num_seconds()
                    .max(0) as f64
                    / 3600.0;
                let decay = 2f64.powf(-age_hours / self.half_life_hours);
                bonus += self.recency_weight * decay as f32;
            }
        }

        for boost in &self.boosts {
            if candidate.metadata.get(&boost.key) == Some(&boost.value) {
                bonus += boost.weight;
            }
        }
        bonus
    }
}

/// Lowercased alphanumeric terms of at least two characters.
fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|term| term.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

/// Share of query terms matched by the candidate's keywords or content, in `[0, 1]`.
fn lexical_score(query_terms: &BTreeSet<String>, candidate: &ScoredChunk) -> f32 {
    let keywords = candidate
        .metadata
        .get(KEYWORDS_KEY)
        .map(|raw| terms(raw))
        .unwrap_or_default();
    let content = terms(&candidate.content);

    let matched: f32 = query_terms
        .iter()
        .map(|term| {
            if keywords.contains(term) {
                1.0
            } else if content.contains(term) {
                CONTENT_MATCH_WEIGHT
            } else {
                0.0
            }
        })
        .sum();
    matched / query_terms.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn scored(id: &str, score: f32, meta: &[(&str, &str)]) -> ScoredChunk {
        ScoredChunk {
            chunk_id: id.to_string(),
            document_id: "doc".to_string(),
            score,
            content: format!("text of {id}"),
            metadata: meta
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_zero_weights_keep_similarity_order() {
        let ranker = Ranker::from_config(&RankingConfig::default());
        assert!(ranker.is_identity());

        let ranked = ranker.rank(
            vec![scored("b", 0.5, &[]), scored("a", 0.5, &[]), scored("c", 0.9, &[])],
            "anything",
            Utc::now(),
        );
        let ids: Vec<_> = ranked.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert!((ranked[0].score - ranked[0].similarity).abs() < f32::EPSILON);
    }

    #[test]
    fn test_recency_halves_per_half_life() {
        let now = Utc::now();
        let ranker = Ranker::from_config(&RankingConfig {
            recency_weight: 0.2,
            half_life_hours: 24.0,
            metadata_boosts: BTreeMap::new(),
            ..RankingConfig::default()
        });
        let day_old = (now - chrono::Duration::hours(24)).to_rfc3339();
        let fresh = now.to_rfc3339();

        let ranked = ranker.rank(
            vec![
                scored("old", 0.5, &[(UPDATED_AT_KEY, day_old.as_str())]),
                scored("new", 0.5, &[(UPDATED_AT_KEY, fresh.as_str())]),
                scored("none", 0.5, &[]),
            ],
            "",
            now,
        );

        assert_eq!(ranked[0].chunk_id, "new");
        assert!((ranked[0].score - 0.7).abs() < 1e-4);
        assert_eq!(ranked[1].chunk_id, "old");
        assert!((ranked[1].score - 0.6).abs() < 1e-4);
        assert_eq!(ranked[2].chunk_id, "none");
    }

    #[test]
    fn test_metadata_boost() {
        let mut boosts = BTreeMap::new();
        boosts.insert("kind=faq".to_string(), 0.3);
        boosts.insert("malformed".to_string(), 5.0);
        let ranker = Ranker::from_config(&RankingConfig {
            recency_weight: 0.0,
            half_life_hours: 1.0,
            metadata_boosts: boosts,
            ..RankingConfig::default()
        });

        let ranked = ranker.rank(
            vec![scored("plain", 0.8, &[]), scored("faq", 0.6, &[("kind", "faq")])],
            "",
            Utc::now(),
        );
        assert_eq!(ranked[0].chunk_id, "faq");
        assert!((ranked[0].score - 0.9).abs() < 1e-5);
        assert!((ranked[0].similarity - 0.6).abs() < f32::EPSILON);
    }

    #[test]
    fn test_keyword_match_lifts_candidate() {
        let ranker = Ranker::from_config(&RankingConfig {
            lexical_weight: 0.5,
            ..RankingConfig::default()
        });
        assert!(!ranker.is_identity());

        let ranked = ranker.rank(
            vec![
                scored("closer", 0.80, &[(KEYWORDS_KEY, "weather, forecast")]),
                scored("tagged", 0.70, &[(KEYWORDS_KEY, "Rust, borrow checker")]),
            ],
            "how does the borrow checker work in rust?",
            Utc::now(),
        );

        assert_eq!(ranked[0].chunk_id, "tagged");
        assert!(ranked[0].score > ranked[1].score);
        assert!((ranked[1].score - 0.80).abs() < 1e-6);
        assert!((ranked[0].similarity - 0.70).abs() < f32::EPSILON);
    }

    #[test]
    fn test_lexical_score_weights_keywords_over_content() {
        let query = terms("borrow checker");
        let keyword_hit = scored("k", 0.0, &[(KEYWORDS_KEY, "borrow, checker")]);
        let mut content_hit = scored("c", 0.0, &[]);
        content_hit.content = "The borrow checker rejects this".to_string();
        let miss = scored("m", 0.0, &[]);

        assert!((lexical_score(&query, &keyword_hit) - 1.0).abs() < f32::EPSILON);
        assert!((lexical_score(&query, &content_hit) - 0.5).abs() < f32::EPSILON);
        assert!(lexical_score(&query, &miss).abs() < f32::EPSILON);
    }

    #[test]
    fn test_request_override_disables_lexical_term() {
        let ranker = Ranker::from_config(&RankingConfig {
            lexical_weight: 0.5,
            ..RankingConfig::default()
        })
        .with_lexical_weight(0.0);

        let ranked = ranker.rank(
            vec![
                scored("closer", 0.80, &[]),
                scored("tagged", 0.70, &[(KEYWORDS_KEY, "rust")]),
            ],
            "rust",
            Utc::now(),
        );
        assert_eq!(ranked[0].chunk_id, "closer");
    }

    #[test]
    fn test_nan_candidate_ranks_last() {
        let ranker = Ranker::from_config(&RankingConfig::default());
        let ranked = ranker.rank(
            vec![scored("poison", f32::NAN, &[]), scored("exact", 1.0, &[])],
            "",
            Utc::now(),
        );
        assert_eq!(ranked[0].chunk_id, "exact");
        assert!(ranked[1].score.is_nan());
    }
}
