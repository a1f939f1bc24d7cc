//! Vector storage models and similarity metrics.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A persisted vector row, keyed by `chunk_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: u32,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub content: String,
    /// Embedding space the vector belongs to (`provider:model`).
    pub similarity_index_key: String,
}

impl VectorRecord {
    pub fn new(
        chunk_id: impl Into<String>,
        document_id: impl Into<String>,
        vector: Vec<f32>,
        similarity_index_key: impl Into<String>,
    ) -> Self {
        Self {
            chunk_id: chunk_id.into(),
            document_id: document_id.into(),
            ordinal: 0,
            vector,
            metadata: BTreeMap::new(),
            content: String::new(),
            similarity_index_key: similarity_index_key.into(),
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_ordinal(mut self, ordinal: u32) -> Self {
        self.ordinal = ordinal;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Similarity metric used to score stored vectors against a query.
///
/// Both metrics produce a score in which larger is more similar and an identical
/// vector scores exactly `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    #[default]
    Cosine,
    Euclidean,
}

impl SimilarityMetric {
    /// Score `candidate` against `query`. Both slices must have the same length.
    pub fn score(self, query: &[f32], candidate: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_similarity(query, candidate),
            Self::Euclidean => 1.0 / (1.0 + euclidean_distance(query, candidate)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
        }
    }
}

/// Index of the first NaN or infinite component, if any.
pub fn first_non_finite(vector: &[f32]) -> Option<usize> {
    vector.iter().position(|v| !v.is_finite())
}

/// Best-first score ordering. NaN sorts after every real score.
pub fn compare_scores_desc(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.total_cmp(&a),
    }
}

/// Cosine similarity; zero-magnitude vectors score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f64;
    let mut mag_a = 0.0_f64;
    let mut mag_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (mag_a.sqrt() * mag_b.sqrt());
    similarity.clamp(-1.0, 1.0) as f32
}

/// Euclidean (L2) distance.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = f64::from(*x) - f64::from(*y);
            d * d
        })
        .sum::<f64>()
        .sqrt() as f32
}

/// Restricts which stored records a similarity query may return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
    /// Every entry must be present in the record metadata with an equal value.
    #[serde(default)]
    pub equals: BTreeMap<String, String>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub similarity_index_key: Option<String>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_equals(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.equals.insert(key.into(), value.into());
        self
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_index_key(mut self, key: impl Into<String>) -> Self {
        self.similarity_index_key = Some(key.into());
        self
    }

    /// Metadata equality check; document and index key are matched by the store.
    pub fn matches_metadata(&self, metadata: &BTreeMap<String, String>) -> bool {
        self.equals
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// A stored chunk scored against a query vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub score: f32,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

/// Final query result after secondary re-ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChunk {
    pub chunk_id: String,
    pub document_id: String,
    /// Score after re-ranking.
    pub score: f32,
    /// Raw similarity reported by the vector store.
    pub similarity: f32,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
}

/// Processing state of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStatus {
    pub document_id: String,
    /// True once every chunk of an ingestion has finished.
    pub processed: bool,
    pub succeeded: u32,
    pub failed: u32,
    pub processed_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_vectors_score_one() {
        let v = [0.3, -0.2, 0.9];
        assert!((SimilarityMetric::Cosine.score(&v, &v) - 1.0).abs() < 1e-6);
        assert!((SimilarityMetric::Euclidean.score(&v, &v) - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_orthogonal_cosine_is_zero() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_cosine() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_euclidean_score_decreases_with_distance() {
        let q = [0.0, 0.0];
        let near = SimilarityMetric::Euclidean.score(&q, &[1.0, 0.0]);
        let far = SimilarityMetric::Euclidean.score(&q, &[3.0, 4.0]);
        assert!((near - 0.5).abs() < 1e-6);
        assert!((far - 1.0 / 6.0).abs() < 1e-6);
        assert!(near > far);
    }

    #[test]
    fn test_filter_matches_metadata() {
        let mut metadata = BTreeMap::new();
        metadata.insert("lang".to_string(), "en".to_string());
        metadata.insert("kind".to_string(), "faq".to_string());

        assert!(MetadataFilter::new().matches_metadata(&metadata));
        assert!(MetadataFilter::new().with_equals("lang", "en").matches_metadata(&metadata));
        assert!(!MetadataFilter::new().with_equals("lang", "ko").matches_metadata(&metadata));
        assert!(!MetadataFilter::new().with_equals("missing", "x").matches_metadata(&metadata));
    }

    #[test]
    fn test_nan_scores_sort_last() {
        let mut scores = vec![0.2, f32::NAN, 1.0, -f32::NAN, 0.7];
        scores.sort_by(|a, b| compare_scores_desc(*a, *b));
        assert_eq!(&scores[..3], &[1.0, 0.7, 0.2]);
        assert!(scores[3].is_nan() && scores[4].is_nan());
    }

    #[test]
    fn test_first_non_finite() {
        assert_eq!(first_non_finite(&[0.0, 1.0]), None);
        assert_eq!(first_non_finite(&[0.0, f32::NAN, f32::INFINITY]), Some(1));
        assert_eq!(first_non_finite(&[f32::NEG_INFINITY]), Some(0));
    }

    proptest! {
        #[test]
        fn prop_cosine_is_bounded(a in proptest::collection::vec(-10.0f32..10.0, 4), b in proptest::collection::vec(-10.0f32..10.0, 4)) {
            let s = cosine_similarity(&a, &b);
            prop_assert!((-1.0..=1.0).contains(&s));
        }

        #[test]
        fn prop_euclidean_score_in_unit_interval(a in proptest::collection::vec(-10.0f32..10.0, 4), b in proptest::collection::vec(-10.0f32..10.0, 4)) {
            let s = SimilarityMetric::Euclidean.score(&a, &b);
            prop_assert!(s > 0.0 && s <= 1.0);
        }
    }
}
