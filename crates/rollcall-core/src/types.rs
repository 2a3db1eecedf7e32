use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Euclidean distance. Lower = more similar.
    pub fn distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Serialize as packed little-endian f32, the layout stored in the
    /// `face_encodings.encoding` column.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Inverse of [`to_bytes`](Self::to_bytes). Returns `None` for an empty
    /// blob, one whose length is not a multiple of 4, or one holding NaN or
    /// infinite values.
    pub fn from_bytes(bytes: &[u8]) -> Option<Embedding> {
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return None;
        }
        let values: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if !values.iter().all(|v| v.is_finite()) {
            return None;
        }
        Some(Embedding::new(values))
    }
}

/// A registered student's face, as loaded into the in-memory gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledFace {
    pub student_id: String,
    pub name: String,
    pub department: Option<String>,
    pub embedding: Embedding,
    pub updated_at: String,
}

/// Result of matching a query embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance (euclidean) or similarity (cosine) of the best candidate.
    pub score: f32,
    pub student_id: Option<String>,
    pub name: Option<String>,
}

impl MatchResult {
    fn no_match(score: f32) -> Self {
        Self {
            matched: false,
            score,
            student_id: None,
            name: None,
        }
    }

    fn hit(face: &EnrolledFace, score: f32) -> Self {
        Self {
            matched: true,
            score,
            student_id: Some(face.student_id.clone()),
            name: Some(face.name.clone()),
        }
    }
}

/// Strategy for comparing a query embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(&self, query: &Embedding, gallery: &[EnrolledFace], threshold: f32) -> MatchResult;
}

/// Nearest neighbour by Euclidean distance; matches when the best distance
/// is at or under the threshold.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, query: &Embedding, gallery: &[EnrolledFace], threshold: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, face) in gallery.iter().enumerate() {
            if face.embedding.dim() != query.dim() {
                continue;
            }
            let d = query.distance(&face.embedding);
            if !d.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, bd)| d < bd) {
                best = Some((i, d));
            }
        }

        match best {
            Some((idx, d)) if d <= threshold => MatchResult::hit(&gallery[idx], d),
            Some((_, d)) => MatchResult::no_match(d),
            None => MatchResult::no_match(0.0),
        }
    }
}

/// Highest cosine similarity; matches when it reaches the threshold.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, query: &Embedding, gallery: &[EnrolledFace], threshold: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, face) in gallery.iter().enumerate() {
            if face.embedding.dim() != query.dim() {
                continue;
            }
            let sim = query.similarity(&face.embedding);
            if !sim.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, bs)| sim > bs) {
                best = Some((i, sim));
            }
        }

        match best {
            Some((idx, sim)) if sim >= threshold => MatchResult::hit(&gallery[idx], sim),
            Some((_, sim)) => MatchResult::no_match(sim),
            None => MatchResult::no_match(0.0),
        }
    }
}

/// Which distance the gallery scan uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMetric {
    #[default]
    Euclidean,
    Cosine,
}

impl MatchMetric {
    /// Threshold tuned for L2-normalised ArcFace embeddings.
    ///
    /// For unit vectors `d = sqrt(2 - 2 cos)`, so 1.10 euclidean is roughly
    /// 0.40 cosine.
    pub fn default_threshold(self) -> f32 {
        match self {
            MatchMetric::Euclidean => 1.10,
            MatchMetric::Cosine => 0.40,
        }
    }

    pub fn matcher(self) -> Box<dyn Matcher + Send + Sync> {
        match self {
            MatchMetric::Euclidean => Box::new(EuclideanMatcher),
            MatchMetric::Cosine => Box::new(CosineMatcher),
        }
    }
}

impl fmt::Display for MatchMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMetric::Euclidean => f.write_str("euclidean"),
            MatchMetric::Cosine => f.write_str("cosine"),
        }
    }
}

impl FromStr for MatchMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(MatchMetric::Euclidean),
            "cosine" => Ok(MatchMetric::Cosine),
            other => Err(format!("unknown match metric: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(id: &str, name: &str, values: Vec<f32>) -> EnrolledFace {
        EnrolledFace {
            student_id: id.into(),
            name: name.into(),
            department: None,
            embedding: Embedding::new(values),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!((a.similarity(&a.clone()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn test_distance() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_bytes_layout() {
        let e = Embedding::new(vec![1.0, -2.5]);
        let bytes = e.to_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
        assert_eq!(Embedding::from_bytes(&bytes).unwrap().values, vec![1.0, -2.5]);
    }

    #[test]
    fn test_from_bytes_rejects_bad_blobs() {
        assert!(Embedding::from_bytes(&[]).is_none());
        assert!(Embedding::from_bytes(&[0, 0, 0]).is_none());
        assert!(Embedding::from_bytes(&[0; 10]).is_none());
    }

    #[test]
    fn test_from_bytes_rejects_non_finite() {
        let nan = Embedding::new(vec![f32::NAN, 0.0]).to_bytes();
        assert!(Embedding::from_bytes(&nan).is_none());
        let inf = Embedding::new(vec![1.0, f32::INFINITY]).to_bytes();
        assert!(Embedding::from_bytes(&inf).is_none());
    }

    #[test]
    fn test_non_finite_gallery_entry_does_not_block_later_matches() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![
            face("bad", "Corrupt", vec![f32::NAN, 0.0]),
            face("ok", "Good", vec![1.0, 0.0]),
        ];

        let result = EuclideanMatcher.compare(&query, &gallery, 1.1);
        assert!(result.matched);
        assert_eq!(result.student_id.as_deref(), Some("ok"));

        let result = CosineMatcher.compare(&query, &gallery, 0.4);
        assert_eq!(result.student_id.as_deref(), Some("ok"));
    }

    #[test]
    fn test_euclidean_picks_nearest_under_threshold() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![
            face("s1", "Far", vec![0.0, 1.0]),
            face("s2", "Near", vec![0.9, 0.1]),
            face("s3", "Middle", vec![0.5, 0.5]),
        ];

        let result = EuclideanMatcher.compare(&query, &gallery, 0.6);
        assert!(result.matched);
        assert_eq!(result.student_id.as_deref(), Some("s2"));
        assert_eq!(result.name.as_deref(), Some("Near"));
        assert!(result.score < 0.2);
    }

    #[test]
    fn test_euclidean_nearest_over_threshold_is_unknown() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![face("s1", "Other", vec![0.0, 1.0])];

        let result = EuclideanMatcher.compare(&query, &gallery, 0.6);
        assert!(!result.matched);
        assert!(result.student_id.is_none());
        assert!((result.score - 2f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_euclidean_threshold_is_inclusive() {
        let query = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![face("s1", "Edge", vec![0.5, 0.0])];
        assert!(EuclideanMatcher.compare(&query, &gallery, 0.5).matched);
    }

    #[test]
    fn test_ties_go_to_first_entry() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![
            face("first", "A", vec![1.0, 0.0]),
            face("second", "B", vec![1.0, 0.0]),
        ];
        let result = EuclideanMatcher.compare(&query, &gallery, 0.5);
        assert_eq!(result.student_id.as_deref(), Some("first"));
        let result = CosineMatcher.compare(&query, &gallery, 0.5);
        assert_eq!(result.student_id.as_deref(), Some("first"));
    }

    #[test]
    fn test_dimension_mismatch_skipped() {
        let query = Embedding::new(vec![1.0, 0.0]);
        let gallery = vec![
            face("bad", "Wrong", vec![1.0, 0.0, 0.0]),
            face("ok", "Right", vec![0.8, 0.2]),
        ];
        let result = EuclideanMatcher.compare(&query, &gallery, 0.5);
        assert_eq!(result.student_id.as_deref(), Some("ok"));
    }

    #[test]
    fn test_empty_gallery() {
        let query = Embedding::new(vec![1.0, 0.0]);
        for metric in [MatchMetric::Euclidean, MatchMetric::Cosine] {
            let result = metric.matcher().compare(&query, &[], metric.default_threshold());
            assert!(!result.matched);
            assert_eq!(result.score, 0.0);
        }
    }

    #[test]
    fn test_cosine_matcher() {
        let query = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            face("1", "decoy", vec![0.0, 1.0, 0.0]),
            face("2", "match", vec![2.0, 0.0, 0.0]),
        ];
        let result = CosineMatcher.compare(&query, &gallery, 0.5);
        assert!(result.matched);
        assert_eq!(result.student_id.as_deref(), Some("2"));
        assert!((result.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_metric_parse() {
        assert_eq!("Euclidean".parse::<MatchMetric>(), Ok(MatchMetric::Euclidean));
        assert_eq!("cosine".parse::<MatchMetric>(), Ok(MatchMetric::Cosine));
        assert!("hamming".parse::<MatchMetric>().is_err());
    }
}
