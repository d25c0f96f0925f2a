use serde::{Deserialize, Serialize};

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute Euclidean distance between two embeddings.
    ///
    /// Lower = more similar. Dimensions beyond the shorter vector are
    /// ignored; embeddings from the same model always agree in length.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// A face enrolled from a reference image. The source filename doubles
/// as the enrolled identity's display key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolledFace {
    pub source: String,
    pub embedding: Embedding,
}

/// Result of matching a probe embedding against the enrolled gallery.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// True iff the minimum distance is strictly below the threshold.
    pub granted: bool,
    /// Minimum Euclidean distance across the gallery
    /// (`f32::INFINITY` when the gallery is empty).
    pub min_distance: f32,
    /// Source filename of the closest enrolled face (if any).
    pub source: Option<String>,
}

/// Strategy for comparing a probe embedding against enrolled faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[EnrolledFace], threshold: f32) -> MatchOutcome;
}

/// Euclidean nearest-neighbor matcher.
///
/// Scans the whole gallery linearly and keeps the minimum distance.
/// Access is granted iff `min_distance < threshold` — equality denies.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[EnrolledFace], threshold: f32) -> MatchOutcome {
        let mut min_distance = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, face) in gallery.iter().enumerate() {
            let dist = probe.euclidean_distance(&face.embedding);
            if dist < min_distance {
                min_distance = dist;
                best_idx = Some(i);
            }
        }

        MatchOutcome {
            granted: min_distance < threshold,
            min_distance,
            source: best_idx.map(|i| gallery[i].source.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(values: Vec<f32>) -> Embedding {
        Embedding { values, model_version: None }
    }

    fn enrolled(source: &str, values: Vec<f32>) -> EnrolledFace {
        EnrolledFace { source: source.into(), embedding: embedding(values) }
    }

    #[test]
    fn test_euclidean_distance_identical() {
        let a = embedding(vec![0.5, -0.5, 1.0]);
        assert!(a.euclidean_distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_unit_axes() {
        let a = embedding(vec![1.0, 0.0]);
        let b = embedding(vec![0.0, 1.0]);
        assert!((a.euclidean_distance(&b) - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_symmetric() {
        let a = embedding(vec![0.1, 0.2, 0.3]);
        let b = embedding(vec![-0.4, 0.8, 0.0]);
        assert!((a.euclidean_distance(&b) - b.euclidean_distance(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_matcher_picks_minimum_distance() {
        let probe = embedding(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            enrolled("far.png", vec![0.0, 1.0, 0.0]),
            enrolled("close.png", vec![0.9, 0.0, 0.0]),
            enrolled("medium.png", vec![0.5, 0.5, 0.0]),
        ];

        let outcome = EuclideanMatcher.compare(&probe, &gallery, 0.65);
        assert!(outcome.granted);
        assert!((outcome.min_distance - 0.1).abs() < 1e-6);
        assert_eq!(outcome.source.as_deref(), Some("close.png"));
    }

    #[test]
    fn test_matcher_threshold_is_strict() {
        // Probe at exactly distance 0.5 from the only enrolled face.
        let probe = embedding(vec![0.5, 0.0]);
        let gallery = vec![enrolled("ref.jpg", vec![0.0, 0.0])];

        // Threshold just above the distance: granted.
        assert!(EuclideanMatcher.compare(&probe, &gallery, 0.5 + 1e-4).granted);
        // Threshold just below: denied.
        assert!(!EuclideanMatcher.compare(&probe, &gallery, 0.5 - 1e-4).granted);
        // Exact equality: denied (strict less-than).
        assert!(!EuclideanMatcher.compare(&probe, &gallery, 0.5).granted);
    }

    #[test]
    fn test_matcher_denies_above_threshold() {
        let probe = embedding(vec![2.0, 0.0]);
        let gallery = vec![enrolled("ref.jpg", vec![0.0, 0.0])];

        let outcome = EuclideanMatcher.compare(&probe, &gallery, 0.65);
        assert!(!outcome.granted);
        assert!((outcome.min_distance - 2.0).abs() < 1e-6);
        assert_eq!(outcome.source.as_deref(), Some("ref.jpg"));
    }

    #[test]
    fn test_matcher_empty_gallery() {
        let probe = embedding(vec![1.0, 0.0]);
        let outcome = EuclideanMatcher.compare(&probe, &[], 0.65);
        assert!(!outcome.granted);
        assert!(outcome.min_distance.is_infinite());
        assert!(outcome.source.is_none());
    }
}
