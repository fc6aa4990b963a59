use serde::{Deserialize, Serialize};

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
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl Embedding {
    /// Build an L2-normalized embedding. A zero vector is kept as is.
    pub fn normalized(values: Vec<f32>, model_version: Option<&str>) -> Self {
        let norm = values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            values.into_iter().map(|x| x / norm).collect()
        } else {
            values
        };
        Self {
            values,
            model_version: model_version.map(str::to_string),
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance. Embeddings of different length compare as infinitely far.
    pub fn distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Mean of several embeddings, re-normalized. `None` for an empty slice.
    pub fn mean(embeddings: &[Embedding]) -> Option<Embedding> {
        let first = embeddings.first()?;
        let mut acc = vec![0.0f32; first.dim()];
        for e in embeddings {
            for (a, v) in acc.iter_mut().zip(e.values.iter()) {
                *a += v;
            }
        }
        Some(Embedding::normalized(acc, first.model_version.as_deref()))
    }
}

/// The stored encoding of one known identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceEncoding {
    /// Student identity key.
    pub identity: String,
    pub embedding: Embedding,
}

/// Outcome of matching one observed embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    /// Nearest identity, strictly closer than any other within threshold.
    Known { identity: String, distance: f32 },
    /// Two identities fall within threshold and `tie_margin` of each other.
    Ambiguous { candidates: [String; 2], distance: f32 },
    /// Nothing within threshold (or empty gallery).
    Unknown { nearest: Option<f32> },
}

impl MatchResult {
    /// Matched identity, if any. Ambiguous results count as unknown.
    pub fn identity(&self) -> Option<&str> {
        match self {
            MatchResult::Known { identity, .. } => Some(identity),
            _ => None,
        }
    }
}

/// Strategy for comparing an observed embedding against the known encodings.
pub trait Matcher {
    fn compare(&self, query: &Embedding, gallery: &[FaceEncoding]) -> MatchResult;
}

/// Nearest-neighbour matcher on Euclidean distance.
///
/// Always visits every gallery entry. A match requires the nearest distance to
/// be below `threshold`; if the runner-up is also below threshold and within
/// `tie_margin` of the nearest, the result is [`MatchResult::Ambiguous`].
#[derive(Debug, Clone, Copy)]
pub struct NearestMatcher {
    pub threshold: f32,
    pub tie_margin: f32,
}

/// Distance threshold on L2-normalized ArcFace embeddings (≈ cosine 0.5).
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 1.0;

impl Default for NearestMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DISTANCE_THRESHOLD,
            tie_margin: 0.0,
        }
    }
}

impl Matcher for NearestMatcher {
    fn compare(&self, query: &Embedding, gallery: &[FaceEncoding]) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;
        let mut second: Option<(usize, f32)> = None;

        for (i, known) in gallery.iter().enumerate() {
            let d = query.distance(&known.embedding);
            match best {
                Some((_, bd)) if d >= bd => {
                    if second.map_or(true, |(_, sd)| d < sd) {
                        second = Some((i, d));
                    }
                }
                _ => {
                    second = best;
                    best = Some((i, d));
                }
            }
        }

        let Some((bi, bd)) = best else {
            return MatchResult::Unknown { nearest: None };
        };
        if !(bd < self.threshold) {
            return MatchResult::Unknown { nearest: Some(bd) };
        }

        if let Some((si, sd)) = second {
            if sd < self.threshold && sd - bd <= self.tie_margin {
                return MatchResult::Ambiguous {
                    candidates: [gallery[bi].identity.clone(), gallery[si].identity.clone()],
                    distance: bd,
                };
            }
        }

        MatchResult::Known {
            identity: gallery[bi].identity.clone(),
            distance: bd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding { values: values.to_vec(), model_version: None }
    }

    fn enc(id: &str, values: &[f32]) -> FaceEncoding {
        FaceEncoding { identity: id.into(), embedding: emb(values) }
    }

    #[test]
    fn test_distance() {
        assert!((emb(&[0.0, 0.0]).distance(&emb(&[3.0, 4.0])) - 5.0).abs() < 1e-6);
        assert_eq!(emb(&[1.0]).distance(&emb(&[1.0, 0.0])), f32::INFINITY);
    }

    #[test]
    fn test_normalized_and_mean() {
        let e = Embedding::normalized(vec![3.0, 4.0], Some("m"));
        assert!((e.values[0] - 0.6).abs() < 1e-6);
        assert_eq!(e.model_version.as_deref(), Some("m"));

        let m = Embedding::mean(&[emb(&[1.0, 0.0]), emb(&[0.0, 1.0])]).unwrap();
        let h = std::f32::consts::FRAC_1_SQRT_2;
        assert!((m.values[0] - h).abs() < 1e-6 && (m.values[1] - h).abs() < 1e-6);
        assert!(Embedding::mean(&[]).is_none());
    }

    #[test]
    fn test_exact_match_returns_identity() {
        let gallery = vec![enc("S1", &[1.0, 0.0, 0.0]), enc("S2", &[0.0, 1.0, 0.0])];
        let result = NearestMatcher::default().compare(&emb(&[1.0, 0.0, 0.0]), &gallery);
        assert_eq!(result.identity(), Some("S1"));
    }

    #[test]
    fn test_best_match_last_in_gallery() {
        let gallery = vec![
            enc("decoy1", &[0.0, 1.0, 0.0]),
            enc("decoy2", &[0.0, 0.0, 1.0]),
            enc("match", &[1.0, 0.0, 0.0]),
        ];
        let result = NearestMatcher::default().compare(&emb(&[0.99, 0.01, 0.0]), &gallery);
        assert_eq!(result.identity(), Some("match"));
    }

    #[test]
    fn test_far_query_is_unknown() {
        let gallery = vec![enc("S1", &[1.0, 0.0])];
        let result = NearestMatcher::default().compare(&emb(&[-1.0, 0.0]), &gallery);
        assert_eq!(result, MatchResult::Unknown { nearest: Some(2.0) });
    }

    #[test]
    fn test_threshold_is_strict() {
        let gallery = vec![enc("S1", &[0.0, 0.0])];
        let matcher = NearestMatcher { threshold: 1.0, tie_margin: 0.0 };
        assert_eq!(matcher.compare(&emb(&[1.0, 0.0]), &gallery).identity(), None);
        assert_eq!(matcher.compare(&emb(&[0.5, 0.0]), &gallery).identity(), Some("S1"));
    }

    #[test]
    fn test_equidistant_is_ambiguous() {
        let gallery = vec![enc("S1", &[1.0, 0.0]), enc("S2", &[-1.0, 0.0])];
        let matcher = NearestMatcher { threshold: 1.5, tie_margin: 0.0 };
        let result = matcher.compare(&emb(&[0.0, 0.0]), &gallery);
        assert!(matches!(result, MatchResult::Ambiguous { .. }));
        assert_eq!(result.identity(), None);
    }

    #[test]
    fn test_tie_margin_requires_clear_winner() {
        let gallery = vec![enc("S1", &[0.0, 0.0]), enc("S2", &[0.5, 0.0])];
        let query = emb(&[0.2, 0.0]); // 0.2 from S1, 0.3 from S2
        let strict = NearestMatcher { threshold: 1.0, tie_margin: 0.0 };
        assert_eq!(strict.compare(&query, &gallery).identity(), Some("S1"));
        let wide = NearestMatcher { threshold: 1.0, tie_margin: 0.2 };
        assert!(matches!(wide.compare(&query, &gallery), MatchResult::Ambiguous { .. }));
    }

    #[test]
    fn test_runner_up_beyond_threshold_is_not_a_tie() {
        let gallery = vec![enc("S1", &[0.0, 0.0]), enc("S2", &[2.0, 0.0])];
        let matcher = NearestMatcher { threshold: 1.0, tie_margin: 5.0 };
        assert_eq!(matcher.compare(&emb(&[0.5, 0.0]), &gallery).identity(), Some("S1"));
    }

    #[test]
    fn test_empty_gallery() {
        let result = NearestMatcher::default().compare(&emb(&[1.0]), &[]);
        assert_eq!(result, MatchResult::Unknown { nearest: None });
    }
}
