//! Scores simulated edits against a tier model.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::features::FeatureVector;
use crate::model::{ModelError, TierModel};

use super::SimulatedEdit;

/// Expected tier index, `sum_t t * P(t)`.
pub fn quality_score(distribution: &[f64]) -> f64 {
    distribution
        .iter()
        .enumerate()
        .map(|(t, p)| t as f64 * p)
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEdit {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_url: Option<String>,
    /// Quality score of the edited vector.
    pub score: f64,
    /// `score - base_score`, always positive.
    pub delta: f64,
}

/// An edit that could not be scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEdit {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditRanking {
    pub base_distribution: Vec<f64>,
    pub base_score: f64,
    /// Edits with positive delta, best first; ties keep catalog order.
    pub ranked: Vec<RankedEdit>,
    pub skipped: Vec<SkippedEdit>,
}

pub struct EditRanker<'a, M: TierModel + ?Sized> {
    model: &'a M,
}

impl<'a, M: TierModel + ?Sized> EditRanker<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }

    /// Scores `base` and every simulated edit of it.
    ///
    /// Fails only when the base vector cannot be scored. Edits that failed
    /// to simulate or to score are reported in `skipped`.
    pub fn rank(
        &self,
        base: &FeatureVector,
        edits: Vec<SimulatedEdit>,
    ) -> Result<EditRanking, ModelError> {
        let base_distribution = self.model.predict_distribution(base)?;
        let base_score = quality_score(&base_distribution);

        let mut ranked = Vec::new();
        let mut skipped = Vec::new();
        for edit in edits {
            let scored = edit
                .outcome
                .map_err(ModelError::from)
                .and_then(|vector| self.model.predict_distribution(&vector));
            let distribution = match scored {
                Ok(d) => d,
                Err(e) => {
                    warn!(edit = %edit.name, error = %e, "skipping edit that could not be scored");
                    skipped.push(SkippedEdit {
                        name: edit.name,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let score = quality_score(&distribution);
            let delta = score - base_score;
            if delta > 0.0 {
                ranked.push(RankedEdit {
                    name: edit.name,
                    description: edit.description,
                    help_url: edit.help_url,
                    score,
                    delta,
                });
            }
        }
        // Stable: equal deltas keep catalog order.
        ranked.sort_by(|a, b| b.delta.total_cmp(&a.delta));

        Ok(EditRanking {
            base_distribution,
            base_score,
            ranked,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureError;

    /// Puts all mass on the tier given by the `t` feature.
    struct PointMass;

    impl TierModel for PointMass {
        fn n_classes(&self) -> usize {
            3
        }

        fn predict_distribution(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
            let t = features.require("t")?;
            let mut d = vec![0.0; 3];
            d[t as usize] = 1.0;
            Ok(d)
        }
    }

    fn simulated(name: &str, outcome: Result<FeatureVector, FeatureError>) -> SimulatedEdit {
        SimulatedEdit {
            name: name.to_string(),
            description: name.to_uppercase(),
            help_url: None,
            outcome,
        }
    }

    #[test]
    fn quality_score_is_expected_index() {
        assert_eq!(quality_score(&[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(quality_score(&[0.0, 0.5, 0.5]), 1.5);
    }

    #[test]
    fn ranking_drops_non_positive_deltas_and_keeps_ties_in_order() {
        let base = FeatureVector::new().with("t", 1.0);
        let edits = vec![
            simulated("same", Ok(FeatureVector::new().with("t", 1.0))),
            simulated("up_a", Ok(FeatureVector::new().with("t", 2.0))),
            simulated("down", Ok(FeatureVector::new().with("t", 0.0))),
            simulated("up_b", Ok(FeatureVector::new().with("t", 2.0))),
        ];
        let ranking = EditRanker::new(&PointMass).rank(&base, edits).unwrap();
        assert_eq!(ranking.base_score, 1.0);
        let names: Vec<&str> = ranking.ranked.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["up_a", "up_b"]);
        assert!(ranking.ranked.iter().all(|e| e.delta == 1.0));
        assert!(ranking.skipped.is_empty());
    }

    #[test]
    fn failing_edits_are_skipped() {
        let base = FeatureVector::new().with("t", 0.0);
        let edits = vec![
            simulated(
                "broken",
                Err(FeatureError::Missing {
                    name: "images".to_string(),
                }),
            ),
            simulated("unscorable", Ok(FeatureVector::new())),
            simulated("good", Ok(FeatureVector::new().with("t", 1.0))),
        ];
        let ranking = EditRanker::new(&PointMass).rank(&base, edits).unwrap();
        assert_eq!(ranking.ranked.len(), 1);
        assert_eq!(ranking.ranked[0].name, "good");
        let skipped: Vec<&str> = ranking.skipped.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(skipped, vec!["broken", "unscorable"]);
    }

    #[test]
    fn unscorable_base_is_an_error() {
        let ranking = EditRanker::new(&PointMass).rank(&FeatureVector::new(), Vec::new());
        assert!(matches!(ranking, Err(ModelError::Feature(_))));
    }
}
