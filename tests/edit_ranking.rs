use std::sync::Arc;

use wikidit::dataset::TrainingSet;
use wikidit::edits::{
    quality_score, CandidateEdit, EditCatalog, EditRanker, EditSimulator, Perturbation,
};
use wikidit::evaluation::synthetic_revisions;
use wikidit::features::{FeatureVector, Preprocessor, WORDS};
use wikidit::model::{LogisticRegression, ModelError, SequentialOrdinalClassifier, TierModel};
use wikidit::service::PredictionService;
use wikidit::{QualityTier, TIER_COUNT};

/// Expected tier index equals `words / 50`, spread over two adjacent tiers.
struct WordsModel;

impl TierModel for WordsModel {
    fn n_classes(&self) -> usize {
        TIER_COUNT
    }

    fn predict_distribution(&self, features: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        let score = (features.require(WORDS)? / 50.0).clamp(0.0, 5.0);
        let low = score.floor().min(4.0);
        let frac = score - low;
        let mut dist = vec![0.0; TIER_COUNT];
        dist[low as usize] = 1.0 - frac;
        dist[low as usize + 1] = frac;
        Ok(dist)
    }
}

fn words_edit(name: &str, words: f64) -> CandidateEdit {
    CandidateEdit::new(name, format!("{words:+} words"), Perturbation::AddWords { words })
}

#[test]
fn only_edits_with_positive_delta_are_ranked() {
    let catalog = EditCatalog::new(vec![words_edit("grow", 15.0), words_edit("shrink", -5.0)]).unwrap();
    let simulator = EditSimulator::new(catalog);
    let base = FeatureVector::new().with(WORDS, 100.0);

    let ranking = EditRanker::new(&WordsModel)
        .rank(&base, simulator.simulate(&base))
        .unwrap();

    assert!((ranking.base_score - 2.0).abs() < 1e-12);
    assert_eq!(ranking.ranked.len(), 1);
    let top = &ranking.ranked[0];
    assert_eq!(top.name, "grow");
    assert!((top.score - 2.3).abs() < 1e-9);
    assert!((top.delta - 0.3).abs() < 1e-9);
    assert!(ranking.skipped.is_empty());
}

#[test]
fn ranking_is_sorted_by_delta_descending() {
    let catalog = EditCatalog::new(vec![
        words_edit("small", 5.0),
        words_edit("large", 40.0),
        words_edit("medium", 20.0),
        words_edit("medium_twin", 20.0),
    ])
    .unwrap();
    let base = FeatureVector::new().with(WORDS, 60.0);
    let ranking = EditRanker::new(&WordsModel)
        .rank(&base, EditSimulator::new(catalog).simulate(&base))
        .unwrap();
    let names: Vec<&str> = ranking.ranked.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["large", "medium", "medium_twin", "small"]);
}

#[test]
fn quality_score_of_point_mass_is_its_index() {
    for tier in QualityTier::ALL {
        let mut dist = vec![0.0; TIER_COUNT];
        dist[tier.index()] = 1.0;
        assert_eq!(quality_score(&dist), tier.index() as f64);
    }
}

fn trained_service() -> PredictionService {
    let revisions = synthetic_revisions(20, 21);
    let preprocessor = Preprocessor::standard();
    let set = TrainingSet::from_revisions(&revisions, &preprocessor).unwrap();
    let mut model = SequentialOrdinalClassifier::for_quality_tiers(
        LogisticRegression::default(),
        preprocessor.schema(),
    );
    model.fit(&set.rows, &set.target).unwrap();
    PredictionService::new(Arc::new(model), preprocessor, EditSimulator::default()).unwrap()
}

#[test]
fn service_prediction_is_complete_and_deterministic() {
    let service = trained_service();
    let revisions = synthetic_revisions(1, 99);
    for revision in &revisions {
        let result = service.predict(&revision.features).unwrap();
        assert_eq!(result.distribution.len(), TIER_COUNT);
        let total: f64 = result.distribution.iter().map(|p| p.probability).sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!((0.0..=5.0).contains(&result.score));
        assert!(result.skipped_edits.is_empty());
        for pair in result.ranked_edits.windows(2) {
            assert!(pair[0].delta >= pair[1].delta);
        }
        assert!(result.ranked_edits.iter().all(|e| e.delta > 0.0));

        assert_eq!(service.predict(&revision.features).unwrap(), result);
    }
}

#[test]
fn zero_margin_revision_is_scored() {
    let service = trained_service();
    let mut raw = FeatureVector::new().with(WORDS, 1.0);
    for (name, _) in synthetic_revisions(1, 1)[0].features.iter() {
        if name != WORDS {
            raw = raw.with(name, 0.0);
        }
    }
    let result = service.predict(&raw).unwrap();
    assert!(result.score.is_finite());
    assert!(result.ranked_edits.iter().all(|e| e.delta.is_finite()));
}

#[test]
fn service_result_serializes_tiers_by_label() {
    let service = trained_service();
    let revision = &synthetic_revisions(1, 3)[4];
    let result = service.predict(&revision.features).unwrap();
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["distribution"][4]["tier"], "GA");
    assert!(json["best_tier"].is_string());
    assert!(json.get("skipped_edits").is_none());
}
