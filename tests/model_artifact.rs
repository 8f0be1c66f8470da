use tempfile::tempdir;

use wikidit::dataset::TrainingSet;
use wikidit::evaluation::synthetic_revisions;
use wikidit::features::Preprocessor;
use wikidit::model::{
    load_model, save_model, ArtifactError, LogisticRegression, SequentialOrdinalClassifier,
};

fn trained(preprocessor: &Preprocessor) -> (SequentialOrdinalClassifier<LogisticRegression>, TrainingSet) {
    let revisions = synthetic_revisions(12, 17);
    let set = TrainingSet::from_revisions(&revisions, preprocessor).unwrap();
    let mut model = SequentialOrdinalClassifier::for_quality_tiers(
        LogisticRegression::default(),
        preprocessor.schema(),
    );
    model.fit(&set.rows, &set.target).unwrap();
    (model, set)
}

#[test]
fn saved_model_reproduces_probabilities_exactly() {
    let (model, set) = trained(&Preprocessor::extended());
    let dir = tempdir().unwrap();
    let path = dir.path().join("models").join("tiers.json");

    save_model(&model, &path).unwrap();
    let loaded: SequentialOrdinalClassifier<LogisticRegression> = load_model(&path).unwrap();

    assert_eq!(loaded.n_classes(), model.n_classes());
    assert_eq!(loaded.schema(), model.schema());
    assert_eq!(
        loaded.predict_proba(&set.rows).unwrap(),
        model.predict_proba(&set.rows).unwrap()
    );
    assert_eq!(
        Preprocessor::for_schema(loaded.schema()).schema(),
        Preprocessor::extended().schema()
    );
}

#[test]
fn edited_artifact_is_rejected() {
    let (model, _) = trained(&Preprocessor::standard());
    let dir = tempdir().unwrap();
    let path = dir.path().join("tiers.json");
    save_model(&model, &path).unwrap();

    let mut doc: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    doc["estimators"][0]["l2"] = serde_json::json!(0.5);
    std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

    let err = load_model::<LogisticRegression>(&path).unwrap_err();
    assert!(matches!(err, ArtifactError::Fingerprint { .. }), "{err}");
}

#[test]
fn missing_artifact_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = load_model::<LogisticRegression>(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ArtifactError::Io(_)));
}
