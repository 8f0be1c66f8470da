use std::path::Path;
use std::process::Command;

use tempfile::tempdir;

use wikidit::service::PredictionResult;
use wikidit::TIER_COUNT;

fn wikidit(args: &[&str], paths: &[&Path]) -> std::process::Output {
    let output = Command::new(env!("CARGO_BIN_EXE_wikidit"))
        .args(args)
        .args(paths)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "wikidit {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

#[test]
fn cli_synth_train_predict_round_trip() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("revisions.jsonl");
    let model = dir.path().join("model.json");
    let metrics = dir.path().join("metrics.json");
    let input = dir.path().join("page.json");
    let result = dir.path().join("result.json");

    let status = Command::new(env!("CARGO_BIN_EXE_wikidit"))
        .args(["synth", "--per-tier", "15", "--seed", "3", "--out"])
        .arg(&data)
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(std::fs::read_to_string(&data).unwrap().lines().count(), 90);

    let status = Command::new(env!("CARGO_BIN_EXE_wikidit"))
        .args(["train", "--n-jobs", "2", "--data"])
        .arg(&data)
        .arg("--out")
        .arg(&model)
        .arg("--metrics")
        .arg(&metrics)
        .status()
        .unwrap();
    assert!(status.success());
    let held_out: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&metrics).unwrap()).unwrap();
    assert!(held_out["ordinal_score"].as_f64().unwrap() > 0.5);

    let first_line = std::fs::read_to_string(&data).unwrap();
    let revision: serde_json::Value =
        serde_json::from_str(first_line.lines().next().unwrap()).unwrap();
    std::fs::write(&input, revision.to_string()).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_wikidit"))
        .arg("predict")
        .arg("--model")
        .arg(&model)
        .arg("--input")
        .arg(&input)
        .arg("--out")
        .arg(&result)
        .status()
        .unwrap();
    assert!(status.success());
    let prediction: PredictionResult =
        serde_json::from_str(&std::fs::read_to_string(&result).unwrap()).unwrap();
    assert_eq!(prediction.distribution.len(), TIER_COUNT);
    assert!(prediction.ranked_edits.iter().all(|e| e.delta > 0.0));

    let text = wikidit(
        &["predict", "--format", "text", "--model"],
        &[model.as_path(), Path::new("--input"), input.as_path()],
    );
    let stdout = String::from_utf8_lossy(&text.stdout);
    assert!(stdout.starts_with("predicted tier: "), "{stdout}");

    let evaluated = wikidit(
        &["evaluate", "--model"],
        &[model.as_path(), Path::new("--data"), data.as_path()],
    );
    let metrics: serde_json::Value = serde_json::from_slice(&evaluated.stdout).unwrap();
    assert_eq!(metrics["n"], 90);
}

#[test]
fn cli_catalog_lists_default_edits() {
    let output = wikidit(&["catalog"], &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let names: Vec<&str> = stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .collect();
    assert_eq!(names.len(), 16);
    assert_eq!(names[0], "sentence");
    assert_eq!(names[8], "citation");
    assert_eq!(names[15], "backlog_links");
}

#[test]
fn cli_eval_writes_jsonl() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("eval.jsonl");
    wikidit(&["eval", "--case", "clean_small", "--out"], &[out.as_path()]);

    let raw = std::fs::read_to_string(&out).unwrap();
    let first: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
    assert_eq!(first["case_name"], "clean_small");
    assert!(first["test"]["ordinal_score"].as_f64().unwrap() > 0.8);
}

#[test]
fn cli_rejects_unknown_eval_case() {
    let dir = tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_wikidit"))
        .args(["eval", "--case", "missing", "--out"])
        .arg(dir.path().join("eval.jsonl"))
        .status()
        .unwrap();
    assert!(!status.success());
}
