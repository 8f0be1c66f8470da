//! Labeled revision datasets.
//!
//! One revision per JSONL line: the WP10 label, optional revision id and
//! title, and the featurizer output flattened alongside them:
//!
//! ```text
//! {"revid": 123, "title": "Kea", "wp10": "GA", "words": 5200, "headings": 9, ...}
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::features::{FeatureError, FeatureVector, Preprocessor};
use crate::model::{ModelError, OrdinalTarget};
use crate::tier::{QualityTier, UnknownTier};

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize revision: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("revision {index}: {source}")]
    Label {
        index: usize,
        #[source]
        source: UnknownTier,
    },
    #[error("revision {index}: {source}")]
    Feature {
        index: usize,
        #[source]
        source: FeatureError,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("dataset is empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledRevision {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub wp10: String,
    #[serde(flatten)]
    pub features: FeatureVector,
}

impl LabeledRevision {
    pub fn tier(&self) -> Result<QualityTier, UnknownTier> {
        self.wp10.parse()
    }
}

pub fn read_jsonl(path: impl AsRef<Path>) -> Result<Vec<LabeledRevision>, DatasetError> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut out = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let revision = serde_json::from_str(&line)
            .map_err(|source| DatasetError::Parse { line: i + 1, source })?;
        out.push(revision);
    }
    Ok(out)
}

pub fn write_jsonl(
    path: impl AsRef<Path>,
    revisions: &[LabeledRevision],
) -> Result<(), DatasetError> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    for revision in revisions {
        let line = serde_json::to_string(revision).map_err(DatasetError::Serialize)?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Preprocessed model input with its targets.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub rows: Vec<FeatureVector>,
    pub target: OrdinalTarget,
}

impl TrainingSet {
    pub fn from_revisions(
        revisions: &[LabeledRevision],
        preprocessor: &Preprocessor,
    ) -> Result<Self, DatasetError> {
        if revisions.is_empty() {
            return Err(DatasetError::Empty);
        }
        let mut rows = Vec::with_capacity(revisions.len());
        let mut tiers = Vec::with_capacity(revisions.len());
        for (index, revision) in revisions.iter().enumerate() {
            tiers.push(
                revision
                    .tier()
                    .map_err(|source| DatasetError::Label { index, source })?,
            );
            rows.push(
                preprocessor
                    .prepare(&revision.features)
                    .map_err(|source| DatasetError::Feature { index, source })?,
            );
        }
        Ok(Self {
            rows,
            target: OrdinalTarget::from_tiers(&tiers),
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn select(&self, indices: &[usize]) -> Self {
        Self {
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
            target: self.target.select(indices),
        }
    }

    /// Seeded split that keeps each tier's share in both halves.
    ///
    /// Every tier contributes `round(n * test_fraction)` rows to the test
    /// half, leaving at least one row in the training half. Original row
    /// order is kept within each half.
    pub fn train_test_split(&self, test_fraction: f64, seed: u64) -> (Self, Self) {
        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, code) in self.target.codes().iter().enumerate() {
            by_class.entry(*code).or_default().push(i);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut train = Vec::with_capacity(self.len());
        let mut test = Vec::new();
        for (_, mut indices) in by_class {
            indices.shuffle(&mut rng);
            let n = indices.len();
            let n_test = ((n as f64 * test_fraction).round() as usize).min(n.saturating_sub(1));
            test.extend_from_slice(&indices[..n_test]);
            train.extend_from_slice(&indices[n_test..]);
        }
        train.sort_unstable();
        test.sort_unstable();
        (self.select(&train), self.select(&test))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::synthetic_revisions;

    #[test]
    fn flat_jsonl_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revisions.jsonl");
        let revisions = synthetic_revisions(2, 7);
        write_jsonl(&path, &revisions).unwrap();
        assert_eq!(read_jsonl(&path).unwrap(), revisions);

        let first_line = std::fs::read_to_string(&path).unwrap();
        let first: serde_json::Value =
            serde_json::from_str(first_line.lines().next().unwrap()).unwrap();
        assert!(first.get("words").is_some());
        assert!(first.get("features").is_none());
    }

    #[test]
    fn parse_error_names_the_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"wp10\": \"B\", \"words\": 3}\n\nnot json\n").unwrap();
        match read_jsonl(&path) {
            Err(DatasetError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn unknown_label_is_reported_with_its_row() {
        let mut revisions = synthetic_revisions(1, 1);
        revisions[2].wp10 = "A".to_string();
        let err = TrainingSet::from_revisions(&revisions, &Preprocessor::standard()).unwrap_err();
        assert!(matches!(err, DatasetError::Label { index: 2, .. }));
    }

    #[test]
    fn split_is_stratified_and_seeded() {
        let revisions = synthetic_revisions(10, 3);
        let set = TrainingSet::from_revisions(&revisions, &Preprocessor::standard()).unwrap();
        let (train, test) = set.train_test_split(0.2, 11);
        assert_eq!(train.len() + test.len(), set.len());
        assert_eq!(test.len(), 12);
        for tier in 0..6 {
            let in_test = test.target.codes().iter().filter(|c| **c == tier).count();
            assert_eq!(in_test, 2);
        }
        let (_, again) = set.train_test_split(0.2, 11);
        assert_eq!(again, test);
    }
}
