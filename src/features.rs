//! Feature vectors handed to the model by the wikitext featurizer.
//!
//! A [`FeatureVector`] is an immutable `name -> f64` record. Booleans from the
//! featurizer are stored as 0/1; non-numeric fields (template name lists,
//! plaintext) are dropped on deserialization. Derived `<name>_per_word`
//! ratios are always recomputed from their count and `words`, never edited.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const WORDS: &str = "words";
pub const PER_WORD_SUFFIX: &str = "_per_word";

/// Counts normalized per word in the standard schema.
pub const PER_WORD_FEATURES: [&str; 8] = [
    "headings",
    "sub_headings",
    "images",
    "categories",
    "wikilinks",
    "external_links",
    "cite_templates",
    "ref",
];

/// Additional per-word counts used by the extended schema.
pub const EXTENDED_PER_WORD_FEATURES: [&str; 3] = ["main_templates", "templates", "smartlists"];

pub const BINARY_FEATURES: [&str; 2] = ["coordinates", "infoboxes"];

pub const BACKLOG_FEATURES: [&str; 5] = [
    "backlog_accuracy",
    "backlog_content",
    "backlog_other",
    "backlog_style",
    "backlog_links",
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FeatureError {
    #[error("required feature `{name}` is missing")]
    Missing { name: String },
    #[error("feature `{name}` is not finite ({value})")]
    NonFinite { name: String, value: f64 },
}

/// Name of the derived ratio feature for `feature`.
pub fn per_word_name(feature: &str) -> String {
    format!("{feature}{PER_WORD_SUFFIX}")
}

/// `count / words`, defined as 0 when `words` is not positive.
pub fn per_word(count: f64, words: f64) -> f64 {
    if words > 0.0 {
        count / words
    } else {
        0.0
    }
}

// ---------------------------------------------------------------------
//  FeatureVector
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, RawFeature>",
    into = "BTreeMap<String, f64>"
)]
pub struct FeatureVector {
    values: BTreeMap<String, f64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFeature {
    Number(f64),
    Flag(bool),
    Ignored(serde::de::IgnoredAny),
}

impl From<BTreeMap<String, RawFeature>> for FeatureVector {
    fn from(raw: BTreeMap<String, RawFeature>) -> Self {
        let values = raw
            .into_iter()
            .filter_map(|(name, value)| match value {
                RawFeature::Number(v) => Some((name, v)),
                RawFeature::Flag(b) => Some((name, if b { 1.0 } else { 0.0 })),
                RawFeature::Ignored(_) => None,
            })
            .collect();
        Self { values }
    }
}

impl From<FeatureVector> for BTreeMap<String, f64> {
    fn from(vector: FeatureVector) -> Self {
        vector.values
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Value of a feature the caller cannot proceed without.
    pub fn require(&self, name: &str) -> Result<f64, FeatureError> {
        match self.values.get(name) {
            None => Err(FeatureError::Missing {
                name: name.to_string(),
            }),
            Some(v) if !v.is_finite() => Err(FeatureError::NonFinite {
                name: name.to_string(),
                value: *v,
            }),
            Some(v) => Ok(*v),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Returns a vector with `name` set to `value`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Recompute every `<name>_per_word` ratio whose count is present.
    ///
    /// Leaves the vector unchanged when `words` is absent.
    #[must_use]
    pub fn rederive_ratios(mut self) -> Self {
        let Some(words) = self.get(WORDS) else {
            return self;
        };
        let updates: Vec<(String, f64)> = self
            .values
            .keys()
            .filter_map(|key| {
                let base = key.strip_suffix(PER_WORD_SUFFIX)?;
                let count = self.values.get(base)?;
                Some((key.clone(), per_word(*count, words)))
            })
            .collect();
        for (key, ratio) in updates {
            self.values.insert(key, ratio);
        }
        self
    }
}

// ---------------------------------------------------------------------
//  FeatureSchema
// ---------------------------------------------------------------------

/// Ordered list of the features a model consumes, one design-matrix column each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn standard() -> Self {
        Preprocessor::standard().schema()
    }

    pub fn extended() -> Self {
        Preprocessor::extended().schema()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Values of `vector` in schema order.
    pub fn row(&self, vector: &FeatureVector) -> Result<Vec<f64>, FeatureError> {
        self.names.iter().map(|name| vector.require(name)).collect()
    }
}

// ---------------------------------------------------------------------
//  Preprocessor
// ---------------------------------------------------------------------

/// Normalizes a raw featurizer record into model input.
///
/// Floors `words` at 1, clamps counts at 0, derives per-word ratios and
/// coerces binary flags to 0/1. Unknown extra features pass through untouched.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    per_word: Vec<&'static str>,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::standard()
    }
}

impl Preprocessor {
    pub fn standard() -> Self {
        Self {
            per_word: PER_WORD_FEATURES.to_vec(),
        }
    }

    pub fn extended() -> Self {
        let mut per_word = PER_WORD_FEATURES.to_vec();
        per_word.extend(EXTENDED_PER_WORD_FEATURES);
        Self { per_word }
    }

    /// The preprocessor that produces every column of `schema`.
    pub fn for_schema(schema: &FeatureSchema) -> Self {
        let extended = EXTENDED_PER_WORD_FEATURES
            .iter()
            .any(|name| schema.names().iter().any(|n| n == name));
        if extended {
            Self::extended()
        } else {
            Self::standard()
        }
    }

    /// Schema of the vectors this preprocessor produces.
    pub fn schema(&self) -> FeatureSchema {
        let mut names: Vec<String> = vec![WORDS.to_string()];
        names.extend(BACKLOG_FEATURES.iter().map(|s| s.to_string()));
        names.extend(self.per_word.iter().map(|s| s.to_string()));
        names.extend(self.per_word.iter().map(|s| per_word_name(s)));
        names.extend(BINARY_FEATURES.iter().map(|s| s.to_string()));
        FeatureSchema { names }
    }

    pub fn prepare(&self, raw: &FeatureVector) -> Result<FeatureVector, FeatureError> {
        let words = raw.require(WORDS)?.max(1.0);
        let mut out = raw.clone().with(WORDS, words);

        for name in BACKLOG_FEATURES {
            let count = raw.require(name)?.max(0.0);
            out = out.with(name, count);
        }
        for name in &self.per_word {
            let count = raw.require(name)?.max(0.0);
            out = out
                .with(*name, count)
                .with(per_word_name(name), per_word(count, words));
        }
        for name in BINARY_FEATURES {
            let flag = raw.require(name)?;
            out = out.with(name, if flag != 0.0 { 1.0 } else { 0.0 });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_raw() -> FeatureVector {
        let mut v: FeatureVector = [(WORDS, 1.0)].into_iter().collect();
        for name in PER_WORD_FEATURES
            .iter()
            .chain(BINARY_FEATURES.iter())
            .chain(BACKLOG_FEATURES.iter())
        {
            v = v.with(*name, 0.0);
        }
        v
    }

    #[test]
    fn deserialize_accepts_bools_and_drops_text() {
        let v: FeatureVector = serde_json::from_str(
            r#"{"words": 120, "coordinates": true, "infoboxes": false,
                "backlog_style_templates": "cleanup", "backlog_links_templates": null}"#,
        )
        .unwrap();
        assert_eq!(v.get("words"), Some(120.0));
        assert_eq!(v.get("coordinates"), Some(1.0));
        assert_eq!(v.get("infoboxes"), Some(0.0));
        assert!(!v.contains("backlog_style_templates"));
        assert!(!v.contains("backlog_links_templates"));
    }

    #[test]
    fn zero_margin_vector_has_well_defined_ratios() {
        let prepared = Preprocessor::standard().prepare(&minimal_raw()).unwrap();
        for name in PER_WORD_FEATURES {
            let ratio = prepared.get(&per_word_name(name)).unwrap();
            assert_eq!(ratio, 0.0);
        }
        assert_eq!(prepared.get(WORDS), Some(1.0));
    }

    #[test]
    fn prepare_floors_words_and_binarizes_flags() {
        let raw = minimal_raw()
            .with(WORDS, 0.0)
            .with("coordinates", 3.0)
            .with("headings", 4.0)
            .with("backlog_style", -2.0);
        let prepared = Preprocessor::standard().prepare(&raw).unwrap();
        assert_eq!(prepared.get(WORDS), Some(1.0));
        assert_eq!(prepared.get("coordinates"), Some(1.0));
        assert_eq!(prepared.get("headings_per_word"), Some(4.0));
        assert_eq!(prepared.get("backlog_style"), Some(0.0));
    }

    #[test]
    fn prepare_reports_missing_words() {
        let raw = FeatureVector::new().with("headings", 1.0);
        let err = Preprocessor::standard().prepare(&raw).unwrap_err();
        assert_eq!(
            err,
            FeatureError::Missing {
                name: WORDS.to_string()
            }
        );
    }

    #[test]
    fn standard_schema_matches_prepared_vector() {
        let prepared = Preprocessor::standard().prepare(&minimal_raw()).unwrap();
        let schema = FeatureSchema::standard();
        assert_eq!(schema.len(), 24);
        assert_eq!(schema.row(&prepared).unwrap().len(), 24);
        assert!(FeatureSchema::extended().row(&prepared).is_err());
    }

    #[test]
    fn for_schema_picks_matching_preprocessor() {
        let extended = Preprocessor::for_schema(&FeatureSchema::extended());
        assert_eq!(extended.schema(), FeatureSchema::extended());
        let standard = Preprocessor::for_schema(&FeatureSchema::standard());
        assert_eq!(standard.schema(), FeatureSchema::standard());
    }

    #[test]
    fn rederive_ratios_tracks_word_changes() {
        let v = FeatureVector::new()
            .with(WORDS, 10.0)
            .with("headings", 2.0)
            .with("headings_per_word", 0.2)
            .with(WORDS, 20.0)
            .rederive_ratios();
        assert_eq!(v.get("headings_per_word"), Some(0.1));
    }

    #[test]
    fn require_rejects_non_finite() {
        let v = FeatureVector::new().with(WORDS, f64::NAN);
        assert!(matches!(
            v.require(WORDS),
            Err(FeatureError::NonFinite { .. })
        ));
    }
}
