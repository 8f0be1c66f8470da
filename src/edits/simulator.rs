//! Applies every catalog entry to a feature vector. No scoring happens here.

use crate::features::{FeatureError, FeatureVector};

use super::EditCatalog;

/// One catalog entry applied to a base vector.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedEdit {
    pub name: String,
    pub description: String,
    pub help_url: Option<String>,
    /// The perturbed vector, or why this edit could not be applied.
    pub outcome: Result<FeatureVector, FeatureError>,
}

#[derive(Debug, Clone, Default)]
pub struct EditSimulator {
    catalog: EditCatalog,
}

impl EditSimulator {
    pub fn new(catalog: EditCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &EditCatalog {
        &self.catalog
    }

    /// One entry per catalog edit, in catalog order.
    pub fn simulate(&self, vector: &FeatureVector) -> Vec<SimulatedEdit> {
        self.catalog
            .edits()
            .iter()
            .map(|edit| SimulatedEdit {
                name: edit.name.clone(),
                description: edit.description.clone(),
                help_url: edit.help_url.clone(),
                outcome: edit.perturbation.apply(vector),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{
        per_word_name, BACKLOG_FEATURES, BINARY_FEATURES, PER_WORD_FEATURES, WORDS,
    };
    use proptest::prelude::*;

    fn zero_margin() -> FeatureVector {
        let mut v = FeatureVector::new().with(WORDS, 1.0);
        for name in PER_WORD_FEATURES {
            v = v.with(name, 0.0).with(per_word_name(name), 0.0);
        }
        for name in BINARY_FEATURES.iter().chain(BACKLOG_FEATURES.iter()) {
            v = v.with(*name, 0.0);
        }
        v
    }

    fn outcome<'a>(edits: &'a [SimulatedEdit], name: &str) -> &'a FeatureVector {
        edits
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| e.outcome.as_ref().ok())
            .unwrap()
    }

    #[test]
    fn simulate_returns_one_entry_per_catalog_edit() {
        let simulator = EditSimulator::default();
        let edits = simulator.simulate(&zero_margin());
        assert_eq!(edits.len(), simulator.catalog().len());
        assert!(edits.iter().all(|e| e.outcome.is_ok()));
    }

    #[test]
    fn zero_margin_vector_yields_finite_ratios() {
        let edits = EditSimulator::default().simulate(&zero_margin());
        for edit in &edits {
            let vector = edit.outcome.as_ref().unwrap();
            for (name, value) in vector.iter() {
                assert!(value.is_finite(), "{} produced {name} = {value}", edit.name);
            }
        }
        let images = outcome(&edits, "images");
        assert_eq!(images.get(WORDS), Some(1.0));
        assert_eq!(images.get("images_per_word"), Some(1.0));
    }

    #[test]
    fn flag_edits_are_idempotent() {
        let simulator = EditSimulator::default();
        let once = simulator.simulate(&zero_margin());
        let coords = outcome(&once, "coordinates").clone();
        assert_eq!(coords.get("coordinates"), Some(1.0));

        let twice = simulator.simulate(&coords);
        assert_eq!(outcome(&twice, "coordinates"), &coords);
    }

    #[test]
    fn missing_feature_fails_only_its_edit() {
        let partial = FeatureVector::new()
            .with(WORDS, 50.0)
            .with("headings", 1.0);
        let edits = EditSimulator::default().simulate(&partial);
        assert!(outcome(&edits, "sentence").get(WORDS) == Some(65.0));
        let images = edits.iter().find(|e| e.name == "images").unwrap();
        assert_eq!(
            images.outcome,
            Err(FeatureError::Missing {
                name: "images".to_string()
            })
        );
    }

    proptest! {
        #[test]
        fn backlog_reduction_floors_at_zero(start in prop_oneof![Just(0.0), Just(1.0), Just(100.0), 0.0f64..500.0]) {
            let base = zero_margin().with("backlog_accuracy", start);
            let edits = EditSimulator::default().simulate(&base);
            let after = outcome(&edits, "backlog_accuracy").get("backlog_accuracy").unwrap();
            prop_assert_eq!(after, (start - 1.0).max(0.0));
            prop_assert!(after >= 0.0);
        }
    }
}
