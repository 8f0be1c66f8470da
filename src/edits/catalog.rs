//! The ordered list of candidate edits.

use std::collections::HashSet;

use super::{CandidateEdit, Perturbation};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("edit catalog is empty")]
    Empty,
    #[error("edit name must be non-empty")]
    EmptyName,
    #[error("duplicate edit name `{0}`")]
    DuplicateName(String),
}

/// Candidate edits in a fixed order. Order breaks ranking ties.
#[derive(Debug, Clone, PartialEq)]
pub struct EditCatalog {
    edits: Vec<CandidateEdit>,
}

impl Default for EditCatalog {
    fn default() -> Self {
        Self {
            edits: default_edits(),
        }
    }
}

impl EditCatalog {
    pub fn new(edits: Vec<CandidateEdit>) -> Result<Self, CatalogError> {
        if edits.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut seen = HashSet::new();
        for edit in &edits {
            if edit.name.trim().is_empty() {
                return Err(CatalogError::EmptyName);
            }
            if !seen.insert(edit.name.as_str()) {
                return Err(CatalogError::DuplicateName(edit.name.clone()));
            }
        }
        Ok(Self { edits })
    }

    pub fn edits(&self) -> &[CandidateEdit] {
        &self.edits
    }

    pub fn get(&self, name: &str) -> Option<&CandidateEdit> {
        self.edits.iter().find(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.edits.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

const STYLE_HEADINGS: &str = "https://en.wikipedia.org/wiki/Wikipedia:Manual_of_Style#Article_titles,_headings,_and_sections";
const BACKLOG: &str = "https://en.wikipedia.org/wiki/Wikipedia:Backlog";

fn per_word(name: &str, feature: &str, words: f64, description: &str, url: &str) -> CandidateEdit {
    CandidateEdit::new(
        name,
        description,
        Perturbation::AddPerWord {
            feature: feature.to_string(),
            count: 1.0,
            words,
        },
    )
    .with_help_url(url)
}

fn flag(feature: &str, description: &str, url: &str) -> CandidateEdit {
    CandidateEdit::new(
        feature,
        description,
        Perturbation::SetFlag {
            feature: feature.to_string(),
        },
    )
    .with_help_url(url)
}

fn backlog(feature: &str, description: &str) -> CandidateEdit {
    CandidateEdit::new(
        feature,
        description,
        Perturbation::ReduceBacklog {
            feature: feature.to_string(),
        },
    )
    .with_help_url(BACKLOG)
}

fn default_edits() -> Vec<CandidateEdit> {
    vec![
        CandidateEdit::new(
            "sentence",
            "Add a sentence (15 words)",
            Perturbation::AddWords { words: 15.0 },
        ),
        CandidateEdit::new(
            "paragraph",
            "Add a paragraph (150 words)",
            Perturbation::AddWords { words: 150.0 },
        ),
        per_word(
            "headings",
            "headings",
            2.0,
            "Organize the article with a heading",
            STYLE_HEADINGS,
        ),
        per_word(
            "sub_headings",
            "sub_headings",
            2.0,
            "Organize the article with a sub-heading",
            STYLE_HEADINGS,
        ),
        per_word(
            "images",
            "images",
            0.0,
            "Add an image",
            "https://en.wikipedia.org/wiki/Wikipedia:Manual_of_Style/Images",
        ),
        per_word(
            "categories",
            "categories",
            2.0,
            "Add another category",
            "https://en.wikipedia.org/wiki/Help:Category",
        ),
        per_word(
            "wikilinks",
            "wikilinks",
            1.0,
            "Add a link to another page in Wikipedia",
            "https://en.wikipedia.org/wiki/Help:Link",
        ),
        per_word(
            "external_links",
            "external_links",
            1.0,
            "Add an external link",
            "https://en.wikipedia.org/wiki/Wikipedia:External_links",
        ),
        per_word(
            "citation",
            "cite_templates",
            5.0,
            "Add a citation",
            "https://en.wikipedia.org/wiki/Wikipedia:Citing_sources",
        ),
        per_word(
            "ref",
            "ref",
            15.0,
            "Add a footnote",
            "https://en.wikipedia.org/wiki/Help:Footnotes#Footnotes:_the_basics",
        ),
        flag(
            "coordinates",
            "Add coordinates",
            "https://en.wikipedia.org/wiki/Wikipedia:WikiProject_Geographical_coordinates#Coordinate_templates",
        ),
        flag(
            "infoboxes",
            "Add an infobox",
            "https://en.wikipedia.org/wiki/Wikipedia:Manual_of_Style/Infoboxes",
        ),
        backlog("backlog_accuracy", "Fix a backlog issue related to accuracy"),
        backlog("backlog_other", "Fix a backlog issue in the other category"),
        backlog("backlog_style", "Fix a backlog issue relating to style"),
        backlog("backlog_links", "Fix a backlog issue relating to links"),
    ]
}
