//! WP10 quality tiers.
//!
//! The six tiers are totally ordered; every probability and scoring routine in
//! the crate indexes distributions by [`QualityTier::index`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of quality tiers.
pub const TIER_COUNT: usize = 6;

/// Wikipedia WP10 article quality tier, worst first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    Stub,
    Start,
    C,
    B,
    GA,
    FA,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown quality tier `{0}`")]
pub struct UnknownTier(pub String);

impl QualityTier {
    pub const ALL: [QualityTier; TIER_COUNT] = [
        QualityTier::Stub,
        QualityTier::Start,
        QualityTier::C,
        QualityTier::B,
        QualityTier::GA,
        QualityTier::FA,
    ];

    /// 0-based position in the tier order.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Short WP10 label (`"Stub"`, `"GA"`, ...).
    pub fn label(self) -> &'static str {
        match self {
            QualityTier::Stub => "Stub",
            QualityTier::Start => "Start",
            QualityTier::C => "C",
            QualityTier::B => "B",
            QualityTier::GA => "GA",
            QualityTier::FA => "FA",
        }
    }

    /// Long-form name used in human-readable output.
    pub fn full_name(self) -> &'static str {
        match self {
            QualityTier::Stub => "Stub-class",
            QualityTier::Start => "Start-class",
            QualityTier::C => "C-class",
            QualityTier::B => "B-class",
            QualityTier::GA => "Good article",
            QualityTier::FA => "Featured article",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for QualityTier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        QualityTier::ALL
            .iter()
            .copied()
            .find(|tier| tier.label().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownTier(trimmed.to_string()))
    }
}
