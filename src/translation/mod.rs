//! AI-assisted translation of tour steps.
//!
//! A provider proposes per-locale text for every step; the merge engine
//! reconciles the proposals with what is stored and the service writes the
//! result back.

pub mod merge;
pub mod prompt;
pub mod provider;
pub mod service;

pub use merge::{MergeOutcome, merge_translations};
pub use provider::{
    OpenAiTranslator, StepTranslation, TranslationBatch, TranslationProvider, TranslationRequest,
};
pub use service::TranslationService;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How proposals are combined with stored translations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranslationMode {
    /// Only fill tracked locales whose title or content is missing.
    #[default]
    #[serde(alias = "empty")]
    FillMissing,
    /// Replace each step's map with the proposal.
    #[serde(alias = "override")]
    OverrideAll,
}

impl TranslationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FillMissing => "fill-missing",
            Self::OverrideAll => "override-all",
        }
    }
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How merged maps are written back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommitMode {
    /// One update per step; a failure leaves earlier steps applied.
    #[default]
    PerStep,
    /// Every step in a single transaction.
    Atomic,
}

impl FromStr for CommitMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-step" | "per_step" => Ok(Self::PerStep),
            "atomic" => Ok(Self::Atomic),
            other => Err(format!("expected 'per-step' or 'atomic', got '{other}'")),
        }
    }
}
