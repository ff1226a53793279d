pub mod food;

use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub use food::{Food, Package, Resource};

/// One commit that touched a food definition, as reported by the history scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RevisionRecord {
    pub revision: String,
    pub summary: String,
}

impl RevisionRecord {
    pub fn new(revision: impl Into<String>, summary: impl Into<String>) -> Self {
        RevisionRecord {
            revision: revision.into(),
            summary: summary.into(),
        }
    }
}

impl Display for RevisionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.revision, self.summary)
    }
}

/// A food descriptor together with the revision it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedFood {
    pub revision: String,
    pub summary: String,
    pub food: Food,
}

impl VersionedFood {
    pub fn new(record: RevisionRecord, food: Food) -> Self {
        VersionedFood {
            revision: record.revision,
            summary: record.summary,
            food,
        }
    }

    pub fn version(&self) -> &str {
        &self.food.version
    }
}

impl Display for VersionedFood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} ({} {})",
            self.food.name, self.food.version, self.revision, self.summary
        )
    }
}
