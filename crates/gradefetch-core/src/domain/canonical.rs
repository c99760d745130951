use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{SourceId, UtcDateTime};

/// Marker carried instead of a grade when the semester was referred.
pub const REFERENCE_MARKER: &str = "ref";

/// Which participant produced a resolved result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Source(SourceId),
    Fallback,
}

impl Display for Provenance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source(id) => write!(f, "source:{id}"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstituteData {
    pub code: String,
    pub name: String,
    pub district: String,
}

/// Canonical per-semester entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterResult {
    pub semester: u32,
    /// Two-decimal grade or [`REFERENCE_MARKER`].
    pub result: String,
    pub passed: bool,
    pub reference_subjects: Vec<String>,
    pub published_at: UtcDateTime,
}

impl SemesterResult {
    pub fn is_reference(&self) -> bool {
        self.result == REFERENCE_MARKER
    }
}

/// Canonical cumulative entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativeEntry {
    pub semester: String,
    pub cgpa: String,
    pub published_at: UtcDateTime,
}

/// The single output shape returned to callers regardless of origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalResult {
    pub success: bool,
    pub roll: String,
    pub regulation: String,
    pub exam: String,
    pub institute_data: InstituteData,
    pub result_data: Vec<SemesterResult>,
    pub cgpa_data: Vec<CumulativeEntry>,
    pub provenance: Provenance,
}
