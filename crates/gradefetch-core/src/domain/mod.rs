//! # Domain Models
//!
//! Lookup keys, backend record rows, and the canonical output shape.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`QueryKey`] | Validated (roll, regulation, program) lookup identity |
//! | [`PrimaryRecord`] | Student row matched by the primary lookup |
//! | [`InstituteRecord`] | Institute row, embedded or looked up separately |
//! | [`GradeRecord`] | Per-semester grade row |
//! | [`CumulativeRecord`] | Cumulative-average row |
//! | [`CanonicalResult`] | Normalized output returned to callers |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Backend rows keep loosely-typed fields (`serde_json::Value`) where sources
//! disagree on shape; only the normalizer turns them into canonical values.

mod canonical;
mod key;
mod records;
mod timestamp;

pub use canonical::{
    CanonicalResult, CumulativeEntry, InstituteData, Provenance, SemesterResult, REFERENCE_MARKER,
};
pub use key::QueryKey;
pub use records::{
    CumulativeRecord, GradeRecord, InstituteRecord, PrimaryRecord, MAX_CUMULATIVE_ENTRIES,
};
pub(crate) use records::{
    lenient_flag, lenient_semester, lenient_timestamp, optional_flag, optional_text,
};
pub use timestamp::UtcDateTime;
