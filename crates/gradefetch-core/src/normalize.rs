//! # Canonical Normalizer
//!
//! Maps every raw shape into [`CanonicalResult`]. The mapping is total: any
//! input, however sparse, produces a well-formed result.
//!
//! | Missing or malformed | Canonical value |
//! |----------------------|-----------------|
//! | institute code | `"00000"` |
//! | institute name, district | `"Unknown"` |
//! | grade value | `"ref"`, and `passed = false` |
//! | semester | `1` |
//! | publication timestamp | Unix epoch |
//! | cumulative value | `"0.00"` |
//! | cumulative label | `"Final"` |
//! | reference subjects | empty list |
//!
//! Numeric grades and cumulative values are rendered with two decimals.

use serde_json::Value;

use crate::domain::MAX_CUMULATIVE_ENTRIES;
use crate::fallback::{ExternalGrade, ExternalPayload, ExternalSemester};
use crate::{
    CanonicalResult, CumulativeEntry, CumulativeRecord, GradeRecord, InstituteData,
    InstituteRecord, PrimaryRecord, Provenance, QueryKey, SemesterResult, SourceId, UtcDateTime,
    REFERENCE_MARKER,
};

pub const UNKNOWN_INSTITUTE_CODE: &str = "00000";
pub const UNKNOWN_TEXT: &str = "Unknown";
pub const MISSING_CUMULATIVE: &str = "0.00";
pub const FINAL_LABEL: &str = "Final";

static NO_SUBJECTS: Value = Value::Null;

/// Raw data gathered from one configured source.
#[derive(Debug, Clone)]
pub struct BackendRecord {
    pub source: SourceId,
    pub record: PrimaryRecord,
    pub institute: Option<InstituteRecord>,
    pub grades: Vec<GradeRecord>,
    pub cumulatives: Vec<CumulativeRecord>,
}

/// Every raw shape the normalizer accepts. Nothing past the normalizer sees
/// these.
#[derive(Debug, Clone)]
pub enum RawResult {
    Backend(BackendRecord),
    External { key: QueryKey, payload: ExternalPayload },
}

pub fn normalize(raw: RawResult) -> CanonicalResult {
    match raw {
        RawResult::Backend(backend) => normalize_backend(backend),
        RawResult::External { key, payload } => normalize_external(&key, payload),
    }
}

/// Re-applies the default policy to an already canonical result. A result
/// with no missing fields comes back unchanged.
pub fn normalize_canonical(result: CanonicalResult) -> CanonicalResult {
    let institute_data = InstituteData {
        code: text_or(Some(result.institute_data.code), UNKNOWN_INSTITUTE_CODE),
        name: text_or(Some(result.institute_data.name), UNKNOWN_TEXT),
        district: text_or(Some(result.institute_data.district), UNKNOWN_TEXT),
    };

    let result_data = result
        .result_data
        .into_iter()
        .map(|entry| {
            let grade = grade_text(Some(&Value::String(entry.result)));
            let passed = entry.passed && grade != REFERENCE_MARKER;
            SemesterResult {
                semester: entry.semester,
                result: grade,
                passed,
                reference_subjects: dedupe(entry.reference_subjects),
                published_at: entry.published_at,
            }
        })
        .collect();

    let cgpa_data = result
        .cgpa_data
        .into_iter()
        .map(|entry| CumulativeEntry {
            semester: text_or(Some(entry.semester), FINAL_LABEL),
            cgpa: cumulative_text(Some(&Value::String(entry.cgpa))),
            published_at: entry.published_at,
        })
        .collect();

    CanonicalResult {
        success: result.success,
        roll: result.roll,
        regulation: result.regulation,
        exam: result.exam,
        institute_data,
        result_data: sorted(result_data),
        cgpa_data: capped(cgpa_data),
        provenance: result.provenance,
    }
}

fn normalize_backend(backend: BackendRecord) -> CanonicalResult {
    let BackendRecord {
        source,
        record,
        institute,
        grades,
        cumulatives,
    } = backend;

    let institute = institute.or(record.institute);
    let institute_data = institute_data(institute, record.institute_code);

    let result_data = grades
        .iter()
        .map(|grade| {
            semester_result(
                grade.semester.unwrap_or(1),
                grade.grade.as_ref(),
                &grade.reference_subjects,
                false,
                grade.published_at.as_deref(),
            )
        })
        .collect();

    CanonicalResult {
        success: true,
        roll: record.roll,
        regulation: record.regulation,
        exam: record.program,
        institute_data,
        result_data: sorted(result_data),
        cgpa_data: cumulative_entries(&cumulatives),
        provenance: Provenance::Source(source),
    }
}

fn normalize_external(key: &QueryKey, payload: ExternalPayload) -> CanonicalResult {
    let result_data = payload.result_data.iter().map(external_semester).collect();

    CanonicalResult {
        success: true,
        roll: scalar_text(payload.roll.as_ref()).unwrap_or_else(|| key.roll().to_owned()),
        regulation: scalar_text(payload.regulation.as_ref())
            .unwrap_or_else(|| key.regulation().to_owned()),
        exam: payload
            .exam
            .filter(|exam| !exam.trim().is_empty())
            .unwrap_or_else(|| key.program().to_owned()),
        institute_data: institute_data(payload.institute_data, None),
        result_data: sorted(result_data),
        cgpa_data: cumulative_entries(&payload.cgpa_data),
        provenance: Provenance::Fallback,
    }
}

fn external_semester(entry: &ExternalSemester) -> SemesterResult {
    let (grade, nested_subjects) = match &entry.result {
        ExternalGrade::Nested { gpa, ref_subjects } => (gpa.as_ref(), ref_subjects),
        ExternalGrade::Bare(value) => (Some(value), &NO_SUBJECTS),
    };
    let subjects = if nested_subjects.is_array() {
        nested_subjects
    } else {
        &entry.reference_subjects
    };

    semester_result(
        entry.semester,
        grade,
        subjects,
        entry.failed,
        entry.published_at.as_deref(),
    )
}

fn semester_result(
    semester: u32,
    grade: Option<&Value>,
    reference_subjects: &Value,
    failed: bool,
    published_at: Option<&str>,
) -> SemesterResult {
    let result = if failed {
        REFERENCE_MARKER.to_owned()
    } else {
        grade_text(grade)
    };
    let passed = result != REFERENCE_MARKER;

    SemesterResult {
        semester,
        result,
        passed,
        reference_subjects: subject_list(reference_subjects),
        published_at: timestamp(published_at),
    }
}

fn institute_data(institute: Option<InstituteRecord>, fallback_code: Option<String>) -> InstituteData {
    let institute = institute.unwrap_or_default();
    InstituteData {
        code: text_or(institute.code.or(fallback_code), UNKNOWN_INSTITUTE_CODE),
        name: text_or(institute.name, UNKNOWN_TEXT),
        district: text_or(institute.district, UNKNOWN_TEXT),
    }
}

fn cumulative_entries(rows: &[CumulativeRecord]) -> Vec<CumulativeEntry> {
    capped(
        rows.iter()
            .map(|row| CumulativeEntry {
                semester: scalar_text(row.semester.as_ref())
                    .unwrap_or_else(|| FINAL_LABEL.to_owned()),
                cgpa: cumulative_text(row.value.as_ref()),
                published_at: timestamp(row.published_at.as_deref()),
            })
            .collect(),
    )
}

/// Two-decimal grade, the reference marker, or verbatim non-numeric text.
fn grade_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(number)) => number
            .as_f64()
            .map(two_decimals)
            .unwrap_or_else(|| REFERENCE_MARKER.to_owned()),
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() || text.eq_ignore_ascii_case(REFERENCE_MARKER) {
                REFERENCE_MARKER.to_owned()
            } else {
                numeric(text).map_or_else(|| text.to_owned(), two_decimals)
            }
        }
        _ => REFERENCE_MARKER.to_owned(),
    }
}

fn cumulative_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::Number(number)) => number
            .as_f64()
            .map_or_else(|| MISSING_CUMULATIVE.to_owned(), two_decimals),
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() {
                MISSING_CUMULATIVE.to_owned()
            } else {
                numeric(text).map_or_else(|| text.to_owned(), two_decimals)
            }
        }
        _ => MISSING_CUMULATIVE.to_owned(),
    }
}

fn numeric(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}

fn two_decimals(value: f64) -> String {
    format!("{value:.2}")
}

fn subject_list(value: &Value) -> Vec<String> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    dedupe(
        items
            .iter()
            .filter_map(|item| scalar_text(Some(item)))
            .collect(),
    )
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn text_or(value: Option<String>, default: &str) -> String {
    match value {
        Some(text) if !text.trim().is_empty() => text.trim().to_owned(),
        _ => default.to_owned(),
    }
}

fn timestamp(value: Option<&str>) -> UtcDateTime {
    value
        .and_then(UtcDateTime::parse_lenient)
        .unwrap_or(UtcDateTime::EPOCH)
}

fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut output: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !output.contains(&item) {
            output.push(item);
        }
    }
    output
}

fn sorted(mut entries: Vec<SemesterResult>) -> Vec<SemesterResult> {
    entries.sort_by_key(|entry| entry.semester);
    entries
}

fn capped(mut entries: Vec<CumulativeEntry>) -> Vec<CumulativeEntry> {
    entries.truncate(MAX_CUMULATIVE_ENTRIES);
    entries
}
