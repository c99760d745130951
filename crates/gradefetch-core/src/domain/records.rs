use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::QueryKey;

/// Upper bound on cumulative entries kept for one student.
pub const MAX_CUMULATIVE_ENTRIES: usize = 20;

/// Institute row as stored by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstituteRecord {
    #[serde(default, deserialize_with = "optional_text")]
    pub code: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub district: Option<String>,
}

/// Student row matched by the primary lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryRecord {
    #[serde(deserialize_with = "required_text")]
    pub roll: String,
    #[serde(alias = "exam", alias = "program_name")]
    pub program: String,
    #[serde(deserialize_with = "required_text")]
    pub regulation: String,
    #[serde(default, deserialize_with = "optional_text")]
    pub institute_code: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub institute: Option<InstituteRecord>,
}

impl PrimaryRecord {
    pub fn new(
        roll: impl Into<String>,
        program: impl Into<String>,
        regulation: impl Into<String>,
    ) -> Self {
        Self {
            roll: roll.into(),
            program: program.into(),
            regulation: regulation.into(),
            institute_code: None,
            created_at: None,
            institute: None,
        }
    }

    pub fn with_institute_code(mut self, code: impl Into<String>) -> Self {
        self.institute_code = Some(code.into());
        self
    }

    pub fn with_institute(mut self, institute: InstituteRecord) -> Self {
        self.institute = Some(institute);
        self
    }

    /// Exact equality on all three key fields.
    pub fn matches(&self, key: &QueryKey) -> bool {
        self.roll == key.roll() && self.regulation == key.regulation() && self.program == key.program()
    }
}

/// One semester's grade row. The grade may be a number, a numeric string, the
/// reference marker, or absent entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    #[serde(default, deserialize_with = "lenient_semester")]
    pub semester: Option<u32>,
    #[serde(default, alias = "gpa", alias = "result")]
    pub grade: Option<Value>,
    #[serde(default, alias = "ref_subjects", alias = "refSubjects")]
    pub reference_subjects: Value,
    #[serde(
        default,
        alias = "created_at",
        alias = "publishedAt",
        deserialize_with = "lenient_timestamp"
    )]
    pub published_at: Option<String>,
}

impl GradeRecord {
    pub fn new(semester: u32, grade: Option<Value>) -> Self {
        Self {
            semester: Some(semester),
            grade,
            ..Self::default()
        }
    }

    pub fn with_reference_subjects(mut self, subjects: Value) -> Self {
        self.reference_subjects = subjects;
        self
    }

    pub fn with_published_at(mut self, published_at: impl Into<String>) -> Self {
        self.published_at = Some(published_at.into());
        self
    }
}

/// One cumulative-average row. `semester` is either a number or a label such
/// as `"Final"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeRecord {
    #[serde(default)]
    pub semester: Option<Value>,
    #[serde(default, alias = "cgpa")]
    pub value: Option<Value>,
    #[serde(
        default,
        alias = "created_at",
        alias = "publishedAt",
        deserialize_with = "lenient_timestamp"
    )]
    pub published_at: Option<String>,
}

impl CumulativeRecord {
    pub fn new(semester: Value, value: Option<Value>) -> Self {
        Self {
            semester: Some(semester),
            value,
            published_at: None,
        }
    }
}

fn required_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(text) => Ok(text),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, found {other}"
        ))),
    }
}

pub(crate) fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

/// Semester number from a number or numeric string. Anything else is absent.
pub(crate) fn lenient_semester<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

/// Timestamp text. Unix seconds (or milliseconds) are rendered as RFC 3339;
/// other shapes are absent.
pub(crate) fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => number.as_i64().and_then(unix_timestamp_text),
        _ => None,
    })
}

/// Boolean flag from `true`/`false`, `1`/`0`, or their string forms.
/// Unrecognized values read as `false`.
pub(crate) fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_flag(deserializer)?.unwrap_or(false))
}

/// Like [`lenient_flag`], but unrecognized values are absent.
pub(crate) fn optional_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(flag)) => Some(flag),
        Some(Value::Number(number)) => number.as_f64().map(|n| n != 0.0),
        Some(Value::String(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn unix_timestamp_text(value: i64) -> Option<String> {
    // values this large are milliseconds
    let seconds = if value.abs() >= 100_000_000_000 {
        value / 1_000
    } else {
        value
    };
    OffsetDateTime::from_unix_timestamp(seconds)
        .ok()?
        .format(&Rfc3339)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primary_record_accepts_numeric_key_columns() {
        let record: PrimaryRecord = serde_json::from_value(json!({
            "roll": 654321,
            "program": "Diploma in Engineering",
            "regulation": 2022,
            "institute_code": 10042
        }))
        .expect("valid record");

        assert_eq!(record.roll, "654321");
        assert_eq!(record.regulation, "2022");
        assert_eq!(record.institute_code.as_deref(), Some("10042"));
    }

    #[test]
    fn primary_record_matching_is_exact() {
        let key = QueryKey::new("654321", "2022", "Diploma in Engineering").expect("valid");
        let record = PrimaryRecord::new("654321", "Diploma in Engineering", "2022");
        assert!(record.matches(&key));

        let other = PrimaryRecord::new("654321", "diploma in engineering", "2022");
        assert!(!other.matches(&key));
    }

    #[test]
    fn grade_record_reads_column_aliases() {
        let record: GradeRecord = serde_json::from_value(json!({
            "semester": 3,
            "gpa": "3.41",
            "ref_subjects": ["66631"],
            "created_at": "2024-02-01T10:00:00+06:00"
        }))
        .expect("valid record");

        assert_eq!(record.semester, Some(3));
        assert_eq!(record.grade, Some(json!("3.41")));
        assert_eq!(record.reference_subjects, json!(["66631"]));
        assert!(record.published_at.is_some());
    }

    #[test]
    fn off_type_grade_columns_fall_back_instead_of_failing_the_list() {
        let rows: Vec<GradeRecord> = serde_json::from_str(
            r#"[
                {"semester": 1, "gpa": "3.50"},
                {"semester": "2", "gpa": "3.10", "created_at": 1700000000},
                {"semester": {"n": 3}, "gpa": 2.9, "created_at": false}
            ]"#,
        )
        .expect("every row decodes");

        let semesters = rows.iter().map(|row| row.semester).collect::<Vec<_>>();
        assert_eq!(semesters, vec![Some(1), Some(2), None]);
        assert_eq!(rows[1].published_at.as_deref(), Some("2023-11-14T22:13:20Z"));
        assert_eq!(rows[2].published_at, None);
    }

    #[test]
    fn millisecond_timestamps_are_recognized() {
        let row: CumulativeRecord = serde_json::from_value(json!({
            "cgpa": 3.2,
            "publishedAt": 1_700_000_000_000_i64
        }))
        .expect("valid record");
        assert_eq!(row.published_at.as_deref(), Some("2023-11-14T22:13:20Z"));
    }

    #[test]
    fn institute_text_columns_accept_numbers() {
        let institute: InstituteRecord = serde_json::from_value(json!({
            "code": 10042,
            "name": "Dhaka Polytechnic Institute",
            "district": 7
        }))
        .expect("valid record");
        assert_eq!(institute.district.as_deref(), Some("7"));
    }
}
