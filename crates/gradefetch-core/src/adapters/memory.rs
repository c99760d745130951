use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::MAX_CUMULATIVE_ENTRIES;
use crate::record_source::{InstituteQuery, RecordSource, SourceError, SourceFuture};
use crate::{CumulativeRecord, GradeRecord, InstituteRecord, PrimaryRecord, QueryKey, SourceId};

/// Institute row keyed by program and regulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstituteRow {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub regulation: Option<String>,
    #[serde(flatten)]
    pub institute: InstituteRecord,
}

/// In-process dataset, loadable from a JSON fixture file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryDataset {
    #[serde(default)]
    pub students: Vec<PrimaryRecord>,
    #[serde(default)]
    pub institutes: Vec<InstituteRow>,
    /// Grade rows keyed by roll number.
    #[serde(default)]
    pub grades: BTreeMap<String, Vec<GradeRecord>>,
    /// Cumulative rows keyed by roll number.
    #[serde(default)]
    pub cumulatives: BTreeMap<String, Vec<CumulativeRecord>>,
}

impl MemoryDataset {
    pub fn from_json_file(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path).map_err(|error| {
            SourceError::unavailable(format!(
                "failed to read fixture '{}': {error}",
                path.display()
            ))
        })?;
        serde_json::from_str(&content).map_err(|error| {
            SourceError::unavailable(format!(
                "fixture '{}' is not a valid dataset: {error}",
                path.display()
            ))
        })
    }

    pub fn with_student(mut self, record: PrimaryRecord) -> Self {
        self.students.push(record);
        self
    }

    pub fn with_institute(
        mut self,
        program: impl Into<String>,
        regulation: impl Into<String>,
        institute: InstituteRecord,
    ) -> Self {
        self.institutes.push(InstituteRow {
            program: Some(program.into()),
            regulation: Some(regulation.into()),
            institute,
        });
        self
    }

    pub fn with_grades(mut self, roll: impl Into<String>, grades: Vec<GradeRecord>) -> Self {
        self.grades.insert(roll.into(), grades);
        self
    }

    pub fn with_cumulatives(
        mut self,
        roll: impl Into<String>,
        cumulatives: Vec<CumulativeRecord>,
    ) -> Self {
        self.cumulatives.insert(roll.into(), cumulatives);
        self
    }
}

/// Record source over a [`MemoryDataset`], with optional simulated latency
/// and failure.
#[derive(Debug, Clone)]
pub struct MemoryRecordStore {
    id: SourceId,
    dataset: Arc<MemoryDataset>,
    primary_latency: Duration,
    enrichment_latency: Duration,
    failure: Option<String>,
    completed: Arc<AtomicUsize>,
}

impl MemoryRecordStore {
    pub fn new(id: SourceId, dataset: MemoryDataset) -> Self {
        Self {
            id,
            dataset: Arc::new(dataset),
            primary_latency: Duration::ZERO,
            enrichment_latency: Duration::ZERO,
            failure: None,
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn empty(id: SourceId) -> Self {
        Self::new(id, MemoryDataset::default())
    }

    /// Applies the same simulated latency to every operation.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.primary_latency = latency;
        self.enrichment_latency = latency;
        self
    }

    pub fn with_primary_latency(mut self, latency: Duration) -> Self {
        self.primary_latency = latency;
        self
    }

    pub fn with_enrichment_latency(mut self, latency: Duration) -> Self {
        self.enrichment_latency = latency;
        self
    }

    /// Every operation fails with an unavailable error after its latency.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Number of operations that ran to completion. Cancelled calls are not
    /// counted.
    pub fn completed_queries(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    async fn settle(&self, latency: Duration) -> Result<(), SourceError> {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        match &self.failure {
            Some(message) => Err(SourceError::unavailable(format!(
                "{}: {message}",
                self.id
            ))),
            None => Ok(()),
        }
    }
}

impl RecordSource for MemoryRecordStore {
    fn id(&self) -> SourceId {
        self.id.clone()
    }

    fn find_primary<'a>(&'a self, key: QueryKey) -> SourceFuture<'a, Option<PrimaryRecord>> {
        Box::pin(async move {
            self.settle(self.primary_latency).await?;
            Ok(self
                .dataset
                .students
                .iter()
                .find(|record| record.matches(&key))
                .cloned())
        })
    }

    fn find_institute<'a>(
        &'a self,
        query: InstituteQuery,
    ) -> SourceFuture<'a, Option<InstituteRecord>> {
        Box::pin(async move {
            self.settle(self.enrichment_latency).await?;
            Ok(self
                .dataset
                .institutes
                .iter()
                .find(|row| {
                    row.institute.code.as_deref() == Some(query.code.as_str())
                        && row.program.as_deref().map_or(true, |p| p == query.program)
                        && row
                            .regulation
                            .as_deref()
                            .map_or(true, |r| r == query.regulation)
                })
                .map(|row| row.institute.clone()))
        })
    }

    fn list_grades<'a>(&'a self, roll: String) -> SourceFuture<'a, Vec<GradeRecord>> {
        Box::pin(async move {
            self.settle(self.enrichment_latency).await?;
            let mut grades = self.dataset.grades.get(&roll).cloned().unwrap_or_default();
            grades.sort_by_key(|grade| grade.semester.unwrap_or(1));
            Ok(grades)
        })
    }

    fn list_cumulatives<'a>(
        &'a self,
        roll: String,
        limit: usize,
    ) -> SourceFuture<'a, Vec<CumulativeRecord>> {
        Box::pin(async move {
            self.settle(self.enrichment_latency).await?;
            let mut rows = self
                .dataset
                .cumulatives
                .get(&roll)
                .cloned()
                .unwrap_or_default();
            rows.truncate(limit.min(MAX_CUMULATIVE_ENTRIES));
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dataset() -> MemoryDataset {
        MemoryDataset::default()
            .with_student(
                PrimaryRecord::new("654321", "Diploma in Engineering", "2022")
                    .with_institute_code("10042"),
            )
            .with_institute(
                "Diploma in Engineering",
                "2022",
                InstituteRecord {
                    code: Some(String::from("10042")),
                    name: Some(String::from("Dhaka Polytechnic Institute")),
                    district: Some(String::from("Dhaka")),
                },
            )
            .with_grades(
                "654321",
                vec![
                    GradeRecord::new(2, Some(json!("3.50"))),
                    GradeRecord::new(1, Some(json!(3.25))),
                ],
            )
    }

    #[tokio::test]
    async fn finds_primary_only_on_exact_key_match() {
        let store = MemoryRecordStore::new(SourceId::parse("mem").expect("valid"), dataset());

        let hit = QueryKey::new("654321", "2022", "Diploma in Engineering").expect("valid");
        assert!(store.find_primary(hit).await.expect("ok").is_some());

        let miss = QueryKey::new("654321", "2016", "Diploma in Engineering").expect("valid");
        assert!(store.find_primary(miss).await.expect("ok").is_none());
    }

    #[tokio::test]
    async fn lists_grades_in_semester_order() {
        let store = MemoryRecordStore::new(SourceId::parse("mem").expect("valid"), dataset());
        let grades = store.list_grades(String::from("654321")).await.expect("ok");
        let semesters = grades.iter().map(|g| g.semester).collect::<Vec<_>>();
        assert_eq!(semesters, vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn cumulatives_respect_the_requested_limit() {
        let rows = (1..=30)
            .map(|semester| CumulativeRecord::new(json!(semester), Some(json!("3.00"))))
            .collect();
        let store = MemoryRecordStore::new(
            SourceId::parse("mem").expect("valid"),
            MemoryDataset::default().with_cumulatives("654321", rows),
        );

        let capped = store
            .list_cumulatives(String::from("654321"), 50)
            .await
            .expect("ok");
        assert_eq!(capped.len(), MAX_CUMULATIVE_ENTRIES);
    }

    #[tokio::test]
    async fn failing_store_reports_unavailable() {
        let store = MemoryRecordStore::empty(SourceId::parse("mem").expect("valid"))
            .failing("connection refused");
        let key = QueryKey::new("654321", "2022", "Diploma in Engineering").expect("valid");

        let error = store.find_primary(key).await.expect_err("must fail");
        assert_eq!(error.kind(), crate::SourceErrorKind::Unavailable);
        assert_eq!(store.completed_queries(), 1);
    }
}
