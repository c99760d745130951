//! Secondary lookups issued once the primary match is known.
//!
//! Grades and the institute row come only from the winning source. The
//! cumulative sequence is raced across every participating source, because
//! it may live on a different backend than the primary record. Each lookup
//! degrades to empty on its own; none of them can fail the resolution.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::dispatch::{race, RaceTarget, SourceAttempt};
use crate::domain::MAX_CUMULATIVE_ENTRIES;
use crate::record_source::{InstituteQuery, SourceError};
use crate::{CumulativeRecord, GradeRecord, InstituteRecord, PrimaryRecord, QueryKey, SourceId};

/// Everything gathered after the primary match.
#[derive(Debug, Clone, Default)]
pub struct Enrichment {
    pub institute: Option<InstituteRecord>,
    pub grades: Vec<GradeRecord>,
    pub cumulatives: Vec<CumulativeRecord>,
    /// Source whose cumulative sequence was accepted.
    pub cumulative_source: Option<SourceId>,
    pub cumulative_attempts: Vec<SourceAttempt>,
}

/// Runs the winner-only lookups and the cross-source cumulative race
/// concurrently.
pub async fn enrich(
    winner: &RaceTarget,
    everyone: Vec<RaceTarget>,
    record: &PrimaryRecord,
    key: &QueryKey,
) -> Enrichment {
    let institute = async {
        if record.institute.is_some() {
            return record.institute.clone();
        }
        let code = record.institute_code.as_deref()?.trim();
        if code.is_empty() {
            return None;
        }
        fetch_institute(winner, InstituteQuery::for_key(key, code)).await
    };

    let (institute, grades, (cumulatives, cumulative_source, cumulative_attempts)) = tokio::join!(
        institute,
        fetch_grades(winner, &record.roll),
        fetch_cumulative_across_all(everyone, &record.roll),
    );

    Enrichment {
        institute,
        grades,
        cumulatives,
        cumulative_source,
        cumulative_attempts,
    }
}

/// Grades from the winning source only. Empty on timeout or error.
pub async fn fetch_grades(winner: &RaceTarget, roll: &str) -> Vec<GradeRecord> {
    let Ok(client) = &winner.client else {
        return Vec::new();
    };
    let roll = roll.to_owned();
    bounded(&winner.id, "grades", winner.timeout, client.list_grades(roll))
        .await
        .unwrap_or_default()
}

pub async fn fetch_institute(winner: &RaceTarget, query: InstituteQuery) -> Option<InstituteRecord> {
    let Ok(client) = &winner.client else {
        return None;
    };
    bounded(
        &winner.id,
        "institute",
        winner.timeout,
        client.find_institute(query),
    )
    .await
    .flatten()
}

/// Races the cumulative lookup across `targets` and keeps the first non-empty
/// sequence, capped at [`MAX_CUMULATIVE_ENTRIES`].
pub async fn fetch_cumulative_across_all(
    targets: Vec<RaceTarget>,
    roll: &str,
) -> (Vec<CumulativeRecord>, Option<SourceId>, Vec<SourceAttempt>) {
    let outcome = race(
        targets,
        |client| {
            let roll = roll.to_owned();
            async move {
                client
                    .list_cumulatives(roll, MAX_CUMULATIVE_ENTRIES)
                    .await
            }
        },
        |rows: &Vec<CumulativeRecord>| !rows.is_empty(),
    )
    .await;

    match outcome.winner {
        Some((source, mut rows)) => {
            rows.truncate(MAX_CUMULATIVE_ENTRIES);
            (rows, Some(source), outcome.attempts)
        }
        None => (Vec::new(), None, outcome.attempts),
    }
}

async fn bounded<T, F>(source: &SourceId, lookup: &'static str, timeout: Duration, call: F) -> Option<T>
where
    F: Future<Output = Result<T, SourceError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(error)) => {
            debug!(source = %source, lookup, error = %error, "enrichment lookup failed");
            None
        }
        Err(_) => {
            debug!(source = %source, lookup, "enrichment lookup timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{MemoryDataset, MemoryRecordStore};
    use crate::record_source::RecordSource;
    use serde_json::json;
    use std::sync::Arc;

    fn id(value: &str) -> SourceId {
        SourceId::parse(value).expect("valid id")
    }

    fn key() -> QueryKey {
        QueryKey::new("654321", "2022", "Diploma in Engineering").expect("valid key")
    }

    fn target(store: MemoryRecordStore, timeout_ms: u64) -> RaceTarget {
        RaceTarget {
            id: store.id(),
            client: Ok(Arc::new(store)),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn record() -> PrimaryRecord {
        PrimaryRecord::new("654321", "Diploma in Engineering", "2022").with_institute_code("10042")
    }

    fn winner_dataset() -> MemoryDataset {
        MemoryDataset::default()
            .with_student(record())
            .with_institute(
                "Diploma in Engineering",
                "2022",
                InstituteRecord {
                    code: Some(String::from("10042")),
                    name: Some(String::from("Dhaka Polytechnic Institute")),
                    district: Some(String::from("Dhaka")),
                },
            )
            .with_grades("654321", vec![GradeRecord::new(1, Some(json!("3.25")))])
    }

    #[tokio::test(start_paused = true)]
    async fn cumulatives_may_come_from_a_different_source() {
        let winner = target(MemoryRecordStore::new(id("primary"), winner_dataset()), 500);
        let shard = MemoryRecordStore::new(
            id("aggregates"),
            MemoryDataset::default().with_cumulatives(
                "654321",
                vec![CumulativeRecord::new(json!("Final"), Some(json!("3.40")))],
            ),
        );
        let everyone = vec![
            target(MemoryRecordStore::new(id("primary"), winner_dataset()), 500),
            target(shard, 500),
        ];

        let enrichment = enrich(&winner, everyone, &record(), &key()).await;

        assert_eq!(enrichment.grades.len(), 1);
        assert_eq!(
            enrichment.institute.and_then(|i| i.name).as_deref(),
            Some("Dhaka Polytechnic Institute")
        );
        assert_eq!(enrichment.cumulatives.len(), 1);
        assert_eq!(enrichment.cumulative_source, Some(id("aggregates")));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_grades_degrade_to_empty_without_affecting_cumulatives() {
        let slow = MemoryRecordStore::new(id("primary"), winner_dataset())
            .with_enrichment_latency(Duration::from_secs(10));
        let winner = target(slow, 200);
        let shard = MemoryRecordStore::new(
            id("aggregates"),
            MemoryDataset::default().with_cumulatives(
                "654321",
                vec![CumulativeRecord::new(json!(4), Some(json!(3.1)))],
            ),
        );

        let enrichment = enrich(&winner, vec![target(shard, 200)], &record(), &key()).await;

        assert!(enrichment.grades.is_empty());
        assert!(enrichment.institute.is_none());
        assert_eq!(enrichment.cumulatives.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn embedded_institute_skips_the_lookup() {
        let embedded = InstituteRecord {
            code: Some(String::from("20001")),
            name: Some(String::from("Embedded")),
            district: None,
        };
        let store = MemoryRecordStore::empty(id("primary"));
        let winner = target(store.clone(), 100);

        let enrichment = enrich(
            &winner,
            Vec::new(),
            &record().with_institute(embedded.clone()),
            &key(),
        )
        .await;

        assert_eq!(enrichment.institute, Some(embedded));
        // only the grade lookup ran
        assert_eq!(store.completed_queries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn all_empty_cumulatives_yield_an_empty_sequence() {
        let (rows, source, attempts) = fetch_cumulative_across_all(
            vec![
                target(MemoryRecordStore::empty(id("a")), 100),
                target(MemoryRecordStore::empty(id("b")).failing("down"), 100),
            ],
            "654321",
        )
        .await;

        assert!(rows.is_empty());
        assert!(source.is_none());
        assert_eq!(attempts.len(), 2);
    }
}
