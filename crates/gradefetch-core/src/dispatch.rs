//! Racing query dispatch.
//!
//! One task per source is spawned into a [`JoinSet`]; each task bounds its
//! call with its own timeout. The first accepted answer wins, the remaining
//! tasks are aborted, and dropping their futures aborts the underlying
//! transport requests. A source that times out, errors, or answers with
//! nothing is a miss, never a dispatcher failure.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;

use crate::record_source::{RecordSource, SourceError, SourceErrorKind};
use crate::registry::SourceRegistry;
use crate::{PrimaryRecord, QueryKey, RegistryError, SourceId};

/// How one participant of a race ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Matched,
    Miss,
    Timeout,
    Unavailable,
    /// Still in flight when another participant won; cancelled.
    Abandoned,
    /// Not queried at all (for example a disabled fallback).
    Skipped,
}

impl AttemptOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Miss => "miss",
            Self::Timeout => "timeout",
            Self::Unavailable => "unavailable",
            Self::Abandoned => "abandoned",
            Self::Skipped => "skipped",
        }
    }
}

impl Display for AttemptOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-source record of one race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttempt {
    pub source: SourceId,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl SourceAttempt {
    fn new(source: SourceId, outcome: AttemptOutcome, latency: Duration) -> Self {
        Self {
            source,
            outcome,
            latency_ms: duration_ms(latency),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// One participant of a race: a source, its client (or the reason it has
/// none), and the bound on its call.
pub struct RaceTarget {
    pub id: SourceId,
    pub client: Result<Arc<dyn RecordSource>, RegistryError>,
    pub timeout: Duration,
}

impl RaceTarget {
    /// Resolves `ids` against the registry. Unknown or unconstructible sources
    /// stay in the list and are reported as unavailable when raced.
    pub fn from_registry(
        registry: &SourceRegistry,
        ids: &[SourceId],
        default_timeout: Duration,
    ) -> Vec<Self> {
        ids.iter()
            .map(|id| Self {
                id: id.clone(),
                client: registry.resolve(id),
                timeout: registry.timeout_for(id, default_timeout),
            })
            .collect()
    }
}

/// Result of a race: the winning source and value, if any, plus one attempt
/// per participant in issue order.
#[derive(Debug)]
pub struct RaceOutcome<T> {
    pub winner: Option<(SourceId, T)>,
    pub attempts: Vec<SourceAttempt>,
}

impl<T> RaceOutcome<T> {
    pub fn is_miss(&self) -> bool {
        self.winner.is_none()
    }
}

/// Outcome of the primary lookup race.
pub type DispatchOutcome = RaceOutcome<PrimaryRecord>;

/// Races `call` across `targets` and returns the first value `accept` takes.
pub async fn race<T, F, Fut, A>(targets: Vec<RaceTarget>, call: F, accept: A) -> RaceOutcome<T>
where
    T: Send + 'static,
    F: Fn(Arc<dyn RecordSource>) -> Fut,
    Fut: Future<Output = Result<T, SourceError>> + Send + 'static,
    A: Fn(&T) -> bool,
{
    let race_started = Instant::now();
    let mut attempts: Vec<(usize, SourceAttempt)> = Vec::with_capacity(targets.len());
    let mut pending: HashMap<usize, SourceId> = HashMap::with_capacity(targets.len());
    let mut tasks = JoinSet::new();

    for (index, target) in targets.into_iter().enumerate() {
        let client = match target.client {
            Ok(client) => client,
            Err(error) => {
                debug!(source = %target.id, error = %error, "source skipped: no client");
                attempts.push((
                    index,
                    SourceAttempt::new(target.id, AttemptOutcome::Unavailable, Duration::ZERO)
                        .with_detail(error.to_string()),
                ));
                continue;
            }
        };

        let future = call(client);
        let timeout = target.timeout;
        pending.insert(index, target.id);
        tasks.spawn(async move {
            let started = Instant::now();
            let result = tokio::time::timeout(timeout, future).await;
            (index, result, started.elapsed())
        });
    }

    let mut winner = None;
    while let Some(joined) = tasks.join_next().await {
        let Ok((index, result, elapsed)) = joined else {
            continue;
        };
        let Some(id) = pending.remove(&index) else {
            continue;
        };

        let attempt = match result {
            Err(_) => SourceAttempt::new(id.clone(), AttemptOutcome::Timeout, elapsed)
                .with_detail("deadline elapsed"),
            Ok(Err(error)) => failed_attempt(id.clone(), &error, elapsed),
            Ok(Ok(value)) if accept(&value) => {
                winner = Some((id.clone(), value));
                SourceAttempt::new(id.clone(), AttemptOutcome::Matched, elapsed)
            }
            Ok(Ok(_)) => SourceAttempt::new(id.clone(), AttemptOutcome::Miss, elapsed),
        };

        debug!(
            source = %id,
            outcome = %attempt.outcome,
            latency_ms = attempt.latency_ms,
            "race participant finished"
        );
        attempts.push((index, attempt));

        if winner.is_some() {
            break;
        }
    }

    tasks.abort_all();
    let leftover_outcome = if winner.is_some() {
        AttemptOutcome::Abandoned
    } else {
        // only reachable when a task panicked
        AttemptOutcome::Unavailable
    };
    for (index, id) in pending {
        attempts.push((
            index,
            SourceAttempt::new(id, leftover_outcome, race_started.elapsed()),
        ));
    }

    attempts.sort_by_key(|(index, _)| *index);
    RaceOutcome {
        winner,
        attempts: attempts.into_iter().map(|(_, attempt)| attempt).collect(),
    }
}

/// Races the primary lookup for `key` and returns the first exact match.
pub async fn dispatch(targets: Vec<RaceTarget>, key: &QueryKey) -> DispatchOutcome {
    let outcome = race(
        targets,
        |client| {
            let key = key.clone();
            async move { client.find_primary(key).await }
        },
        |record: &Option<PrimaryRecord>| record.as_ref().is_some_and(|r| r.matches(key)),
    )
    .await;

    RaceOutcome {
        winner: outcome
            .winner
            .and_then(|(id, record)| record.map(|record| (id, record))),
        attempts: outcome.attempts,
    }
}

fn failed_attempt(id: SourceId, error: &SourceError, elapsed: Duration) -> SourceAttempt {
    let outcome = match error.kind() {
        SourceErrorKind::Timeout => AttemptOutcome::Timeout,
        SourceErrorKind::Unavailable
        | SourceErrorKind::InvalidResponse
        | SourceErrorKind::Internal => AttemptOutcome::Unavailable,
    };
    SourceAttempt::new(id, outcome, elapsed).with_detail(error.to_string())
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}
