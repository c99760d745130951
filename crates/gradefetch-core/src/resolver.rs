use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::ResolverConfig;
use crate::dispatch::{dispatch, RaceTarget, SourceAttempt};
use crate::enrich::enrich;
use crate::fallback::{Escalation, ExternalFallback, FallbackAttempt};
use crate::http_client::HttpClient;
use crate::normalize::{normalize, BackendRecord, RawResult};
use crate::record_source::SourceConnector;
use crate::registry::SourceRegistry;
use crate::{CanonicalResult, ConfigError, QueryKey};

pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(4);
pub const DEFAULT_ENRICHMENT_TIMEOUT: Duration = Duration::from_secs(4);

/// Terminal outcome when no source and no fallback produced a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundReport {
    pub success: bool,
    pub roll: String,
    pub regulation: String,
    pub exam: String,
    /// One entry per configured source that took part in the primary race.
    pub attempts: Vec<SourceAttempt>,
    pub fallback: FallbackAttempt,
    pub message: String,
}

/// Outcome of one resolution. Not-found is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Resolution {
    Found(CanonicalResult),
    NotFound(NotFoundReport),
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn found(self) -> Option<CanonicalResult> {
        match self {
            Self::Found(result) => Some(result),
            Self::NotFound(_) => None,
        }
    }

    pub fn not_found(self) -> Option<NotFoundReport> {
        match self {
            Self::Found(_) => None,
            Self::NotFound(report) => Some(report),
        }
    }
}

/// Inbound entry point: race the configured sources, enrich the winner,
/// escalate to the fallback when nothing matched.
///
/// A resolver is cheap to share behind an `Arc`; concurrent resolutions only
/// contend on the registry's read locks.
pub struct Resolver {
    registry: Arc<SourceRegistry>,
    fallback: Option<ExternalFallback>,
    source_timeout: Duration,
    enrichment_timeout: Duration,
}

impl Resolver {
    pub fn new(registry: Arc<SourceRegistry>) -> Self {
        Self {
            registry,
            fallback: None,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            enrichment_timeout: DEFAULT_ENRICHMENT_TIMEOUT,
        }
    }

    pub fn with_fallback(mut self, fallback: ExternalFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn with_enrichment_timeout(mut self, timeout: Duration) -> Self {
        self.enrichment_timeout = timeout;
        self
    }

    /// Builds the registry and fallback described by `config`.
    ///
    /// # Errors
    ///
    /// Duplicate source ids, unknown search-order entries and an unknown
    /// current source are rejected. Unreachable endpoints are not.
    pub fn from_config(
        config: &ResolverConfig,
        connector: Arc<dyn SourceConnector>,
        http_client: Arc<dyn HttpClient>,
    ) -> Result<Self, ConfigError> {
        let registry = SourceRegistry::new(
            config.descriptors(),
            config.search_order.clone(),
            connector,
        )?;
        if let Some(current) = &config.current_source {
            registry.set_active(current)?;
        }

        let mut resolver = Self::new(Arc::new(registry))
            .with_source_timeout(config.source_timeout())
            .with_enrichment_timeout(config.enrichment_timeout());
        if let Some(base_url) = config.fallback.effective_base_url() {
            resolver = resolver.with_fallback(
                ExternalFallback::new(http_client, base_url).with_timeout(config.fallback.timeout()),
            );
        }
        Ok(resolver)
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub async fn resolve(&self, key: &QueryKey) -> Resolution {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "resolve",
            %request_id,
            roll = key.roll(),
            regulation = key.regulation(),
            program = key.program()
        );
        self.resolve_in_span(key).instrument(span).await
    }

    async fn resolve_in_span(&self, key: &QueryKey) -> Resolution {
        // snapshot: a concurrent set_active does not affect this request
        let order = self.registry.dispatch_order();
        let targets = RaceTarget::from_registry(&self.registry, &order, self.source_timeout);
        let dispatched = dispatch(targets, key).await;

        if let Some((source, record)) = dispatched.winner {
            let winner = RaceTarget {
                id: source.clone(),
                client: self.registry.resolve(&source),
                timeout: self.registry.timeout_for(&source, self.enrichment_timeout),
            };
            let everyone = RaceTarget::from_registry(&self.registry, &order, self.enrichment_timeout);
            let enrichment = enrich(&winner, everyone, &record, key).await;
            debug!(
                grades = enrichment.grades.len(),
                cumulatives = enrichment.cumulatives.len(),
                cumulative_source = enrichment.cumulative_source.as_ref().map(|id| id.as_str()),
                "enrichment finished"
            );

            let result = normalize(RawResult::Backend(BackendRecord {
                source,
                record,
                institute: enrichment.institute,
                grades: enrichment.grades,
                cumulatives: enrichment.cumulatives,
            }));
            info!(provenance = %result.provenance, "record resolved");
            return Resolution::Found(result);
        }

        let escalation = match &self.fallback {
            Some(fallback) => fallback.query_external(key).await,
            None => Escalation {
                result: None,
                attempt: FallbackAttempt::skipped("no fallback configured"),
            },
        };

        if let Some(result) = escalation.result {
            info!(provenance = %result.provenance, "record resolved");
            return Resolution::Found(result);
        }

        info!(
            sources = dispatched.attempts.len(),
            fallback = %escalation.attempt.outcome,
            "record not found"
        );
        Resolution::NotFound(NotFoundReport {
            success: false,
            roll: key.roll().to_owned(),
            regulation: key.regulation().to_owned(),
            exam: key.program().to_owned(),
            message: format!(
                "no record for roll {} ({} / {}) after {} source(s) and the fallback",
                key.roll(),
                key.program(),
                key.regulation(),
                dispatched.attempts.len()
            ),
            attempts: dispatched.attempts,
            fallback: escalation.attempt,
        })
    }
}
