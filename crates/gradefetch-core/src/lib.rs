//! # Gradefetch Core
//!
//! Multi-source resolution engine for student examination records.
//!
//! ## Overview
//!
//! A lookup key (roll number, regulation year, program) is raced across every
//! configured record source at once. The first source with an exact match
//! wins; its grades and institute are fetched from it, while the cumulative
//! averages are raced across all sources again. When no source matches, a
//! single external fallback service is queried. Whatever answers, the caller
//! receives one [`CanonicalResult`] shape, or a [`NotFoundReport`] naming
//! every attempt.
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`registry`] | Configured sources, memoized clients, current-source pointer |
//! | [`dispatch`] | Racing query dispatch with per-source timeouts |
//! | [`enrich`] | Grade, institute and cumulative lookups after a match |
//! | [`fallback`] | External fallback service and its payload shape |
//! | [`normalize`] | Mapping of raw shapes into [`CanonicalResult`] |
//! | [`resolver`] | Inbound entry point tying the above together |
//! | [`record_source`] | Record source trait and per-call error type |
//! | [`adapters`] | REST and in-memory record sources |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`config`] | TOML/JSON configuration |
//! | [`domain`] | Keys, backend rows, canonical output, timestamps |
//! | [`source`] | Source identifiers and descriptors |
//! | [`error`] | Core error types |
//!
//! ## Architecture
//!
//! ```text
//! QueryKey
//!    │
//!    ▼
//! ┌──────────────┐  miss   ┌───────────────────┐
//! │  Dispatcher  │────────▶│ External fallback │──┐
//! └──────┬───────┘         └───────────────────┘  │
//!        │ match                                   │
//!        ▼                                         │
//! ┌──────────────┐                                 │
//! │  Enrichment  │                                 │
//! └──────┬───────┘                                 │
//!        ▼                                         ▼
//! ┌──────────────────────────────────────────────────┐
//! │                   Normalizer                     │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use gradefetch_core::{DefaultConnector, QueryKey, ReqwestHttpClient, Resolver, ResolverConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ResolverConfig::load_default()?;
//!     let http = Arc::new(ReqwestHttpClient::new());
//!     let connector = Arc::new(DefaultConnector::new(http.clone(), config.source_timeout()));
//!     let resolver = Resolver::from_config(&config, connector, http)?;
//!
//!     let key = QueryKey::new("654321", "2022", "Diploma in Engineering")?;
//!     println!("{}", serde_json::to_string(&resolver.resolve(&key).await)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Security
//!
//! - Source credentials are redacted from `Debug` output and never logged
//! - HTTP requests use TLS via rustls

pub mod adapters;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod enrich;
pub mod error;
pub mod fallback;
pub mod http_client;
pub mod normalize;
pub mod record_source;
pub mod registry;
pub mod resolver;
pub mod source;

pub use adapters::{DefaultConnector, MemoryDataset, MemoryRecordStore, RestRecordStore};
pub use config::{FallbackConfig, ResolverConfig, SourceConfig};
pub use dispatch::{AttemptOutcome, RaceOutcome, RaceTarget, SourceAttempt};
pub use domain::{
    CanonicalResult, CumulativeEntry, CumulativeRecord, GradeRecord, InstituteData,
    InstituteRecord, PrimaryRecord, Provenance, QueryKey, SemesterResult, UtcDateTime,
    MAX_CUMULATIVE_ENTRIES, REFERENCE_MARKER,
};
pub use enrich::Enrichment;
pub use error::{ConfigError, CoreError, RegistryError, ValidationError};
pub use fallback::{ExternalFallback, ExternalPayload, FallbackAttempt};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpErrorKind, HttpRequest, HttpResponse, ReqwestHttpClient,
};
pub use normalize::{normalize, normalize_canonical, BackendRecord, RawResult};
pub use record_source::{
    InstituteQuery, RecordSource, SourceConnector, SourceError, SourceErrorKind,
};
pub use registry::SourceRegistry;
pub use resolver::{NotFoundReport, Resolution, Resolver};
pub use source::{SourceDescriptor, SourceId};
