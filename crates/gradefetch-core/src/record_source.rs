//! Record source trait and per-call error type.
//!
//! Every configured backend implements [`RecordSource`], whatever its wire
//! protocol. The dispatcher, the enrichment aggregator, and the registry only
//! ever see this trait.
//!
//! | Operation | Returns | Notes |
//! |-----------|---------|-------|
//! | [`find_primary`](RecordSource::find_primary) | `Option<PrimaryRecord>` | exact match on all key fields |
//! | [`find_institute`](RecordSource::find_institute) | `Option<InstituteRecord>` | |
//! | [`list_grades`](RecordSource::list_grades) | `Vec<GradeRecord>` | semester ascending |
//! | [`list_cumulatives`](RecordSource::list_cumulatives) | `Vec<CumulativeRecord>` | at most `limit` rows |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::{
    CumulativeRecord, GradeRecord, InstituteRecord, PrimaryRecord, QueryKey, SourceDescriptor,
    SourceId,
};

/// Per-call failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Unavailable,
    Timeout,
    InvalidResponse,
    Internal,
}

/// Structured failure of a single source call. Never propagated past the
/// dispatcher, aggregator, or escalator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
}

impl SourceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Unavailable,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Timeout,
            message: message.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::InvalidResponse,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Internal,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Unavailable => "source.unavailable",
            SourceErrorKind::Timeout => "source.timeout",
            SourceErrorKind::InvalidResponse => "source.invalid_response",
            SourceErrorKind::Internal => "source.internal",
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Institute lookup parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstituteQuery {
    pub program: String,
    pub regulation: String,
    pub code: String,
}

impl InstituteQuery {
    pub fn for_key(key: &QueryKey, code: impl Into<String>) -> Self {
        Self {
            program: key.program().to_owned(),
            regulation: key.regulation().to_owned(),
            code: code.into(),
        }
    }
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Uniform query interface over one backend.
///
/// Implementations must be `Send + Sync`: one client is shared by every
/// concurrent resolution for the lifetime of the process.
pub trait RecordSource: Send + Sync {
    fn id(&self) -> SourceId;

    /// Returns the single record matching all three key fields, if any.
    fn find_primary<'a>(&'a self, key: QueryKey) -> SourceFuture<'a, Option<PrimaryRecord>>;

    fn find_institute<'a>(
        &'a self,
        query: InstituteQuery,
    ) -> SourceFuture<'a, Option<InstituteRecord>>;

    fn list_grades<'a>(&'a self, roll: String) -> SourceFuture<'a, Vec<GradeRecord>>;

    fn list_cumulatives<'a>(
        &'a self,
        roll: String,
        limit: usize,
    ) -> SourceFuture<'a, Vec<CumulativeRecord>>;
}

/// Builds a live client for a descriptor.
///
/// Called lazily by the registry on first use. A construction error is
/// reported as an unavailable source at query time, never at load time.
pub trait SourceConnector: Send + Sync {
    fn connect(&self, descriptor: &SourceDescriptor) -> Result<Arc<dyn RecordSource>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(SourceError::unavailable("down").code(), "source.unavailable");
        assert_eq!(SourceError::timeout("slow").code(), "source.timeout");
        assert_eq!(
            SourceError::invalid_response("garbled").code(),
            "source.invalid_response"
        );
    }

    #[test]
    fn institute_query_copies_key_fields() {
        let key = QueryKey::new("654321", "2022", "Diploma in Engineering").expect("valid");
        let query = InstituteQuery::for_key(&key, "10042");
        assert_eq!(query.program, "Diploma in Engineering");
        assert_eq!(query.regulation, "2022");
        assert_eq!(query.code, "10042");
    }
}
