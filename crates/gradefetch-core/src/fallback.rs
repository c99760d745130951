//! External fallback service, queried only when every configured source
//! missed.
//!
//! The external payload has its own schema. Grades arrive either as a bare
//! value or as an object carrying the value and a list of referred subjects,
//! semesters may be missing, and a referred outcome is signalled either by
//! the `ref` marker or by a `failed` flag. [`ExternalPayload`] absorbs that
//! variance at deserialization time so the normalizer sees one typed shape.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::dispatch::{duration_ms, AttemptOutcome};
use crate::domain::{
    lenient_flag, lenient_semester, lenient_timestamp, optional_flag, optional_text,
};
use crate::http_client::{HttpClient, HttpRequest};
use crate::normalize::{normalize, RawResult};
use crate::{CanonicalResult, CumulativeRecord, InstituteRecord, QueryKey};

/// Default bound on the fallback call.
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(8);

/// External grade field: either the value itself or an object wrapping it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExternalGrade {
    Nested {
        #[serde(default, alias = "result", alias = "grade")]
        gpa: Option<Value>,
        #[serde(default, alias = "refSubjects", alias = "reference_subjects")]
        ref_subjects: Value,
    },
    Bare(Value),
}

impl Default for ExternalGrade {
    fn default() -> Self {
        Self::Bare(Value::Null)
    }
}

/// One semester entry of the external payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSemester {
    #[serde(default = "first_semester", deserialize_with = "semester_number")]
    pub semester: u32,
    #[serde(default, alias = "gpa", alias = "grade")]
    pub result: ExternalGrade,
    /// Reference subjects given next to, rather than inside, the grade.
    #[serde(default, alias = "ref_subjects", alias = "refSubjects")]
    pub reference_subjects: Value,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub failed: bool,
    #[serde(
        default,
        alias = "published_at",
        alias = "created_at",
        deserialize_with = "lenient_timestamp"
    )]
    pub published_at: Option<String>,
}

impl Default for ExternalSemester {
    fn default() -> Self {
        Self {
            semester: first_semester(),
            result: ExternalGrade::default(),
            reference_subjects: Value::Null,
            failed: false,
            published_at: None,
        }
    }
}

/// Body returned by the external service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalPayload {
    #[serde(default, deserialize_with = "optional_flag")]
    pub success: Option<bool>,
    #[serde(default)]
    pub roll: Option<Value>,
    #[serde(default)]
    pub regulation: Option<Value>,
    #[serde(default, alias = "program", deserialize_with = "optional_text")]
    pub exam: Option<String>,
    #[serde(
        default,
        alias = "institute",
        alias = "institute_data",
        deserialize_with = "lenient_entry"
    )]
    pub institute_data: Option<InstituteRecord>,
    #[serde(default, alias = "results", alias = "result_data", deserialize_with = "lenient_list")]
    pub result_data: Vec<ExternalSemester>,
    #[serde(default, alias = "cgpa", alias = "cgpa_data", deserialize_with = "lenient_list")]
    pub cgpa_data: Vec<CumulativeRecord>,
}

impl ExternalPayload {
    /// A payload that carries no record data at all.
    pub fn is_empty(&self) -> bool {
        self.institute_data.is_none() && self.result_data.is_empty() && self.cgpa_data.is_empty()
    }
}

/// How the fallback call ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackAttempt {
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl FallbackAttempt {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            outcome: AttemptOutcome::Skipped,
            latency_ms: 0,
            detail: Some(reason.into()),
        }
    }

    fn finished(outcome: AttemptOutcome, started: Instant, detail: Option<String>) -> Self {
        Self {
            outcome,
            latency_ms: duration_ms(started.elapsed()),
            detail,
        }
    }
}

/// Result of escalating one key.
#[derive(Debug, Clone)]
pub struct Escalation {
    pub result: Option<CanonicalResult>,
    pub attempt: FallbackAttempt,
}

/// Client for the external service. Independent of the source registry.
#[derive(Clone)]
pub struct ExternalFallback {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    timeout: Duration,
}

impl ExternalFallback {
    pub fn new(http_client: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            timeout: DEFAULT_FALLBACK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `GET {base_url}/{roll}?program=..&regulation=..`.
    pub fn request_for(&self, key: &QueryKey) -> HttpRequest {
        HttpRequest::get(format!(
            "{}/{}",
            self.base_url,
            urlencoding::encode(key.roll())
        ))
        .with_query("program", key.program())
        .with_query("regulation", key.regulation())
        .with_header("accept", "application/json")
        .with_timeout(self.timeout)
    }

    /// Queries the external service. Every failure becomes a miss; this
    /// never returns an error.
    pub async fn query_external(&self, key: &QueryKey) -> Escalation {
        let started = Instant::now();
        let call = self.http_client.execute(self.request_for(key));

        let response = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => {
                return miss(AttemptOutcome::Timeout, started, "deadline elapsed");
            }
            Ok(Err(error)) => {
                return miss(AttemptOutcome::Unavailable, started, error.to_string());
            }
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            return miss(
                AttemptOutcome::Unavailable,
                started,
                format!("fallback returned status {}", response.status),
            );
        }

        let payload = match parse_payload(&response.body) {
            Ok(payload) => payload,
            Err(detail) => return miss(AttemptOutcome::Unavailable, started, detail),
        };

        if payload.success == Some(false) || payload.is_empty() {
            return miss(AttemptOutcome::Miss, started, "fallback has no record");
        }

        debug!(latency_ms = duration_ms(started.elapsed()), "fallback matched");
        Escalation {
            result: Some(normalize(RawResult::External {
                key: key.clone(),
                payload,
            })),
            attempt: FallbackAttempt::finished(AttemptOutcome::Matched, started, None),
        }
    }
}

fn miss(outcome: AttemptOutcome, started: Instant, detail: impl Into<String>) -> Escalation {
    let attempt = FallbackAttempt::finished(outcome, started, Some(detail.into()));
    debug!(
        outcome = %attempt.outcome,
        latency_ms = attempt.latency_ms,
        "fallback missed"
    );
    Escalation {
        result: None,
        attempt,
    }
}

fn parse_payload(body: &str) -> Result<ExternalPayload, String> {
    if body.trim().is_empty() {
        return Err(String::from("fallback returned an empty body"));
    }
    match serde_json::from_str::<Option<ExternalPayload>>(body) {
        Ok(Some(payload)) => Ok(payload),
        Ok(None) => Ok(ExternalPayload::default()),
        Err(error) => Err(format!("fallback payload is undecodable: {error}")),
    }
}

const fn first_semester() -> u32 {
    1
}

fn semester_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_semester(deserializer)?.unwrap_or_else(first_semester))
}

fn lenient_entry<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .and_then(|value| serde_json::from_value(value).ok()))
}

/// Decodes a list entry by entry. Entries that do not fit `T` are dropped,
/// and anything other than an array reads as empty.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Some(Value::Array(items)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpError, HttpFuture, HttpResponse};
    use crate::Provenance;
    use serde_json::json;
    use std::sync::Mutex;

    struct StubHttpClient {
        response: Result<HttpResponse, HttpError>,
        delay: Duration,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl StubHttpClient {
        fn new(response: Result<HttpResponse, HttpError>) -> Self {
            Self {
                response,
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    impl HttpClient for StubHttpClient {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self.response.clone();
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                response
            })
        }
    }

    fn key() -> QueryKey {
        QueryKey::new("654321", "2022", "Diploma in Engineering").expect("valid key")
    }

    fn fallback(client: StubHttpClient) -> ExternalFallback {
        ExternalFallback::new(Arc::new(client), "https://results.example.test/api/")
            .with_timeout(Duration::from_secs(2))
    }

    #[test]
    fn request_carries_roll_in_path_and_key_as_query() {
        let fallback = fallback(StubHttpClient::new(Ok(HttpResponse::ok_json("{}"))));
        let url = fallback.request_for(&key()).full_url();
        assert!(url.starts_with("https://results.example.test/api/654321?"));
        assert!(url.contains("program=Diploma%20in%20Engineering"));
        assert!(url.contains("regulation=2022"));
    }

    #[test]
    fn payload_absorbs_grade_shape_variance() {
        let payload: ExternalPayload = serde_json::from_value(json!({
            "success": true,
            "resultData": [
                { "semester": 1, "result": "3.50" },
                { "semester": "2", "result": { "gpa": "ref", "ref_subjects": ["66631"] } },
                { "result": 3.1, "failed": true }
            ]
        }))
        .expect("valid payload");

        assert_eq!(payload.result_data[0].result, ExternalGrade::Bare(json!("3.50")));
        assert_eq!(payload.result_data[1].semester, 2);
        assert!(matches!(
            payload.result_data[1].result,
            ExternalGrade::Nested { .. }
        ));
        assert_eq!(payload.result_data[2].semester, 1);
        assert!(payload.result_data[2].failed);
    }

    #[test]
    fn off_type_fields_fall_back_to_defaults_instead_of_rejecting_the_payload() {
        let payload: ExternalPayload = serde_json::from_value(json!({
            "success": "true",
            "exam": 42,
            "instituteData": "unavailable",
            "resultData": [
                { "semester": "2", "result": 3.1, "publishedAt": 1700000000, "failed": "no" },
                { "semester": [3], "result": "ref", "failed": 1, "publishedAt": { "at": "x" } },
                "not a semester"
            ],
            "cgpaData": { "cgpa": 3.2 }
        }))
        .expect("off-type fields are absorbed");

        assert_eq!(payload.success, Some(true));
        assert_eq!(payload.exam.as_deref(), Some("42"));
        assert!(payload.institute_data.is_none());
        assert_eq!(payload.result_data.len(), 2);

        let first = &payload.result_data[0];
        assert_eq!(first.semester, 2);
        assert!(!first.failed);
        assert_eq!(first.published_at.as_deref(), Some("2023-11-14T22:13:20Z"));

        let second = &payload.result_data[1];
        assert_eq!(second.semester, 1);
        assert!(second.failed);
        assert!(second.published_at.is_none());
        assert!(payload.cgpa_data.is_empty());
    }

    #[tokio::test]
    async fn numeric_publication_time_does_not_turn_a_match_into_a_miss() {
        let body = json!({
            "success": true,
            "resultData": [ { "semester": 1, "result": 3.5, "publishedAt": 1700000000 } ]
        });
        let escalation = fallback(StubHttpClient::new(Ok(HttpResponse::ok_json(
            body.to_string(),
        ))))
        .query_external(&key())
        .await;

        assert_eq!(escalation.attempt.outcome, AttemptOutcome::Matched);
        let result = escalation.result.expect("fallback matched");
        assert_eq!(
            result.result_data[0].published_at,
            crate::UtcDateTime::parse("2023-11-14T22:13:20Z").expect("valid")
        );
    }

    #[tokio::test]
    async fn valid_payload_is_normalized_with_fallback_provenance() {
        let body = json!({
            "success": true,
            "instituteData": { "code": "10042", "name": "Dhaka Polytechnic Institute", "district": "Dhaka" },
            "resultData": [ { "semester": 1, "result": 3.5 } ],
            "cgpaData": null
        });
        let escalation = fallback(StubHttpClient::new(Ok(HttpResponse::ok_json(
            body.to_string(),
        ))))
        .query_external(&key())
        .await;

        let result = escalation.result.expect("fallback matched");
        assert_eq!(result.provenance, Provenance::Fallback);
        assert_eq!(result.result_data[0].result, "3.50");
        assert!(result.cgpa_data.is_empty());
        assert_eq!(escalation.attempt.outcome, AttemptOutcome::Matched);
    }

    #[tokio::test]
    async fn unsuccessful_or_empty_payloads_are_misses() {
        for body in [r#"{"success":false,"resultData":[{"result":"3.00"}]}"#, "{}", "null"] {
            let escalation = fallback(StubHttpClient::new(Ok(HttpResponse::ok_json(body))))
                .query_external(&key())
                .await;
            assert!(escalation.result.is_none(), "body {body} should miss");
            assert_eq!(escalation.attempt.outcome, AttemptOutcome::Miss);
        }
    }

    #[tokio::test]
    async fn transport_failures_never_escape() {
        let cases = [
            Ok(HttpResponse::with_status(503, "maintenance")),
            Ok(HttpResponse::ok_json("<html></html>")),
            Err(HttpError::new(
                crate::http_client::HttpErrorKind::Connect,
                "connection refused",
            )),
        ];
        for response in cases {
            let escalation = fallback(StubHttpClient::new(response)).query_external(&key()).await;
            assert!(escalation.result.is_none());
            assert_eq!(escalation.attempt.outcome, AttemptOutcome::Unavailable);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_service_times_out() {
        let escalation = fallback(
            StubHttpClient::new(Ok(HttpResponse::ok_json("{}"))).delayed(Duration::from_secs(60)),
        )
        .query_external(&key())
        .await;

        assert!(escalation.result.is_none());
        assert_eq!(escalation.attempt.outcome, AttemptOutcome::Timeout);
        assert!(escalation.attempt.latency_ms >= 2_000);
    }
}
