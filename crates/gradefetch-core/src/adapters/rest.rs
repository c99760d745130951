use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::domain::MAX_CUMULATIVE_ENTRIES;
use crate::http_client::{HttpAuth, HttpClient, HttpErrorKind, HttpRequest};
use crate::record_source::{InstituteQuery, RecordSource, SourceError, SourceFuture};
use crate::{CumulativeRecord, GradeRecord, InstituteRecord, PrimaryRecord, QueryKey, SourceId};

const STUDENTS_TABLE: &str = "students";
const INSTITUTES_TABLE: &str = "institutes";
const GRADES_TABLE: &str = "grade_records";
const CUMULATIVES_TABLE: &str = "cumulative_records";

/// JSON-over-HTTP record store exposing one table per record type with
/// `column=eq.value` filters.
#[derive(Clone)]
pub struct RestRecordStore {
    id: SourceId,
    base_url: String,
    auth: HttpAuth,
    timeout: Duration,
    http_client: Arc<dyn HttpClient>,
}

impl RestRecordStore {
    pub fn new(
        id: SourceId,
        base_url: impl Into<String>,
        auth: HttpAuth,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            id,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            auth,
            timeout: Duration::from_secs(4),
            http_client,
        }
    }

    /// Transport-level timeout. The racing layer applies its own bound; this
    /// one keeps connections from outliving an abandoned call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn table_request(&self, table: &str) -> HttpRequest {
        HttpRequest::get(format!("{}/rest/v1/{table}", self.base_url))
            .with_query("select", "*")
            .with_header("accept", "application/json")
            .with_auth(&self.auth)
            .with_timeout(self.timeout)
    }

    async fn fetch_rows<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
    ) -> Result<Vec<T>, SourceError> {
        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(|error| match error.kind() {
                HttpErrorKind::Timeout => {
                    SourceError::timeout(format!("{} transport timeout: {}", self.id, error))
                }
                HttpErrorKind::Connect | HttpErrorKind::Other => {
                    SourceError::unavailable(format!("{} transport error: {}", self.id, error))
                }
            })?;

        if !response.is_success() {
            return Err(SourceError::unavailable(format!(
                "{} upstream returned status {}",
                self.id, response.status
            )));
        }

        serde_json::from_str(&response.body).map_err(|error| {
            SourceError::invalid_response(format!("{} returned undecodable rows: {error}", self.id))
        })
    }
}

impl RecordSource for RestRecordStore {
    fn id(&self) -> SourceId {
        self.id.clone()
    }

    fn find_primary<'a>(&'a self, key: QueryKey) -> SourceFuture<'a, Option<PrimaryRecord>> {
        Box::pin(async move {
            let request = self
                .table_request(STUDENTS_TABLE)
                .with_query("program", format!("eq.{}", key.program()))
                .with_query("regulation", format!("eq.{}", key.regulation()))
                .with_query("roll", format!("eq.{}", key.roll()))
                .with_query("limit", "1");

            let rows: Vec<PrimaryRecord> = self.fetch_rows(request).await?;
            Ok(rows.into_iter().next())
        })
    }

    fn find_institute<'a>(
        &'a self,
        query: InstituteQuery,
    ) -> SourceFuture<'a, Option<InstituteRecord>> {
        Box::pin(async move {
            let request = self
                .table_request(INSTITUTES_TABLE)
                .with_query("program", format!("eq.{}", query.program))
                .with_query("regulation", format!("eq.{}", query.regulation))
                .with_query("code", format!("eq.{}", query.code))
                .with_query("limit", "1");

            let rows: Vec<InstituteRecord> = self.fetch_rows(request).await?;
            Ok(rows.into_iter().next())
        })
    }

    fn list_grades<'a>(&'a self, roll: String) -> SourceFuture<'a, Vec<GradeRecord>> {
        Box::pin(async move {
            let request = self
                .table_request(GRADES_TABLE)
                .with_query("roll", format!("eq.{roll}"))
                .with_query("order", "semester.asc");

            self.fetch_rows(request).await
        })
    }

    fn list_cumulatives<'a>(
        &'a self,
        roll: String,
        limit: usize,
    ) -> SourceFuture<'a, Vec<CumulativeRecord>> {
        Box::pin(async move {
            let limit = limit.min(MAX_CUMULATIVE_ENTRIES);
            let request = self
                .table_request(CUMULATIVES_TABLE)
                .with_query("roll", format!("eq.{roll}"))
                .with_query("order", "created_at.desc")
                .with_query("limit", limit.to_string());

            let mut rows: Vec<CumulativeRecord> = self.fetch_rows(request).await?;
            rows.truncate(limit);
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::{HttpError, HttpFuture, HttpResponse};
    use crate::SourceErrorKind;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct RecordingHttpClient {
        response: Result<HttpResponse, HttpError>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl RecordingHttpClient {
        fn responding(response: Result<HttpResponse, HttpError>) -> Self {
            Self {
                response,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn recorded_requests(&self) -> Vec<HttpRequest> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .clone()
        }
    }

    impl HttpClient for RecordingHttpClient {
        fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
            self.requests
                .lock()
                .expect("request store should not be poisoned")
                .push(request);
            let response = self.response.clone();
            Box::pin(async move { response })
        }
    }

    fn store(client: Arc<RecordingHttpClient>) -> RestRecordStore {
        RestRecordStore::new(
            SourceId::parse("primary").expect("valid id"),
            "https://db.example.test/",
            HttpAuth::ApiKey(String::from("anon-key")),
            client,
        )
    }

    fn key() -> QueryKey {
        QueryKey::new("654321", "2022", "Diploma in Engineering").expect("valid key")
    }

    #[tokio::test]
    async fn primary_lookup_filters_on_all_key_fields() {
        let client = Arc::new(RecordingHttpClient::responding(Ok(HttpResponse::ok_json(
            r#"[{"roll":"654321","program":"Diploma in Engineering","regulation":"2022","institute_code":"10042"}]"#,
        ))));

        let record = store(client.clone())
            .find_primary(key())
            .await
            .expect("lookup should succeed")
            .expect("record should be present");
        assert_eq!(record.institute_code.as_deref(), Some("10042"));

        let requests = client.recorded_requests();
        assert_eq!(requests.len(), 1);
        let url = requests[0].full_url();
        assert!(url.starts_with("https://db.example.test/rest/v1/students?"));
        assert!(url.contains("roll=eq.654321"));
        assert!(url.contains("regulation=eq.2022"));
        assert!(url.contains("program=eq.Diploma%20in%20Engineering"));
        assert!(url.contains("limit=1"));
        assert_eq!(
            requests[0].headers.get("apikey").map(String::as_str),
            Some("anon-key")
        );
    }

    #[tokio::test]
    async fn empty_row_set_is_a_miss_not_an_error() {
        let client = Arc::new(RecordingHttpClient::responding(Ok(HttpResponse::ok_json("[]"))));
        let record = store(client).find_primary(key()).await.expect("lookup ok");
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn rejected_credential_maps_to_unavailable() {
        let client = Arc::new(RecordingHttpClient::responding(Ok(HttpResponse::with_status(
            401,
            r#"{"message":"invalid api key"}"#,
        ))));

        let error = store(client).find_primary(key()).await.expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert!(error.message().contains("401"));
    }

    #[tokio::test]
    async fn transport_timeout_maps_to_timeout_kind() {
        let client = Arc::new(RecordingHttpClient::responding(Err(HttpError::timeout(
            "deadline elapsed",
        ))));

        let error = store(client)
            .list_grades(String::from("654321"))
            .await
            .expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::Timeout);
    }

    #[tokio::test]
    async fn undecodable_body_maps_to_invalid_response() {
        let client = Arc::new(RecordingHttpClient::responding(Ok(HttpResponse::ok_json(
            "<html>maintenance</html>",
        ))));

        let error = store(client)
            .list_grades(String::from("654321"))
            .await
            .expect_err("must fail");
        assert_eq!(error.kind(), SourceErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn cumulative_request_is_capped_at_twenty_rows() {
        let client = Arc::new(RecordingHttpClient::responding(Ok(HttpResponse::ok_json("[]"))));
        let rows = store(client.clone())
            .list_cumulatives(String::from("654321"), 100)
            .await
            .expect("lookup ok");
        assert!(rows.is_empty());

        let url = client.recorded_requests()[0].full_url();
        assert!(url.contains("/rest/v1/cumulative_records?"));
        assert!(url.contains("limit=20"));
    }
}
