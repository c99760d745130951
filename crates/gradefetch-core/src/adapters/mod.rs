//! Concrete record sources and the default connector that picks one per
//! descriptor endpoint.
//!
//! | Endpoint scheme | Adapter |
//! |-----------------|---------|
//! | `http://`, `https://` | [`RestRecordStore`] |
//! | `file://<path>.json` | [`MemoryRecordStore`] loaded from a fixture |
//! | `memory://` | empty [`MemoryRecordStore`] |

mod memory;
mod rest;

pub use memory::{InstituteRow, MemoryDataset, MemoryRecordStore};
pub use rest::RestRecordStore;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;

use crate::http_client::{HttpAuth, HttpClient, ReqwestHttpClient};
use crate::record_source::{RecordSource, SourceConnector, SourceError};
use crate::SourceDescriptor;

/// Builds adapters from descriptors. Validation happens here, lazily, so a
/// misconfigured source only fails the queries routed to it.
#[derive(Clone)]
pub struct DefaultConnector {
    http_client: Arc<dyn HttpClient>,
    default_timeout: Duration,
}

impl DefaultConnector {
    pub fn new(http_client: Arc<dyn HttpClient>, default_timeout: Duration) -> Self {
        Self {
            http_client,
            default_timeout,
        }
    }
}

impl Default for DefaultConnector {
    fn default() -> Self {
        Self::new(Arc::new(ReqwestHttpClient::new()), Duration::from_secs(4))
    }
}

impl SourceConnector for DefaultConnector {
    fn connect(&self, descriptor: &SourceDescriptor) -> Result<Arc<dyn RecordSource>, SourceError> {
        let endpoint = descriptor.endpoint.trim();

        if endpoint == "memory://" {
            return Ok(Arc::new(MemoryRecordStore::empty(descriptor.id.clone())));
        }

        if let Some(path) = endpoint.strip_prefix("file://") {
            let dataset = MemoryDataset::from_json_file(Path::new(path))?;
            return Ok(Arc::new(MemoryRecordStore::new(
                descriptor.id.clone(),
                dataset,
            )));
        }

        let url = Url::parse(endpoint).map_err(|error| {
            SourceError::unavailable(format!(
                "source '{}' has a malformed endpoint: {error}",
                descriptor.id
            ))
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(SourceError::unavailable(format!(
                    "source '{}' uses unsupported scheme '{other}'",
                    descriptor.id
                )))
            }
        }

        if descriptor.credential.trim().is_empty() {
            return Err(SourceError::unavailable(format!(
                "source '{}' has no credential configured",
                descriptor.id
            )));
        }

        let store = RestRecordStore::new(
            descriptor.id.clone(),
            url.as_str(),
            HttpAuth::ApiKey(descriptor.credential.clone()),
            Arc::clone(&self.http_client),
        )
        .with_timeout(descriptor.timeout_or(self.default_timeout));

        Ok(Arc::new(store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SourceErrorKind, SourceId};
    use std::io::Write;

    fn descriptor(endpoint: &str) -> SourceDescriptor {
        SourceDescriptor::new(SourceId::parse("main").expect("valid id"), endpoint)
    }

    #[test]
    fn malformed_endpoint_is_reported_as_unavailable() {
        let error = DefaultConnector::default()
            .connect(&descriptor("not a url").with_credential("key"))
            .err()
            .expect("must fail");
        assert_eq!(error.kind(), SourceErrorKind::Unavailable);
        assert!(error.message().contains("malformed endpoint"));
    }

    #[test]
    fn http_source_without_credential_is_unavailable() {
        let error = DefaultConnector::default()
            .connect(&descriptor("https://db.example.test"))
            .err()
            .expect("must fail");
        assert!(error.message().contains("no credential"));
    }

    #[test]
    fn unsupported_scheme_is_unavailable() {
        let error = DefaultConnector::default()
            .connect(&descriptor("ftp://db.example.test").with_credential("key"))
            .err()
            .expect("must fail");
        assert!(error.message().contains("unsupported scheme"));
    }

    #[test]
    fn file_endpoint_loads_fixture_dataset() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{"students":[{{"roll":"654321","program":"Diploma in Engineering","regulation":"2022"}}]}}"#
        )
        .expect("write fixture");

        let endpoint = format!("file://{}", file.path().display());
        let source = DefaultConnector::default()
            .connect(&descriptor(&endpoint))
            .expect("fixture should load");
        assert_eq!(source.id().as_str(), "main");
    }

    #[test]
    fn https_source_with_credential_connects() {
        let source = DefaultConnector::default()
            .connect(&descriptor("https://db.example.test").with_credential("anon-key"))
            .expect("should connect");
        assert_eq!(source.id().as_str(), "main");
    }
}
