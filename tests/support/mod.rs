//! Shared fixtures for behavior tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gradefetch_core::{
    ExternalFallback, GradeRecord, HttpClient, HttpError, HttpRequest, HttpResponse,
    InstituteRecord, MemoryDataset, MemoryRecordStore, PrimaryRecord, QueryKey, RecordSource,
    Resolver, SourceConnector, SourceDescriptor, SourceError, SourceId, SourceRegistry,
};
use gradefetch_core::http_client::HttpFuture;
use serde_json::json;

pub const ROLL: &str = "654321";
pub const REGULATION: &str = "2022";
pub const PROGRAM: &str = "Diploma in Engineering";

pub fn id(value: &str) -> SourceId {
    SourceId::parse(value).expect("valid source id")
}

pub fn key() -> QueryKey {
    QueryKey::new(ROLL, REGULATION, PROGRAM).expect("valid key")
}

pub fn student() -> PrimaryRecord {
    PrimaryRecord::new(ROLL, PROGRAM, REGULATION).with_institute_code("10042")
}

pub fn institute() -> InstituteRecord {
    InstituteRecord {
        code: Some(String::from("10042")),
        name: Some(String::from("Dhaka Polytechnic Institute")),
        district: Some(String::from("Dhaka")),
    }
}

/// Dataset holding a matching student with institute and two semesters.
pub fn matching_dataset() -> MemoryDataset {
    MemoryDataset::default()
        .with_student(student())
        .with_institute(PROGRAM, REGULATION, institute())
        .with_grades(
            ROLL,
            vec![
                GradeRecord::new(1, Some(json!("3.25")))
                    .with_published_at("2023-07-01T10:00:00+06:00"),
                GradeRecord::new(2, Some(json!("ref")))
                    .with_reference_subjects(json!(["66631"])),
            ],
        )
}

pub fn matching_store(name: &str, latency: Duration) -> MemoryRecordStore {
    MemoryRecordStore::new(id(name), matching_dataset()).with_latency(latency)
}

pub fn empty_store(name: &str, latency: Duration) -> MemoryRecordStore {
    MemoryRecordStore::empty(id(name)).with_latency(latency)
}

/// Hands out pre-built stores by id. Clones share their query counters, so
/// tests can observe how many calls each store completed.
#[derive(Default)]
pub struct StaticConnector {
    stores: HashMap<SourceId, MemoryRecordStore>,
}

impl StaticConnector {
    pub fn new(stores: &[MemoryRecordStore]) -> Self {
        Self {
            stores: stores
                .iter()
                .map(|store| (store.id(), store.clone()))
                .collect(),
        }
    }
}

impl SourceConnector for StaticConnector {
    fn connect(&self, descriptor: &SourceDescriptor) -> Result<Arc<dyn RecordSource>, SourceError> {
        self.stores
            .get(&descriptor.id)
            .map(|store| Arc::new(store.clone()) as Arc<dyn RecordSource>)
            .ok_or_else(|| SourceError::unavailable(format!("no store for '{}'", descriptor.id)))
    }
}

/// Registry over `stores`, each with its own query timeout.
pub fn registry(stores: &[(MemoryRecordStore, Duration)]) -> SourceRegistry {
    let descriptors = stores
        .iter()
        .map(|(store, timeout)| SourceDescriptor::new(store.id(), "memory://").with_timeout(*timeout))
        .collect();
    let plain = stores.iter().map(|(store, _)| store.clone()).collect::<Vec<_>>();
    SourceRegistry::new(descriptors, None, Arc::new(StaticConnector::new(&plain)))
        .expect("valid registry")
}

pub fn resolver(stores: &[(MemoryRecordStore, Duration)]) -> Resolver {
    Resolver::new(Arc::new(registry(stores)))
        .with_source_timeout(Duration::from_secs(1))
        .with_enrichment_timeout(Duration::from_secs(1))
}

/// Canned external service.
pub struct StubFallbackClient {
    response: Result<HttpResponse, HttpError>,
    delay: Duration,
    requests: Mutex<Vec<HttpRequest>>,
    completed: AtomicUsize,
}

impl StubFallbackClient {
    pub fn responding(response: Result<HttpResponse, HttpError>) -> Self {
        Self {
            response,
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn json(body: serde_json::Value) -> Self {
        Self::responding(Ok(HttpResponse::ok_json(body.to_string())))
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .expect("request store should not be poisoned")
            .len()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl HttpClient for StubFallbackClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        self.requests
            .lock()
            .expect("request store should not be poisoned")
            .push(request);
        let response = self.response.clone();
        Box::pin(async move {
            tokio::time::sleep(self.delay).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            response
        })
    }
}

pub fn fallback(client: Arc<StubFallbackClient>, timeout: Duration) -> ExternalFallback {
    ExternalFallback::new(client, "https://results.example.test/api").with_timeout(timeout)
}
