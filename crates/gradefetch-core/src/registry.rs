use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, warn};

use crate::record_source::{RecordSource, SourceConnector};
use crate::{RegistryError, SourceDescriptor, SourceId};

struct CachedClient {
    fingerprint: (String, String),
    client: Arc<dyn RecordSource>,
}

/// Process-wide set of configured sources and their memoized clients.
///
/// Reads take shared locks and never await while holding them. The current
/// source pointer and the client cache are the only state written after
/// construction.
pub struct SourceRegistry {
    descriptors: RwLock<Vec<SourceDescriptor>>,
    search_order: Vec<SourceId>,
    current: RwLock<Option<SourceId>>,
    clients: RwLock<HashMap<SourceId, CachedClient>>,
    connector: Arc<dyn SourceConnector>,
}

impl SourceRegistry {
    /// Builds a registry. When `search_order` is given it must reference only
    /// configured ids and becomes the authoritative order; otherwise the
    /// descriptor order is used.
    pub fn new(
        descriptors: Vec<SourceDescriptor>,
        search_order: Option<Vec<SourceId>>,
        connector: Arc<dyn SourceConnector>,
    ) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for descriptor in &descriptors {
            if !seen.insert(descriptor.id.clone()) {
                return Err(RegistryError::DuplicateSource {
                    id: descriptor.id.to_string(),
                });
            }
        }

        let search_order = match search_order {
            Some(order) => {
                for id in &order {
                    if !seen.contains(id) {
                        return Err(RegistryError::UnknownSearchOrderEntry { id: id.to_string() });
                    }
                }
                dedupe_order(&order)
            }
            None => descriptors.iter().map(|d| d.id.clone()).collect(),
        };

        Ok(Self {
            descriptors: RwLock::new(descriptors),
            search_order,
            current: RwLock::new(None),
            clients: RwLock::new(HashMap::new()),
            connector,
        })
    }

    /// Descriptors in search order. Ids configured but left out of an explicit
    /// search order are listed after it.
    pub fn list_sources(&self) -> Vec<SourceDescriptor> {
        let descriptors = self.read_descriptors();
        let mut listed = Vec::with_capacity(descriptors.len());
        for id in &self.search_order {
            if let Some(descriptor) = descriptors.iter().find(|d| &d.id == id) {
                listed.push(descriptor.clone());
            }
        }
        for descriptor in descriptors.iter() {
            if !self.search_order.contains(&descriptor.id) {
                listed.push(descriptor.clone());
            }
        }
        listed
    }

    pub fn descriptor(&self, id: &SourceId) -> Result<SourceDescriptor, RegistryError> {
        self.read_descriptors()
            .iter()
            .find(|d| &d.id == id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownSource { id: id.to_string() })
    }

    pub fn current_source(&self) -> Option<SourceId> {
        self.current
            .read()
            .expect("registry current-source lock is not poisoned")
            .clone()
    }

    /// Makes `id` the current source and marks it active. Queries already in
    /// flight keep the order they were issued with.
    pub fn set_active(&self, id: &SourceId) -> Result<(), RegistryError> {
        {
            let mut descriptors = self
                .descriptors
                .write()
                .expect("registry descriptor lock is not poisoned");
            let descriptor = descriptors
                .iter_mut()
                .find(|d| &d.id == id)
                .ok_or_else(|| RegistryError::UnknownSource { id: id.to_string() })?;
            descriptor.active = true;
        }

        *self
            .current
            .write()
            .expect("registry current-source lock is not poisoned") = Some(id.clone());
        debug!(source = %id, "current source switched");
        Ok(())
    }

    /// Rotates a credential. The memoized client is rebuilt on next use.
    pub fn update_credential(
        &self,
        id: &SourceId,
        credential: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let mut descriptors = self
            .descriptors
            .write()
            .expect("registry descriptor lock is not poisoned");
        let descriptor = descriptors
            .iter_mut()
            .find(|d| &d.id == id)
            .ok_or_else(|| RegistryError::UnknownSource { id: id.to_string() })?;
        descriptor.credential = credential.into();
        Ok(())
    }

    /// Active sources in the order queries are issued: the current source
    /// first, then the search order.
    pub fn dispatch_order(&self) -> Vec<SourceId> {
        let current = self.current_source();
        let active = self
            .list_sources()
            .into_iter()
            .filter(|d| d.active)
            .map(|d| d.id)
            .collect::<Vec<_>>();

        let mut order = Vec::with_capacity(active.len());
        if let Some(current) = current {
            if active.contains(&current) {
                order.push(current);
            }
        }
        for id in active {
            if !order.contains(&id) {
                order.push(id);
            }
        }
        order
    }

    /// Effective per-source timeout.
    pub fn timeout_for(&self, id: &SourceId, default: Duration) -> Duration {
        self.read_descriptors()
            .iter()
            .find(|d| &d.id == id)
            .map(|d| d.timeout_or(default))
            .unwrap_or(default)
    }

    /// Returns the memoized client for `id`, constructing it on first use.
    ///
    /// Construction runs without holding the cache lock, so a connector may
    /// itself consult the registry. When two callers race to construct the
    /// same client, the first one cached is kept and returned to both.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::UnknownSource`] when `id` is not configured
    /// - [`RegistryError::Unavailable`] when the client cannot be constructed
    pub fn resolve(&self, id: &SourceId) -> Result<Arc<dyn RecordSource>, RegistryError> {
        let descriptor = self.descriptor(id)?;
        let fingerprint = descriptor.connection_fingerprint();

        if let Some(cached) = self
            .clients
            .read()
            .expect("registry client cache lock is not poisoned")
            .get(id)
        {
            if cached.fingerprint == fingerprint {
                return Ok(Arc::clone(&cached.client));
            }
        }

        let client = self.connector.connect(&descriptor).map_err(|error| {
            warn!(source = %id, error = %error, "source client construction failed");
            RegistryError::Unavailable {
                id: id.to_string(),
                message: error.message().to_owned(),
            }
        })?;

        let mut clients = self
            .clients
            .write()
            .expect("registry client cache lock is not poisoned");
        if let Some(cached) = clients.get(id) {
            if cached.fingerprint == fingerprint {
                return Ok(Arc::clone(&cached.client));
            }
        }

        debug!(source = %id, "source client constructed");
        clients.insert(
            id.clone(),
            CachedClient {
                fingerprint,
                client: Arc::clone(&client),
            },
        );
        Ok(client)
    }

    fn read_descriptors(&self) -> std::sync::RwLockReadGuard<'_, Vec<SourceDescriptor>> {
        self.descriptors
            .read()
            .expect("registry descriptor lock is not poisoned")
    }
}

fn dedupe_order(order: &[SourceId]) -> Vec<SourceId> {
    let mut seen = HashSet::new();
    let mut output = Vec::with_capacity(order.len());

    for id in order {
        if seen.insert(id.clone()) {
            output.push(id.clone());
        }
    }

    output
}
