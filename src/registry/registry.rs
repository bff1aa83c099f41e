//! Provider registry.

use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use tokio::time::Instant;

use crate::adapter::ProviderAdapter;
use crate::health::state::ProviderStats;
use crate::registry::descriptor::{ProviderDescriptor, ProviderId};
use crate::registry::state::ProviderRuntimeState;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("provider '{0}' is already registered")]
    DuplicateProvider(ProviderId),
}

/// A registered provider: descriptor, adapter and guarded runtime state.
pub struct ProviderEntry {
    descriptor: ProviderDescriptor,
    adapter: Arc<dyn ProviderAdapter>,
    state: Mutex<ProviderRuntimeState>,
}

impl ProviderEntry {
    pub fn new(descriptor: ProviderDescriptor, adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            descriptor,
            adapter,
            state: Mutex::new(ProviderRuntimeState::default()),
        }
    }

    pub fn id(&self) -> &ProviderId {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    pub fn adapter(&self) -> &dyn ProviderAdapter {
        self.adapter.as_ref()
    }

    /// Run `f` with exclusive access to the runtime state.
    ///
    /// A poisoned lock is recovered: the state is plain counters and
    /// timestamps, so a panic mid-update cannot leave it unusable.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ProviderRuntimeState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Copy of the current runtime state.
    pub fn snapshot(&self) -> ProviderRuntimeState {
        self.with_state(|state| state.clone())
    }

    pub fn stats(&self, now: Instant) -> ProviderStats {
        ProviderStats::capture(&self.descriptor, &self.snapshot(), now)
    }
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// All known providers keyed by id.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    entries: DashMap<ProviderId, Arc<ProviderEntry>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        descriptor: ProviderDescriptor,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Result<Arc<ProviderEntry>, RegistryError> {
        use dashmap::mapref::entry::Entry;

        match self.entries.entry(descriptor.id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateProvider(descriptor.id)),
            Entry::Vacant(slot) => {
                tracing::debug!(
                    provider = %descriptor.id,
                    category = %descriptor.category,
                    priority = descriptor.priority,
                    "Registered provider"
                );
                let entry = Arc::new(ProviderEntry::new(descriptor, adapter));
                slot.insert(entry.clone());
                Ok(entry)
            }
        }
    }

    pub fn get(&self, id: &ProviderId) -> Option<Arc<ProviderEntry>> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// All entries, ordered by id.
    pub fn entries(&self) -> Vec<Arc<ProviderEntry>> {
        let mut entries: Vec<_> = self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.id().cmp(b.id()));
        entries
    }

    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        self.entries()
            .into_iter()
            .map(|entry| entry.descriptor().clone())
            .collect()
    }

    pub fn stats(&self) -> Vec<ProviderStats> {
        let now = Instant::now();
        self.entries().iter().map(|entry| entry.stats(now)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
