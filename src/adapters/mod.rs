//! Adapter contracts and the type-indexed registry.
//!
//! Three slots: `message` (required, defaults to the built-in shell
//! adapter), `nlu`, and `storage`. Adapters resolve by name through a
//! factory registry; the typed traits are validated at compile time, and
//! loading validates the slot/factory pairing. All adapter calls made by
//! the core run under the configured request timeout.

pub mod shell;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::envelopes::Envelope;
use crate::errors::AdapterError;
use crate::messages::Message;
use crate::nlu::NluResult;
use crate::settings::Settings;

/// Run an adapter call under the request timeout.
pub async fn with_timeout<T>(
    ms: u64,
    fut: impl Future<Output = T>,
) -> Result<T, AdapterError> {
    tokio::time::timeout(Duration::from_millis(ms), fut)
        .await
        .map_err(|_| AdapterError::Timeout { ms })
}

/// Base contract every adapter implements.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Human-readable adapter name.
    fn name(&self) -> &str;

    /// Connect and begin operating.
    async fn start(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    /// Disconnect and release resources.
    async fn shutdown(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// Outbound message delivery. Inbound messages enter through
/// `Bot::receive`, called by the adapter's own listener.
#[async_trait]
pub trait MessageAdapter: Adapter {
    /// Deliver one envelope to the platform.
    async fn dispatch(&self, envelope: &Envelope) -> Result<(), anyhow::Error>;
}

/// Natural-language understanding.
#[async_trait]
pub trait NluAdapter: Adapter {
    /// Analyse a message; `None` when the adapter has no result for it.
    async fn process(&self, message: &Message) -> Result<Option<NluResult>, anyhow::Error>;
}

/// Durable persistence for memory snapshots and ad-hoc records.
#[async_trait]
pub trait StorageAdapter: Adapter {
    /// Persist a full memory snapshot.
    async fn save_memory(&self, data: Value) -> Result<(), anyhow::Error>;

    /// Load the last memory snapshot.
    async fn load_memory(&self) -> Result<Value, anyhow::Error>;

    /// Append a record to a collection.
    async fn keep(&self, collection: &str, data: Value) -> Result<(), anyhow::Error>;

    /// Remove records matching the criteria.
    async fn lose(&self, collection: &str, criteria: Value) -> Result<(), anyhow::Error>;

    /// Find records matching the criteria.
    async fn find(&self, collection: &str, criteria: Value)
        -> Result<Vec<Value>, anyhow::Error>;

    /// Find the first record matching the criteria.
    async fn find_one(
        &self,
        collection: &str,
        criteria: Value,
    ) -> Result<Option<Value>, anyhow::Error>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The three adapter slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Message,
    Nlu,
    Storage,
}

impl std::fmt::Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Slot::Message => write!(f, "message"),
            Slot::Nlu => write!(f, "nlu"),
            Slot::Storage => write!(f, "storage"),
        }
    }
}

/// Factory producing a message adapter from settings.
pub type MessageAdapterFactory =
    Arc<dyn Fn(&Settings) -> Result<Arc<dyn MessageAdapter>, AdapterError> + Send + Sync>;
/// Factory producing an NLU adapter from settings.
pub type NluAdapterFactory =
    Arc<dyn Fn(&Settings) -> Result<Arc<dyn NluAdapter>, AdapterError> + Send + Sync>;
/// Factory producing a storage adapter from settings.
pub type StorageAdapterFactory =
    Arc<dyn Fn(&Settings) -> Result<Arc<dyn StorageAdapter>, AdapterError> + Send + Sync>;

/// A named, slot-typed adapter factory.
#[derive(Clone)]
pub enum AdapterFactory {
    Message(MessageAdapterFactory),
    Nlu(NluAdapterFactory),
    Storage(StorageAdapterFactory),
}

impl AdapterFactory {
    fn slot(&self) -> Slot {
        match self {
            AdapterFactory::Message(_) => Slot::Message,
            AdapterFactory::Nlu(_) => Slot::Nlu,
            AdapterFactory::Storage(_) => Slot::Storage,
        }
    }
}

/// Type-indexed adapter slots plus the factory registry they load from.
#[derive(Default)]
pub struct AdapterRegistry {
    factories: RwLock<HashMap<String, AdapterFactory>>,
    message: RwLock<Option<Arc<dyn MessageAdapter>>>,
    nlu: RwLock<Option<Arc<dyn NluAdapter>>>,
    storage: RwLock<Option<Arc<dyn StorageAdapter>>>,
}

impl AdapterRegistry {
    /// An empty registry with no factories.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a resolvable name.
    pub fn register(&self, name: impl Into<String>, factory: AdapterFactory) {
        self.factories.write().unwrap().insert(name.into(), factory);
    }

    /// Place an already-constructed message adapter in its slot.
    pub fn use_message(&self, adapter: Arc<dyn MessageAdapter>) {
        *self.message.write().unwrap() = Some(adapter);
    }

    /// Place an already-constructed NLU adapter in its slot.
    pub fn use_nlu(&self, adapter: Arc<dyn NluAdapter>) {
        *self.nlu.write().unwrap() = Some(adapter);
    }

    /// Place an already-constructed storage adapter in its slot.
    pub fn use_storage(&self, adapter: Arc<dyn StorageAdapter>) {
        *self.storage.write().unwrap() = Some(adapter);
    }

    /// Resolve a name through the factory registry and fill the slot.
    pub fn load(&self, slot: Slot, name: &str, settings: &Settings) -> Result<(), AdapterError> {
        let factory = {
            let factories = self.factories.read().unwrap();
            factories
                .get(name)
                .cloned()
                .ok_or_else(|| AdapterError::InvalidAdapter {
                    name: name.to_string(),
                    reason: "no factory registered under this name".to_string(),
                })?
        };
        if factory.slot() != slot {
            return Err(AdapterError::InvalidAdapter {
                name: name.to_string(),
                reason: format!(
                    "registered as a {} adapter, wanted {}",
                    factory.slot(),
                    slot
                ),
            });
        }
        match factory {
            AdapterFactory::Message(make) => {
                let adapter = make(settings)?;
                validate_name(name, adapter.name())?;
                self.use_message(adapter);
            }
            AdapterFactory::Nlu(make) => {
                let adapter = make(settings)?;
                validate_name(name, adapter.name())?;
                self.use_nlu(adapter);
            }
            AdapterFactory::Storage(make) => {
                let adapter = make(settings)?;
                validate_name(name, adapter.name())?;
                self.use_storage(adapter);
            }
        }
        log::info!("[adapters] loaded {slot} adapter '{name}'");
        Ok(())
    }

    /// Load every slot configured in the settings. Slots already populated
    /// (via the `use_*` methods) are left alone; the message slot falls
    /// back to the built-in shell adapter.
    pub fn load_all(&self, settings: &Settings) -> Result<(), AdapterError> {
        if self.message().is_none() {
            let message_name = settings.message_adapter.as_deref().unwrap_or(shell::NAME);
            self.load(Slot::Message, message_name, settings)?;
        }
        if self.nlu().is_none() {
            if let Some(name) = settings.nlu_adapter.as_deref() {
                self.load(Slot::Nlu, name, settings)?;
            }
        }
        if self.storage().is_none() {
            if let Some(name) = settings.storage_adapter.as_deref() {
                self.load(Slot::Storage, name, settings)?;
            }
        }
        Ok(())
    }

    /// The loaded message adapter.
    pub fn message(&self) -> Option<Arc<dyn MessageAdapter>> {
        self.message.read().unwrap().clone()
    }

    /// The loaded NLU adapter.
    pub fn nlu(&self) -> Option<Arc<dyn NluAdapter>> {
        self.nlu.read().unwrap().clone()
    }

    /// The loaded storage adapter.
    pub fn storage(&self) -> Option<Arc<dyn StorageAdapter>> {
        self.storage.read().unwrap().clone()
    }

    fn populated(&self) -> Vec<Arc<dyn Adapter>> {
        let mut adapters: Vec<Arc<dyn Adapter>> = Vec::new();
        if let Some(a) = self.message() {
            adapters.push(a);
        }
        if let Some(a) = self.nlu() {
            adapters.push(a);
        }
        if let Some(a) = self.storage() {
            adapters.push(a);
        }
        adapters
    }

    /// Start all populated slots, in slot order.
    pub async fn start_all(&self) -> Result<(), AdapterError> {
        for adapter in self.populated() {
            adapter
                .start()
                .await
                .map_err(AdapterError::Failed)?;
            log::debug!("[adapters] started '{}'", adapter.name());
        }
        Ok(())
    }

    /// Shut down all populated slots in reverse slot order. Failures are
    /// logged, not propagated, so remaining adapters still stop.
    pub async fn shutdown_all(&self) {
        for adapter in self.populated().into_iter().rev() {
            if let Err(err) = adapter.shutdown().await {
                log::error!("[adapters] '{}' shutdown failed: {err}", adapter.name());
            }
        }
    }

    /// Empty every slot. Factories stay registered.
    pub fn unload_all(&self) {
        *self.message.write().unwrap() = None;
        *self.nlu.write().unwrap() = None;
        *self.storage.write().unwrap() = None;
    }
}

fn validate_name(registered: &str, reported: &str) -> Result<(), AdapterError> {
    if reported.trim().is_empty() {
        return Err(AdapterError::InvalidAdapter {
            name: registered.to_string(),
            reason: "adapter reports an empty name".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Room, User};
    use std::sync::Mutex;

    pub(crate) struct RecordingStorage {
        pub saved: Mutex<Vec<Value>>,
        pub records: Mutex<HashMap<String, Vec<Value>>>,
        pub snapshot: Mutex<Value>,
    }

    impl RecordingStorage {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                saved: Mutex::new(Vec::new()),
                records: Mutex::new(HashMap::new()),
                snapshot: Mutex::new(Value::Null),
            })
        }
    }

    #[async_trait]
    impl Adapter for RecordingStorage {
        fn name(&self) -> &str {
            "recording-storage"
        }
    }

    #[async_trait]
    impl StorageAdapter for RecordingStorage {
        async fn save_memory(&self, data: Value) -> Result<(), anyhow::Error> {
            *self.snapshot.lock().unwrap() = data.clone();
            self.saved.lock().unwrap().push(data);
            Ok(())
        }

        async fn load_memory(&self) -> Result<Value, anyhow::Error> {
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn keep(&self, collection: &str, data: Value) -> Result<(), anyhow::Error> {
            self.records
                .lock()
                .unwrap()
                .entry(collection.to_string())
                .or_default()
                .push(data);
            Ok(())
        }

        async fn lose(&self, collection: &str, _criteria: Value) -> Result<(), anyhow::Error> {
            self.records.lock().unwrap().remove(collection);
            Ok(())
        }

        async fn find(
            &self,
            collection: &str,
            _criteria: Value,
        ) -> Result<Vec<Value>, anyhow::Error> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(collection)
                .cloned()
                .unwrap_or_default())
        }

        async fn find_one(
            &self,
            collection: &str,
            criteria: Value,
        ) -> Result<Option<Value>, anyhow::Error> {
            Ok(self.find(collection, criteria).await?.into_iter().next())
        }
    }

    #[test]
    fn test_unknown_adapter_name_fails() {
        let registry = AdapterRegistry::new();
        let err = registry
            .load(Slot::Message, "missing", &Settings::default())
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidAdapter { .. }));
    }

    #[test]
    fn test_slot_mismatch_fails() {
        let registry = AdapterRegistry::new();
        let storage = RecordingStorage::new();
        registry.register(
            "recording",
            AdapterFactory::Storage(Arc::new(move |_settings| {
                Ok(storage.clone() as Arc<dyn StorageAdapter>)
            })),
        );
        let err = registry
            .load(Slot::Message, "recording", &Settings::default())
            .unwrap_err();
        match err {
            AdapterError::InvalidAdapter { reason, .. } => {
                assert!(reason.contains("storage"));
            }
            other => panic!("expected InvalidAdapter, got {other:?}"),
        }
    }

    #[test]
    fn test_load_all_defaults_to_shell() {
        let registry = AdapterRegistry::new();
        registry.register(
            shell::NAME,
            AdapterFactory::Message(Arc::new(|_settings| {
                Ok(Arc::new(shell::ShellAdapter::new()) as Arc<dyn MessageAdapter>)
            })),
        );
        registry.load_all(&Settings::default()).unwrap();
        assert!(registry.message().is_some());
        assert!(registry.nlu().is_none());
        assert!(registry.storage().is_none());
    }

    #[tokio::test]
    async fn test_dispatch_through_shell() {
        let adapter = shell::ShellAdapter::new();
        let envelope = Envelope::new()
            .to_room(Room::new("general"))
            .to_user(User::new("u1"))
            .compose(&["hello"]);
        adapter.dispatch(&envelope).await.unwrap();
        assert_eq!(adapter.sent(), 1);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(10, async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            1
        })
        .await;
        assert!(matches!(result, Err(AdapterError::Timeout { ms: 10 })));

        let ok = with_timeout(200, async { 1 }).await.unwrap();
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn test_unload_all_clears_slots() {
        let registry = AdapterRegistry::new();
        registry.use_storage(RecordingStorage::new());
        assert!(registry.storage().is_some());
        registry.unload_all();
        assert!(registry.storage().is_none());
    }
}
