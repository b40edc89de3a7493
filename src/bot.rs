//! The bot context and lifecycle controller.
//!
//! A [`Bot`] bundles everything one bot process owns: settings, the event
//! bus, the global path, the bit registry, per-stage middleware stacks, the
//! adapter slots, memory, and any open scenes. Constructors take the
//! configuration; tests build their own context. The lifecycle runs
//! `waiting → loading → loaded → starting → started → shutdown`, with
//! `pause` dropping back to `loaded` and `reset` returning to `waiting`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::adapters::{shell, with_timeout, AdapterFactory, AdapterRegistry, MessageAdapter};
use crate::bits::{self, Bit};
use crate::branches::Branch;
use crate::envelopes::Envelope;
use crate::errors::AdapterError;
use crate::events::{EventBus, Handler};
use crate::memory::Memory;
use crate::messages::Message;
use crate::middleware::{Middleware, Piece};
use crate::paths::Path;
use crate::settings::Settings;
use crate::state::State;
use crate::thought::{Scene, Stage, ThoughtProcess};

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotStatus {
    Waiting,
    Loading,
    Loaded,
    Starting,
    Started,
    Shutdown,
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotStatus::Waiting => write!(f, "waiting"),
            BotStatus::Loading => write!(f, "loading"),
            BotStatus::Loaded => write!(f, "loaded"),
            BotStatus::Starting => write!(f, "starting"),
            BotStatus::Started => write!(f, "started"),
            BotStatus::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// The bot context: registries, adapters, memory, and lifecycle state.
pub struct Bot {
    /// Resolved configuration (name already sanitised).
    pub settings: Settings,
    /// Observer event bus.
    pub events: EventBus,
    /// Adapter slots and factories.
    pub adapters: AdapterRegistry,
    /// The process-lifetime key/collection store.
    pub memory: Memory,
    middlewares: RwLock<HashMap<Stage, Middleware>>,
    path: RwLock<Path>,
    scenes: RwLock<Vec<Scene>>,
    bits: RwLock<HashMap<String, Bit>>,
    status_tx: watch::Sender<BotStatus>,
}

impl Bot {
    /// Create a bot context from settings. The built-in shell message
    /// adapter factory is pre-registered.
    pub fn new(settings: Settings) -> Arc<Self> {
        let settings = settings.sanitized();
        let (status_tx, _status_rx) = watch::channel(BotStatus::Waiting);
        let bot = Arc::new(Self {
            settings,
            events: EventBus::new(),
            adapters: AdapterRegistry::new(),
            memory: Memory::new(),
            middlewares: RwLock::new(HashMap::new()),
            path: RwLock::new(Path::global()),
            scenes: RwLock::new(Vec::new()),
            bits: RwLock::new(HashMap::new()),
            status_tx,
        });
        bot.seed_middlewares();
        bot.adapters.register(
            shell::NAME,
            AdapterFactory::Message(Arc::new(|_settings| {
                Ok(Arc::new(shell::ShellAdapter::new()) as Arc<dyn MessageAdapter>)
            })),
        );
        bot
    }

    fn seed_middlewares(&self) {
        let mut map = self.middlewares.write().unwrap();
        map.clear();
        for stage in Stage::ALL {
            map.insert(stage, Middleware::new(stage.to_string()));
        }
    }

    // -----------------------------------------------------------------------
    // Registries
    // -----------------------------------------------------------------------

    /// Mutable access to the global path for branch registration.
    pub fn path_mut(&self) -> RwLockWriteGuard<'_, Path> {
        self.warn_if_started("branches");
        self.path.write().unwrap()
    }

    /// Branches registered globally for a stage.
    pub fn global_branches(&self, stage: Stage) -> Vec<Branch> {
        self.path.read().unwrap().branches(stage).to_vec()
    }

    /// A snapshot of the whole global path.
    pub fn global_path(&self) -> Path {
        self.path.read().unwrap().clone()
    }

    /// Register a middleware piece for a stage.
    pub fn register_middleware(&self, stage: Stage, piece: Piece) {
        self.warn_if_started("middleware");
        let mut map = self.middlewares.write().unwrap();
        map.entry(stage)
            .or_insert_with(|| Middleware::new(stage.to_string()))
            .register(piece);
    }

    /// The middleware stack for a stage (cloned; stacks are cheap bundles
    /// of shared pieces).
    pub fn middleware(&self, stage: Stage) -> Middleware {
        self.middlewares
            .read()
            .unwrap()
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| Middleware::new(stage.to_string()))
    }

    /// Register a bit, replacing any bit with the same id.
    pub fn register_bit(&self, bit: Bit) {
        self.warn_if_started("bits");
        if !bit.has_interaction() {
            log::warn!(
                "[bot] bit '{}' has neither send strings nor a callback",
                bit.id
            );
        }
        self.bits.write().unwrap().insert(bit.id.clone(), bit);
    }

    /// Look up a bit by id.
    pub fn bit(&self, id: &str) -> Option<Bit> {
        self.bits.read().unwrap().get(id).cloned()
    }

    /// Run a bit against a state.
    pub async fn do_bit(&self, id: &str, state: &mut State) -> Result<(), anyhow::Error> {
        bits::run(id, state).await
    }

    /// Attach an observer to a thought-process or lifecycle event.
    pub fn on(&self, event: &str, handler: Handler) {
        self.events.on(event, handler);
    }

    fn warn_if_started(&self, what: &str) {
        if self.status() == BotStatus::Started {
            log::warn!(
                "[bot] registering {what} while started; registries freeze once started"
            );
        }
    }

    // -----------------------------------------------------------------------
    // Scenes
    // -----------------------------------------------------------------------

    /// Open a scoped scene.
    pub fn push_scene(&self, scene: Scene) {
        log::debug!(
            "[bot] scene {} opened (user {:?}, room {:?})",
            scene.path.scope,
            scene.user_id,
            scene.room_id
        );
        self.scenes.write().unwrap().push(scene);
    }

    /// Discard scenes by id.
    pub fn remove_scenes(&self, ids: &[String]) {
        self.scenes.write().unwrap().retain(|s| !ids.contains(&s.id));
    }

    /// Open scene count (expired scenes are pruned lazily on evaluation).
    pub fn scene_count(&self) -> usize {
        self.scenes.read().unwrap().len()
    }

    /// Applicable scene branches for a stage, pruning expired scenes.
    /// Returns `(scene id, branches)` pairs for scenes that bind the
    /// message's participants and carry branches at the stage.
    pub fn scene_branches(
        &self,
        stage: Stage,
        message: &Message,
    ) -> Vec<(String, Vec<Branch>)> {
        let mut scenes = self.scenes.write().unwrap();
        scenes.retain(|s| {
            if s.expired() {
                log::debug!("[bot] scene {} timed out", s.path.scope);
                false
            } else {
                true
            }
        });
        scenes
            .iter()
            .filter(|s| s.applies_to(message))
            .filter_map(|s| {
                let branches = s.path.branches(stage);
                if branches.is_empty() {
                    None
                } else {
                    Some((s.id.clone(), branches.to_vec()))
                }
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Thought-process entry points
    // -----------------------------------------------------------------------

    /// Route an inbound chat message through the thought process.
    pub async fn receive(self: &Arc<Self>, message: Message) -> State {
        ThoughtProcess::new(self.clone()).receive(message).await
    }

    /// Route a server-originated message through the thought process.
    pub async fn serve(self: &Arc<Self>, message: Message) -> State {
        ThoughtProcess::new(self.clone()).serve(message).await
    }

    /// Dispatch a bot-initiated envelope (respond and remember stages).
    pub async fn dispatch(self: &Arc<Self>, envelope: Envelope) -> State {
        ThoughtProcess::new(self.clone()).dispatch(envelope).await
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Current lifecycle status.
    pub fn status(&self) -> BotStatus {
        *self.status_tx.borrow()
    }

    fn set_status(&self, status: BotStatus) {
        log::debug!("[bot] status -> {status}");
        self.status_tx.send_replace(status);
    }

    /// Load adapters and wiring. A load failure tears the bot down with
    /// exit code 1.
    pub async fn load(self: &Arc<Self>) -> Result<(), AdapterError> {
        if self.status() != BotStatus::Waiting {
            log::warn!("[bot] load ignored in status {}", self.status());
            return Ok(());
        }
        self.set_status(BotStatus::Loading);
        log::info!("[bot] loading '{}'", self.settings.name);
        if let Err(err) = self.adapters.load_all(&self.settings) {
            log::error!("[bot] load failed: {err}");
            self.set_status(BotStatus::Loaded);
            self.shutdown(1).await;
            return Err(err);
        }
        self.set_status(BotStatus::Loaded);
        self.events.emit("loaded", None);
        Ok(())
    }

    /// Start adapters and memory. Loads first when still waiting. A start
    /// failure tears the bot down with exit code 1.
    pub async fn start(self: &Arc<Self>) -> Result<(), AdapterError> {
        if self.status() == BotStatus::Waiting {
            self.load().await?;
        }
        if self.status() != BotStatus::Loaded {
            log::warn!("[bot] start ignored in status {}", self.status());
            return Ok(());
        }
        self.set_status(BotStatus::Starting);
        log::info!("[bot] starting");
        if let Err(err) = self.adapters.start_all().await {
            log::error!("[bot] start failed: {err}");
            self.set_status(BotStatus::Loaded);
            self.shutdown(1).await;
            return Err(err);
        }
        match self.load_memory().await {
            Ok(()) | Err(AdapterError::StorageUnavailable) => {}
            Err(err) => log::warn!("[bot] memory load failed: {err}"),
        }
        if self.settings.auto_save && self.adapters.storage().is_some() {
            self.set_save_interval(self.settings.save_interval);
        }
        self.set_status(BotStatus::Started);
        self.events.emit("started", None);
        Ok(())
    }

    /// Tear down in LIFO order. Waits out an in-flight load/start so the
    /// teardown always sees a settled status, then returns the exit code
    /// for the host process.
    pub async fn shutdown(self: &Arc<Self>, code: i32) -> i32 {
        let mut rx = self.status_tx.subscribe();
        while matches!(*rx.borrow(), BotStatus::Loading | BotStatus::Starting) {
            if rx.changed().await.is_err() {
                break;
            }
        }
        if self.status() == BotStatus::Shutdown {
            return code;
        }
        log::info!("[bot] shutting down (code {code})");
        self.clear_save_interval();
        if self.adapters.storage().is_some() {
            if let Err(err) = self.snapshot_memory().await {
                log::error!("[bot] final memory save failed: {err}");
            }
        }
        self.adapters.shutdown_all().await;
        self.set_status(BotStatus::Shutdown);
        self.events.emit("shutdown", None);
        code
    }

    /// Stop adapters and timers but keep registrations; status drops back
    /// to loaded so `start` can resume.
    pub async fn pause(self: &Arc<Self>) {
        if self.status() != BotStatus::Started {
            log::warn!("[bot] pause ignored in status {}", self.status());
            return;
        }
        log::info!("[bot] pausing");
        self.clear_save_interval();
        self.adapters.shutdown_all().await;
        self.set_status(BotStatus::Loaded);
    }

    /// Return to `waiting`: empty the global path, scenes, bits, adapter
    /// slots, and middleware stacks. Memory contents survive a reset.
    pub fn reset(&self) {
        log::info!("[bot] reset");
        self.clear_save_interval();
        *self.path.write().unwrap() = Path::global();
        self.scenes.write().unwrap().clear();
        self.bits.write().unwrap().clear();
        self.adapters.unload_all();
        self.seed_middlewares();
        self.set_status(BotStatus::Waiting);
    }

    // -----------------------------------------------------------------------
    // Memory persistence
    // -----------------------------------------------------------------------

    /// Snapshot memory through the storage adapter now. Clears the save
    /// timer first and re-arms it afterwards so writes never overlap.
    pub async fn save_memory(self: &Arc<Self>) -> Result<(), AdapterError> {
        self.memory.disarm_save_timer();
        let result = self.snapshot_memory().await;
        if self.settings.auto_save
            && self.status() == BotStatus::Started
            && self.adapters.storage().is_some()
        {
            self.set_save_interval(self.settings.save_interval);
        }
        result
    }

    async fn snapshot_memory(&self) -> Result<(), AdapterError> {
        let storage = self
            .adapters
            .storage()
            .ok_or(AdapterError::StorageUnavailable)?;
        let _guard = self.memory.save_guard().await;
        let data = self.memory.to_object();
        with_timeout(self.settings.request_timeout, storage.save_memory(data))
            .await?
            .map_err(AdapterError::Failed)
    }

    /// Merge the stored snapshot into memory. Current entries win.
    pub async fn load_memory(&self) -> Result<(), AdapterError> {
        let storage = self
            .adapters
            .storage()
            .ok_or(AdapterError::StorageUnavailable)?;
        let loaded = with_timeout(self.settings.request_timeout, storage.load_memory())
            .await?
            .map_err(AdapterError::Failed)?;
        self.memory.merge_loaded(loaded);
        Ok(())
    }

    /// Arm the periodic memory snapshot task.
    pub fn set_save_interval(self: &Arc<Self>, ms: u64) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(ms.max(1)));
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; the schedule starts one
            // interval from now.
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(bot) = weak.upgrade() else { break };
                if let Err(err) = bot.snapshot_memory().await {
                    log::error!("[bot] periodic memory save failed: {err}");
                }
            }
        });
        self.memory.arm_save_timer(handle);
    }

    /// Stop the periodic memory snapshot task.
    pub fn clear_save_interval(&self) {
        self.memory.disarm_save_timer();
    }

    // -----------------------------------------------------------------------
    // Ad-hoc storage passthrough
    // -----------------------------------------------------------------------

    /// Append a record to a storage collection.
    pub async fn keep(&self, collection: &str, data: Value) -> Result<(), AdapterError> {
        let storage = self
            .adapters
            .storage()
            .ok_or(AdapterError::StorageUnavailable)?;
        with_timeout(self.settings.request_timeout, storage.keep(collection, data))
            .await?
            .map_err(AdapterError::Failed)
    }

    /// Remove records matching the criteria.
    pub async fn lose(&self, collection: &str, criteria: Value) -> Result<(), AdapterError> {
        let storage = self
            .adapters
            .storage()
            .ok_or(AdapterError::StorageUnavailable)?;
        with_timeout(
            self.settings.request_timeout,
            storage.lose(collection, criteria),
        )
        .await?
        .map_err(AdapterError::Failed)
    }

    /// Find records matching the criteria.
    pub async fn find(
        &self,
        collection: &str,
        criteria: Value,
    ) -> Result<Vec<Value>, AdapterError> {
        let storage = self
            .adapters
            .storage()
            .ok_or(AdapterError::StorageUnavailable)?;
        with_timeout(
            self.settings.request_timeout,
            storage.find(collection, criteria),
        )
        .await?
        .map_err(AdapterError::Failed)
    }

    /// Find the first record matching the criteria.
    pub async fn find_one(
        &self,
        collection: &str,
        criteria: Value,
    ) -> Result<Option<Value>, AdapterError> {
        let storage = self
            .adapters
            .storage()
            .ok_or(AdapterError::StorageUnavailable)?;
        with_timeout(
            self.settings.request_timeout,
            storage.find_one(collection, criteria),
        )
        .await?
        .map_err(AdapterError::Failed)
    }
}

impl std::fmt::Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("name", &self.settings.name)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{Adapter, StorageAdapter};
    use crate::branches::callback;
    use crate::conditions::Conditions;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MemoryStorage {
        saves: AtomicUsize,
        snapshot: Mutex<Value>,
        kept: Mutex<Vec<(String, Value)>>,
    }

    impl MemoryStorage {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                saves: AtomicUsize::new(0),
                snapshot: Mutex::new(Value::Null),
                kept: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Adapter for MemoryStorage {
        fn name(&self) -> &str {
            "memory-storage"
        }
    }

    #[async_trait]
    impl StorageAdapter for MemoryStorage {
        async fn save_memory(&self, data: Value) -> Result<(), anyhow::Error> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            *self.snapshot.lock().unwrap() = data;
            Ok(())
        }

        async fn load_memory(&self) -> Result<Value, anyhow::Error> {
            Ok(self.snapshot.lock().unwrap().clone())
        }

        async fn keep(&self, collection: &str, data: Value) -> Result<(), anyhow::Error> {
            self.kept
                .lock()
                .unwrap()
                .push((collection.to_string(), data));
            Ok(())
        }

        async fn lose(&self, collection: &str, _criteria: Value) -> Result<(), anyhow::Error> {
            self.kept.lock().unwrap().retain(|(c, _)| c != collection);
            Ok(())
        }

        async fn find(
            &self,
            collection: &str,
            _criteria: Value,
        ) -> Result<Vec<Value>, anyhow::Error> {
            Ok(self
                .kept
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| c == collection)
                .map(|(_, v)| v.clone())
                .collect())
        }

        async fn find_one(
            &self,
            collection: &str,
            criteria: Value,
        ) -> Result<Option<Value>, anyhow::Error> {
            Ok(self.find(collection, criteria).await?.into_iter().next())
        }
    }

    struct SlowStarter {
        trace: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Adapter for SlowStarter {
        fn name(&self) -> &str {
            "slow-starter"
        }

        async fn start(&self) -> Result<(), anyhow::Error> {
            tokio::time::sleep(Duration::from_millis(60)).await;
            self.trace.lock().unwrap().push("started");
            Ok(())
        }

        async fn shutdown(&self) -> Result<(), anyhow::Error> {
            self.trace.lock().unwrap().push("shutdown");
            Ok(())
        }
    }

    #[async_trait]
    impl MessageAdapter for SlowStarter {
        async fn dispatch(&self, _envelope: &Envelope) -> Result<(), anyhow::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path() {
        let bot = Bot::new(Settings::default());
        assert_eq!(bot.status(), BotStatus::Waiting);
        bot.load().await.unwrap();
        assert_eq!(bot.status(), BotStatus::Loaded);
        bot.start().await.unwrap();
        assert_eq!(bot.status(), BotStatus::Started);
        let code = bot.shutdown(0).await;
        assert_eq!(code, 0);
        assert_eq!(bot.status(), BotStatus::Shutdown);
    }

    #[tokio::test]
    async fn test_start_from_waiting_loads_first() {
        let bot = Bot::new(Settings::default());
        bot.start().await.unwrap();
        assert_eq!(bot.status(), BotStatus::Started);
        // The default shell adapter filled the message slot.
        assert!(bot.adapters.message().is_some());
    }

    #[tokio::test]
    async fn test_load_failure_triggers_shutdown_code_one() {
        let bot = Bot::new(Settings {
            message_adapter: Some("nonexistent".to_string()),
            ..Default::default()
        });
        let err = bot.load().await.unwrap_err();
        assert!(matches!(err, AdapterError::InvalidAdapter { .. }));
        assert_eq!(bot.status(), BotStatus::Shutdown);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_inflight_start() {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let bot = Bot::new(Settings::default());
        bot.adapters.use_message(Arc::new(SlowStarter {
            trace: trace.clone(),
        }));
        bot.load().await.unwrap();

        let starter = bot.clone();
        let start_task = tokio::spawn(async move { starter.start().await });
        // Give start a moment to enter the starting state.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let code = bot.shutdown(0).await;

        start_task.await.unwrap().unwrap();
        assert_eq!(code, 0);
        assert_eq!(bot.status(), BotStatus::Shutdown);
        // Teardown happened after the in-flight start completed.
        assert_eq!(*trace.lock().unwrap(), vec!["started", "shutdown"]);
    }

    #[tokio::test]
    async fn test_autosave_interval_snapshots_repeatedly() {
        let storage = MemoryStorage::new();
        let bot = Bot::new(Settings {
            auto_save: true,
            save_interval: 50,
            ..Default::default()
        });
        bot.adapters.use_storage(storage.clone());
        bot.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(130)).await;
        let after_running = storage.saves.load(Ordering::SeqCst);
        assert!(after_running >= 2, "expected >= 2 saves, got {after_running}");

        bot.clear_save_interval();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(storage.saves.load(Ordering::SeqCst), after_running);
        bot.shutdown(0).await;
    }

    #[tokio::test]
    async fn test_memory_roundtrip_through_storage() {
        let storage = MemoryStorage::new();
        let bot = Bot::new(Settings::default());
        bot.adapters.use_storage(storage.clone());
        bot.memory.set("facts", json!({"sky": "blue"}));
        bot.save_memory().await.unwrap();
        let before = bot.memory.to_object();

        bot.load_memory().await.unwrap();
        assert_eq!(bot.memory.to_object(), before);

        // A fresh context restores the same collections.
        let other = Bot::new(Settings::default());
        other.adapters.use_storage(storage);
        other.load_memory().await.unwrap();
        assert_eq!(other.memory.get("facts"), Some(json!({"sky": "blue"})));
    }

    #[tokio::test]
    async fn test_storage_unavailable_errors() {
        let bot = Bot::new(Settings::default());
        assert!(matches!(
            bot.save_memory().await,
            Err(AdapterError::StorageUnavailable)
        ));
        assert!(matches!(
            bot.keep("notes", json!(1)).await,
            Err(AdapterError::StorageUnavailable)
        ));
        assert!(matches!(
            bot.find("notes", Value::Null).await,
            Err(AdapterError::StorageUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_keep_find_lose_passthrough() {
        let bot = Bot::new(Settings::default());
        bot.adapters.use_storage(MemoryStorage::new());
        bot.keep("notes", json!({"n": 1})).await.unwrap();
        bot.keep("notes", json!({"n": 2})).await.unwrap();
        assert_eq!(bot.find("notes", Value::Null).await.unwrap().len(), 2);
        assert_eq!(
            bot.find_one("notes", Value::Null).await.unwrap(),
            Some(json!({"n": 1}))
        );
        bot.lose("notes", Value::Null).await.unwrap();
        assert!(bot.find("notes", Value::Null).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reset_returns_to_waiting_and_empties_registries() {
        let bot = Bot::new(Settings::default());
        bot.path_mut().text(
            Conditions::from_expression("/x/").unwrap(),
            callback(|_b: &mut State| Box::pin(async { Ok(()) })),
        );
        bot.register_bit(Bit::new("b").saying(&["hi"]));
        bot.register_middleware(
            Stage::Hear,
            crate::middleware::piece(|_b: &mut State, _c: &mut crate::middleware::PieceContext| {
                Box::pin(async { Ok(crate::middleware::PieceFlow::Continue) })
            }),
        );
        bot.load().await.unwrap();

        bot.reset();
        assert_eq!(bot.status(), BotStatus::Waiting);
        assert!(bot.global_branches(Stage::Listen).is_empty());
        assert!(bot.bit("b").is_none());
        assert!(bot.adapters.message().is_none());
        assert!(bot.middleware(Stage::Hear).is_empty());
    }

    #[tokio::test]
    async fn test_pause_drops_back_to_loaded() {
        let bot = Bot::new(Settings::default());
        bot.start().await.unwrap();
        bot.pause().await;
        assert_eq!(bot.status(), BotStatus::Loaded);
        // Resumable.
        bot.start().await.unwrap();
        assert_eq!(bot.status(), BotStatus::Started);
    }

    #[tokio::test]
    async fn test_lifecycle_events_emitted() {
        let bot = Bot::new(Settings::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["loaded", "started", "shutdown"] {
            let s = seen.clone();
            bot.on(
                name,
                Arc::new(move |event: &str, _state: Option<&State>| {
                    s.lock().unwrap().push(event.to_string());
                }),
            );
        }
        bot.start().await.unwrap();
        bot.shutdown(0).await;
        assert_eq!(*seen.lock().unwrap(), vec!["loaded", "started", "shutdown"]);
    }
}
