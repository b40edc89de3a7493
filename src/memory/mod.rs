//! In-process key/collection memory.
//!
//! Memory is a mapping of named collections to key/value entries, with
//! reserved `users` and `rooms` collections and a default `private`
//! collection. Values are stored as owned JSON so writers keep no aliases
//! into the store; reads return clones. The lifecycle controller snapshots
//! the whole store through the storage adapter periodically and at
//! shutdown.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::messages::{Room, User};

/// Collection used when none is named.
pub const DEFAULT_COLLECTION: &str = "private";
/// Reserved collection of known users, keyed by user id.
pub const USERS_COLLECTION: &str = "users";
/// Reserved collection of known rooms, keyed by room id.
pub const ROOMS_COLLECTION: &str = "rooms";

/// The process-wide key/collection store.
pub struct Memory {
    collections: RwLock<HashMap<String, HashMap<String, Value>>>,
    save_timer: Mutex<Option<JoinHandle<()>>>,
    save_lock: tokio::sync::Mutex<()>,
}

impl Memory {
    /// An empty memory with the reserved collections seeded.
    pub fn new() -> Self {
        let memory = Self {
            collections: RwLock::new(HashMap::new()),
            save_timer: Mutex::new(None),
            save_lock: tokio::sync::Mutex::new(()),
        };
        memory.seed();
        memory
    }

    fn seed(&self) {
        let mut map = self.collections.write().unwrap();
        for name in [USERS_COLLECTION, ROOMS_COLLECTION, DEFAULT_COLLECTION] {
            map.entry(name.to_string()).or_default();
        }
    }

    /// Store a value in the default collection.
    pub fn set(&self, key: &str, value: Value) {
        self.set_in(DEFAULT_COLLECTION, key, value);
    }

    /// Store a value in a named collection, creating the collection on
    /// first use. The store takes ownership, so callers keep no alias into
    /// memory.
    pub fn set_in(&self, collection: &str, key: &str, value: Value) {
        let mut map = self.collections.write().unwrap();
        map.entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Read a value from the default collection.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_in(DEFAULT_COLLECTION, key)
    }

    /// Read a value from a named collection.
    pub fn get_in(&self, collection: &str, key: &str) -> Option<Value> {
        let map = self.collections.read().unwrap();
        map.get(collection).and_then(|c| c.get(key)).cloned()
    }

    /// Remove a key from the default collection.
    pub fn unset(&self, key: &str) {
        self.unset_in(DEFAULT_COLLECTION, key);
    }

    /// Remove a key from a named collection.
    pub fn unset_in(&self, collection: &str, key: &str) {
        let mut map = self.collections.write().unwrap();
        if let Some(c) = map.get_mut(collection) {
            c.remove(key);
        }
    }

    /// Wipe this instance, leaving the reserved collections seeded empty.
    pub fn clear(&self) {
        self.collections.write().unwrap().clear();
        self.seed();
    }

    /// Upsert a user record, keyed by user id.
    pub fn remember_user(&self, user: &User) {
        if let Ok(value) = serde_json::to_value(user) {
            self.set_in(USERS_COLLECTION, &user.id, value);
        }
    }

    /// Upsert a room record, keyed by room id.
    pub fn remember_room(&self, room: &Room) {
        if let Ok(value) = serde_json::to_value(room) {
            self.set_in(ROOMS_COLLECTION, &room.id, value);
        }
    }

    /// Serialise the whole store as one JSON object keyed by collection.
    pub fn to_object(&self) -> Value {
        let map = self.collections.read().unwrap();
        let mut root = Map::new();
        for (name, collection) in map.iter() {
            let mut entries = Map::new();
            for (key, value) in collection {
                entries.insert(key.clone(), value.clone());
            }
            root.insert(name.clone(), Value::Object(entries));
        }
        Value::Object(root)
    }

    /// Merge a loaded snapshot into memory, collection by collection.
    /// Entries already present in memory win over loaded ones.
    pub fn merge_loaded(&self, loaded: Value) {
        let Value::Object(collections) = loaded else {
            log::warn!("[memory] loaded snapshot is not an object; ignoring");
            return;
        };
        let mut map = self.collections.write().unwrap();
        for (name, entries) in collections {
            let Value::Object(entries) = entries else {
                continue;
            };
            let collection = map.entry(name).or_default();
            for (key, value) in entries {
                collection.entry(key).or_insert(value);
            }
        }
    }

    /// Guard serialising snapshot writes; at most one save runs at a time.
    pub async fn save_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.save_lock.lock().await
    }

    /// Replace the periodic save task, aborting any previous one.
    pub fn arm_save_timer(&self, handle: JoinHandle<()>) {
        let mut timer = self.save_timer.lock().unwrap();
        if let Some(old) = timer.take() {
            old.abort();
        }
        *timer = Some(handle);
    }

    /// Stop the periodic save task.
    pub fn disarm_save_timer(&self) {
        let mut timer = self.save_timer.lock().unwrap();
        if let Some(old) = timer.take() {
            old.abort();
        }
    }

    /// Whether a periodic save task is armed.
    pub fn save_timer_armed(&self) -> bool {
        self.save_timer.lock().unwrap().is_some()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        self.disarm_save_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_default_collection() {
        let memory = Memory::new();
        memory.set("greeting", json!("hello"));
        assert_eq!(memory.get("greeting"), Some(json!("hello")));
        assert_eq!(memory.get("missing"), None);
    }

    #[test]
    fn test_reads_are_clones() {
        let memory = Memory::new();
        memory.set("list", json!([1, 2]));
        let mut copy = memory.get("list").unwrap();
        copy.as_array_mut().unwrap().push(json!(3));
        // The store is unaffected by mutation of the returned value.
        assert_eq!(memory.get("list"), Some(json!([1, 2])));
    }

    #[test]
    fn test_named_collections_and_unset() {
        let memory = Memory::new();
        memory.set_in("scores", "alice", json!(10));
        assert_eq!(memory.get_in("scores", "alice"), Some(json!(10)));
        memory.unset_in("scores", "alice");
        assert_eq!(memory.get_in("scores", "alice"), None);
    }

    #[test]
    fn test_remember_user_deduplicates_by_id() {
        let memory = Memory::new();
        memory.remember_user(&User::named("u1", "First"));
        memory.remember_user(&User::named("u1", "Renamed"));
        let stored = memory.get_in(USERS_COLLECTION, "u1").unwrap();
        assert_eq!(stored["name"], "Renamed");
        let object = memory.to_object();
        assert_eq!(object[USERS_COLLECTION].as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_clear_wipes_instance() {
        let memory = Memory::new();
        memory.set("key", json!(1));
        memory.set_in("custom", "key", json!(2));
        memory.clear();
        assert_eq!(memory.get("key"), None);
        assert_eq!(memory.get_in("custom", "key"), None);
        // Reserved collections exist again, empty.
        let object = memory.to_object();
        assert!(object[USERS_COLLECTION].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_merge_roundtrip() {
        let memory = Memory::new();
        memory.remember_user(&User::new("u1"));
        memory.set("counter", json!(7));
        let snapshot = memory.to_object();

        let restored = Memory::new();
        restored.merge_loaded(snapshot.clone());
        assert_eq!(restored.to_object(), snapshot);
    }

    #[test]
    fn test_merge_current_entries_win() {
        let memory = Memory::new();
        memory.set("counter", json!(7));
        memory.merge_loaded(json!({
            "private": {"counter": 1, "legacy": true},
            "archive": {"a": 1},
        }));
        assert_eq!(memory.get("counter"), Some(json!(7)));
        assert_eq!(memory.get("legacy"), Some(json!(true)));
        assert_eq!(memory.get_in("archive", "a"), Some(json!(1)));
    }
}
