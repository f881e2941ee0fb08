//! In-process store implementation: the volatile rendezvous store.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::watch;

use super::StateStore;

/// HashMap-backed store. Cheap to construct in tests; the daemon uses one as
/// the shared-memory analog for progress/cancel keys.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    changes_tx: watch::Sender<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes_tx, _) = watch::channel(0);
        Self {
            entries: RwLock::new(HashMap::new()),
            changes_tx,
        }
    }

    fn bump(&self) {
        self.changes_tx.send_modify(|v| *v += 1);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().unwrap().get(key).cloned()
    }

    fn put(&self, key: &str, value: &str) {
        self.entries
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        self.bump();
    }

    fn remove(&self, key: &str) {
        self.entries.write().unwrap().remove(key);
        self.bump();
    }

    fn all_keys(&self) -> Vec<String> {
        self.entries.read().unwrap().keys().cloned().collect()
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes_tx.subscribe()
    }
}
