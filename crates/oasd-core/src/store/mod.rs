//! Narrow state-store capability injected into every component.
//!
//! The engine coordinates through a process-wide key-value store it does not
//! own: progress strings, cancellation flags and the published catalog are a
//! rendezvous point shared with external observers (a UI). The store offers
//! per-key set/get only; every coordination invariant (single-flight,
//! debounced transitions) is enforced by the engine, never by the store.

mod dir;
mod memory;

pub mod keys;

pub use dir::DirStore;
pub use memory::MemoryStore;

use tokio::sync::watch;

/// get/put/remove/watch surface required from the host's parameter store.
///
/// Values are strings; booleans are stored as `"1"`/`"0"`. All methods are
/// infallible by contract: implementations log and swallow I/O errors, the
/// way the host treats non-blocking parameter writes.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn all_keys(&self) -> Vec<String>;

    /// Whole-store change counter, bumped on every put/remove. Lets callers
    /// wait for activity without polling individual keys.
    fn changes(&self) -> watch::Receiver<u64>;

    fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key).as_deref(), Some("1") | Some("true"))
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key)?.trim().parse().ok()
    }

    fn put_bool(&self, key: &str, value: bool) {
        self.put(key, if value { "1" } else { "0" });
    }

    fn put_int(&self, key: &str, value: i64) {
        self.put(key, &value.to_string());
    }
}
