//! File-per-key store implementation: the persistent settings store.
//!
//! One file per key under a root directory, so the settings namespace can be
//! backed up with a plain directory copy. Writes go through a temp file and
//! rename so readers never observe a torn value.

use std::fs;
use std::path::{Path, PathBuf};

use tokio::sync::watch;

use super::StateStore;

pub struct DirStore {
    root: PathBuf,
    changes_tx: watch::Sender<u64>,
}

impl DirStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(root)?;
        let (changes_tx, _) = watch::channel(0);
        Ok(Self {
            root: root.to_path_buf(),
            changes_tx,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn bump(&self) {
        self.changes_tx.send_modify(|v| *v += 1);
    }
}

impl StateStore for DirStore {
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.key_path(key)).ok()
    }

    fn put(&self, key: &str, value: &str) {
        let path = self.key_path(key);
        let tmp = self.root.join(format!(".{}.tmp", key));
        let res = fs::write(&tmp, value).and_then(|_| fs::rename(&tmp, &path));
        if let Err(e) = res {
            tracing::warn!("store write {} failed: {}", key, e);
            return;
        }
        self.bump();
    }

    fn remove(&self, key: &str) {
        match fs::remove_file(self.key_path(key)) {
            Ok(()) => self.bump(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("store remove {} failed: {}", key, e),
        }
    }

    fn all_keys(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        entries
            .flatten()
            .filter(|e| e.path().is_file())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|name| !name.starts_with('.'))
            .collect()
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persists_values_as_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        store.put("ModelName", "Baseline V2 (Default)");
        assert_eq!(
            fs::read_to_string(dir.path().join("ModelName")).unwrap(),
            "Baseline V2 (Default)"
        );
        assert_eq!(
            store.get("ModelName").as_deref(),
            Some("Baseline V2 (Default)")
        );
    }

    #[test]
    fn remove_missing_key_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        store.remove("NeverExisted");
        assert!(store.all_keys().is_empty());
    }

    #[test]
    fn all_keys_skips_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        store.put("A", "1");
        fs::write(dir.path().join(".B.tmp"), "junk").unwrap();
        assert_eq!(store.all_keys(), vec!["A".to_string()]);
    }
}
