//! Backup rotation: retention-pruned, dotfile-excluding directory copies.
//!
//! Before each new backup, auto-backups beyond the retention count are
//! removed, newest (by modification time) kept. The new backup lands in a
//! dated `<stamp>_auto` directory.

use std::fs;
use std::io;
use std::path::Path;

use chrono::{DateTime, Local};

use crate::config::SyncConfig;
use crate::store::{keys, StateStore};

const AUTO_SUFFIX: &str = "_auto";

/// Remove auto-backups beyond `limit`, ordered by modification time
/// descending.
pub fn cleanup_backups(directory: &Path, limit: usize) {
    let Ok(rd) = fs::read_dir(directory) else {
        return;
    };
    let mut backups: Vec<(std::time::SystemTime, std::path::PathBuf)> = rd
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter(|e| e.file_name().to_string_lossy().ends_with(AUTO_SUFFIX))
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((modified, e.path()))
        })
        .collect();
    backups.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, path) in backups.into_iter().skip(limit) {
        match fs::remove_dir_all(&path) {
            Ok(()) => tracing::info!("deleted oldest backup: {}", path.display()),
            Err(e) => tracing::warn!("failed to delete backup {}: {}", path.display(), e),
        }
    }
}

/// Recursive copy of `source` into `destination`, dotfiles excluded.
pub fn backup_directory(source: &Path, destination: &Path) -> io::Result<()> {
    fs::create_dir_all(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        let target = destination.join(&name);
        if entry.file_type()?.is_dir() {
            backup_directory(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Directory name stamp, e.g. `2026-08-06_0412pm` style (lowercased).
pub fn backup_stamp(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d_%I-%M%p").to_string().to_lowercase()
}

fn rotate(source: &Path, root: &Path, limit: usize, now: DateTime<Local>) {
    cleanup_backups(root, limit);
    let destination = root.join(format!("{}{}", backup_stamp(now), AUTO_SUFFIX));
    match backup_directory(source, &destination) {
        Ok(()) => tracing::info!(
            "backed up {} to {}",
            source.display(),
            destination.display()
        ),
        Err(e) if e.raw_os_error() == Some(28) => {
            tracing::warn!("not enough space to perform the backup");
        }
        Err(e) => tracing::warn!("failed to back up {}: {}", source.display(), e),
    }
}

/// Full-system backup of the software root (retention 4).
pub fn backup_system(cfg: &SyncConfig, now: DateTime<Local>) {
    rotate(
        &cfg.paths.system_root,
        &cfg.paths.backups_dir,
        cfg.backup.full_retention,
        now,
    );
}

/// Settings backup (retention 9): snapshot the persisted-settings namespace
/// into the storage store, then copy the settings directory.
pub fn backup_settings(
    cfg: &SyncConfig,
    store: &dyn StateStore,
    storage: &dyn StateStore,
    now: DateTime<Local>,
) {
    for key in store.all_keys() {
        if !keys::is_persisted(&key) {
            continue;
        }
        if let Some(value) = store.get(&key) {
            storage.put(&key, &value);
        }
    }
    rotate(
        &cfg.paths.settings_dir,
        &cfg.paths.settings_backups_dir,
        cfg.backup.settings_retention,
        now,
    );
}
