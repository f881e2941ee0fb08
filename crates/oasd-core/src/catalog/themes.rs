//! Theme asset reconciliation and downloads.
//!
//! Manifest-less: driven by the mirror's directory-listing endpoint instead
//! of a JSON manifest. Each category republishes two lists on every pass:
//! what is already on disk ("available") and what only the mirror has
//! ("downloadable"). Downloads walk the category's candidate extensions and
//! retry once against the secondary mirror on verification failure.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::catalog::SyncError;
use crate::category::Category;
use crate::config::SyncConfig;
use crate::coordinator::CancelToken;
use crate::mirror::{Mirror, MirrorSet};
use crate::remote;
use crate::storage::{self, TEMP_SUFFIX};
use crate::store::{keys, StateStore};
use crate::transfer::{
    transfer, ProgressReporter, TransferError, PROGRESS_CANCELLED, PROGRESS_DOWNLOADED,
    PROGRESS_MIRRORS_OFFLINE,
};
use crate::verify::verify;

/// The factory wheel image; shipped with the device, never listed.
pub const STOCK_WHEEL_FILE: &str = "stock_wheel.png";

/// "father_time.png" -> "Father Time".
pub fn display_name(file_name: &str) -> String {
    let stem = file_name.split('.').next().unwrap_or(file_name);
    stem.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Directory listing: a JSON array of `{name}` objects.
pub fn parse_listing(body: &str) -> Result<Vec<String>, SyncError> {
    #[derive(Deserialize)]
    struct ListingEntry {
        name: String,
    }
    let entries: Vec<ListingEntry> =
        serde_json::from_str(body).map_err(|e| SyncError::ManifestUnavailable(e.to_string()))?;
    Ok(entries.into_iter().map(|e| e.name).collect())
}

/// Theme-side reconciler and download worker. Methods are blocking; the
/// engine runs them under `spawn_blocking` inside each category's slot.
/// Cloning shares the store and mirror set.
#[derive(Clone)]
pub struct ThemeSync {
    cfg: Arc<SyncConfig>,
    store: Arc<dyn StateStore>,
    mirrors: Arc<MirrorSet>,
}

impl ThemeSync {
    pub fn new(
        cfg: Arc<SyncConfig>,
        store: Arc<dyn StateStore>,
        mirrors: Arc<MirrorSet>,
    ) -> Self {
        Self {
            cfg,
            store,
            mirrors,
        }
    }

    fn progress(&self, category: Category) -> ProgressReporter {
        ProgressReporter::new(Arc::clone(&self.store), category.progress_key())
    }

    fn finish_failed(&self, category: Category, message: &str) {
        self.progress(category).set(message);
        self.store.remove(category.download_key());
    }

    /// Download one theme asset, trying each candidate extension on the
    /// resolved mirror and falling back to the secondary once.
    pub fn download_theme(&self, category: Category, name: &str, cancel: &CancelToken) {
        let item = name.to_lowercase().replace(' ', "_");
        let dir = category.local_dir(&self.cfg.paths);

        if category
            .extensions()
            .iter()
            .any(|ext| dir.join(format!("{}{}", item, ext)).exists())
        {
            tracing::info!("{} {} already exists, skipping download", category.display(), item);
            self.progress(category)
                .set(&format!("{} already exists...", category.display()));
            self.store.remove(category.download_key());
            return;
        }

        let Some(mirror) = self.mirrors.resolve() else {
            self.finish_failed(category, PROGRESS_MIRRORS_OFFLINE);
            return;
        };
        if self.try_mirror(category, &item, mirror, cancel) {
            return;
        }
        self.retry_secondary(category, &item, cancel);
    }

    /// Walk the extension list on one mirror. Returns true when a terminal
    /// state was reached (success, hard failure or cancellation); false
    /// means "not found or failed verification, try the secondary".
    fn try_mirror(
        &self,
        category: Category,
        item: &str,
        mirror: &Mirror,
        cancel: &CancelToken,
    ) -> bool {
        let progress = self.progress(category);
        let dir = category.local_dir(&self.cfg.paths);
        for ext in category.extensions() {
            let url = mirror.join(&format!("{}/{}{}", category.remote_dir(), item, ext));
            let dest = dir.join(format!("{}{}", item, ext));
            match transfer(&url, &dest, cancel, &progress, &self.cfg.transfer) {
                Ok(()) => {
                    if verify(&dest, &url, &self.cfg.transfer) {
                        tracing::info!(
                            "{} {} downloaded and verified",
                            category.display(),
                            item
                        );
                        self.refresh_category(category);
                        progress.set(PROGRESS_DOWNLOADED);
                        self.store.remove(category.download_key());
                        return true;
                    }
                    storage::delete_file(&dest);
                    return false;
                }
                Err(TransferError::NotFound) => continue, // next extension
                Err(TransferError::Cancelled) => {
                    self.finish_failed(category, PROGRESS_CANCELLED);
                    return true;
                }
                Err(e) => {
                    self.finish_failed(category, &e.progress_message());
                    return true;
                }
            }
        }
        false
    }

    fn retry_secondary(&self, category: Category, item: &str, cancel: &CancelToken) {
        if cancel.is_cancelled() {
            self.finish_failed(category, PROGRESS_CANCELLED);
            return;
        }
        tracing::warn!(
            "{} {} failed on primary mirror, retrying from secondary",
            category.display(),
            item
        );
        if self.try_mirror(category, item, self.mirrors.secondary(), cancel) {
            return;
        }
        self.finish_failed(category, &TransferError::Verification.progress_message());
    }

    /// Refresh the available/downloadable lists for every theme category.
    pub fn update_themes(&self) {
        if self.mirrors.resolve().is_none() {
            tracing::warn!("theme list refresh skipped: {}", SyncError::MirrorsOffline);
            return;
        }
        for category in Category::THEMES {
            self.refresh_category(category);
        }
    }

    fn refresh_category(&self, category: Category) {
        match self.fetch_listing(category) {
            Ok(listing) => self.publish_lists(category, &listing),
            Err(e) => tracing::warn!("{} list refresh failed: {}", category.display(), e),
        }
    }

    fn fetch_listing(&self, category: Category) -> Result<Vec<String>, SyncError> {
        let url = format!(
            "{}/{}",
            self.cfg.mirrors.listing_base.trim_end_matches('/'),
            category.remote_dir()
        );
        let body = remote::fetch_string(
            &url,
            Duration::from_secs(self.cfg.transfer.head_timeout_secs),
        )
        .map_err(|e| SyncError::ManifestUnavailable(e.to_string()))?;
        parse_listing(&body)
    }

    /// Republish "available" (on disk) and "downloadable" (remote-only).
    fn publish_lists(&self, category: Category, remote_files: &[String]) {
        let dir = category.local_dir(&self.cfg.paths);
        let mut available: Vec<String> = match fs::read_dir(&dir) {
            Ok(rd) => rd
                .flatten()
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|name| !(category == Category::Wheel && name == STOCK_WHEEL_FILE))
                .filter(|name| !name.ends_with(TEMP_SUFFIX))
                .map(|name| display_name(&name))
                .collect(),
            Err(_) => Vec::new(),
        };
        if category == Category::Wheel {
            available.push("Stock".to_string());
            available.push("None".to_string());
        }
        available.sort();
        available.dedup();
        self.store
            .put(category.available_key(), &available.join(","));

        let mut downloadable: Vec<String> = remote_files
            .iter()
            .map(|f| display_name(f))
            .filter(|n| !available.contains(n))
            .collect();
        downloadable.sort();
        downloadable.dedup();
        self.store
            .put(category.downloadable_key(), &downloadable.join(","));
        tracing::info!("{} lists updated", category.display());
    }

    /// Repopulate the active-theme wheel image from `source_dir`, matching
    /// `image` by file stem. Previous `wheel*` files are cleared first.
    pub fn swap_active_wheel(&self, source_dir: &Path, image: &str) {
        let save_dir = self.cfg.paths.active_theme_dir.join("images");
        if let Err(e) = fs::create_dir_all(&save_dir) {
            tracing::warn!("cannot prepare active theme dir: {}", e);
            return;
        }
        if let Ok(rd) = fs::read_dir(&save_dir) {
            for entry in rd.flatten() {
                if entry.file_name().to_string_lossy().starts_with("wheel") {
                    storage::delete_file(&entry.path());
                }
            }
        }

        let wanted = image.to_lowercase().replace(' ', "_");
        let Ok(rd) = fs::read_dir(source_dir) else {
            tracing::warn!("theme source missing: {}", source_dir.display());
            return;
        };
        for entry in rd.flatten() {
            let path = entry.path();
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_lowercase();
            if stem != wanted {
                continue;
            }
            let dest = match path.extension().and_then(|s| s.to_str()) {
                Some(ext) => save_dir.join(format!("wheel.{}", ext)),
                None => save_dir.join("wheel"),
            };
            match fs::copy(&path, &dest) {
                Ok(_) => tracing::info!("activated wheel image {}", path.display()),
                Err(e) => tracing::warn!("failed to activate wheel image: {}", e),
            }
            return;
        }
        tracing::warn!("no wheel image named {} under {}", wanted, source_dir.display());
    }

    /// Swap in a holiday theme's wheel image.
    pub fn apply_holiday_theme(&self, holiday_key: &str) {
        let source = self
            .cfg
            .paths
            .holiday_assets_dir
            .join(holiday_key)
            .join("images")
            .join("steering_wheel");
        self.swap_active_wheel(&source, holiday_key);
    }

    /// Re-apply the user's selected wheel (holiday over, or settings changed).
    pub fn apply_user_theme(&self) {
        let selected = self
            .store
            .get(keys::WHEEL_ICON)
            .unwrap_or_else(|| "stock_wheel".to_string());
        let source = Category::Wheel.local_dir(&self.cfg.paths);
        self.swap_active_wheel(&source, &selected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn theme_sync(themes_dir: &Path, active_dir: &Path) -> (ThemeSync, Arc<MemoryStore>) {
        let mut cfg = SyncConfig::default();
        cfg.paths.themes_dir = themes_dir.to_path_buf();
        cfg.paths.active_theme_dir = active_dir.to_path_buf();
        let store = Arc::new(MemoryStore::new());
        let mirrors = Arc::new(
            MirrorSet::from_config(&cfg.mirrors, Duration::from_millis(200)).unwrap(),
        );
        (
            ThemeSync::new(Arc::new(cfg), store.clone(), mirrors),
            store,
        )
    }

    #[test]
    fn display_name_title_cases_stems() {
        assert_eq!(display_name("father_time.png"), "Father Time");
        assert_eq!(display_name("frog.gif"), "Frog");
        assert_eq!(display_name("NEON_nights.zip"), "Neon Nights");
    }

    #[test]
    fn parse_listing_extracts_names() {
        let body = r#"[{"name": "father_time.png"}, {"name": "frog.gif"}]"#;
        assert_eq!(
            parse_listing(body).unwrap(),
            vec!["father_time.png".to_string(), "frog.gif".to_string()]
        );
        assert!(parse_listing("{}").is_err());
    }

    #[test]
    fn publish_lists_splits_available_and_downloadable() {
        let themes = tempfile::tempdir().unwrap();
        let active = tempfile::tempdir().unwrap();
        let (sync, store) = theme_sync(themes.path(), active.path());

        let wheels = themes.path().join("steering_wheels");
        fs::create_dir_all(&wheels).unwrap();
        fs::write(wheels.join("father_time.png"), b"img").unwrap();
        fs::write(wheels.join(STOCK_WHEEL_FILE), b"img").unwrap();

        let remote = vec!["father_time.png".to_string(), "frog.gif".to_string()];
        sync.publish_lists(Category::Wheel, &remote);

        assert_eq!(
            store.get(Category::Wheel.available_key()).as_deref(),
            Some("Father Time,None,Stock")
        );
        assert_eq!(
            store.get(Category::Wheel.downloadable_key()).as_deref(),
            Some("Frog")
        );
    }

    #[test]
    fn swap_active_wheel_replaces_previous_image() {
        let themes = tempfile::tempdir().unwrap();
        let active = tempfile::tempdir().unwrap();
        let (sync, _store) = theme_sync(themes.path(), active.path());

        let wheels = themes.path().join("steering_wheels");
        fs::create_dir_all(&wheels).unwrap();
        fs::write(wheels.join("father_time.png"), b"new").unwrap();

        let images = active.path().join("images");
        fs::create_dir_all(&images).unwrap();
        fs::write(images.join("wheel.gif"), b"old").unwrap();

        sync.swap_active_wheel(&wheels, "Father Time");

        assert!(!images.join("wheel.gif").exists());
        assert_eq!(fs::read(images.join("wheel.png")).unwrap(), b"new");
    }
}
