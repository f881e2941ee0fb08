//! Model catalog reconciliation and model downloads.
//!
//! The catalog is rebuilt wholesale from each successful manifest fetch and
//! never partially merged; a failed fetch leaves the previous catalog
//! untouched. Local models are then classified as present, stale or missing
//! against the declared sizes, and anything not listed by the catalog is
//! deleted (selection falling back to the default model when needed).

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::manifest::{self, ModelEntry};
use crate::catalog::SyncError;
use crate::category::Category;
use crate::config::SyncConfig;
use crate::coordinator::CancelToken;
use crate::mirror::{Mirror, MirrorSet};
use crate::remote;
use crate::storage;
use crate::store::{keys, StateStore};
use crate::transfer::{
    transfer, ProgressReporter, TransferError, PROGRESS_ALL_MODELS_DOWNLOADED,
    PROGRESS_CANCELLED, PROGRESS_DOWNLOADED, PROGRESS_MIRRORS_OFFLINE,
};
use crate::verify::verify;

/// Identity selection falls back to when the selected model is pruned.
pub const DEFAULT_MODEL: &str = "baseline-v2";
pub const DEFAULT_MODEL_NAME: &str = "Baseline V2 (Default)";

/// On-disk extension for model weights.
pub const MODEL_EXTENSION: &str = ".bin";

/// Reduce a display name to the per-model parameter key prefix: decorations,
/// spaces, the default marker and dashes all stripped.
pub fn clean_model_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '(' | ')' | '-'))
        .collect();
    kept.replace("(Default)", "").replace('-', "")
}

/// Model-side reconciler and download worker. Methods are blocking; the
/// engine runs them under `spawn_blocking` inside the Model category slot.
/// Cloning shares the store and mirror set.
#[derive(Clone)]
pub struct ModelSync {
    cfg: Arc<SyncConfig>,
    store: Arc<dyn StateStore>,
    mirrors: Arc<MirrorSet>,
}

impl ModelSync {
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

    fn model_path(&self, id: &str) -> PathBuf {
        self.cfg
            .paths
            .models_dir
            .join(format!("{}{}", id, MODEL_EXTENSION))
    }

    fn model_url(&self, mirror: &Mirror, id: &str) -> String {
        mirror.join(&format!(
            "{}/{}{}",
            Category::Model.remote_dir(),
            id,
            MODEL_EXTENSION
        ))
    }

    fn progress(&self) -> ProgressReporter {
        ProgressReporter::new(Arc::clone(&self.store), Category::Model.progress_key())
    }

    /// Publish a terminal failure and clear both request keys.
    fn finish_failed(&self, message: &str) {
        self.progress().set(message);
        self.store.remove(Category::Model.download_key());
        self.store.remove(keys::DOWNLOAD_ALL_MODELS);
    }

    /// Refresh the published catalog from the remote manifest, then classify
    /// local models. The boot pass additionally installs the bundled default
    /// model and prunes models the previous catalog no longer lists.
    pub fn update_models(&self, boot_run: bool) {
        if boot_run {
            self.install_default_model();
            self.prune_unlisted_models();
        }

        let Some(mirror) = self.mirrors.resolve() else {
            tracing::warn!("model catalog refresh skipped: {}", SyncError::MirrorsOffline);
            return;
        };
        let url = manifest::manifest_url(mirror, &self.cfg.mirrors.manifest_version);
        let entries = match manifest::fetch_manifest(&url, &self.cfg.transfer) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("model catalog refresh aborted: {}", e);
                return;
            }
        };
        if entries.is_empty() {
            tracing::warn!("empty model manifest, keeping previous catalog");
            return;
        }

        self.publish_catalog(&entries);
        let all_present = self.reconcile(mirror, &entries);
        self.store.put_bool(keys::MODELS_DOWNLOADED, all_present);
    }

    /// Replace all published catalog parameters from the new manifest.
    fn publish_catalog(&self, entries: &[ModelEntry]) {
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        let experimental: Vec<&str> = entries
            .iter()
            .filter(|e| e.experimental)
            .map(|e| e.id.as_str())
            .collect();
        let navigation: Vec<&str> = entries
            .iter()
            .filter(|e| e.navigation)
            .map(|e| e.id.as_str())
            .collect();
        let radarless: Vec<&str> = entries
            .iter()
            .filter(|e| !e.radar)
            .map(|e| e.id.as_str())
            .collect();

        self.store.put(keys::AVAILABLE_MODELS, &ids.join(","));
        self.store
            .put(keys::AVAILABLE_MODEL_NAMES, &names.join(","));
        self.store
            .put(keys::EXPERIMENTAL_MODELS, &experimental.join(","));
        self.store
            .put(keys::NAVIGATION_MODELS, &navigation.join(","));
        self.store.put(keys::RADARLESS_MODELS, &radarless.join(","));
        tracing::info!("model catalog updated: {} entries", entries.len());
    }

    /// Classify every catalog entry as present, stale or missing. Returns
    /// true only when every entry is present and current.
    fn reconcile(&self, mirror: &Mirror, entries: &[ModelEntry]) -> bool {
        let auto_update = self.store.get_bool(keys::AUTOMATICALLY_UPDATE_MODELS);
        let head_timeout = Duration::from_secs(self.cfg.transfer.head_timeout_secs);
        let mut all_present = true;

        for entry in entries {
            let path = self.model_path(&entry.id);
            if path.exists() {
                if !auto_update {
                    continue;
                }
                let Ok(meta) = fs::metadata(&path) else {
                    continue;
                };
                let url = self.model_url(mirror, &entry.id);
                if let Ok(Some(remote_size)) = remote::remote_file_size(&url, head_timeout) {
                    if remote_size != meta.len() {
                        tracing::info!("model {} is outdated, re-downloading", entry.id);
                        storage::delete_file(&path);
                        self.remove_model_params(&entry.name);
                        self.queue_download(&entry.id);
                        all_present = false;
                    }
                }
            } else {
                if auto_update {
                    tracing::info!("model {} isn't downloaded, downloading", entry.id);
                    self.remove_model_params(&entry.name);
                    self.queue_download(&entry.id);
                }
                all_present = false;
            }
        }
        all_present
    }

    /// Stale calibration state must not survive a model swap.
    fn remove_model_params(&self, display_name: &str) {
        let base = clean_model_name(display_name);
        self.store.remove(&format!("{}CalibrationParams", base));
        self.store.remove(&format!("{}LiveTorqueParameters", base));
    }

    /// Queue one download request; a request already pending is left alone
    /// and the next refresh pass re-queues whatever is still missing.
    fn queue_download(&self, id: &str) {
        let key = Category::Model.download_key();
        if self.store.get(key).is_none() {
            self.store.put(key, id);
        }
    }

    /// Download a single model with verify-then-secondary-mirror retry.
    pub fn download_model(&self, id: &str, cancel: &CancelToken) {
        let progress = self.progress();
        let path = self.model_path(id);
        if path.exists() {
            tracing::info!("model {} already exists, skipping download", id);
            progress.set("Model already exists...");
            self.store.remove(Category::Model.download_key());
            return;
        }

        let Some(mirror) = self.mirrors.resolve() else {
            self.finish_failed(PROGRESS_MIRRORS_OFFLINE);
            return;
        };
        let url = self.model_url(mirror, id);
        tracing::info!("downloading model: {}", id);
        match transfer(&url, &path, cancel, &progress, &self.cfg.transfer) {
            Ok(()) => {
                if verify(&path, &url, &self.cfg.transfer) {
                    tracing::info!("model {} downloaded and verified", id);
                    progress.set(PROGRESS_DOWNLOADED);
                    self.store.remove(Category::Model.download_key());
                } else {
                    storage::delete_file(&path);
                    self.retry_secondary(id, cancel);
                }
            }
            Err(TransferError::NotFound) => self.retry_secondary(id, cancel),
            Err(TransferError::Cancelled) => self.finish_failed(PROGRESS_CANCELLED),
            Err(e) => self.finish_failed(&e.progress_message()),
        }
    }

    /// Exactly one retry against the secondary mirror after a verification
    /// failure (or 404) on the resolved mirror.
    fn retry_secondary(&self, id: &str, cancel: &CancelToken) {
        if cancel.is_cancelled() {
            self.finish_failed(PROGRESS_CANCELLED);
            return;
        }
        tracing::warn!("model {} failed verification, retrying from secondary mirror", id);
        let progress = self.progress();
        let path = self.model_path(id);
        let url = self.model_url(self.mirrors.secondary(), id);
        match transfer(&url, &path, cancel, &progress, &self.cfg.transfer) {
            Ok(()) => {
                if verify(&path, &url, &self.cfg.transfer) {
                    tracing::info!("model {} recovered from secondary mirror", id);
                    progress.set(PROGRESS_DOWNLOADED);
                    self.store.remove(Category::Model.download_key());
                } else {
                    storage::delete_file(&path);
                    self.finish_failed(&TransferError::Verification.progress_message());
                }
            }
            Err(TransferError::Cancelled) => self.finish_failed(PROGRESS_CANCELLED),
            Err(e) => self.finish_failed(&e.progress_message()),
        }
    }

    /// Drain the full catalog sequentially inside the Model category slot,
    /// checking the cancellation flag before each asset.
    pub fn download_all(&self, cancel: &CancelToken) {
        let progress = self.progress();
        let Some(mirror) = self.mirrors.resolve() else {
            self.finish_failed(PROGRESS_MIRRORS_OFFLINE);
            return;
        };
        let url = manifest::manifest_url(mirror, &self.cfg.mirrors.manifest_version);
        let entries = match manifest::fetch_manifest(&url, &self.cfg.transfer) {
            Ok(entries) if !entries.is_empty() => entries,
            _ => {
                self.finish_failed("Unable to update model list...");
                return;
            }
        };

        for entry in &entries {
            if cancel.is_cancelled() {
                self.finish_failed(PROGRESS_CANCELLED);
                return;
            }
            let path = self.model_path(&entry.id);
            if path.exists() {
                continue;
            }

            tracing::info!("downloading model: {}", entry.name);
            progress.set(&format!("Downloading {}...", entry.name));
            let url = self.model_url(mirror, &entry.id);
            let verified = match transfer(&url, &path, cancel, &progress, &self.cfg.transfer) {
                Ok(()) => verify(&path, &url, &self.cfg.transfer),
                Err(TransferError::Cancelled) => {
                    self.finish_failed(PROGRESS_CANCELLED);
                    return;
                }
                Err(TransferError::NotFound) => false,
                Err(e) => {
                    self.finish_failed(&e.progress_message());
                    return;
                }
            };
            if verified {
                continue;
            }

            // One retry against the secondary; a second failure aborts the drain.
            storage::delete_file(&path);
            let url = self.model_url(self.mirrors.secondary(), &entry.id);
            match transfer(&url, &path, cancel, &progress, &self.cfg.transfer) {
                Ok(()) => {
                    if !verify(&path, &url, &self.cfg.transfer) {
                        storage::delete_file(&path);
                        self.finish_failed(&TransferError::Verification.progress_message());
                        return;
                    }
                }
                Err(TransferError::Cancelled) => {
                    self.finish_failed(PROGRESS_CANCELLED);
                    return;
                }
                Err(e) => {
                    self.finish_failed(&e.progress_message());
                    return;
                }
            }
        }

        progress.set(PROGRESS_ALL_MODELS_DOWNLOADED);
        self.store.remove(keys::DOWNLOAD_ALL_MODELS);
        self.store.put_bool(keys::MODELS_DOWNLOADED, true);
    }

    /// Delete local models the published catalog no longer lists; selection
    /// falls back to the default identity when the pruned model was active.
    pub fn prune_unlisted_models(&self) {
        if let Some(name) = self.store.get(keys::MODEL_NAME) {
            // Normalize a stray default marker left on a non-default name.
            if name.contains("(Default)") && name != DEFAULT_MODEL_NAME {
                self.store
                    .put(keys::MODEL_NAME, name.replace(" (Default)", "").trim());
            }
        }

        let Some(available) = self.store.get(keys::AVAILABLE_MODELS) else {
            return;
        };
        if available.is_empty() {
            return;
        }
        let listed: Vec<&str> = available.split(',').collect();
        let current = self.store.get(keys::MODEL);

        let Ok(dir) = fs::read_dir(&self.cfg.paths.models_dir) else {
            return;
        };
        for entry in dir.flatten() {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            let stem = name.strip_suffix(MODEL_EXTENSION).unwrap_or(name);
            if listed.contains(&stem) {
                continue;
            }
            if current.as_deref() == Some(stem) {
                self.store.put(keys::MODEL, DEFAULT_MODEL);
                self.store.put(keys::MODEL_NAME, DEFAULT_MODEL_NAME);
            }
            storage::delete_file(&entry.path());
        }
    }

    /// Install the bundled default model on first boot.
    pub fn install_default_model(&self) {
        let dest = self.model_path(DEFAULT_MODEL);
        if dest.exists() {
            return;
        }
        let source = &self.cfg.paths.default_model_source;
        if !source.exists() {
            tracing::warn!("bundled default model not found at {}", source.display());
            return;
        }
        if let Some(parent) = dest.parent() {
            let _ = fs::create_dir_all(parent);
        }
        match fs::copy(source, &dest) {
            Ok(_) => tracing::info!("installed default model at {}", dest.display()),
            Err(e) => tracing::warn!("failed to install default model: {}", e),
        }
    }
}
