//! Engine façade: owns the config, the stores, the mirror set and the
//! single-flight coordinator, and translates download-request store keys
//! into category workers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Local};

use crate::catalog::models::ModelSync;
use crate::catalog::themes::ThemeSync;
use crate::category::Category;
use crate::config::SyncConfig;
use crate::coordinator::{Coordinator, Job};
use crate::mirror::MirrorSet;
use crate::scheduler::{backup, maps, DeviceState};
use crate::store::{keys, StateStore};

pub struct SyncEngine {
    cfg: Arc<SyncConfig>,
    store: Arc<dyn StateStore>,
    storage: Arc<dyn StateStore>,
    mirrors: Arc<MirrorSet>,
    coordinator: Coordinator,
    models: ModelSync,
    themes: ThemeSync,
}

impl SyncEngine {
    /// `store` is the shared rendezvous store (requests, progress, catalog);
    /// `storage` only receives persisted-settings snapshots during backups.
    pub fn new(
        cfg: SyncConfig,
        store: Arc<dyn StateStore>,
        storage: Arc<dyn StateStore>,
    ) -> Result<Arc<Self>> {
        let cfg = Arc::new(cfg);
        let mirrors = Arc::new(MirrorSet::from_config(
            &cfg.mirrors,
            Duration::from_secs(cfg.transfer.probe_timeout_secs),
        )?);
        let models = ModelSync::new(Arc::clone(&cfg), Arc::clone(&store), Arc::clone(&mirrors));
        let themes = ThemeSync::new(Arc::clone(&cfg), Arc::clone(&store), Arc::clone(&mirrors));
        Ok(Arc::new(Self {
            cfg,
            store,
            storage,
            mirrors,
            coordinator: Coordinator::new(),
            models,
            themes,
        }))
    }

    pub fn store(&self) -> &dyn StateStore {
        &*self.store
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn models(&self) -> &ModelSync {
        &self.models
    }

    pub fn themes(&self) -> &ThemeSync {
        &self.themes
    }

    pub fn config(&self) -> &SyncConfig {
        &self.cfg
    }

    /// One dispatch pass: trip observed cancellations, then turn pending
    /// request keys into single-flight workers. Never blocks.
    pub fn poll_downloads(&self) {
        for category in Category::ALL {
            if self.store.get_bool(category.cancel_key()) {
                // Observed: trip the in-flight token and clear the key.
                self.coordinator.request_cancel(category);
                self.store.remove(category.cancel_key());
            }
        }

        if let Some(model) = self.pending_request(Category::Model.download_key()) {
            let models = self.models.clone();
            let token = self.coordinator.cancel_token(Category::Model);
            self.coordinator
                .run_exclusive(Job::Download(Category::Model), async move {
                    let res = tokio::task::spawn_blocking(move || {
                        models.download_model(&model, &token)
                    })
                    .await;
                    if let Err(e) = res {
                        tracing::warn!("model download worker panicked: {}", e);
                    }
                });
        }

        if self.store.get_bool(keys::DOWNLOAD_ALL_MODELS) {
            let models = self.models.clone();
            let token = self.coordinator.cancel_token(Category::Model);
            self.coordinator
                .run_exclusive(Job::Download(Category::Model), async move {
                    let res =
                        tokio::task::spawn_blocking(move || models.download_all(&token)).await;
                    if let Err(e) = res {
                        tracing::warn!("model drain worker panicked: {}", e);
                    }
                });
        }

        for category in Category::THEMES {
            if let Some(name) = self.pending_request(category.download_key()) {
                let themes = self.themes.clone();
                let token = self.coordinator.cancel_token(category);
                self.coordinator
                    .run_exclusive(Job::Download(category), async move {
                        let res = tokio::task::spawn_blocking(move || {
                            themes.download_theme(category, &name, &token)
                        })
                        .await;
                        if let Err(e) = res {
                            tracing::warn!(
                                "{} download worker panicked: {}",
                                category.display(),
                                e
                            );
                        }
                    });
            }
        }
    }

    fn pending_request(&self, key: &str) -> Option<String> {
        self.store.get(key).filter(|v| !v.is_empty())
    }

    /// The minute-rollover pass: connectivity gate, OS-update intents, map
    /// scheduling and the model catalog refresh. Blocking; runs in the
    /// TimeChecks slot.
    pub fn time_checks(&self, device: &DeviceState, now: DateTime<Local>) {
        if !device.online {
            return;
        }
        if self.mirrors.resolve().is_none() {
            return;
        }

        if self.store.get_bool(keys::AUTOMATIC_UPDATES) && device.screen_off {
            self.update_check(device.started);
        }

        let maps_downloaded = self.cfg.paths.maps_dir.exists();
        maps::update_maps(&*self.store, now.date_naive(), maps_downloaded);

        self.models.update_models(false);
    }

    /// OS updates are out of scope; publish intents for the host to act on.
    fn update_check(&self, started: bool) {
        let update_ready = self.store.get_bool(keys::UPDATE_AVAILABLE);
        let fetch_available = self.store.get_bool(keys::UPDATER_FETCH_AVAILABLE);
        let updater_idle = self.store.get(keys::UPDATER_STATE).as_deref() == Some("idle");

        if update_ready && !started {
            self.store.put_bool(keys::UPDATER_REBOOT_REQUESTED, true);
        } else if fetch_available {
            self.store.put_bool(keys::UPDATER_TRIGGER_FETCH, true);
        } else if updater_idle {
            self.store.put_bool(keys::UPDATER_TRIGGER_CHECK, true);
        }
    }

    /// Swap the active theme: a holiday's assets, or the user's selection.
    pub fn swap_theme(&self, holiday_key: Option<&str>) {
        match holiday_key {
            Some(key) => self.themes.apply_holiday_theme(key),
            None => self.themes.apply_user_theme(),
        }
    }

    /// Pulse the toggle-refresh flag so observers reload settings.
    pub fn notify_toggles_refreshed(&self) {
        self.store.put_bool(keys::TOGGLES_UPDATED, true);
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            store.put_bool(keys::TOGGLES_UPDATED, false);
        });
    }

    pub fn spawn_settings_backup(&self, now: DateTime<Local>) {
        let cfg = Arc::clone(&self.cfg);
        let store = Arc::clone(&self.store);
        let storage = Arc::clone(&self.storage);
        self.coordinator
            .run_exclusive(Job::SettingsBackup, async move {
                let res = tokio::task::spawn_blocking(move || {
                    backup::backup_settings(&cfg, &*store, &*storage, now)
                })
                .await;
                if let Err(e) = res {
                    tracing::warn!("settings backup worker panicked: {}", e);
                }
            });
    }

    pub fn spawn_system_backup(&self, now: DateTime<Local>) {
        let cfg = Arc::clone(&self.cfg);
        self.coordinator
            .run_exclusive(Job::SystemBackup, async move {
                let res =
                    tokio::task::spawn_blocking(move || backup::backup_system(&cfg, now)).await;
                if let Err(e) = res {
                    tracing::warn!("system backup worker panicked: {}", e);
                }
            });
    }
}
