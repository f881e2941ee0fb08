//! Tick-driven scheduling state machine.
//!
//! Evaluated once per control cycle by the host process but only acts on
//! second/day boundaries: the minute rollover triggers the time-check pass
//! (connectivity gate, OS-update intents, map scheduling, catalog refresh)
//! and the theme list refresh, then holidays are evaluated. Long-running
//! work is offloaded through the single-flight coordinator so the loop
//! never blocks on network or disk I/O.

pub mod backup;
pub mod holiday;
pub mod maps;

use std::sync::Arc;

use chrono::{DateTime, Local, Timelike};

use crate::coordinator::Job;
use crate::engine::SyncEngine;
use crate::store::{keys, StateStore};
use holiday::HolidayTracker;

/// Host-written device state, read from the store each tick.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    pub started: bool,
    pub online: bool,
    pub screen_off: bool,
    pub time_valid: bool,
}

impl DeviceState {
    pub fn from_store(store: &dyn StateStore) -> Self {
        Self {
            started: store.get_bool(keys::DEVICE_STARTED),
            online: store.get_bool(keys::NETWORK_ONLINE),
            screen_off: store.get_bool(keys::SCREEN_OFF),
            time_valid: store.get_bool(keys::SYSTEM_TIME_VALID),
        }
    }
}

pub struct Scheduler {
    engine: Arc<SyncEngine>,
    holiday: HolidayTracker,
    minute_armed: bool,
    toggles_pending: bool,
    time_validated: bool,
    boot_backup_done: bool,
}

impl Scheduler {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            holiday: HolidayTracker::new(),
            minute_armed: false,
            toggles_pending: false,
            time_validated: false,
            boot_backup_done: false,
        }
    }

    /// One pass of the cooperative loop. Cheap unless a boundary fired.
    pub fn tick(&mut self, now: DateTime<Local>) {
        let device = DeviceState::from_store(self.engine.store());

        self.engine.poll_downloads();
        self.toggle_edge_pass(&device, now);

        if now.second() == 0 {
            self.minute_armed = true;
        } else if self.minute_armed || !self.time_validated {
            self.minute_armed = false;
            self.spawn_time_checks(&device, now);
            self.spawn_theme_refresh();

            if !self.time_validated {
                self.time_validated = device.time_valid;
                if !self.time_validated {
                    // Holiday and catalog decisions wait for a correct clock.
                    return;
                }
                self.spawn_catalog_boot_sync();
                self.boot_backups(&device, now);
            }

            self.holiday_pass(now);
        }
    }

    /// React exactly once to the falling edge of the toggle-change flag:
    /// re-apply the active theme and rotate the settings backup.
    fn toggle_edge_pass(&mut self, device: &DeviceState, now: DateTime<Local>) {
        if self.engine.store().get_bool(keys::TOGGLES_UPDATED) {
            self.toggles_pending = true;
            return;
        }
        if !self.toggles_pending {
            return;
        }
        self.toggles_pending = false;

        let holiday_id = self
            .engine
            .store()
            .get_int(keys::CURRENT_HOLIDAY_THEME)
            .unwrap_or(0);
        self.engine.swap_theme(holiday::key_for_id(holiday_id));

        if device.time_valid && !device.started {
            self.engine.spawn_settings_backup(now);
        }
    }

    /// One-time backups once the clock is valid.
    fn boot_backups(&mut self, device: &DeviceState, now: DateTime<Local>) {
        if self.boot_backup_done {
            return;
        }
        self.boot_backup_done = true;
        self.engine.spawn_system_backup(now);
        if !device.started {
            self.engine.spawn_settings_backup(now);
        }
    }

    fn spawn_time_checks(&self, device: &DeviceState, now: DateTime<Local>) {
        let engine = Arc::clone(&self.engine);
        let device = device.clone();
        self.engine
            .coordinator()
            .run_exclusive(Job::TimeChecks, async move {
                let res =
                    tokio::task::spawn_blocking(move || engine.time_checks(&device, now)).await;
                if let Err(e) = res {
                    tracing::warn!("time-check worker panicked: {}", e);
                }
            });
    }

    fn spawn_theme_refresh(&self) {
        let engine = Arc::clone(&self.engine);
        self.engine
            .coordinator()
            .run_exclusive(Job::ThemeRefresh, async move {
                let res = tokio::task::spawn_blocking(move || engine.themes().update_themes()).await;
                if let Err(e) = res {
                    tracing::warn!("theme refresh worker panicked: {}", e);
                }
            });
    }

    fn spawn_catalog_boot_sync(&self) {
        let engine = Arc::clone(&self.engine);
        self.engine
            .coordinator()
            .run_exclusive(Job::CatalogRefresh, async move {
                let res =
                    tokio::task::spawn_blocking(move || engine.models().update_models(true)).await;
                if let Err(e) = res {
                    tracing::warn!("catalog refresh worker panicked: {}", e);
                }
            });
    }

    fn holiday_pass(&mut self, now: DateTime<Local>) {
        if let Some(transition) = self.holiday.update(now.date_naive()) {
            tracing::info!("holiday theme transition: {}", transition.theme_id);
            self.engine
                .store()
                .put_int(keys::CURRENT_HOLIDAY_THEME, transition.theme_id);
            self.engine.swap_theme(transition.key);
            self.engine.notify_toggles_refreshed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    /// Engine with unreachable mirrors and throwaway directories: ticks run
    /// the full state machine but network passes bail out immediately.
    fn offline_engine(root: &std::path::Path) -> Arc<SyncEngine> {
        let mut cfg = SyncConfig::default();
        cfg.mirrors.primary_probe = "http://127.0.0.1:1".into();
        cfg.mirrors.secondary_probe = "http://127.0.0.1:1".into();
        cfg.transfer.probe_timeout_secs = 1;
        cfg.paths.models_dir = root.join("models");
        cfg.paths.themes_dir = root.join("themes");
        cfg.paths.active_theme_dir = root.join("active");
        cfg.paths.holiday_assets_dir = root.join("holiday");
        cfg.paths.settings_dir = root.join("settings");
        cfg.paths.storage_dir = root.join("storage");
        cfg.paths.maps_dir = root.join("maps");
        cfg.paths.system_root = root.join("system");
        cfg.paths.backups_dir = root.join("backups");
        cfg.paths.settings_backups_dir = root.join("settings_backups");
        std::fs::create_dir_all(root.join("system")).unwrap();
        std::fs::create_dir_all(root.join("settings")).unwrap();
        let store = Arc::new(MemoryStore::new());
        let storage = Arc::new(MemoryStore::new());
        SyncEngine::new(cfg, store, storage).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn holiday_transition_publishes_once() {
        let root = tempfile::tempdir().unwrap();
        let engine = offline_engine(root.path());
        engine.store().put_bool(keys::SYSTEM_TIME_VALID, true);
        let mut scheduler = Scheduler::new(Arc::clone(&engine));

        let christmas = Local.with_ymd_and_hms(2026, 12, 25, 10, 0, 1).unwrap();
        scheduler.tick(christmas);
        assert_eq!(
            engine.store().get_int(keys::CURRENT_HOLIDAY_THEME),
            Some(10)
        );
        // The transition pulses the toggle-refresh flag.
        assert!(engine.store().get_bool(keys::TOGGLES_UPDATED));

        // Same window a minute later: no re-publication.
        engine.store().put_int(keys::CURRENT_HOLIDAY_THEME, -1);
        let mut later = Scheduler::new(Arc::clone(&engine));
        later.time_validated = true;
        later.minute_armed = true;
        let _ = later.holiday.update(christmas.date_naive());
        later.tick(Local.with_ymd_and_hms(2026, 12, 25, 10, 1, 1).unwrap());
        assert_eq!(
            engine.store().get_int(keys::CURRENT_HOLIDAY_THEME),
            Some(-1)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_clock_defers_holiday_evaluation() {
        let root = tempfile::tempdir().unwrap();
        let engine = offline_engine(root.path());
        let mut scheduler = Scheduler::new(Arc::clone(&engine));

        scheduler.tick(Local.with_ymd_and_hms(2026, 12, 25, 10, 0, 1).unwrap());
        assert_eq!(engine.store().get_int(keys::CURRENT_HOLIDAY_THEME), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_zero_only_arms_the_minute_pass() {
        let root = tempfile::tempdir().unwrap();
        let engine = offline_engine(root.path());
        engine.store().put_bool(keys::SYSTEM_TIME_VALID, true);
        let mut scheduler = Scheduler::new(Arc::clone(&engine));
        scheduler.time_validated = true;

        scheduler.tick(Local.with_ymd_and_hms(2026, 12, 25, 10, 0, 0).unwrap());
        assert!(scheduler.minute_armed);
        assert_eq!(engine.store().get_int(keys::CURRENT_HOLIDAY_THEME), None);

        scheduler.tick(Local.with_ymd_and_hms(2026, 12, 25, 10, 0, 1).unwrap());
        assert!(!scheduler.minute_armed);
        assert_eq!(
            engine.store().get_int(keys::CURRENT_HOLIDAY_THEME),
            Some(10)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn toggle_falling_edge_rotates_settings_backup() {
        let root = tempfile::tempdir().unwrap();
        let engine = offline_engine(root.path());
        let store = engine.store();
        store.put_bool(keys::SYSTEM_TIME_VALID, true);
        store.put(keys::MODEL, "night-owl");
        let mut scheduler = Scheduler::new(Arc::clone(&engine));
        scheduler.time_validated = true;

        let now = Local.with_ymd_and_hms(2026, 6, 10, 10, 0, 30).unwrap();
        store.put_bool(keys::TOGGLES_UPDATED, true);
        scheduler.tick(now);
        assert!(scheduler.toggles_pending);

        store.put_bool(keys::TOGGLES_UPDATED, false);
        scheduler.tick(now);
        assert!(!scheduler.toggles_pending);

        // The backup worker runs in the background; wait for it to finish.
        while engine.coordinator().is_running(Job::SettingsBackup) {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let backups: Vec<_> = std::fs::read_dir(root.path().join("settings_backups"))
            .map(|rd| rd.flatten().collect())
            .unwrap_or_default();
        assert_eq!(backups.len(), 1);
    }
}
