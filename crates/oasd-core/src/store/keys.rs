//! Store key names owned by the engine.
//!
//! Per-category download/progress/cancel keys live on [`crate::category::Category`];
//! everything else is listed here. External writers use the `*ToDownload`
//! keys and `DownloadAllModels` to request work.

/// Published model catalog (rebuilt wholesale on each manifest fetch).
pub const AVAILABLE_MODELS: &str = "AvailableModels";
pub const AVAILABLE_MODEL_NAMES: &str = "AvailableModelNames";
pub const EXPERIMENTAL_MODELS: &str = "ExperimentalModels";
pub const NAVIGATION_MODELS: &str = "NavigationModels";
pub const RADARLESS_MODELS: &str = "RadarlessModels";

/// True only when every catalog entry is present locally.
pub const MODELS_DOWNLOADED: &str = "ModelsDownloaded";

/// Policy flag: re-fetch stale models and fetch missing ones automatically.
pub const AUTOMATICALLY_UPDATE_MODELS: &str = "AutomaticallyUpdateModels";

/// Currently selected model identity and display name.
pub const MODEL: &str = "Model";
pub const MODEL_NAME: &str = "ModelName";

/// Request flag: drain the whole model catalog.
pub const DOWNLOAD_ALL_MODELS: &str = "DownloadAllModels";

/// Active holiday theme id (0 = none).
pub const CURRENT_HOLIDAY_THEME: &str = "CurrentHolidayTheme";

/// Pulsed after settings changes so observers reload; its falling edge is
/// the scheduler's toggle-change event.
pub const TOGGLES_UPDATED: &str = "TogglesUpdated";

/// Map-update scheduling.
pub const MAPS_SELECTED: &str = "MapsSelected";
pub const PREFERRED_SCHEDULE: &str = "PreferredSchedule";
pub const LAST_MAPS_UPDATE: &str = "LastMapsUpdate";
pub const OSM_DOWNLOAD_LOCATIONS: &str = "OSMDownloadLocations";
pub const OSM_DOWNLOAD_PROGRESS: &str = "OSMDownloadProgress";

/// OS updater handshake (read) and published intents (written).
pub const UPDATER_FETCH_AVAILABLE: &str = "UpdaterFetchAvailable";
pub const UPDATE_AVAILABLE: &str = "UpdateAvailable";
pub const UPDATER_STATE: &str = "UpdaterState";
pub const UPDATER_REBOOT_REQUESTED: &str = "UpdaterRebootRequested";
pub const UPDATER_TRIGGER_FETCH: &str = "UpdaterTriggerFetch";
pub const UPDATER_TRIGGER_CHECK: &str = "UpdaterTriggerCheck";

/// Host-written device state consumed each tick.
pub const DEVICE_STARTED: &str = "DeviceStarted";
pub const NETWORK_ONLINE: &str = "NetworkOnline";
pub const SCREEN_OFF: &str = "ScreenOff";
pub const SYSTEM_TIME_VALID: &str = "SystemTimeValid";

/// Policy flag: allow automatic OS update checks.
pub const AUTOMATIC_UPDATES: &str = "AutomaticUpdates";

/// The user's selected steering wheel image (file stem).
pub const WHEEL_ICON: &str = "WheelIcon";

/// Keys in the engine's persisted-settings namespace. Settings backups
/// snapshot exactly these into the storage store before copying the
/// settings directory.
pub const PERSISTED_SETTINGS: &[&str] = &[
    AUTOMATIC_UPDATES,
    AUTOMATICALLY_UPDATE_MODELS,
    MAPS_SELECTED,
    MODEL,
    MODEL_NAME,
    PREFERRED_SCHEDULE,
    WHEEL_ICON,
];

/// True when `key` belongs to the persisted-settings namespace.
pub fn is_persisted(key: &str) -> bool {
    PERSISTED_SETTINGS.contains(&key)
}
