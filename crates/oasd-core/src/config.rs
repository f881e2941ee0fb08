use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Mirror endpoints (optional `[mirrors]` section in config.toml).
///
/// `primary_base`/`secondary_base` are the roots of two identical asset
/// trees; the probe URLs are what the resolver pings to decide reachability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Base URL of the primary asset tree.
    pub primary_base: String,
    /// Base URL of the secondary (failover) asset tree.
    pub secondary_base: String,
    /// URL probed to decide whether the primary host is reachable.
    pub primary_probe: String,
    /// URL probed to decide whether the secondary host is reachable.
    pub secondary_probe: String,
    /// Directory-listing endpoint for theme assets (JSON array of `{name}`).
    pub listing_base: String,
    /// Version tag in the model manifest filename (`model_names_<tag>.json`).
    pub manifest_version: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            primary_base: "https://raw.githubusercontent.com/oasd-project/assets/main/".into(),
            secondary_base: "https://gitlab.com/oasd-project/assets/-/raw/main/".into(),
            primary_probe: "https://github.com".into(),
            secondary_probe: "https://gitlab.com".into(),
            listing_base: "https://api.github.com/repos/oasd-project/assets/contents".into(),
            manifest_version: "v5".into(),
        }
    }
}

/// Filesystem layout consumed and produced by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    /// Directory holding downloaded model weights.
    pub models_dir: PathBuf,
    /// Root of the theme-asset tree (one sub-directory per category).
    pub themes_dir: PathBuf,
    /// Directory repopulated on every theme swap; read by the UI.
    pub active_theme_dir: PathBuf,
    /// Bundled holiday theme assets, one sub-directory per theme.
    pub holiday_assets_dir: PathBuf,
    /// Bundled copy of the default model, installed on first boot.
    pub default_model_source: PathBuf,
    /// Directory backing the persistent settings store.
    pub settings_dir: PathBuf,
    /// Directory backing the storage store settings are snapshotted into.
    pub storage_dir: PathBuf,
    /// Presence of this directory means offline maps are downloaded.
    pub maps_dir: PathBuf,
    /// Root copied by full-system backups.
    pub system_root: PathBuf,
    /// Destination root for full-system backups.
    pub backups_dir: PathBuf,
    /// Destination root for settings-only backups.
    pub settings_backups_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            models_dir: "/data/models".into(),
            themes_dir: "/data/themes".into(),
            active_theme_dir: "/data/active_theme".into(),
            holiday_assets_dir: "/data/holiday_themes".into(),
            default_model_source: "/usr/share/oasd/baseline-v2.bin".into(),
            settings_dir: "/data/settings".into(),
            storage_dir: "/persist/settings".into(),
            maps_dir: "/data/maps/offline".into(),
            system_root: "/data/oasd".into(),
            backups_dir: "/data/backups".into(),
            settings_backups_dir: "/data/settings_backups".into(),
        }
    }
}

/// Network timeouts and stall limits for probes and transfers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Connect timeout for streaming GETs, in seconds.
    pub connect_timeout_secs: u64,
    /// Total timeout for reachability probes, in seconds.
    pub probe_timeout_secs: u64,
    /// Total timeout for HEAD size checks and manifest fetches, in seconds.
    pub head_timeout_secs: u64,
    /// Abort a streaming GET slower than this many bytes/sec...
    pub low_speed_limit_bytes: u32,
    /// ...for this many seconds. Classified as a timeout.
    pub low_speed_time_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            probe_timeout_secs: 5,
            head_timeout_secs: 5,
            low_speed_limit_bytes: 1024,
            low_speed_time_secs: 60,
        }
    }
}

/// Backup rotation retention counts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Auto backups kept under `backups_dir`.
    pub full_retention: usize,
    /// Auto backups kept under `settings_backups_dir`.
    pub settings_retention: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            full_retention: 4,
            settings_retention: 9,
        }
    }
}

/// Global configuration loaded from `~/.config/oasd/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub mirrors: MirrorConfig,
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub backup: BackupConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("oasd")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SyncConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = SyncConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: SyncConfig = toml::from_str(&data)?;
    Ok(cfg)
}
