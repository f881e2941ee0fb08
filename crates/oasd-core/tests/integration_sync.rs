//! Integration tests: a live HTTP server behind the full engine path.
//!
//! Covers catalog reconciliation end-to-end (missing/stale/orphaned
//! models), idempotence, cancellation mid-transfer, mirror failover and the
//! theme listing reconciliation.

mod common;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::asset_server::{self, AssetServerOptions};
use oasd_core::catalog::models::{DEFAULT_MODEL, DEFAULT_MODEL_NAME};
use oasd_core::category::Category;
use oasd_core::config::SyncConfig;
use oasd_core::coordinator::Job;
use oasd_core::engine::SyncEngine;
use oasd_core::mirror::MirrorSet;
use oasd_core::store::{keys, MemoryStore, StateStore};
use oasd_core::verify::verify;

const MANIFEST_PATH: &str = "/primary/Versions/model_names_v5.json";

fn manifest_json(entries: &[(&str, &str)]) -> Vec<u8> {
    let models: Vec<String> = entries
        .iter()
        .map(|(id, name)| format!(r#"{{"id": "{}", "name": "{}"}}"#, id, name))
        .collect();
    format!(r#"{{"models": [{}]}}"#, models.join(",")).into_bytes()
}

fn test_cfg(server_url: &str, root: &Path) -> SyncConfig {
    let mut cfg = SyncConfig::default();
    cfg.mirrors.primary_base = format!("{}primary/", server_url);
    cfg.mirrors.secondary_base = format!("{}secondary/", server_url);
    cfg.mirrors.primary_probe = server_url.to_string();
    cfg.mirrors.secondary_probe = server_url.to_string();
    cfg.mirrors.listing_base = format!("{}listing", server_url);
    cfg.paths.models_dir = root.join("models");
    cfg.paths.themes_dir = root.join("themes");
    cfg.paths.active_theme_dir = root.join("active");
    cfg.paths.holiday_assets_dir = root.join("holiday");
    cfg.paths.default_model_source = root.join("bundled").join("baseline-v2.bin");
    cfg.paths.settings_dir = root.join("settings");
    cfg.paths.storage_dir = root.join("storage");
    cfg.paths.maps_dir = root.join("maps");
    cfg.paths.system_root = root.join("system");
    cfg.paths.backups_dir = root.join("backups");
    cfg.paths.settings_backups_dir = root.join("settings_backups");
    cfg.transfer.probe_timeout_secs = 2;
    cfg.transfer.head_timeout_secs = 2;
    cfg.transfer.connect_timeout_secs = 2;
    cfg
}

fn build_engine(cfg: SyncConfig) -> (Arc<SyncEngine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let storage = Arc::new(MemoryStore::new());
    let engine = SyncEngine::new(cfg, store.clone(), storage).unwrap();
    (engine, store)
}

async fn wait_idle(engine: &Arc<SyncEngine>, job: Job) {
    for _ in 0..1500 {
        if !engine.coordinator().is_running(job) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("worker for {:?} did not finish", job);
}

#[tokio::test(flavor = "multi_thread")]
async fn reconciliation_downloads_missing_and_is_idempotent() {
    let alpha = vec![0xA5u8; 8 * 1024];
    let beta: Vec<u8> = (0u8..=255).cycle().take(12 * 1024).collect();
    let mut routes = HashMap::new();
    routes.insert(
        MANIFEST_PATH.to_string(),
        manifest_json(&[("alpha", "Alpha"), ("beta", "Beta")]),
    );
    routes.insert("/primary/Models/alpha.bin".to_string(), alpha.clone());
    routes.insert("/primary/Models/beta.bin".to_string(), beta.clone());
    let url = asset_server::start(routes);

    let root = tempfile::tempdir().unwrap();
    let cfg = test_cfg(&url, root.path());
    let models_dir = cfg.paths.models_dir.clone();
    fs::create_dir_all(&models_dir).unwrap();
    fs::write(models_dir.join("alpha.bin"), &alpha).unwrap();

    let (engine, store) = build_engine(cfg);
    store.put_bool(keys::AUTOMATICALLY_UPDATE_MODELS, true);

    let e = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || e.models().update_models(true))
        .await
        .unwrap();

    // Catalog republished wholesale; beta classified missing and queued.
    assert_eq!(store.get(keys::AVAILABLE_MODELS).as_deref(), Some("alpha,beta"));
    assert_eq!(
        store.get(keys::AVAILABLE_MODEL_NAMES).as_deref(),
        Some("Alpha,Beta")
    );
    assert!(!store.get_bool(keys::MODELS_DOWNLOADED));
    assert_eq!(
        store.get(Category::Model.download_key()).as_deref(),
        Some("beta")
    );

    engine.poll_downloads();
    wait_idle(&engine, Job::Download(Category::Model)).await;

    assert_eq!(fs::read(models_dir.join("beta.bin")).unwrap(), beta);
    assert_eq!(
        store.get(Category::Model.progress_key()).as_deref(),
        Some("Downloaded!")
    );
    assert!(store.get(Category::Model.download_key()).is_none());

    // Second pass: local state already matches the manifest, so no new
    // requests, no deletions, and the downloaded flag flips on.
    let e = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || e.models().update_models(false))
        .await
        .unwrap();
    assert!(store.get(Category::Model.download_key()).is_none());
    assert!(store.get_bool(keys::MODELS_DOWNLOADED));
    assert!(models_dir.join("alpha.bin").exists());
    assert!(models_dir.join("beta.bin").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_on_primary_falls_over_to_secondary() {
    let gamma = vec![0x42u8; 4 * 1024];
    let mut routes = HashMap::new();
    // No /primary/Models/gamma.bin: the primary answers 404.
    routes.insert("/secondary/Models/gamma.bin".to_string(), gamma.clone());
    let url = asset_server::start(routes);

    let root = tempfile::tempdir().unwrap();
    let cfg = test_cfg(&url, root.path());
    let models_dir = cfg.paths.models_dir.clone();
    let (engine, store) = build_engine(cfg);

    let e = Arc::clone(&engine);
    let token = engine.coordinator().cancel_token(Category::Model);
    tokio::task::spawn_blocking(move || e.models().download_model("gamma", &token))
        .await
        .unwrap();

    assert_eq!(fs::read(models_dir.join("gamma.bin")).unwrap(), gamma);
    assert_eq!(
        store.get(Category::Model.progress_key()).as_deref(),
        Some("Downloaded!")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_mid_transfer_removes_partial_file() {
    let slow = vec![0x77u8; 200 * 1024];
    let mut routes = HashMap::new();
    routes.insert("/primary/Models/slow.bin".to_string(), slow);
    let url = asset_server::start_with_options(
        routes,
        AssetServerOptions {
            chunk_delay: Some(Duration::from_millis(30)),
            chunks: 64,
        },
    );

    let root = tempfile::tempdir().unwrap();
    let cfg = test_cfg(&url, root.path());
    let models_dir = cfg.paths.models_dir.clone();
    let (engine, store) = build_engine(cfg);

    store.put(Category::Model.download_key(), "slow");
    engine.poll_downloads();
    assert!(engine.coordinator().is_running(Job::Download(Category::Model)));

    // Let some chunks land, then cancel through the store key.
    tokio::time::sleep(Duration::from_millis(200)).await;
    store.put_bool(Category::Model.cancel_key(), true);
    engine.poll_downloads();
    assert!(store.get(Category::Model.cancel_key()).is_none());

    wait_idle(&engine, Job::Download(Category::Model)).await;

    assert_eq!(
        store.get(Category::Model.progress_key()).as_deref(),
        Some("Download cancelled...")
    );
    assert!(store.get(Category::Model.download_key()).is_none());
    assert!(!models_dir.join("slow.bin").exists());
    assert!(!models_dir.join("slow.bin.part").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn download_all_drains_the_catalog() {
    let one = vec![1u8; 2048];
    let two = vec![2u8; 4096];
    let mut routes = HashMap::new();
    routes.insert(
        MANIFEST_PATH.to_string(),
        manifest_json(&[("one", "One"), ("two", "Two")]),
    );
    routes.insert("/primary/Models/one.bin".to_string(), one.clone());
    routes.insert("/primary/Models/two.bin".to_string(), two.clone());
    let url = asset_server::start(routes);

    let root = tempfile::tempdir().unwrap();
    let cfg = test_cfg(&url, root.path());
    let models_dir = cfg.paths.models_dir.clone();
    let (engine, store) = build_engine(cfg);

    store.put_bool(keys::DOWNLOAD_ALL_MODELS, true);
    engine.poll_downloads();
    wait_idle(&engine, Job::Download(Category::Model)).await;

    assert_eq!(fs::read(models_dir.join("one.bin")).unwrap(), one);
    assert_eq!(fs::read(models_dir.join("two.bin")).unwrap(), two);
    assert_eq!(
        store.get(Category::Model.progress_key()).as_deref(),
        Some("All models downloaded!")
    );
    assert!(store.get(keys::DOWNLOAD_ALL_MODELS).is_none());
    assert!(store.get_bool(keys::MODELS_DOWNLOADED));
}

#[tokio::test(flavor = "multi_thread")]
async fn verify_requires_exact_size_match() {
    let body = vec![9u8; 1000];
    let mut routes = HashMap::new();
    routes.insert("/file.bin".to_string(), body.clone());
    let url = asset_server::start(routes);
    let file_url = format!("{}file.bin", url);

    let dir = tempfile::tempdir().unwrap();
    let cfg = test_cfg(&url, dir.path());

    let exact = dir.path().join("exact.bin");
    fs::write(&exact, &body).unwrap();
    assert!(verify(&exact, &file_url, &cfg.transfer));

    let short = dir.path().join("short.bin");
    fs::write(&short, &body[..999]).unwrap();
    assert!(!verify(&short, &file_url, &cfg.transfer));

    let empty = dir.path().join("empty.bin");
    fs::write(&empty, b"").unwrap();
    assert!(!verify(&empty, &file_url, &cfg.transfer));

    assert!(!verify(&dir.path().join("missing.bin"), &file_url, &cfg.transfer));
}

#[tokio::test(flavor = "multi_thread")]
async fn dead_primary_probe_resolves_to_secondary() {
    let url = asset_server::start(HashMap::new());
    let root = tempfile::tempdir().unwrap();
    let mut cfg = test_cfg(&url, root.path());
    cfg.mirrors.primary_probe = "http://127.0.0.1:1".to_string();
    cfg.transfer.probe_timeout_secs = 1;

    let mirrors = MirrorSet::from_config(&cfg.mirrors, Duration::from_secs(1)).unwrap();
    let resolved = tokio::task::spawn_blocking(move || {
        mirrors.resolve().map(|m| m.base().to_string())
    })
    .await
    .unwrap();
    assert_eq!(resolved.as_deref(), Some(cfg.mirrors.secondary_base.as_str()));
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_mirrors_leave_catalog_untouched() {
    let root = tempfile::tempdir().unwrap();
    let mut cfg = test_cfg("http://127.0.0.1:1/", root.path());
    cfg.transfer.probe_timeout_secs = 1;
    let (engine, store) = build_engine(cfg);
    store.put(keys::AVAILABLE_MODELS, "previous-catalog");

    let e = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || e.models().update_models(false))
        .await
        .unwrap();

    assert_eq!(
        store.get(keys::AVAILABLE_MODELS).as_deref(),
        Some("previous-catalog")
    );
    assert!(store.get(Category::Model.download_key()).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn orphaned_model_is_pruned_and_selection_reverts() {
    let url = asset_server::start(HashMap::new());
    let root = tempfile::tempdir().unwrap();
    let cfg = test_cfg(&url, root.path());
    let models_dir = cfg.paths.models_dir.clone();
    fs::create_dir_all(&models_dir).unwrap();
    fs::write(models_dir.join("kept.bin"), b"kept").unwrap();
    fs::write(models_dir.join("orphan.bin"), b"orphan").unwrap();

    let (engine, store) = build_engine(cfg);
    store.put(keys::AVAILABLE_MODELS, "kept");
    store.put(keys::MODEL, "orphan");
    store.put(keys::MODEL_NAME, "Orphan");

    let e = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || e.models().prune_unlisted_models())
        .await
        .unwrap();

    assert!(models_dir.join("kept.bin").exists());
    assert!(!models_dir.join("orphan.bin").exists());
    assert_eq!(store.get(keys::MODEL).as_deref(), Some(DEFAULT_MODEL));
    assert_eq!(store.get(keys::MODEL_NAME).as_deref(), Some(DEFAULT_MODEL_NAME));
}

#[tokio::test(flavor = "multi_thread")]
async fn wheel_download_falls_back_to_next_extension() {
    let gif = vec![0x47u8; 3 * 1024];
    let mut routes = HashMap::new();
    // No .png on either mirror; the .gif is the one that exists.
    routes.insert("/primary/Steering-Wheels/frog.gif".to_string(), gif.clone());
    routes.insert(
        "/listing/Steering-Wheels".to_string(),
        br#"[{"name": "frog.gif"}, {"name": "father_time.png"}]"#.to_vec(),
    );
    let url = asset_server::start(routes);

    let root = tempfile::tempdir().unwrap();
    let cfg = test_cfg(&url, root.path());
    let wheels_dir = cfg.paths.themes_dir.join("steering_wheels");
    let (engine, store) = build_engine(cfg);

    store.put(Category::Wheel.download_key(), "Frog");
    engine.poll_downloads();
    wait_idle(&engine, Job::Download(Category::Wheel)).await;

    assert_eq!(fs::read(wheels_dir.join("frog.gif")).unwrap(), gif);
    assert_eq!(
        store.get(Category::Wheel.progress_key()).as_deref(),
        Some("Downloaded!")
    );
    assert!(store.get(Category::Wheel.download_key()).is_none());
    // The post-download list refresh sees the new wheel as available.
    let available = store.get(Category::Wheel.available_key()).unwrap();
    assert!(available.contains("Frog"));
    let downloadable = store.get(Category::Wheel.downloadable_key()).unwrap();
    assert!(downloadable.contains("Father Time"));
    assert!(!downloadable.contains("Frog"));
}
