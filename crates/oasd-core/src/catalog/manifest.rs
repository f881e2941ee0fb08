//! Remote model manifest: a JSON document listing model ids, display names
//! and capability flags, republished wholesale on every successful fetch.

use std::time::Duration;

use serde::Deserialize;

use crate::catalog::SyncError;
use crate::config::TransferConfig;
use crate::mirror::Mirror;
use crate::remote;

/// One model as declared by the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub experimental: bool,
    #[serde(default)]
    pub navigation: bool,
    /// True when the model consumes radar; absent means radarless.
    #[serde(default)]
    pub radar: bool,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    models: Vec<ModelEntry>,
}

/// Manifest URL on a mirror for a given version tag.
pub fn manifest_url(mirror: &Mirror, version: &str) -> String {
    mirror.join(&format!("Versions/model_names_{}.json", version))
}

/// Fetch and parse the manifest. Any failure maps to `ManifestUnavailable`
/// so the caller leaves the local catalog untouched.
pub fn fetch_manifest(url: &str, net: &TransferConfig) -> Result<Vec<ModelEntry>, SyncError> {
    let body = remote::fetch_string(url, Duration::from_secs(net.head_timeout_secs))
        .map_err(|e| SyncError::ManifestUnavailable(e.to_string()))?;
    parse_manifest(&body)
}

pub fn parse_manifest(body: &str) -> Result<Vec<ModelEntry>, SyncError> {
    let manifest: Manifest =
        serde_json::from_str(body).map_err(|e| SyncError::ManifestUnavailable(e.to_string()))?;
    Ok(manifest.models)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_manifest() {
        let body = r#"{
            "models": [
                {"id": "baseline-v2", "name": "Baseline V2 (Default)"},
                {"id": "night-owl", "name": "Night Owl", "experimental": true, "navigation": true, "radar": true}
            ]
        }"#;
        let models = parse_manifest(body).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "baseline-v2");
        assert!(!models[0].experimental);
        assert!(!models[0].radar);
        assert!(models[1].navigation);
        assert!(models[1].radar);
    }

    #[test]
    fn malformed_manifest_is_unavailable() {
        let err = parse_manifest("{\"models\": 12}").unwrap_err();
        assert!(matches!(err, SyncError::ManifestUnavailable(_)));
        assert!(parse_manifest("not json").is_err());
    }

    #[test]
    fn manifest_url_embeds_version() {
        let cfg = crate::config::MirrorConfig::default();
        let mirrors =
            crate::mirror::MirrorSet::from_config(&cfg, Duration::from_secs(1)).unwrap();
        let url = manifest_url(mirrors.secondary(), "v5");
        assert!(url.ends_with("Versions/model_names_v5.json"));
    }
}
