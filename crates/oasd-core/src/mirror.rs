//! Mirror resolution: probe the primary host, fall back to the secondary.
//!
//! A mirror is reachable when its probe URL answers an HTTP request at all;
//! the status code is irrelevant. Resolution is re-evaluated on every
//! synchronization pass and never cached, so a recovered primary wins back
//! traffic on the next tick. No retries within one call.

use std::time::Duration;

use anyhow::{Context, Result};
use url::Url;

use crate::config::MirrorConfig;

/// One remote asset tree: a normalized base URL plus the URL probed for
/// reachability.
#[derive(Debug, Clone)]
pub struct Mirror {
    base: String,
    probe_url: String,
}

impl Mirror {
    fn new(base: &str, probe_url: &str) -> Result<Self> {
        // Validate early; join() below is plain concatenation.
        Url::parse(base).with_context(|| format!("invalid mirror base URL: {}", base))?;
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        Ok(Self {
            base,
            probe_url: probe_url.to_string(),
        })
    }

    /// Absolute URL for a path relative to this mirror's asset tree.
    pub fn join(&self, relative: &str) -> String {
        format!("{}{}", self.base, relative.trim_start_matches('/'))
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}

/// The ordered pair of mirrors with a reachability predicate.
pub struct MirrorSet {
    primary: Mirror,
    secondary: Mirror,
    probe_timeout: Duration,
}

impl MirrorSet {
    pub fn from_config(cfg: &MirrorConfig, probe_timeout: Duration) -> Result<Self> {
        Ok(Self {
            primary: Mirror::new(&cfg.primary_base, &cfg.primary_probe)?,
            secondary: Mirror::new(&cfg.secondary_base, &cfg.secondary_probe)?,
            probe_timeout,
        })
    }

    /// First reachable mirror, primary preferred; `None` when both probes
    /// fail. Blocking; callers re-resolve on the next scheduling tick.
    pub fn resolve(&self) -> Option<&Mirror> {
        if reachable(&self.primary.probe_url, self.probe_timeout) {
            return Some(&self.primary);
        }
        if reachable(&self.secondary.probe_url, self.probe_timeout) {
            tracing::info!("primary mirror unreachable, using secondary");
            return Some(&self.secondary);
        }
        tracing::warn!("both mirrors unreachable");
        None
    }

    /// The failover mirror, used for the one retry after a verification
    /// failure against the primary.
    pub fn secondary(&self) -> &Mirror {
        &self.secondary
    }
}

/// Short-timeout reachability check: HEAD the probe URL and accept any HTTP
/// response. No read of the body is required.
fn reachable(url: &str, timeout: Duration) -> bool {
    fn probe(url: &str, timeout: Duration) -> Result<(), curl::Error> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        easy.nobody(true)?;
        easy.follow_location(true)?;
        easy.connect_timeout(timeout)?;
        easy.timeout(timeout)?;
        easy.perform()
    }
    probe(url, timeout).is_ok()
}
