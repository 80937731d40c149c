//! Engine-wide tunables — ambient configuration, not part of the execution
//! semantics. Loaded from an optional TOML file with `HARMONY_*` env
//! overrides, the same way the teacher loads `skynet.toml` + `SKYNET_*`.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub paging: PagingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// When true, use the durable sqlite-backed stores; otherwise the
    /// in-memory reference stores from §6 are used.
    #[serde(default)]
    pub durable: bool,
    #[serde(default = "default_db_path")]
    pub sqlite_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            durable: false,
            sqlite_path: default_db_path(),
        }
    }
}

/// Mirrors the fixed `[1,500]`/`50` clamp `ListSessions` applies; present as
/// an ambient tunable for operators inspecting config, not as a runtime
/// override — the clamp itself stays the literal bound the driving
/// algorithm specifies, not whatever a deployment's config file says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagingConfig {
    #[serde(default = "default_page_size")]
    pub default_limit: usize,
    #[serde(default = "default_max_page_size")]
    pub max_limit: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_PAGE_SIZE,
            max_limit: MAX_PAGE_SIZE,
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.harmony/harmony.db")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            paging: PagingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from an optional TOML file with `HARMONY_*` env var overrides.
    /// Falls back to defaults when no file is present.
    pub fn load(config_path: Option<&str>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(figment::providers::Serialized::defaults(
            EngineConfig::default(),
        ));
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed("HARMONY_").split("_"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert!(!cfg.store.durable);
        assert_eq!(cfg.paging.default_limit, 50);
        assert_eq!(cfg.paging.max_limit, 500);
    }
}
