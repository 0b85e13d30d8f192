//! Viaduct Proxy -- library crate for the translation proxy binary.
//!
//! Re-exports config and session modules so integration tests can drive
//! session legs in-process.

pub mod config;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;

use viaduct_engine::Translator;
use viaduct_mapping::{CommandTable, MappingHandle};

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs_or_home() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

pub fn dirs_or_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Load the command table named by `cfg`. A missing file yields an empty
/// table: container packets then fail open, everything else still works.
pub fn load_mapping(cfg: &config::ProxyConfig) -> anyhow::Result<CommandTable> {
    let path = expand_tilde(&cfg.proxy.mapping_file);
    if path.exists() {
        Ok(CommandTable::load(&path)?)
    } else {
        tracing::warn!(
            path = %path.display(),
            "command table not found, container packets will be forwarded untranslated"
        );
        Ok(CommandTable::default())
    }
}

/// Build the shared translator from config.
pub fn build_translator(cfg: &config::ProxyConfig) -> anyhow::Result<Arc<Translator>> {
    let table = load_mapping(cfg)?;
    let handle = Arc::new(MappingHandle::new(table));
    Ok(Arc::new(Translator::new(cfg.engine.clone(), handle)))
}
