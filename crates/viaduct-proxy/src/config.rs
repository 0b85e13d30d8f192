//! Configuration types for viaduct-proxy.
//! Parsed from ~/.viaduct/config.toml.

use serde::{Deserialize, Serialize};
use std::path::Path;
use viaduct_engine::EngineConfig;
use viaduct_protocol::{ProtocolVersion, V3_2, V4_2};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProxyConfig {
    #[serde(default)]
    pub proxy: ProxySection,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxySection {
    /// Revision spoken by the game client.
    #[serde(default = "default_client_version")]
    pub client_version: ProtocolVersion,
    /// Revision spoken by the upstream server.
    #[serde(default = "default_server_version")]
    pub server_version: ProtocolVersion,
    #[serde(default = "default_mapping_file")]
    pub mapping_file: String,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            client_version: default_client_version(),
            server_version: default_server_version(),
            mapping_file: default_mapping_file(),
        }
    }
}

// Default value functions
fn default_client_version() -> ProtocolVersion {
    V3_2
}
fn default_server_version() -> ProtocolVersion {
    V4_2
}
fn default_mapping_file() -> String {
    "~/.viaduct/commands.toml".into()
}

impl ProxyConfig {
    /// Load config from file, or use defaults if missing.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ProxyConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}
