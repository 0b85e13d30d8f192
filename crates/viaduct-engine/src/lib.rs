//! Viaduct Engine -- cross-revision packet translation.
//!
//! Dispatches on packet name:
//!   - recursive packets: full-document sweep for the relocated field
//!   - field rules: directional rewrite of one top-level field
//!   - container packet: unwrap, translate each sub-packet, remap ids
//!   - everything else: forwarded unchanged
//!
//! Every failure is fail-open: the caller gets the original bytes back along
//! with the error and keeps the session alive.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use viaduct_protocol::{CommandId, ProtocolError, ProtocolVersion};

pub mod alias;
pub mod diagnostics;
pub mod dispatcher;
pub mod nested;
pub mod rewriter;

pub use alias::{FieldAlias, RelocatedField};
pub use diagnostics::{apply_fix, FixStrategy, IssueKind, IssueLog, ProtocolIssue, Severity};
pub use dispatcher::Translator;
pub use rewriter::{RewriteEvent, Rewriter};

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("{packet}: undecodable body: {source}")]
    Decode {
        packet: String,
        #[source]
        source: ProtocolError,
    },
    #[error("{packet}: re-encode failed: {source}")]
    Encode {
        packet: String,
        #[source]
        source: ProtocolError,
    },
    #[error("command id {id} has no name in {version}")]
    UnresolvedCommand { id: CommandId, version: ProtocolVersion },
    #[error("command {name} ({id} in {from}) has no id in {to}")]
    UnpairedCommand {
        name: String,
        id: CommandId,
        from: ProtocolVersion,
        to: ProtocolVersion,
    },
    #[error("entry {index} ({name}): {source}")]
    Nested {
        index: usize,
        name: String,
        #[source]
        source: Box<TranslateError>,
    },
}

/// A failed translation. `original` is the untouched input body, which the
/// caller should forward in place of a translation.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct TranslateFailure {
    pub original: Bytes,
    #[source]
    pub error: TranslateError,
}

/// Scoped rewrite of one top-level field of one packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub packet: String,
    pub field: String,
}

/// Which packet names take which path through the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_recursive_packets")]
    pub recursive_packets: BTreeSet<String>,
    #[serde(default = "default_field_rules")]
    pub field_rules: Vec<FieldRule>,
    #[serde(default = "default_container_packet")]
    pub container_packet: String,
    #[serde(default = "default_observed_packets")]
    pub observed_packets: BTreeSet<String>,
    #[serde(default)]
    pub relocation: RelocatedField,
}

impl EngineConfig {
    pub fn field_rule(&self, packet: &str) -> Option<&FieldRule> {
        self.field_rules.iter().find(|r| r.packet == packet)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recursive_packets: default_recursive_packets(),
            field_rules: default_field_rules(),
            container_packet: default_container_packet(),
            observed_packets: default_observed_packets(),
            relocation: RelocatedField::default(),
        }
    }
}

// Default value functions
fn default_recursive_packets() -> BTreeSet<String> {
    [
        "SceneGadgetInfo",
        "SceneEntityInfo",
        "ScenePlayerBackgroundAvatarRefreshNotify",
        "SceneEntityUpdateNotify",
        "SceneEntityAppearNotify",
        "AvatarChangeCostumeNotify",
        "SceneTeamAvatar",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_field_rules() -> Vec<FieldRule> {
    vec![FieldRule {
        packet: "EvtCreateGadgetNotify".into(),
        field: "gadget".into(),
    }]
}
fn default_container_packet() -> String {
    "UnionCmdNotify".into()
}
fn default_observed_packets() -> BTreeSet<String> {
    [
        "GetPlayerTokenReq",
        "GetPlayerTokenRsp",
        "PlayerEnterSceneNotify",
        "PostEnterSceneRsp",
        "EntityMoveInfo",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
