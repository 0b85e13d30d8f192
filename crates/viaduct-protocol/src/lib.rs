//! Viaduct Protocol -- revisions, packets, documents, wire codecs.
//!
//! Packets arrive already decoded as `(name, header, body)`. The body is a
//! JSON document whose layout drifts between protocol revisions; the name is
//! stable across all of them.

pub mod codec;
pub mod document;
pub mod messages;
pub mod version;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use codec::PacketCodec;
pub use document::{Document, Scalar};
pub use messages::{UnionCmd, UnionCmdNotify};
pub use version::{Direction, ProtocolVersion, SUPPORTED_VERSIONS, V3_2, V4_2};

/// Numeric command identifier, scoped to one protocol revision.
pub type CommandId = u16;

/// A decoded packet in flight between the two endpoints.
///
/// `header` is opaque and forwarded untouched. An empty header means the
/// packet had none (nested sub-packets never carry one).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    pub name: String,
    #[serde(with = "messages::base64_bytes", default)]
    pub header: Bytes,
    #[serde(with = "messages::base64_bytes")]
    pub body: Bytes,
}

impl Packet {
    pub fn new(name: impl Into<String>, header: impl Into<Bytes>, body: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            header: header.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown protocol version: {0:?}")]
    UnknownVersion(String),
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
    #[error("incoming frame exceeds {max} bytes")]
    FrameTooLarge { max: usize },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
