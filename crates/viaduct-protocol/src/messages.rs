//! Wire message types the engine understands structurally.
//!
//! Only the container packet is modelled as a typed struct. Every other body
//! is handled as a generic [`Document`](crate::Document).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::CommandId;

// ============================================================================
// Container packet
// ============================================================================

/// Container carrying an ordered batch of sub-packets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionCmdNotify {
    #[serde(rename = "cmdList", default)]
    pub cmd_list: Vec<UnionCmd>,
}

/// One embedded sub-packet. `message_id` lives in the sender's id namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionCmd {
    #[serde(rename = "messageId")]
    pub message_id: CommandId,
    #[serde(with = "base64_bytes", default)]
    pub body: Bytes,
}

// ============================================================================
// Serde helpers
// ============================================================================

/// Serialize/deserialize byte buffers as base64 strings.
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: AsRef<[u8]>,
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: From<Vec<u8>>,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD
            .decode(&s)
            .map(T::from)
            .map_err(serde::de::Error::custom)
    }
}
