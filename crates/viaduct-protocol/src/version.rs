//! Protocol revisions -- the totally ordered identifiers of each wire release.
//!
//! Message names are shared by every revision; field layouts are not. The only
//! thing the translation engine asks of a revision is how it compares to the
//! other endpoint's: a newer source translating to an older destination is a
//! down-conversion, the reverse is an up-conversion.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ProtocolError;

/// A released protocol revision, ordered by `(major, minor)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

/// 3.2: `trifleItem` sits flat on the gadget info.
pub const V3_2: ProtocolVersion = ProtocolVersion::new(3, 2);

/// 4.2: `trifleItem` moved under a `trifleGadget` wrapper.
pub const V4_2: ProtocolVersion = ProtocolVersion::new(4, 2);

/// Revisions the default rewrite rules were written against, oldest first.
pub const SUPPORTED_VERSIONS: &[ProtocolVersion] = &[V3_2, V4_2];

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = ProtocolError;

    /// Accepts `3.2`, `v3.2` and `3.2.0`. A patch component is ignored: patch
    /// releases never change message layouts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let mut parts = digits.split('.');
        let major = parts.next().and_then(|p| p.parse::<u16>().ok());
        let minor = parts.next().and_then(|p| p.parse::<u16>().ok());
        let patch_ok = match parts.next() {
            None => true,
            Some(p) => p.parse::<u16>().is_ok(),
        };

        match (major, minor, patch_ok, parts.next()) {
            (Some(major), Some(minor), true, None) => Ok(Self { major, minor }),
            _ => Err(ProtocolError::UnknownVersion(s.to_string())),
        }
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProtocolVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which way a packet travels through protocol history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Source is newer than destination.
    Down,
    /// Source is older than destination.
    Up,
    /// Both endpoints speak the same revision.
    Same,
}

impl Direction {
    pub fn between(from: ProtocolVersion, to: ProtocolVersion) -> Self {
        match from.cmp(&to) {
            std::cmp::Ordering::Greater => Direction::Down,
            std::cmp::Ordering::Less => Direction::Up,
            std::cmp::Ordering::Equal => Direction::Same,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Direction::Down => "down",
            Direction::Up => "up",
            Direction::Same => "same",
        }
    }
}
