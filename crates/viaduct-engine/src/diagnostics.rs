//! Protocol issue diagnostics.
//!
//! One [`IssueLog`] per top-level translation call. Issues are logged the
//! moment they are added and summarised once at the end of the call; nothing
//! here ever changes the bytes a translation returns.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use viaduct_protocol::ProtocolVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn name(&self) -> &'static str {
        match self {
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A relocated field was rewritten into the destination's shape.
    FieldRelocated,
    /// A wrapper key was present with no payload inside.
    WrapperWithoutPayload,
    /// Hoisting dropped wrapper fields the legacy shape cannot carry.
    WrapperFieldsDropped,
    /// Hoisting replaced a flat field already present beside the wrapper.
    FlatFieldOverwritten,
    /// Body did not decode as a document.
    MalformedBody,
    /// Rewritten document could not be encoded.
    EncodeFailed,
    /// Container entry id has no name in the source revision.
    UnresolvedCommand,
    /// Container entry name has no id in the destination revision.
    UnpairedCommand,
}

impl IssueKind {
    pub fn name(&self) -> &'static str {
        match self {
            IssueKind::FieldRelocated => "field_relocated",
            IssueKind::WrapperWithoutPayload => "wrapper_without_payload",
            IssueKind::WrapperFieldsDropped => "wrapper_fields_dropped",
            IssueKind::FlatFieldOverwritten => "flat_field_overwritten",
            IssueKind::MalformedBody => "malformed_body",
            IssueKind::EncodeFailed => "encode_failed",
            IssueKind::UnresolvedCommand => "unresolved_command",
            IssueKind::UnpairedCommand => "unpaired_command",
        }
    }
}

/// How the engine dealt with an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixStrategy {
    /// Flat payload wrapped for a newer destination.
    WrapPayload,
    /// Wrapped payload hoisted for an older destination.
    HoistPayload,
    /// Bytes forwarded as they arrived.
    PassThrough,
    /// Whole container refused.
    RejectContainer,
    /// Strategy label the engine does not recognise.
    Unknown(String),
}

impl FixStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            FixStrategy::WrapPayload => "convert_trifle_item_to_gadget",
            FixStrategy::HoistPayload => "convert_trifle_gadget_to_item",
            FixStrategy::PassThrough => "pass_through",
            FixStrategy::RejectContainer => "reject_container",
            FixStrategy::Unknown(label) => label,
        }
    }
}

impl fmt::Display for FixStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FixStrategy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "convert_trifle_item_to_gadget" => FixStrategy::WrapPayload,
            "convert_trifle_gadget_to_item" => FixStrategy::HoistPayload,
            "pass_through" => FixStrategy::PassThrough,
            "reject_container" => FixStrategy::RejectContainer,
            other => FixStrategy::Unknown(other.to_string()),
        })
    }
}

impl Serialize for FixStrategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FixStrategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse::<FixStrategy>().unwrap_or_else(|never| match never {}))
    }
}

/// A structured anomaly found while translating one packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolIssue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub severity: Severity,
    pub packet_name: String,
    pub description: String,
    /// Document path (`$.entityList[0].gadget`) or container entry.
    pub location: String,
    pub fix_strategy: FixStrategy,
    #[serde(default)]
    pub context: BTreeMap<String, Value>,
}

impl ProtocolIssue {
    pub fn new(
        kind: IssueKind,
        severity: Severity,
        packet_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            packet_name: packet_name.into(),
            description: description.into(),
            location: "$".into(),
            fix_strategy: FixStrategy::PassThrough,
            context: BTreeMap::new(),
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn fix(mut self, strategy: FixStrategy) -> Self {
        self.fix_strategy = strategy;
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }
}

/// Append-only issue log for one translation call.
#[derive(Debug, Default)]
pub struct IssueLog {
    issues: Vec<ProtocolIssue>,
}

impl IssueLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an issue and emit it at its severity.
    pub fn add(&mut self, issue: ProtocolIssue) {
        match issue.severity {
            Severity::High => tracing::error!(
                packet = issue.packet_name.as_str(),
                kind = issue.kind.name(),
                location = issue.location.as_str(),
                fix = %issue.fix_strategy,
                "protocol issue: {}",
                issue.description
            ),
            Severity::Medium => tracing::warn!(
                packet = issue.packet_name.as_str(),
                kind = issue.kind.name(),
                location = issue.location.as_str(),
                fix = %issue.fix_strategy,
                "protocol issue: {}",
                issue.description
            ),
            Severity::Low => tracing::debug!(
                packet = issue.packet_name.as_str(),
                kind = issue.kind.name(),
                location = issue.location.as_str(),
                fix = %issue.fix_strategy,
                "protocol issue: {}",
                issue.description
            ),
        }
        self.issues.push(issue);
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn all(&self) -> &[ProtocolIssue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    /// Run [`apply_fix`] over every issue. Returns how many were recognised.
    pub fn apply_fixes(&self) -> usize {
        self.issues.iter().filter(|issue| apply_fix(issue)).count()
    }

    /// One summary line for the whole call.
    pub fn summarize(&self, packet: &str, from: ProtocolVersion, to: ProtocolVersion) {
        if self.issues.is_empty() {
            return;
        }
        let high = self.count(Severity::High);
        let medium = self.count(Severity::Medium);
        let low = self.count(Severity::Low);
        if high > 0 {
            tracing::warn!(
                packet,
                %from,
                %to,
                high,
                medium,
                low,
                "translation finished with issues"
            );
        } else {
            tracing::debug!(packet, %from, %to, high, medium, low, "translation summary");
        }
    }
}

/// Acknowledge the strategy an issue was handled with.
///
/// Every known strategy is applied inline by the rewriter or dispatcher at
/// the time the issue is raised, so this only reports. An unknown label is
/// logged and otherwise ignored.
pub fn apply_fix(issue: &ProtocolIssue) -> bool {
    match &issue.fix_strategy {
        FixStrategy::Unknown(label) => {
            tracing::warn!(
                packet = issue.packet_name.as_str(),
                strategy = label.as_str(),
                "unknown fix strategy"
            );
            false
        }
        known => {
            tracing::debug!(
                packet = issue.packet_name.as_str(),
                strategy = known.as_str(),
                "applied fix"
            );
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viaduct_protocol::{V3_2, V4_2};

    fn relocated() -> ProtocolIssue {
        ProtocolIssue::new(
            IssueKind::FieldRelocated,
            Severity::Low,
            "SceneEntityAppearNotify",
            "wrapped trifleItem",
        )
        .at("$.entityList[0].gadget")
        .fix(FixStrategy::WrapPayload)
        .with_context("flat", "trifleItem")
    }

    #[test]
    fn test_log_is_ordered_and_append_only() {
        let mut log = IssueLog::new();
        assert!(!log.has_issues());

        log.add(relocated());
        log.add(
            ProtocolIssue::new(IssueKind::MalformedBody, Severity::High, "X", "bad json")
                .fix(FixStrategy::PassThrough),
        );

        assert!(log.has_issues());
        assert_eq!(log.len(), 2);
        assert_eq!(log.all()[0].kind, IssueKind::FieldRelocated);
        assert_eq!(log.all()[1].kind, IssueKind::MalformedBody);
        assert_eq!(log.count(Severity::High), 1);
        assert_eq!(log.count(Severity::Medium), 0);
        log.summarize("X", V4_2, V3_2);
    }

    #[test]
    fn test_fix_strategy_labels() {
        for strategy in [
            FixStrategy::WrapPayload,
            FixStrategy::HoistPayload,
            FixStrategy::PassThrough,
            FixStrategy::RejectContainer,
        ] {
            let parsed: FixStrategy = strategy.as_str().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
        let unknown: FixStrategy = "patch_lua".parse().unwrap();
        assert_eq!(unknown, FixStrategy::Unknown("patch_lua".into()));
        assert_eq!(unknown.to_string(), "patch_lua");
    }

    #[test]
    fn test_apply_fix_unknown_is_not_fatal() {
        assert!(apply_fix(&relocated()));
        let unknown = relocated().fix(FixStrategy::Unknown("patch_lua".into()));
        assert!(!apply_fix(&unknown));

        let mut log = IssueLog::new();
        log.add(relocated());
        log.add(unknown);
        assert_eq!(log.apply_fixes(), 1);
    }

    #[test]
    fn test_issue_serialises_with_wire_names() {
        let json = serde_json::to_value(relocated()).unwrap();
        assert_eq!(json["type"], "field_relocated");
        assert_eq!(json["severity"], "low");
        assert_eq!(json["fix_strategy"], "convert_trifle_item_to_gadget");
        assert_eq!(json["context"]["flat"], "trifleItem");

        let back: ProtocolIssue = serde_json::from_value(json).unwrap();
        assert_eq!(back, relocated());
    }
}
