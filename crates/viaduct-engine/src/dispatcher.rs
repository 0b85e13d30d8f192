//! Packet dispatcher -- routes each packet to its transform by name.

use std::sync::Arc;

use bytes::Bytes;
use viaduct_mapping::{CommandMapping, CommandTable, MappingHandle};
use viaduct_protocol::{Direction, Document, Packet, ProtocolError, ProtocolVersion, Scalar};

use crate::diagnostics::{FixStrategy, IssueKind, IssueLog, ProtocolIssue, Severity};
use crate::rewriter::{RewriteEvent, Rewriter};
use crate::{EngineConfig, FieldRule, TranslateError, TranslateFailure};

/// Bytes of a malformed body quoted in its issue record.
const BODY_PREVIEW_BYTES: usize = 16;

/// State shared by one top-level call and every nested call it makes.
pub(crate) struct Call {
    pub(crate) from: ProtocolVersion,
    pub(crate) to: ProtocolVersion,
    /// One snapshot for the whole call, so every entry of a container
    /// resolves against the same table.
    pub(crate) mapping: Arc<dyn CommandMapping>,
    pub(crate) issues: IssueLog,
}

/// The translation engine. Stateless between calls; share it freely.
pub struct Translator {
    config: EngineConfig,
    rewriter: Rewriter,
    mapping: Arc<MappingHandle>,
}

impl Translator {
    pub fn new(config: EngineConfig, mapping: Arc<MappingHandle>) -> Self {
        let rewriter = Rewriter::new(config.relocation.clone());
        Self {
            config,
            rewriter,
            mapping,
        }
    }

    /// Convenience for a fixed table that is never republished.
    pub fn with_table(config: EngineConfig, table: CommandTable) -> Self {
        Self::new(config, Arc::new(MappingHandle::new(table)))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mapping(&self) -> &Arc<MappingHandle> {
        &self.mapping
    }

    /// Translate one packet body from `from`'s shape into `to`'s.
    ///
    /// On failure the original `body` comes back inside the error.
    pub fn translate(
        &self,
        from: ProtocolVersion,
        to: ProtocolVersion,
        name: &str,
        header: &[u8],
        body: Bytes,
    ) -> Result<Bytes, TranslateFailure> {
        self.translate_traced(from, to, name, header, body).0
    }

    /// [`translate`](Self::translate), also returning the call's issue log.
    pub fn translate_traced(
        &self,
        from: ProtocolVersion,
        to: ProtocolVersion,
        name: &str,
        header: &[u8],
        body: Bytes,
    ) -> (Result<Bytes, TranslateFailure>, IssueLog) {
        if from == to {
            tracing::trace!(packet = name, version = %from, "same revision, forwarding unchanged");
            return (Ok(body), IssueLog::new());
        }

        let mut call = Call {
            from,
            to,
            mapping: self.mapping.snapshot(),
            issues: IssueLog::new(),
        };
        let result = self.dispatch(&mut call, name, header, &body);

        call.issues.summarize(name, from, to);
        call.issues.apply_fixes();

        let result = result.map_err(|error| TranslateFailure {
            original: body,
            error,
        });
        (result, call.issues)
    }

    /// Translate the container packet's body directly.
    pub fn translate_container(
        &self,
        from: ProtocolVersion,
        to: ProtocolVersion,
        body: Bytes,
    ) -> Result<Bytes, TranslateFailure> {
        self.translate(from, to, &self.config.container_packet, &[], body)
    }

    /// Session-side entry point: never fails, forwards the original body
    /// when translation does.
    pub fn translate_packet(
        &self,
        from: ProtocolVersion,
        to: ProtocolVersion,
        packet: Packet,
    ) -> Packet {
        let Packet { name, header, body } = packet;
        let body = match self.translate(from, to, &name, &header, body) {
            Ok(body) => body,
            Err(failure) => {
                tracing::warn!(
                    packet = name.as_str(),
                    %from,
                    %to,
                    error = %failure.error,
                    "forwarding untranslated body"
                );
                failure.original
            }
        };
        Packet { name, header, body }
    }

    pub(crate) fn dispatch(
        &self,
        call: &mut Call,
        name: &str,
        header: &[u8],
        body: &Bytes,
    ) -> Result<Bytes, TranslateError> {
        if self.config.recursive_packets.contains(name) {
            return self.rewrite_recursive(call, name, body);
        }
        if let Some(rule) = self.config.field_rule(name) {
            return self.rewrite_field(call, rule, body);
        }
        if name == self.config.container_packet {
            return self.translate_entries(call, name, body);
        }
        if self.config.observed_packets.contains(name) {
            tracing::trace!(
                packet = name,
                header_len = header.len(),
                body_len = body.len(),
                "observed packet, forwarding unchanged"
            );
        }
        Ok(body.clone())
    }

    fn rewrite_recursive(
        &self,
        call: &mut Call,
        name: &str,
        body: &Bytes,
    ) -> Result<Bytes, TranslateError> {
        let doc = self.decode(call, name, body)?;
        let mut events = Vec::new();
        let doc = self.rewriter.sweep_traced(doc, "$", &mut events);
        self.finish(call, name, doc, events, body)
    }

    fn rewrite_field(
        &self,
        call: &mut Call,
        rule: &FieldRule,
        body: &Bytes,
    ) -> Result<Bytes, TranslateError> {
        let mut doc = self.decode(call, &rule.packet, body)?;
        let direction = Direction::between(call.from, call.to);
        let mut events = Vec::new();

        // Only a mapping can hold the relocated field.
        let slot = doc
            .as_mapping_mut()
            .and_then(|map| map.get_mut(&rule.field))
            .filter(|value| value.is_mapping());
        if let Some(slot) = slot {
            let root = format!("$.{}", rule.field);
            let value = std::mem::replace(slot, Document::Scalar(Scalar::Null));
            *slot = self
                .rewriter
                .convert_traced(value, direction, &root, &mut events);
        }

        self.finish(call, &rule.packet, doc, events, body)
    }

    /// Record what changed and re-encode. An untouched document returns the
    /// original bytes as they arrived.
    fn finish(
        &self,
        call: &mut Call,
        name: &str,
        doc: Document,
        events: Vec<RewriteEvent>,
        body: &Bytes,
    ) -> Result<Bytes, TranslateError> {
        if events.is_empty() {
            return Ok(body.clone());
        }
        let changed = events
            .iter()
            .any(|e| !matches!(e, RewriteEvent::EmptyWrapper { .. }));
        self.record(call, name, events);
        if !changed {
            return Ok(body.clone());
        }

        match doc.encode() {
            Ok(encoded) => Ok(Bytes::from(encoded)),
            Err(source) => {
                call.issues.add(
                    ProtocolIssue::new(
                        IssueKind::EncodeFailed,
                        Severity::High,
                        name,
                        format!("rewritten document could not be encoded: {source}"),
                    )
                    .fix(FixStrategy::PassThrough),
                );
                Err(TranslateError::Encode {
                    packet: name.to_string(),
                    source,
                })
            }
        }
    }

    pub(crate) fn decode(
        &self,
        call: &mut Call,
        name: &str,
        body: &[u8],
    ) -> Result<Document, TranslateError> {
        Document::decode(body).map_err(|source| self.malformed(call, name, body, source))
    }

    pub(crate) fn malformed(
        &self,
        call: &mut Call,
        name: &str,
        body: &[u8],
        source: ProtocolError,
    ) -> TranslateError {
        let preview = &body[..body.len().min(BODY_PREVIEW_BYTES)];
        call.issues.add(
            ProtocolIssue::new(
                IssueKind::MalformedBody,
                Severity::High,
                name,
                format!("body did not decode: {source}"),
            )
            .fix(FixStrategy::PassThrough)
            .with_context("body_len", body.len())
            .with_context("body_prefix", hex::encode(preview)),
        );
        TranslateError::Decode {
            packet: name.to_string(),
            source,
        }
    }

    fn record(&self, call: &mut Call, name: &str, events: Vec<RewriteEvent>) {
        let direction = Direction::between(call.from, call.to).name();
        let flat = self.rewriter.field().flat.canonical().to_string();
        let wrapper_canonical = self.rewriter.field().wrapper.canonical().to_string();

        for event in events {
            match event {
                RewriteEvent::Hoisted {
                    path,
                    wrapper,
                    inner,
                    discarded,
                    overwritten,
                } => {
                    call.issues.add(
                        ProtocolIssue::new(
                            IssueKind::FieldRelocated,
                            Severity::Low,
                            name,
                            format!("hoisted {wrapper}.{inner} to {flat}"),
                        )
                        .at(path.clone())
                        .fix(FixStrategy::HoistPayload)
                        .with_context("direction", direction),
                    );
                    if !overwritten.is_empty() {
                        call.issues.add(
                            ProtocolIssue::new(
                                IssueKind::FlatFieldOverwritten,
                                Severity::Medium,
                                name,
                                format!(
                                    "{} replaced by the payload of {wrapper}",
                                    overwritten.join(", ")
                                ),
                            )
                            .at(path.clone())
                            .fix(FixStrategy::HoistPayload)
                            .with_context("fields", overwritten),
                        );
                    }
                    if !discarded.is_empty() {
                        call.issues.add(
                            ProtocolIssue::new(
                                IssueKind::WrapperFieldsDropped,
                                Severity::Medium,
                                name,
                                format!("{wrapper} fields have no legacy equivalent"),
                            )
                            .at(path)
                            .fix(FixStrategy::HoistPayload)
                            .with_context("fields", discarded),
                        );
                    }
                }
                RewriteEvent::Wrapped { path, flat: key } => {
                    call.issues.add(
                        ProtocolIssue::new(
                            IssueKind::FieldRelocated,
                            Severity::Low,
                            name,
                            format!("wrapped {key} into {wrapper_canonical}"),
                        )
                        .at(path)
                        .fix(FixStrategy::WrapPayload)
                        .with_context("direction", direction),
                    );
                }
                RewriteEvent::EmptyWrapper { path, wrapper } => {
                    call.issues.add(
                        ProtocolIssue::new(
                            IssueKind::WrapperWithoutPayload,
                            Severity::Medium,
                            name,
                            format!("{wrapper} present without a payload"),
                        )
                        .at(path)
                        .fix(FixStrategy::PassThrough),
                    );
                }
            }
        }
    }
}
