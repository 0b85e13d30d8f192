//! Nested command translation for the container packet.
//!
//! Each entry carries an id in the source revision's namespace. The id is
//! resolved to a name, the payload is dispatched through the whole engine
//! under that name, and the id is rewritten into the destination namespace.
//! Entries keep their order; one unresolvable entry rejects the container.

use bytes::Bytes;
use viaduct_protocol::{ProtocolError, UnionCmd, UnionCmdNotify};

use crate::diagnostics::{FixStrategy, IssueKind, ProtocolIssue, Severity};
use crate::dispatcher::{Call, Translator};
use crate::TranslateError;

impl Translator {
    pub(crate) fn translate_entries(
        &self,
        call: &mut Call,
        container: &str,
        body: &Bytes,
    ) -> Result<Bytes, TranslateError> {
        let notify: UnionCmdNotify = serde_json::from_slice(body)
            .map_err(|e| self.malformed(call, container, body, ProtocolError::from(e)))?;

        let mut translated = Vec::with_capacity(notify.cmd_list.len());
        for (index, cmd) in notify.cmd_list.into_iter().enumerate() {
            let location = format!("$.cmdList[{index}]");
            let id = cmd.message_id;

            let Some(name) = call.mapping.name_of(call.from, id).map(str::to_string) else {
                call.issues.add(
                    ProtocolIssue::new(
                        IssueKind::UnresolvedCommand,
                        Severity::High,
                        container,
                        format!("command id {id} unknown in {}", call.from),
                    )
                    .at(location)
                    .fix(FixStrategy::RejectContainer)
                    .with_context("message_id", id),
                );
                return Err(TranslateError::UnresolvedCommand {
                    id,
                    version: call.from,
                });
            };

            let Some(new_id) = call.mapping.paired_id(call.from, call.to, id) else {
                call.issues.add(
                    ProtocolIssue::new(
                        IssueKind::UnpairedCommand,
                        Severity::High,
                        container,
                        format!("{name} has no command id in {}", call.to),
                    )
                    .at(location)
                    .fix(FixStrategy::RejectContainer)
                    .with_context("message_id", id)
                    .with_context("name", name.as_str()),
                );
                return Err(TranslateError::UnpairedCommand {
                    name,
                    id,
                    from: call.from,
                    to: call.to,
                });
            };

            let payload = self
                .dispatch(call, &name, &[], &cmd.body)
                .map_err(|source| TranslateError::Nested {
                    index,
                    name: name.clone(),
                    source: Box::new(source),
                })?;

            tracing::trace!(
                container,
                index,
                name = name.as_str(),
                from_id = id,
                to_id = new_id,
                "nested command translated"
            );
            translated.push(UnionCmd {
                message_id: new_id,
                body: payload,
            });
        }

        let notify = UnionCmdNotify {
            cmd_list: translated,
        };
        serde_json::to_vec(&notify)
            .map(Bytes::from)
            .map_err(|e| TranslateError::Encode {
                packet: container.to_string(),
                source: ProtocolError::from(e),
            })
    }
}
