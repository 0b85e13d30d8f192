//! Document rewriter -- relocates a moved field wherever it appears.
//!
//! Two passes over the same [`RelocatedField`]:
//!
//!   - [`Rewriter::sweep`]: direction-agnostic. At every mapping it first
//!     tries to hoist a wrapped payload to the flat form, and only if that
//!     did not happen tries to wrap a flat payload. Then it descends into
//!     every value. Whatever shape is present decides the outcome, so it is
//!     safe to run over any body without knowing which endpoint is newer.
//!   - [`Rewriter::convert`]: directional. Rewrites at most one field per
//!     mapping and stops descending below a node it rewrote.
//!
//! A mapping sitting directly under a wrapper key is never wrapped again:
//! the payload key inside a wrapper is the wrapped form by definition.

use std::collections::BTreeMap;

use viaduct_protocol::{Direction, Document};

use crate::alias::RelocatedField;

/// One structural change (or refusal) made during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteEvent {
    /// `{wrapper: {inner: v}}` became `{flat: v}`.
    Hoisted {
        path: String,
        wrapper: String,
        inner: String,
        /// Sibling keys inside the wrapper with no place in the flat form.
        discarded: Vec<String>,
        /// Flat keys that already sat beside the wrapper and were replaced.
        overwritten: Vec<String>,
    },
    /// `{flat: v}` became `{wrapper: {inner: v}}`.
    Wrapped { path: String, flat: String },
    /// A wrapper was found with nothing recognisable inside; left as is.
    EmptyWrapper { path: String, wrapper: String },
}

#[derive(Debug, Clone, Default)]
pub struct Rewriter {
    field: RelocatedField,
}

impl Rewriter {
    pub fn new(field: RelocatedField) -> Self {
        Self { field }
    }

    pub fn field(&self) -> &RelocatedField {
        &self.field
    }

    /// Generic sweep over the whole tree.
    pub fn sweep(&self, node: Document) -> Document {
        self.sweep_traced(node, "$", &mut Vec::new())
    }

    /// Generic sweep, recording every change under `root`-relative paths.
    pub fn sweep_traced(
        &self,
        node: Document,
        root: &str,
        events: &mut Vec<RewriteEvent>,
    ) -> Document {
        let mut path = root.to_string();
        self.sweep_node(node, false, &mut path, events)
    }

    /// Directional pass: `Down` hoists, `Up` wraps, `Same` is a no-op.
    pub fn convert(&self, node: Document, direction: Direction) -> Document {
        self.convert_traced(node, direction, "$", &mut Vec::new())
    }

    pub fn convert_traced(
        &self,
        node: Document,
        direction: Direction,
        root: &str,
        events: &mut Vec<RewriteEvent>,
    ) -> Document {
        if direction == Direction::Same {
            return node;
        }
        let mut path = root.to_string();
        self.convert_node(node, direction, false, &mut path, events)
    }

    fn sweep_node(
        &self,
        node: Document,
        in_wrapper: bool,
        path: &mut String,
        events: &mut Vec<RewriteEvent>,
    ) -> Document {
        match node {
            Document::Mapping(mut map) => {
                // Never wrap directly under a wrapper key, even one whose
                // payload another alias failed to supply: the inner key is
                // the wrapped form there, and wrapping it again would nest
                // without bound.
                if !self.hoist(&mut map, path, events) && !in_wrapper {
                    self.wrap(&mut map, path, events);
                }
                let rewritten = map
                    .into_iter()
                    .map(|(key, value)| {
                        let mark = path.len();
                        push_key(path, &key);
                        let under_wrapper = self.field.wrapper.contains(&key);
                        let value = self.sweep_node(value, under_wrapper, path, events);
                        path.truncate(mark);
                        (key, value)
                    })
                    .collect();
                Document::Mapping(rewritten)
            }
            Document::Sequence(items) => Document::Sequence(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let mark = path.len();
                        push_index(path, index);
                        let item = self.sweep_node(item, false, path, events);
                        path.truncate(mark);
                        item
                    })
                    .collect(),
            ),
            scalar @ Document::Scalar(_) => scalar,
        }
    }

    fn convert_node(
        &self,
        node: Document,
        direction: Direction,
        in_wrapper: bool,
        path: &mut String,
        events: &mut Vec<RewriteEvent>,
    ) -> Document {
        match node {
            Document::Mapping(mut map) => {
                let rewrote = match direction {
                    Direction::Down => self.hoist(&mut map, path, events),
                    // Same exception as the sweep: no wrapping inside a wrapper.
                    Direction::Up => !in_wrapper && self.wrap(&mut map, path, events),
                    Direction::Same => false,
                };
                if rewrote {
                    return Document::Mapping(map);
                }
                let rewritten = map
                    .into_iter()
                    .map(|(key, value)| {
                        let mark = path.len();
                        push_key(path, &key);
                        let under_wrapper = self.field.wrapper.contains(&key);
                        let value = self.convert_node(value, direction, under_wrapper, path, events);
                        path.truncate(mark);
                        (key, value)
                    })
                    .collect();
                Document::Mapping(rewritten)
            }
            Document::Sequence(items) => Document::Sequence(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let mark = path.len();
                        push_index(path, index);
                        let item = self.convert_node(item, direction, false, path, events);
                        path.truncate(mark);
                        item
                    })
                    .collect(),
            ),
            scalar @ Document::Scalar(_) => scalar,
        }
    }

    /// Down-conversion at one mapping. Returns whether it fired.
    fn hoist(
        &self,
        map: &mut BTreeMap<String, Document>,
        path: &str,
        events: &mut Vec<RewriteEvent>,
    ) -> bool {
        let Some(wrapper_key) = self.field.wrapper.find_in(map).map(str::to_string) else {
            return false;
        };

        let inner_key = map
            .get(&wrapper_key)
            .and_then(Document::as_mapping)
            .and_then(|inner| self.field.inner.find_in(inner))
            .map(str::to_string);

        let Some(inner_key) = inner_key else {
            events.push(RewriteEvent::EmptyWrapper {
                path: path.to_string(),
                wrapper: wrapper_key,
            });
            return false;
        };

        let Some(Document::Mapping(mut wrapper)) = map.remove(&wrapper_key) else {
            return false;
        };
        let Some(payload) = wrapper.remove(&inner_key) else {
            return false;
        };

        let overwritten = self
            .field
            .flat
            .names()
            .iter()
            .filter(|name| map.remove(name.as_str()).is_some())
            .cloned()
            .collect();
        map.insert(self.field.flat.canonical().to_string(), payload);
        events.push(RewriteEvent::Hoisted {
            path: path.to_string(),
            wrapper: wrapper_key,
            inner: inner_key,
            discarded: wrapper.into_keys().collect(),
            overwritten,
        });
        true
    }

    /// Up-conversion at one mapping. Returns whether it fired.
    fn wrap(
        &self,
        map: &mut BTreeMap<String, Document>,
        path: &str,
        events: &mut Vec<RewriteEvent>,
    ) -> bool {
        if self.field.wrapper.find_in(map).is_some() {
            return false;
        }
        let Some(flat_key) = self.field.flat.find_in(map).map(str::to_string) else {
            return false;
        };
        let Some(payload) = map.remove(&flat_key) else {
            return false;
        };

        let mut wrapper = BTreeMap::new();
        wrapper.insert(self.field.inner.canonical().to_string(), payload);
        map.insert(
            self.field.wrapper.canonical().to_string(),
            Document::Mapping(wrapper),
        );
        events.push(RewriteEvent::Wrapped {
            path: path.to_string(),
            flat: flat_key,
        });
        true
    }
}

fn push_key(path: &mut String, key: &str) {
    path.push('.');
    path.push_str(key);
}

fn push_index(path: &mut String, index: usize) {
    use std::fmt::Write;
    let _ = write!(path, "[{index}]");
}
