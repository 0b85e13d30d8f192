//! Field aliases -- the historical names one logical field has carried.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use viaduct_protocol::Document;

/// Priority-ordered key names for one logical field. The first entry is the
/// canonical name and is what the rewriter emits; lookups return the first
/// entry present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FieldAlias {
    names: Vec<String>,
}

impl FieldAlias {
    pub fn new(canonical: impl Into<String>) -> Self {
        Self {
            names: vec![canonical.into()],
        }
    }

    /// Append a lower-priority historical name.
    pub fn or(mut self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        if !self.names.contains(&alias) {
            self.names.push(alias);
        }
        self
    }

    pub fn canonical(&self) -> &str {
        &self.names[0]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, key: &str) -> bool {
        self.names.iter().any(|n| n == key)
    }

    /// First alias, in priority order, that is a key of `map`.
    pub fn find_in(&self, map: &BTreeMap<String, Document>) -> Option<&str> {
        self.names
            .iter()
            .find(|n| map.contains_key(n.as_str()))
            .map(String::as_str)
    }
}

impl TryFrom<Vec<String>> for FieldAlias {
    type Error = String;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        let mut iter = names.into_iter();
        let canonical = iter
            .next()
            .ok_or_else(|| "field alias needs at least one name".to_string())?;
        Ok(iter.fold(Self::new(canonical), |alias, name| alias.or(name)))
    }
}

impl From<FieldAlias> for Vec<String> {
    fn from(alias: FieldAlias) -> Self {
        alias.names
    }
}

/// A field that moved under a wrapper between revisions.
///
/// Legacy form: `{ <flat>: payload }`.
/// Wrapped form: `{ <wrapper>: { <inner>: payload, ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocatedField {
    /// Names of the wrapper key.
    pub wrapper: FieldAlias,
    /// Names the payload carries when it sits flat on the parent.
    pub flat: FieldAlias,
    /// Names the payload carries inside the wrapper.
    pub inner: FieldAlias,
}

impl RelocatedField {
    /// `trifleItem` moved under `trifleGadget` in 4.x. Snake-case names are
    /// the proto field names some encoders emit instead of JSON names; bare
    /// `item` was the inner key during the 4.0 betas and is only honoured
    /// inside the wrapper.
    pub fn trifle() -> Self {
        Self {
            wrapper: FieldAlias::new("trifleGadget").or("trifle_gadget"),
            flat: FieldAlias::new("trifleItem").or("trifle_item"),
            inner: FieldAlias::new("trifleItem").or("trifle_item").or("item"),
        }
    }
}

impl Default for RelocatedField {
    fn default() -> Self {
        Self::trifle()
    }
}
