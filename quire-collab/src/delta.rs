//! Rich-text operation sequences (Quill delta format) and composition.
//!
//! A [`Delta`] is an ordered list of [`Op`]s. The same type describes both a
//! *document* (inserts only) and a *change* against a document (any mix of
//! insert / retain / delete):
//!
//! ```text
//! document:  [ insert "Hello" {bold} | insert " world\n" ]
//! change:    [ retain 5 | insert "," | delete 6 ]
//!                 │
//!                 ▼  compose
//! result:    [ insert "Hello" {bold} | insert ",\n" ]
//! ```
//!
//! Lengths and positions are counted in UTF-16 code units, the unit the
//! browser editor reports, so positions sent by clients line up exactly.
//!
//! Reference: quill-delta `Delta#compose` / `AttributeMap.compose`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Formatting attributes attached to an insert or retain (`bold`, `color`, …).
///
/// A `null` value inside a retain removes the attribute.
pub type Attributes = Map<String, Value>;

/// Object placeholder used when rendering embeds as plain text.
const EMBED_PLACEHOLDER: char = '\u{FFFC}';

/// Inserted content: a run of text or a single embed (image, video, …).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Insert {
    Text(String),
    /// e.g. `{"image": "data:image/png;base64,…"}`; always length 1.
    Embed(Map<String, Value>),
}

impl Insert {
    /// Length in UTF-16 code units.
    pub fn len(&self) -> u64 {
        match self {
            Insert::Text(text) => utf16_len(text),
            Insert::Embed(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One operation of a delta.
///
/// Serialized in the editor's JSON shape: `{"insert": …}`, `{"retain": n}`
/// or `{"delete": n}`, with optional `attributes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Op {
    Insert {
        insert: Insert,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<Attributes>,
    },
    Retain {
        retain: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<Attributes>,
    },
    Delete {
        delete: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Insert,
    Retain,
    Delete,
}

impl Op {
    /// Length of the op in UTF-16 code units.
    pub fn len(&self) -> u64 {
        match self {
            Op::Insert { insert, .. } => insert.len(),
            Op::Retain { retain, .. } => *retain,
            Op::Delete { delete } => *delete,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Op::Insert { .. })
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Op::Insert { attributes, .. } | Op::Retain { attributes, .. } => attributes.as_ref(),
            Op::Delete { .. } => None,
        }
    }

    fn kind(&self) -> OpKind {
        match self {
            Op::Insert { .. } => OpKind::Insert,
            Op::Retain { .. } => OpKind::Retain,
            Op::Delete { .. } => OpKind::Delete,
        }
    }

    /// `{}` and missing attributes mean the same thing; keep only `None`.
    fn with_canonical_attributes(self) -> Self {
        match self {
            Op::Insert { insert, attributes } => Op::Insert {
                insert,
                attributes: attributes.filter(|a| !a.is_empty()),
            },
            Op::Retain { retain, attributes } => Op::Retain {
                retain,
                attributes: attributes.filter(|a| !a.is_empty()),
            },
            delete => delete,
        }
    }
}

/// Delta errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeltaError {
    /// The change retains or deletes past the end of the document.
    #[error("Change spans {required} units but the document is only {available} long")]
    OutOfBounds { required: u64, available: u64 },
    /// A snapshot must consist of inserts only.
    #[error("Snapshot contains retain or delete operations")]
    NotADocument,
    /// An op boundary of the change falls inside a UTF-16 surrogate pair.
    #[error("Change splits a surrogate pair at unit {position}")]
    SplitsSurrogatePair { position: u64 },
}

/// An ordered sequence of operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub ops: Vec<Op>,
}

impl Delta {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// The canonical "empty" document: a single newline.
    pub fn default_document() -> Self {
        Self::new().insert("\n", None)
    }

    /// Build a normalized delta from raw ops.
    pub fn from_ops(ops: impl IntoIterator<Item = Op>) -> Self {
        let mut delta = Self::new();
        for op in ops {
            delta.push(op);
        }
        delta
    }

    pub fn insert(mut self, text: impl Into<String>, attributes: Option<Attributes>) -> Self {
        self.push(Op::Insert {
            insert: Insert::Text(text.into()),
            attributes,
        });
        self
    }

    pub fn insert_embed(mut self, embed: Map<String, Value>, attributes: Option<Attributes>) -> Self {
        self.push(Op::Insert {
            insert: Insert::Embed(embed),
            attributes,
        });
        self
    }

    pub fn retain(mut self, length: u64, attributes: Option<Attributes>) -> Self {
        self.push(Op::Retain {
            retain: length,
            attributes,
        });
        self
    }

    pub fn delete(mut self, length: u64) -> Self {
        self.push(Op::Delete { delete: length });
        self
    }

    /// Append an op, merging it with its predecessor where possible.
    ///
    /// Inserts are always ordered before an adjacent delete, so equivalent
    /// changes have one canonical form.
    pub fn push(&mut self, op: Op) -> &mut Self {
        let op = op.with_canonical_attributes();
        if op.is_empty() {
            return self;
        }

        let mut index = self.ops.len();
        if let Some(Op::Delete { delete }) = self.ops.last_mut() {
            if let Op::Delete { delete: extra } = op {
                *delete = delete.saturating_add(extra);
                return self;
            }
            if op.is_insert() {
                index -= 1;
                if index == 0 {
                    self.ops.insert(0, op);
                    return self;
                }
            }
        }

        if index > 0 && try_merge(&mut self.ops[index - 1], &op) {
            return self;
        }

        if index == self.ops.len() {
            self.ops.push(op);
        } else {
            self.ops.insert(index, op);
        }
        self
    }

    /// Drop a trailing attribute-less retain; it has no effect.
    pub fn chop(mut self) -> Self {
        if let Some(Op::Retain {
            attributes: None, ..
        }) = self.ops.last()
        {
            self.ops.pop();
        }
        self
    }

    /// Total length of all ops. Saturates at `u64::MAX`.
    pub fn length(&self) -> u64 {
        self.ops.iter().map(Op::len).fold(0, u64::saturating_add)
    }

    /// Length of the document this change expects to be applied to, at minimum.
    /// Saturates at `u64::MAX`, which no document can satisfy.
    pub fn base_length(&self) -> u64 {
        self.ops
            .iter()
            .filter(|op| !op.is_insert())
            .map(Op::len)
            .fold(0, u64::saturating_add)
    }

    /// Whether this delta is a plain document (inserts only).
    pub fn is_document(&self) -> bool {
        self.ops.iter().all(Op::is_insert)
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Compose `other` after `self`, producing a single equivalent delta.
    pub fn compose(&self, other: &Delta) -> Delta {
        let mut this = OpIter::new(&self.ops);
        let mut that = OpIter::new(&other.ops);
        let mut out = Delta::new();

        while this.has_next() || that.has_next() {
            if that.peek_kind() == OpKind::Insert {
                out.push(that.next(u64::MAX));
            } else if this.peek_kind() == OpKind::Delete {
                out.push(this.next(u64::MAX));
            } else {
                let length = this.peek_len().min(that.peek_len());
                let this_op = this.next(length);
                let that_op = that.next(length);

                match that_op {
                    Op::Retain {
                        attributes: incoming,
                        ..
                    } => match this_op {
                        Op::Retain { attributes, .. } => {
                            out.push(Op::Retain {
                                retain: length,
                                attributes: compose_attributes(
                                    attributes.as_ref(),
                                    incoming.as_ref(),
                                    true,
                                ),
                            });
                        }
                        Op::Insert { insert, attributes } => {
                            out.push(Op::Insert {
                                insert,
                                attributes: compose_attributes(
                                    attributes.as_ref(),
                                    incoming.as_ref(),
                                    false,
                                ),
                            });
                        }
                        Op::Delete { .. } => {}
                    },
                    // Deleting something we inserted cancels out.
                    Op::Delete { delete } => {
                        if matches!(this_op, Op::Retain { .. }) {
                            out.push(Op::Delete { delete });
                        }
                    }
                    Op::Insert { .. } => {}
                }
            }
        }

        out.chop()
    }

    /// Apply a change to this document.
    ///
    /// Unlike [`compose`](Self::compose), this refuses changes that reach
    /// past the end of the document or cut through a surrogate pair.
    pub fn apply(&self, change: &Delta) -> Result<Delta, DeltaError> {
        if !self.is_document() {
            return Err(DeltaError::NotADocument);
        }
        let available = self.length();
        let required = change.base_length();
        if required > available {
            return Err(DeltaError::OutOfBounds {
                required,
                available,
            });
        }
        if let Some(position) = self.split_point(change) {
            return Err(DeltaError::SplitsSurrogatePair { position });
        }
        Ok(self.compose(change))
    }

    /// First position where `change` would cut this document between the
    /// two halves of a surrogate pair.
    fn split_point(&self, change: &Delta) -> Option<u64> {
        // Op boundaries in document coordinates, non-decreasing
        let mut position = 0u64;
        let mut cuts = change
            .ops
            .iter()
            .map(|op| {
                if !op.is_insert() {
                    position = position.saturating_add(op.len());
                }
                position
            })
            .collect::<Vec<_>>()
            .into_iter()
            .peekable();

        let mut unit = 0u64;
        for op in &self.ops {
            let text = match op {
                Op::Insert {
                    insert: Insert::Text(text),
                    ..
                } if !text.is_ascii() => text,
                _ => {
                    unit += op.len();
                    continue;
                }
            };
            for ch in text.chars() {
                if ch.len_utf16() == 2 {
                    let inside = unit + 1;
                    while cuts.next_if(|&cut| cut < inside).is_some() {}
                    if cuts.peek() == Some(&inside) {
                        return Some(inside);
                    }
                }
                unit += ch.len_utf16() as u64;
            }
        }
        None
    }

    /// Canonical form: the effect of this delta on an empty document.
    pub fn normalized(&self) -> Delta {
        Delta::new().compose(self)
    }

    /// Two deltas are equivalent if they produce the same document from empty.
    pub fn semantically_eq(&self, other: &Delta) -> bool {
        self.normalized() == other.normalized()
    }

    /// Plain text of a document; embeds become U+FFFC.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for op in &self.ops {
            match op {
                Op::Insert {
                    insert: Insert::Text(text),
                    ..
                } => out.push_str(text),
                Op::Insert {
                    insert: Insert::Embed(_),
                    ..
                } => out.push(EMBED_PLACEHOLDER),
                _ => {}
            }
        }
        out
    }
}

/// Merge `next` into `prev` when both are text inserts or both retains with
/// identical attributes.
fn try_merge(prev: &mut Op, next: &Op) -> bool {
    match (prev, next) {
        (
            Op::Insert {
                insert: Insert::Text(text),
                attributes: prev_attrs,
            },
            Op::Insert {
                insert: Insert::Text(more),
                attributes: next_attrs,
            },
        ) if *prev_attrs == *next_attrs => {
            text.push_str(more);
            true
        }
        (
            Op::Retain {
                retain,
                attributes: prev_attrs,
            },
            Op::Retain {
                retain: more,
                attributes: next_attrs,
            },
        ) if *prev_attrs == *next_attrs => {
            *retain = retain.saturating_add(*more);
            true
        }
        _ => false,
    }
}

/// Compose two attribute maps. `b` wins; keys only in `a` carry over.
///
/// `null` values in `b` survive only when `keep_null` (i.e. the result is
/// still a retain that must remove the attribute downstream).
fn compose_attributes(
    a: Option<&Attributes>,
    b: Option<&Attributes>,
    keep_null: bool,
) -> Option<Attributes> {
    let mut out = b.cloned().unwrap_or_default();
    if !keep_null {
        out.retain(|_, value| !value.is_null());
    }
    if let Some(a) = a {
        for (key, value) in a {
            if !b.is_some_and(|b| b.contains_key(key)) {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    (!out.is_empty()).then_some(out)
}

/// Cursor over a list of ops that can split an op at any offset.
struct OpIter<'a> {
    ops: &'a [Op],
    index: usize,
    offset: u64,
}

impl<'a> OpIter<'a> {
    fn new(ops: &'a [Op]) -> Self {
        Self {
            ops,
            index: 0,
            offset: 0,
        }
    }

    fn has_next(&self) -> bool {
        self.index < self.ops.len()
    }

    /// Remaining length of the current op; unbounded once exhausted.
    fn peek_len(&self) -> u64 {
        self.ops
            .get(self.index)
            .map_or(u64::MAX, |op| op.len() - self.offset)
    }

    /// An exhausted iterator behaves like an endless retain.
    fn peek_kind(&self) -> OpKind {
        self.ops.get(self.index).map_or(OpKind::Retain, Op::kind)
    }

    /// Take up to `length` units from the current op.
    fn next(&mut self, length: u64) -> Op {
        let Some(op) = self.ops.get(self.index) else {
            return Op::Retain {
                retain: length,
                attributes: None,
            };
        };

        let offset = self.offset;
        let remaining = op.len() - offset;
        let length = if length >= remaining {
            self.index += 1;
            self.offset = 0;
            remaining
        } else {
            self.offset += length;
            length
        };

        match op {
            Op::Delete { .. } => Op::Delete { delete: length },
            Op::Retain { attributes, .. } => Op::Retain {
                retain: length,
                attributes: attributes.clone(),
            },
            Op::Insert {
                insert: Insert::Text(text),
                attributes,
            } => Op::Insert {
                insert: Insert::Text(utf16_slice(text, offset, length)),
                attributes: attributes.clone(),
            },
            Op::Insert { insert, attributes } => Op::Insert {
                insert: insert.clone(),
                attributes: attributes.clone(),
            },
        }
    }
}

fn utf16_len(text: &str) -> u64 {
    if text.is_ascii() {
        text.len() as u64
    } else {
        text.encode_utf16().count() as u64
    }
}

/// Substring by UTF-16 offsets. Splitting a surrogate pair yields U+FFFD,
/// which keeps the unit count unchanged; [`Delta::apply`] refuses such cuts.
fn utf16_slice(text: &str, start: u64, length: u64) -> String {
    if text.is_ascii() {
        let start = start as usize;
        let end = start.saturating_add(length as usize).min(text.len());
        return text[start..end].to_string();
    }
    let units: Vec<u16> = text
        .encode_utf16()
        .skip(start as usize)
        .take(length as usize)
        .collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bold() -> Option<Attributes> {
        json!({ "bold": true }).as_object().cloned()
    }

    #[test]
    fn test_default_document_is_single_newline() {
        let doc = Delta::default_document();
        assert_eq!(doc.ops.len(), 1);
        assert_eq!(doc.text(), "\n");
        assert_eq!(Delta::new().compose(&doc).text(), "\n");
    }

    #[test]
    fn test_insert_at_start() {
        let doc = Delta::default_document();
        let change = Delta::new().insert("hi", None);
        let result = doc.apply(&change).unwrap();
        assert_eq!(result, Delta::new().insert("hi\n", None));
    }

    #[test]
    fn test_insert_in_middle_and_delete() {
        let doc = Delta::new().insert("Hello world\n", None);
        let change = Delta::new().retain(5, None).insert(",", None).delete(6);
        let result = doc.apply(&change).unwrap();
        assert_eq!(result.text(), "Hello,\n");
    }

    #[test]
    fn test_sequential_application_matches_composed_change() {
        let doc = Delta::new().insert("abc\n", None);
        let a = Delta::new().retain(1, None).insert("XY", None).delete(1);
        let b = Delta::new().retain(2, None).delete(2).insert("!", bold());

        let stepwise = doc.compose(&a).compose(&b);
        let combined = doc.compose(&a.compose(&b));
        assert_eq!(stepwise, combined);
        assert_eq!(stepwise.text(), "aX!\n");
    }

    #[test]
    fn test_compose_associative_with_formatting() {
        let a = Delta::new().insert("Hello", None);
        let b = Delta::new().retain(5, bold()).insert(" world", None);
        let c = Delta::new()
            .retain(2, None)
            .retain(3, json!({ "bold": null }).as_object().cloned())
            .delete(1);

        let left = a.compose(&b).compose(&c);
        let right = a.compose(&b.compose(&c));
        assert_eq!(left, right);
        assert_eq!(
            left,
            Delta::new()
                .insert("He", bold())
                .insert("lloworld", None)
        );
    }

    #[test]
    fn test_retain_null_removes_attribute_from_insert() {
        let doc = Delta::new().insert("bold", bold()).insert("\n", None);
        let unbold = Delta::new().retain(4, json!({ "bold": null }).as_object().cloned());
        let result = doc.apply(&unbold).unwrap();
        assert_eq!(result, Delta::new().insert("bold\n", None));
    }

    #[test]
    fn test_retain_composition_keeps_null() {
        let a = Delta::new().retain(3, bold());
        let b = Delta::new().retain(3, json!({ "bold": null }).as_object().cloned());
        let composed = a.compose(&b);
        assert_eq!(
            composed,
            Delta::new().retain(3, json!({ "bold": null }).as_object().cloned())
        );
    }

    #[test]
    fn test_delete_of_inserted_text_cancels() {
        let a = Delta::new().insert("abc", None);
        let b = Delta::new().delete(3);
        assert!(a.compose(&b).is_empty());
    }

    #[test]
    fn test_out_of_bounds_change_rejected() {
        let doc = Delta::default_document();
        let change = Delta::new().retain(5, None).insert("x", None);
        assert_eq!(
            doc.apply(&change),
            Err(DeltaError::OutOfBounds {
                required: 5,
                available: 1
            })
        );

        let too_much_delete = Delta::new().delete(2);
        assert!(doc.apply(&too_much_delete).is_err());
    }

    #[test]
    fn test_apply_requires_document() {
        let not_doc = Delta::new().retain(1, None).insert("x", None);
        let change = Delta::new().insert("y", None);
        assert_eq!(not_doc.apply(&change), Err(DeltaError::NotADocument));
    }

    #[test]
    fn test_push_merges_and_orders_insert_before_delete() {
        let mut delta = Delta::new();
        delta.push(Op::Retain { retain: 2, attributes: None });
        delta.push(Op::Delete { delete: 1 });
        delta.push(Op::Delete { delete: 2 });
        delta.push(Op::Insert {
            insert: Insert::Text("x".into()),
            attributes: None,
        });
        assert_eq!(
            delta.ops,
            vec![
                Op::Retain { retain: 2, attributes: None },
                Op::Insert {
                    insert: Insert::Text("x".into()),
                    attributes: None
                },
                Op::Delete { delete: 3 },
            ]
        );
    }

    #[test]
    fn test_push_drops_empty_ops_and_empty_attributes() {
        let mut delta = Delta::new();
        delta.push(Op::Insert {
            insert: Insert::Text(String::new()),
            attributes: None,
        });
        delta.push(Op::Retain { retain: 0, attributes: None });
        delta.push(Op::Insert {
            insert: Insert::Text("a".into()),
            attributes: Some(Map::new()),
        });
        delta.push(Op::Insert {
            insert: Insert::Text("b".into()),
            attributes: None,
        });
        assert_eq!(delta, Delta::new().insert("ab", None));
    }

    #[test]
    fn test_embed_counts_as_one_unit() {
        let image = json!({ "image": "data:image/png;base64,AAAA" })
            .as_object()
            .cloned()
            .unwrap();
        let doc = Delta::new()
            .insert("a", None)
            .insert_embed(image.clone(), None)
            .insert("b\n", None);
        assert_eq!(doc.length(), 4);

        let change = Delta::new().retain(1, None).retain(1, bold());
        let result = doc.apply(&change).unwrap();
        assert_eq!(result.ops[1], Op::Insert {
            insert: Insert::Embed(image),
            attributes: bold(),
        });
        assert_eq!(result.text(), "a\u{FFFC}b\n");
    }

    #[test]
    fn test_positions_are_utf16_units() {
        // "😀" is two UTF-16 units.
        let doc = Delta::new().insert("😀a\n", None);
        assert_eq!(doc.length(), 4);

        let change = Delta::new().retain(2, None).insert("!", None);
        assert_eq!(doc.apply(&change).unwrap().text(), "😀!a\n");
    }

    #[test]
    fn test_semantic_equality_ignores_op_boundaries() {
        let split = Delta {
            ops: vec![
                Op::Insert { insert: Insert::Text("h".into()), attributes: None },
                Op::Insert { insert: Insert::Text("i\n".into()), attributes: None },
            ],
        };
        assert_ne!(split, Delta::new().insert("hi\n", None));
        assert!(split.semantically_eq(&Delta::new().insert("hi\n", None)));
    }

    #[test]
    fn test_editor_json_shape() {
        let raw = json!({
            "ops": [
                { "retain": 3 },
                { "insert": "x", "attributes": { "italic": true } },
                { "insert": { "image": "data:image/gif;base64,R0lG" } },
                { "delete": 2 }
            ]
        });
        let delta: Delta = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(delta.ops[0], Op::Retain { retain: 3, attributes: None }));
        assert!(matches!(delta.ops[2], Op::Insert { insert: Insert::Embed(_), .. }));
        assert!(matches!(delta.ops[3], Op::Delete { delete: 2 }));
        assert_eq!(serde_json::to_value(&delta).unwrap(), raw);
    }

    #[test]
    fn test_rejects_unknown_op_shape() {
        let raw = json!({ "ops": [{ "insert": 5 }] });
        assert!(serde_json::from_value::<Delta>(raw).is_err());

        let negative = json!({ "ops": [{ "retain": -1 }] });
        assert!(serde_json::from_value::<Delta>(negative).is_err());
    }

    #[test]
    fn test_overflowing_change_rejected() {
        let doc = Delta::default_document();

        let retains: Delta = serde_json::from_value(json!({
            "ops": [
                { "retain": u64::MAX, "attributes": { "bold": true } },
                { "retain": 1 }
            ]
        }))
        .unwrap();
        assert_eq!(retains.base_length(), u64::MAX);
        assert_eq!(
            doc.apply(&retains),
            Err(DeltaError::OutOfBounds { required: u64::MAX, available: 1 })
        );

        let deletes: Delta = serde_json::from_value(json!({
            "ops": [{ "delete": u64::MAX }, { "retain": 2 }, { "delete": 1 }]
        }))
        .unwrap();
        assert!(matches!(doc.apply(&deletes), Err(DeltaError::OutOfBounds { .. })));

        // Still a usable document afterwards
        assert_eq!(doc.apply(&Delta::new().insert("ok", None)).unwrap().text(), "ok\n");
    }

    #[test]
    fn test_push_saturates_merged_lengths() {
        let delta = Delta::new().retain(u64::MAX, None).retain(5, None);
        assert_eq!(delta.ops, vec![Op::Retain { retain: u64::MAX, attributes: None }]);

        let delta = Delta::new().delete(u64::MAX).delete(1);
        assert_eq!(delta.ops, vec![Op::Delete { delete: u64::MAX }]);
        assert_eq!(delta.length(), u64::MAX);
    }

    #[test]
    fn test_change_splitting_surrogate_pair_rejected() {
        // "😀" occupies units 1 and 2
        let doc = Delta::new().insert("a😀b\n", None);

        let inside_insert = Delta::new().retain(2, None).insert("x", None);
        assert_eq!(
            doc.apply(&inside_insert),
            Err(DeltaError::SplitsSurrogatePair { position: 2 })
        );

        let half_delete = Delta::new().retain(1, None).delete(1);
        assert_eq!(
            doc.apply(&half_delete),
            Err(DeltaError::SplitsSurrogatePair { position: 2 })
        );

        let half_format = Delta::new().retain(2, bold());
        assert!(doc.apply(&half_format).is_err());

        // Whole-pair edits are fine
        let whole = Delta::new().retain(1, None).delete(2).insert("!", None);
        assert_eq!(doc.apply(&whole).unwrap().text(), "a!b\n");
        let after = Delta::new().retain(3, None).insert("x", None);
        assert_eq!(doc.apply(&after).unwrap().text(), "a😀xb\n");
    }
}
