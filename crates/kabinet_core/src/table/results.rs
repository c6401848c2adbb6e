//! Shapes of query results and the actions a query block can return.

use crate::error::CoreError;
use crate::table::{Document, PRIMARY_KEY_COLUMN};
use kabinet_engine::ProcAction;
use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// What each result carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Select {
    /// Primary key and document, shaped by [`ReturnShape`].
    #[default]
    KeysAndDocs,
    /// Primary keys only.
    Keys,
    /// Documents only.
    Docs,
}

impl FromStr for Select {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "key" | "keys" | "primary_key" | "primary_keys" => Ok(Self::Keys),
            "doc" | "docs" | "document" | "documents" => Ok(Self::Docs),
            "key_and_doc" | "keys_and_docs" | "primary_key_and_doc" | "primary_keys_and_docs" => {
                Ok(Self::KeysAndDocs)
            }
            _ => Err(CoreError::query(format!("unknown select {s:?}"))),
        }
    }
}

/// How key-and-document results are collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnShape {
    /// A list of `(key, document)` pairs (`aoa`).
    Pairs,
    /// A list of documents carrying their key under the `""` column (`aoh`).
    Merged,
    /// A map from key to document (`hoh`).
    Map,
}

impl FromStr for ReturnShape {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aoa" | "aoas" | "array_of_array" | "array_of_arrays" => Ok(Self::Pairs),
            "aoh" | "aohs" | "array_of_hash" | "array_of_hashes" => Ok(Self::Merged),
            "hoh" | "hohs" | "hash_of_hash" | "hash_of_hashes" => Ok(Self::Map),
            _ => Err(CoreError::query(format!("unknown return shape {s:?}"))),
        }
    }
}

/// One result, as handed to a query block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tuple {
    /// Primary key only.
    Key(Vec<u8>),
    /// Document only.
    Doc(Document),
    /// Primary key and document.
    Pair(Vec<u8>, Document),
    /// Document with its primary key under the `""` column.
    Merged(Document),
}

impl Tuple {
    pub(crate) fn build(select: Select, shape: ReturnShape, pk: &[u8], doc: Document) -> Self {
        match (select, shape) {
            (Select::Keys, _) => Self::Key(pk.to_vec()),
            (Select::Docs, _) => Self::Doc(doc),
            (Select::KeysAndDocs, ReturnShape::Merged) => Self::Merged(merge_key(pk, doc)),
            (Select::KeysAndDocs, ReturnShape::Pairs | ReturnShape::Map) => {
                Self::Pair(pk.to_vec(), doc)
            }
        }
    }

    /// Returns the primary key, when the tuple carries it.
    pub fn key(&self) -> Option<&[u8]> {
        match self {
            Self::Key(pk) | Self::Pair(pk, _) => Some(pk),
            Self::Merged(doc) => doc.get(PRIMARY_KEY_COLUMN).map(Vec::as_slice),
            Self::Doc(_) => None,
        }
    }

    /// Returns the document, when the tuple carries it.
    pub fn doc(&self) -> Option<&Document> {
        match self {
            Self::Doc(doc) | Self::Pair(_, doc) | Self::Merged(doc) => Some(doc),
            Self::Key(_) => None,
        }
    }

    /// Returns the document for editing before an update.
    pub fn doc_mut(&mut self) -> Option<&mut Document> {
        match self {
            Self::Doc(doc) | Self::Pair(_, doc) | Self::Merged(doc) => Some(doc),
            Self::Key(_) => None,
        }
    }

    /// The columns an update writes back.
    pub(crate) fn into_document(self) -> Option<Document> {
        match self {
            Self::Doc(doc) | Self::Pair(_, doc) => Some(doc),
            Self::Merged(mut doc) => {
                doc.remove(PRIMARY_KEY_COLUMN);
                Some(doc)
            }
            Self::Key(_) => None,
        }
    }
}

fn merge_key(pk: &[u8], mut doc: Document) -> Document {
    doc.insert(PRIMARY_KEY_COLUMN.to_vec(), pk.to_vec());
    doc
}

/// Results of a search.
///
/// `Map` is keyed and therefore sorted by primary key; use `Pairs` to keep
/// a query's order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResults {
    /// From [`Select::Keys`].
    Keys(Vec<Vec<u8>>),
    /// From [`Select::Docs`].
    Docs(Vec<Document>),
    /// From [`ReturnShape::Pairs`].
    Pairs(Vec<(Vec<u8>, Document)>),
    /// From [`ReturnShape::Merged`].
    Merged(Vec<Document>),
    /// From [`ReturnShape::Map`].
    Map(BTreeMap<Vec<u8>, Document>),
}

impl QueryResults {
    pub(crate) fn collect(
        select: Select,
        shape: ReturnShape,
        rows: impl IntoIterator<Item = (Vec<u8>, Document)>,
    ) -> Self {
        let rows = rows.into_iter();
        match (select, shape) {
            (Select::Keys, _) => Self::Keys(rows.map(|(pk, _)| pk).collect()),
            (Select::Docs, _) => Self::Docs(rows.map(|(_, doc)| doc).collect()),
            (Select::KeysAndDocs, ReturnShape::Pairs) => Self::Pairs(rows.collect()),
            (Select::KeysAndDocs, ReturnShape::Merged) => {
                Self::Merged(rows.map(|(pk, doc)| merge_key(&pk, doc)).collect())
            }
            (Select::KeysAndDocs, ReturnShape::Map) => Self::Map(rows.collect()),
        }
    }

    /// Returns the number of results.
    pub fn len(&self) -> usize {
        match self {
            Self::Keys(keys) => keys.len(),
            Self::Docs(docs) | Self::Merged(docs) => docs.len(),
            Self::Pairs(pairs) => pairs.len(),
            Self::Map(map) => map.len(),
        }
    }

    /// Returns true if nothing matched.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the primary keys in result order; empty for `Docs`.
    pub fn primary_keys(&self) -> Vec<Vec<u8>> {
        match self {
            Self::Keys(keys) => keys.clone(),
            Self::Docs(_) => Vec::new(),
            Self::Pairs(pairs) => pairs.iter().map(|(pk, _)| pk.clone()).collect(),
            Self::Merged(docs) => docs
                .iter()
                .filter_map(|doc| doc.get(PRIMARY_KEY_COLUMN).cloned())
                .collect(),
            Self::Map(map) => map.keys().cloned().collect(),
        }
    }
}

/// What a query block asks for after seeing a result. Combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QueryAction(u8);

impl QueryAction {
    /// Keep going, change nothing.
    pub const NONE: Self = Self(0);
    /// Write the tuple's document back.
    pub const UPDATE: Self = Self(1 << 0);
    /// Remove the record.
    pub const DELETE: Self = Self(1 << 1);
    /// End the query after this record.
    pub const STOP: Self = Self(1 << 2);

    /// Returns true if every flag of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if the action writes to the store.
    #[must_use]
    pub const fn is_destructive(self) -> bool {
        self.0 & (Self::UPDATE.0 | Self::DELETE.0) != 0
    }

    /// Clears the update and delete flags.
    #[must_use]
    pub const fn read_only(self) -> Self {
        Self(self.0 & Self::STOP.0)
    }

    pub(crate) const fn to_proc(self) -> ProcAction {
        ProcAction {
            put: self.contains(Self::UPDATE),
            out: self.contains(Self::DELETE),
            stop: self.contains(Self::STOP),
        }
    }
}

impl BitOr for QueryAction {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for QueryAction {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl FromStr for QueryAction {
    type Err = CoreError;

    /// Parses words separated by spaces, commas or `|`: `update`, `delete`,
    /// `break` or `stop`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.split(|c: char| c == ',' || c == '|' || c.is_whitespace())
            .filter(|word| !word.is_empty())
            .try_fold(Self::NONE, |action, word| {
                let flag = match word.to_ascii_lowercase().as_str() {
                    "update" => Self::UPDATE,
                    "delete" => Self::DELETE,
                    "break" | "stop" => Self::STOP,
                    _ => return Err(CoreError::query(format!("unknown query action {word:?}"))),
                };
                Ok(action | flag)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::document;

    fn dana() -> Document {
        document([("first", "Dana"), ("last", "Gray")])
    }

    #[test]
    fn aliases_parse() {
        assert_eq!("primary_keys".parse::<Select>().unwrap(), Select::Keys);
        assert_eq!("Documents".parse::<Select>().unwrap(), Select::Docs);
        assert_eq!("keys_and_docs".parse::<Select>().unwrap(), Select::KeysAndDocs);
        assert_eq!("hash_of_hashes".parse::<ReturnShape>().unwrap(), ReturnShape::Map);
        assert_eq!("aoa".parse::<ReturnShape>().unwrap(), ReturnShape::Pairs);
        assert_eq!("array_of_hash".parse::<ReturnShape>().unwrap(), ReturnShape::Merged);
        assert!(matches!("rows".parse::<ReturnShape>(), Err(CoreError::Query(_))));
    }

    #[test]
    fn merged_tuples_carry_the_key_and_drop_it_on_update() {
        let tuple = Tuple::build(Select::KeysAndDocs, ReturnShape::Merged, b"dana", dana());
        assert_eq!(tuple.key(), Some(&b"dana"[..]));
        assert_eq!(tuple.doc().map(Document::len), Some(3));
        assert_eq!(tuple.into_document(), Some(dana()));

        let keys_only = Tuple::build(Select::Keys, ReturnShape::Map, b"dana", dana());
        assert_eq!(keys_only.doc(), None);
        assert_eq!(keys_only.into_document(), None);
    }

    #[test]
    fn results_follow_select_then_shape() {
        let rows = || vec![(b"dana".to_vec(), dana())];
        assert_eq!(
            QueryResults::collect(Select::Keys, ReturnShape::Merged, rows()),
            QueryResults::Keys(vec![b"dana".to_vec()])
        );
        let merged = QueryResults::collect(Select::KeysAndDocs, ReturnShape::Merged, rows());
        assert_eq!(merged.primary_keys(), vec![b"dana".to_vec()]);
        assert_eq!(QueryResults::collect(Select::Docs, ReturnShape::Map, rows()).len(), 1);
        assert!(QueryResults::collect(Select::Docs, ReturnShape::Map, Vec::new()).is_empty());
    }

    #[test]
    fn actions_combine() {
        let action: QueryAction = "delete break".parse().unwrap();
        assert_eq!(action, QueryAction::DELETE | QueryAction::STOP);
        assert!(action.is_destructive());
        assert_eq!(action.read_only(), QueryAction::STOP);
        let proc = action.to_proc();
        assert!(proc.out && proc.stop && !proc.put);
        assert!(matches!("explode".parse::<QueryAction>(), Err(CoreError::Query(_))));
    }
}
