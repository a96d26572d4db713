/*!
The snapshot document: the single interchange unit between extraction and restoration.

A [`Snapshot`] normalizes three persistence models into one tree:
preference stores (flat key/value), databases (sampled table rows) and the
private file tree. It is assembled once and only read afterwards.
*/

use crate::{value::PreferenceMap, Result, VaultError};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Sampled content of one database file, keyed by table name
pub type DatabaseImage = BTreeMap<String, Vec<Row>>;

/// One sampled table row.
///
/// Columns keep the order of the source schema. Every value is text; SQL
/// `NULL` is kept as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(Vec<(String, Option<String>)>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column; a repeated name replaces the earlier value in place.
    pub fn push<K: Into<String>>(&mut self, column: K, value: Option<String>) {
        let column = column.into();
        match self.0.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.0.push((column, value)),
        }
    }

    pub fn with<K: Into<String>, V: Into<String>>(mut self, column: K, value: V) -> Self {
        self.push(column, Some(value.into()));
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = Option<&str>> {
        self.0.iter().map(|(_, value)| value.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (column, value) in &self.0 {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of column name to text or null")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Row, A::Error> {
                let mut row = Row::new();
                while let Some((column, value)) = access.next_entry::<String, Option<String>>()? {
                    row.push(column, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

/// Node of the captured file tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileNode {
    /// Directory with its children keyed by file name
    Directory(BTreeMap<String, FileNode>),
    /// Text file captured verbatim
    Text(String),
    /// File content was not textual and was not captured
    Binary,
    /// File was at or above the size threshold and was not read
    Oversized,
}

impl FileNode {
    pub fn empty_dir() -> Self {
        FileNode::Directory(BTreeMap::new())
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self, FileNode::Binary | FileNode::Oversized)
    }

    pub fn children(&self) -> Option<&BTreeMap<String, FileNode>> {
        match self {
            FileNode::Directory(children) => Some(children),
            _ => None,
        }
    }

    /// Look up a node by a `/`-separated path relative to this node
    pub fn lookup(&self, path: &str) -> Option<&FileNode> {
        path.split('/')
            .filter(|part| !part.is_empty())
            .try_fold(self, |node, part| node.children()?.get(part))
    }
}

impl Default for FileNode {
    fn default() -> Self {
        Self::empty_dir()
    }
}

/// Normalized capture of one application's private storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    preference_stores: BTreeMap<String, PreferenceMap>,
    databases: BTreeMap<String, DatabaseImage>,
    files: FileNode,
}

/// Entry counts of a snapshot, used in logs, metadata and the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub preference_stores: usize,
    pub preference_values: usize,
    pub databases: usize,
    pub tables: usize,
    pub rows: usize,
    pub top_level_files: usize,
    pub text_files: usize,
    pub binary_files: usize,
    pub oversized_files: usize,
}

impl Snapshot {
    /// Compose extractor outputs into a snapshot
    pub fn assemble(
        preference_stores: BTreeMap<String, PreferenceMap>,
        databases: BTreeMap<String, DatabaseImage>,
        files: FileNode,
    ) -> Self {
        Self {
            preference_stores,
            databases,
            files,
        }
    }

    /// A snapshot with no content at all
    pub fn empty() -> Self {
        Self::assemble(BTreeMap::new(), BTreeMap::new(), FileNode::empty_dir())
    }

    pub fn preference_stores(&self) -> &BTreeMap<String, PreferenceMap> {
        &self.preference_stores
    }

    pub fn databases(&self) -> &BTreeMap<String, DatabaseImage> {
        &self.databases
    }

    pub fn files(&self) -> &FileNode {
        &self.files
    }

    /// Serialize to the self-describing JSON form
    pub fn serialize(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(VaultError::Json)
    }

    /// Pretty-printed JSON, used for backup output files
    pub fn serialize_pretty(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(VaultError::Json)
    }

    /// Parse a serialized snapshot; malformed input is rejected as a whole
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| VaultError::invalid_format(format!("Malformed snapshot document: {e}")))
    }

    pub fn summary(&self) -> SnapshotSummary {
        let mut summary = SnapshotSummary {
            preference_stores: self.preference_stores.len(),
            preference_values: self.preference_stores.values().map(PreferenceMap::len).sum(),
            databases: self.databases.len(),
            tables: self.databases.values().map(BTreeMap::len).sum(),
            rows: self
                .databases
                .values()
                .flat_map(BTreeMap::values)
                .map(Vec::len)
                .sum(),
            top_level_files: self.files.children().map_or(0, BTreeMap::len),
            ..SnapshotSummary::default()
        };
        count_leaves(&self.files, &mut summary);
        summary
    }
}

fn count_leaves(node: &FileNode, summary: &mut SnapshotSummary) {
    match node {
        FileNode::Directory(children) => {
            for child in children.values() {
                count_leaves(child, summary);
            }
        }
        FileNode::Text(_) => summary.text_files += 1,
        FileNode::Binary => summary.binary_files += 1,
        FileNode::Oversized => summary.oversized_files += 1,
    }
}
