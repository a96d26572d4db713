/*!
Replay of a snapshot into a live target.

Restoration runs three independent best-effort phases. A failing store,
table, row or file is logged, counted and recorded in the [`RestoreReport`];
it never aborts the remaining work.
*/

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::context::{validate_file_name, TargetContext};
use crate::snapshot::{DatabaseImage, FileNode, Row, Snapshot};
use crate::sql;
use crate::value::{PreferenceMap, TypedValue};
use crate::Result;

/// Restore phase an item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Preferences,
    Tables,
    Files,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Preferences => "preferences",
            Phase::Tables => "tables",
            Phase::Files => "files",
        })
    }
}

/// Per-phase counters.
///
/// Preferences count values, tables count rows (a table without rows counts
/// as one skipped item) and files count leaves (sentinels are skipped).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// One item that could not be restored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub phase: Phase,
    pub item: String,
    pub error: String,
}

/// Outcome of one restoration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub preferences: PhaseReport,
    pub tables: PhaseReport,
    pub files: PhaseReport,
    pub failures: Vec<ItemFailure>,
}

impl RestoreReport {
    pub fn phase(&self, phase: Phase) -> &PhaseReport {
        match phase {
            Phase::Preferences => &self.preferences,
            Phase::Tables => &self.tables,
            Phase::Files => &self.files,
        }
    }

    fn phase_mut(&mut self, phase: Phase) -> &mut PhaseReport {
        match phase {
            Phase::Preferences => &mut self.preferences,
            Phase::Tables => &mut self.tables,
            Phase::Files => &mut self.files,
        }
    }

    pub fn total_failed(&self) -> usize {
        self.preferences.failed + self.tables.failed + self.files.failed
    }

    pub fn is_clean(&self) -> bool {
        self.total_failed() == 0
    }

    /// Record `count` failed items under a single failure entry
    fn fail(&mut self, phase: Phase, item: String, count: usize, error: impl fmt::Display) {
        warn!(%phase, item = %item, count, "Restore failed: {}", error);
        self.phase_mut(phase).failed += count;
        self.failures.push(ItemFailure {
            phase,
            item,
            error: error.to_string(),
        });
    }
}

impl fmt::Display for RestoreReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} preference values, {} rows, {} files restored",
            self.preferences.succeeded, self.tables.succeeded, self.files.succeeded
        )?;
        let skipped = self.preferences.skipped + self.tables.skipped + self.files.skipped;
        if skipped > 0 {
            write!(f, ", {skipped} skipped")?;
        }
        if !self.is_clean() {
            write!(f, ", {} failed", self.total_failed())?;
        }
        Ok(())
    }
}

/// Replay `snapshot` into `target`
pub fn restore<T: TargetContext + ?Sized>(snapshot: &Snapshot, target: &T) -> RestoreReport {
    let mut report = RestoreReport::default();

    restore_preferences(snapshot.preference_stores(), target, &mut report);
    restore_databases(snapshot.databases(), target, &mut report);
    restore_files(snapshot.files(), target, &mut report);

    info!(
        preferences = report.preferences.succeeded,
        rows = report.tables.succeeded,
        files = report.files.succeeded,
        failed = report.total_failed(),
        "Restore complete"
    );
    report
}

fn restore_preferences<T: TargetContext + ?Sized>(
    stores: &BTreeMap<String, PreferenceMap>,
    target: &T,
    report: &mut RestoreReport,
) {
    for (store, entries) in stores {
        let mut writer = match target.open_preferences(store) {
            Ok(writer) => writer,
            Err(e) => {
                report.fail(Phase::Preferences, store.clone(), entries.len(), e);
                continue;
            }
        };

        for (key, value) in entries {
            match value {
                TypedValue::String(s) => writer.put_string(key, s),
                TypedValue::Integer(i) => writer.put_long(key, *i),
                TypedValue::Float(x) => writer.put_float(key, *x),
                TypedValue::Boolean(b) => writer.put_boolean(key, *b),
            }
        }

        match writer.commit() {
            Ok(()) => {
                debug!(store = %store, values = entries.len(), "Restored preference store");
                report.preferences.succeeded += entries.len();
            }
            Err(e) => report.fail(Phase::Preferences, store.clone(), entries.len(), e),
        }
    }
    info!(
        stores = stores.len(),
        values = report.preferences.succeeded,
        "Preferences phase done"
    );
}

fn restore_databases<T: TargetContext + ?Sized>(
    databases: &BTreeMap<String, DatabaseImage>,
    target: &T,
    report: &mut RestoreReport,
) {
    for (name, image) in databases {
        let conn = match target.open_database(name) {
            Ok(conn) => conn,
            Err(e) => {
                let rows = image.values().map(Vec::len).sum();
                report.fail(Phase::Tables, name.clone(), rows, e);
                continue;
            }
        };

        for (table, rows) in image {
            restore_table(&conn, name, table, rows, report);
        }
    }
    info!(
        databases = databases.len(),
        rows = report.tables.succeeded,
        "Tables phase done"
    );
}

fn restore_table(
    conn: &Connection,
    database: &str,
    table: &str,
    rows: &[Row],
    report: &mut RestoreReport,
) {
    let Some(first) = rows.first() else {
        debug!(database, table, "Skipping table without rows");
        report.tables.skipped += 1;
        return;
    };

    let item = format!("{database}/{table}");
    let created = sql::create_table_statement(table, first)
        .and_then(|ddl| conn.execute_batch(&ddl).map_err(Into::into));
    if let Err(e) = created {
        report.fail(Phase::Tables, item, rows.len(), e);
        return;
    }

    for (index, row) in rows.iter().enumerate() {
        match insert_row(conn, table, row) {
            Ok(()) => report.tables.succeeded += 1,
            Err(e) => report.fail(Phase::Tables, format!("{item}#{index}"), 1, e),
        }
    }
    debug!(database, table, rows = rows.len(), "Restored table");
}

fn insert_row(conn: &Connection, table: &str, row: &Row) -> Result<()> {
    let dml = sql::replace_statement(table, row)?;
    let mut statement = conn.prepare_cached(&dml)?;
    statement.execute(params_from_iter(row.values()))?;
    Ok(())
}

fn restore_files<T: TargetContext + ?Sized>(
    tree: &FileNode,
    target: &T,
    report: &mut RestoreReport,
) {
    let children = match tree {
        FileNode::Directory(children) if children.is_empty() => return,
        FileNode::Directory(children) => children,
        leaf => {
            warn!("Files root is a {:?} leaf, nothing to restore", leaf);
            report.files.skipped += 1;
            return;
        }
    };

    let root = match target.files_root() {
        Ok(root) => root,
        Err(e) => {
            let (text, sentinels) = count_leaves(tree);
            report.files.skipped += sentinels;
            report.fail(Phase::Files, ".".to_string(), text, e);
            return;
        }
    };

    restore_directory(&root, "", children, report);
    info!(
        files = report.files.succeeded,
        skipped = report.files.skipped,
        "Files phase done"
    );
}

/// Text leaves and sentinel leaves under `node`
fn count_leaves(node: &FileNode) -> (usize, usize) {
    match node {
        FileNode::Directory(children) => children.values().map(count_leaves).fold(
            (0, 0),
            |(text, sentinels), (t, s)| (text + t, sentinels + s),
        ),
        FileNode::Text(_) => (1, 0),
        FileNode::Binary | FileNode::Oversized => (0, 1),
    }
}

fn restore_directory(
    dir: &Path,
    prefix: &str,
    children: &BTreeMap<String, FileNode>,
    report: &mut RestoreReport,
) {
    for (name, node) in children {
        let relative = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };
        if let Err(e) = validate_file_name(name) {
            report.fail(Phase::Files, relative, 1, e);
            continue;
        }
        let path = dir.join(name);

        match node {
            FileNode::Directory(grandchildren) => match fs::create_dir_all(&path) {
                Ok(()) => restore_directory(&path, &relative, grandchildren, report),
                Err(e) => report.fail(Phase::Files, relative, 1, e),
            },
            FileNode::Text(content) => match fs::write(&path, content) {
                Ok(()) => {
                    debug!(path = %path.display(), size = content.len(), "Restored file");
                    report.files.succeeded += 1;
                }
                Err(e) => report.fail(Phase::Files, relative, 1, e),
            },
            FileNode::Binary | FileNode::Oversized => {
                debug!(path = %relative, "Skipping sentinel");
                report.files.skipped += 1;
            }
        }
    }
}
