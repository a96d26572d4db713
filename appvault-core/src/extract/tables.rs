/*!
Database extraction: a bounded row sample of every user table, captured as text.
*/

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::snapshot::{DatabaseImage, Row};
use crate::sql::quote_identifier;
use crate::Result;

/// File extension of a database file
pub const DATABASE_EXTENSION: &str = "db";

/// Table name prefixes reserved for engine and platform bookkeeping
pub const SYSTEM_TABLE_PREFIXES: &[&str] = &["sqlite_", "android_"];

/// True for tables that are never captured
pub fn is_system_table(name: &str) -> bool {
    SYSTEM_TABLE_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Extract every `*.db` file in `dir`, keyed by file name.
///
/// A missing directory yields an empty mapping.
pub fn extract_databases(dir: &Path, row_cap: usize) -> BTreeMap<String, DatabaseImage> {
    let mut databases = BTreeMap::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("No databases at {}: {}", dir.display(), e);
            return databases;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(DATABASE_EXTENSION) {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        let image = extract_database(&path, row_cap);
        info!(database = name, tables = image.len(), "Extracted database");
        databases.insert(name.to_string(), image);
    }

    databases
}

/// Sample up to `row_cap` rows of every user table in one database file.
///
/// Failure to open the database is logged and yields an empty image; a table
/// that cannot be read is logged and skipped.
pub fn extract_database(path: &Path, row_cap: usize) -> DatabaseImage {
    let mut image = DatabaseImage::new();

    let conn = match Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    ) {
        Ok(conn) => conn,
        Err(e) => {
            warn!("Failed to open database {}: {}", path.display(), e);
            return image;
        }
    };

    let tables = match list_user_tables(&conn) {
        Ok(tables) => tables,
        Err(e) => {
            warn!("Failed to list tables of {}: {}", path.display(), e);
            return image;
        }
    };

    for table in tables {
        match sample_table(&conn, &table, row_cap) {
            Ok(rows) => {
                debug!(table = %table, rows = rows.len(), "Sampled table");
                image.insert(table, rows);
            }
            Err(e) => warn!("Failed to extract table {} of {}: {}", table, path.display(), e),
        }
    }

    image
}

/// Names of all non-system tables, in name order
pub fn list_user_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names
        .into_iter()
        .filter(|name| !is_system_table(name))
        .collect())
}

/// Read at most `row_cap` rows of `table` with every column rendered as text
pub fn sample_table(conn: &Connection, table: &str, row_cap: usize) -> Result<Vec<Row>> {
    let sql = format!("SELECT * FROM {} LIMIT ?1", quote_identifier(table));
    let mut stmt = conn.prepare(&sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let limit = i64::try_from(row_cap).unwrap_or(i64::MAX);

    let mut rows = stmt.query([limit])?;
    let mut sampled = Vec::new();
    while let Some(source) = rows.next()? {
        let mut row = Row::new();
        for (index, column) in columns.iter().enumerate() {
            row.push(column.as_str(), cell_text(source.get_ref(index)?));
        }
        sampled.push(row);
    }
    Ok(sampled)
}

fn cell_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
