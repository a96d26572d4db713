/*!
Extractors for the three persistence models of an application data directory.

Every extractor is best-effort: missing inputs produce empty results and a
failure on one store, table or file is logged and contained.
*/

pub mod files;
pub mod prefs;
pub mod tables;

pub use files::extract_files;
pub use prefs::extract_preferences;
pub use tables::{extract_database, extract_databases};

use tracing::info;

use crate::context::AppDataDir;
use crate::snapshot::Snapshot;

/// Capture limits applied during extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractLimits {
    pub row_cap: usize,
    pub max_depth: usize,
    pub max_file_size: u64,
}

impl Default for ExtractLimits {
    fn default() -> Self {
        Self {
            row_cap: crate::config::DEFAULT_ROW_CAP,
            max_depth: crate::config::DEFAULT_MAX_DEPTH,
            max_file_size: crate::config::DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl From<&crate::config::EngineConfig> for ExtractLimits {
    fn from(config: &crate::config::EngineConfig) -> Self {
        Self {
            row_cap: config.row_cap,
            max_depth: config.max_depth,
            max_file_size: config.max_file_size,
        }
    }
}

/// Run all three extractors against `source` and assemble the result
pub fn extract_snapshot(source: &AppDataDir, limits: ExtractLimits) -> Snapshot {
    let preferences = extract_preferences(&source.shared_prefs_dir());
    let databases = extract_databases(&source.databases_dir(), limits.row_cap);
    let files = extract_files(&source.files_dir(), limits.max_depth, limits.max_file_size);

    let snapshot = Snapshot::assemble(preferences, databases, files);
    let summary = snapshot.summary();
    info!(
        source = %source.root().display(),
        stores = summary.preference_stores,
        databases = summary.databases,
        tables = summary.tables,
        rows = summary.rows,
        files = summary.text_files + summary.binary_files + summary.oversized_files,
        "Extraction complete"
    );
    snapshot
}
