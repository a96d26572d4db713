/*!
Timestamped plaintext backups written next to every extraction.
*/

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info};

use crate::snapshot::Snapshot;
use crate::storage::write_atomic;
use crate::Result;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TIMESTAMP_LEN: usize = 15;

/// What a backup file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    /// A full snapshot document
    FullData,
    /// Captured identity fields
    LoginData,
}

impl BackupKind {
    pub fn prefix(self) -> &'static str {
        match self {
            BackupKind::FullData => "full_data_",
            BackupKind::LoginData => "login_data_",
        }
    }

    fn from_file_name(name: &str) -> Option<(Self, NaiveDateTime)> {
        let kind = [BackupKind::FullData, BackupKind::LoginData]
            .into_iter()
            .find(|kind| name.starts_with(kind.prefix()))?;
        if !name.ends_with(".json") {
            return None;
        }
        let stamp = name.get(kind.prefix().len()..kind.prefix().len() + TIMESTAMP_LEN)?;
        let taken_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        Some((kind, taken_at))
    }
}

/// One file found in a backup directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub kind: BackupKind,
    pub taken_at: NaiveDateTime,
    pub size: u64,
}

/// Directory of `full_data_<ts>.json` and `login_data_<ts>.json` files
#[derive(Debug, Clone)]
pub struct BackupDirectory {
    dir: PathBuf,
}

impl BackupDirectory {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `snapshot` as a pretty-printed document
    pub fn save_snapshot(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        self.save_snapshot_at(snapshot, Local::now())
    }

    pub fn save_snapshot_at(&self, snapshot: &Snapshot, now: DateTime<Local>) -> Result<PathBuf> {
        self.write(BackupKind::FullData, now, &snapshot.serialize_pretty()?)
    }

    /// Write a captured field map, such as the fields of a login response
    pub fn save_capture(&self, fields: &BTreeMap<String, serde_json::Value>) -> Result<PathBuf> {
        self.save_capture_at(fields, Local::now())
    }

    pub fn save_capture_at(
        &self,
        fields: &BTreeMap<String, serde_json::Value>,
        now: DateTime<Local>,
    ) -> Result<PathBuf> {
        self.write(BackupKind::LoginData, now, &serde_json::to_vec_pretty(fields)?)
    }

    /// All recognised backups, newest first; a missing directory is empty
    pub fn list(&self) -> Result<Vec<BackupEntry>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some((kind, taken_at)) = name.to_str().and_then(BackupKind::from_file_name) else {
                continue;
            };
            entries.push(BackupEntry {
                path: entry.path(),
                kind,
                taken_at,
                size: entry.metadata()?.len(),
            });
        }

        entries.sort_by(|a, b| b.taken_at.cmp(&a.taken_at).then_with(|| b.path.cmp(&a.path)));
        Ok(entries)
    }

    fn write(&self, kind: BackupKind, now: DateTime<Local>, bytes: &[u8]) -> Result<PathBuf> {
        let stem = format!("{}{}", kind.prefix(), now.format(TIMESTAMP_FORMAT));
        let mut path = self.dir.join(format!("{stem}.json"));
        let mut suffix = 1;
        while path.exists() {
            debug!(path = %path.display(), "Backup name taken");
            path = self.dir.join(format!("{stem}_{suffix}.json"));
            suffix += 1;
        }

        write_atomic(&path, bytes)?;
        info!(path = %path.display(), size = bytes.len(), "Wrote backup");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn at(hour: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 17, hour, 30, 0).unwrap()
    }

    #[test]
    fn test_file_names_follow_timestamp_pattern() {
        let dir = TempDir::new().unwrap();
        let backups = BackupDirectory::new(dir.path().join("backups"));

        let full = backups.save_snapshot_at(&Snapshot::empty(), at(9)).unwrap();
        assert_eq!(full.file_name().unwrap(), "full_data_20240517_093000.json");

        let fields = BTreeMap::from([("uid".to_string(), serde_json::json!("123456"))]);
        let login = backups.save_capture_at(&fields, at(9)).unwrap();
        assert_eq!(login.file_name().unwrap(), "login_data_20240517_093000.json");

        let restored = Snapshot::deserialize(&fs::read(&full).unwrap()).unwrap();
        assert_eq!(restored, Snapshot::empty());
    }

    #[test]
    fn test_same_second_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let backups = BackupDirectory::new(dir.path());

        let first = backups.save_snapshot_at(&Snapshot::empty(), at(10)).unwrap();
        let second = backups.save_snapshot_at(&Snapshot::empty(), at(10)).unwrap();
        assert_ne!(first, second);
        assert_eq!(second.file_name().unwrap(), "full_data_20240517_103000_1.json");
    }

    #[test]
    fn test_list_newest_first_ignoring_strangers() {
        let dir = TempDir::new().unwrap();
        let backups = BackupDirectory::new(dir.path());

        backups.save_snapshot_at(&Snapshot::empty(), at(8)).unwrap();
        backups
            .save_capture_at(&BTreeMap::new(), at(8) + Duration::hours(3))
            .unwrap();
        backups.save_snapshot_at(&Snapshot::empty(), at(10)).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("full_data_garbage.json"), "{}").unwrap();

        let listed = backups.list().unwrap();
        let kinds: Vec<_> = listed.iter().map(|e| (e.kind, e.taken_at.format("%H").to_string())).collect();
        assert_eq!(
            kinds,
            vec![
                (BackupKind::LoginData, "11".to_string()),
                (BackupKind::FullData, "10".to_string()),
                (BackupKind::FullData, "08".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(BackupDirectory::new(dir.path().join("absent")).list().unwrap().is_empty());
    }
}
