/*!
Deduplicated registry of accounts seen in restored snapshots.
*/

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::snapshot::Snapshot;
use crate::storage::write_atomic;
use crate::Result;

/// Preference keys holding a user id
pub const UID_ALIASES: [&str; 2] = ["uid", "user_id"];
/// Preference keys holding a display name
pub const NICKNAME_ALIASES: [&str; 2] = ["nickname", "user_name"];

/// Scan order of identity keys within one store
const IDENTITY_KEYS: [&str; 4] = ["uid", "nickname", "user_id", "user_name"];

/// One account, keyed by `uid`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    pub uid: String,
    pub nickname: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Identity fields found in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: String,
    pub nickname: Option<String>,
}

/// Find the account identity carried by `snapshot`.
///
/// Stores are scanned in name order and keys in the order `uid`,
/// `nickname`, `user_id`, `user_name`; the last non-empty value seen for
/// each field wins.
pub fn identity(snapshot: &Snapshot) -> Option<Identity> {
    let mut uid = None;
    let mut nickname = None;

    for entries in snapshot.preference_stores().values() {
        for key in IDENTITY_KEYS {
            let Some(value) = entries.get(key).map(ToString::to_string) else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            if UID_ALIASES.contains(&key) {
                uid = Some(value);
            } else if NICKNAME_ALIASES.contains(&key) {
                nickname = Some(value);
            }
        }
    }

    uid.map(|uid| Identity { uid, nickname })
}

/// Account list persisted as a JSON array, newest account first
#[derive(Debug, Clone)]
pub struct AccountRegistry {
    path: PathBuf,
}

impl AccountRegistry {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current records; a missing file is an empty registry
    pub fn load(&self) -> Result<Vec<AccountRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Upsert the identity found in `snapshot`, stamped with the current time
    pub fn record(&self, snapshot: &Snapshot) -> Result<Option<AccountRecord>> {
        self.record_at(snapshot, Utc::now())
    }

    /// Upsert the identity found in `snapshot`, stamped with `now`.
    ///
    /// Without a uid the registry is left untouched. A known uid keeps its
    /// position and `first_seen_at`; a new one is prepended.
    pub fn record_at(
        &self,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> Result<Option<AccountRecord>> {
        let Some(identity) = identity(snapshot) else {
            debug!("No account identity in snapshot");
            return Ok(None);
        };

        let mut records = self.load()?;
        let record = match records.iter_mut().find(|r| r.uid == identity.uid) {
            Some(existing) => {
                existing.last_seen_at = now;
                if identity.nickname.is_some() {
                    existing.nickname = identity.nickname;
                }
                info!(uid = %existing.uid, "Updated account");
                existing.clone()
            }
            None => {
                let record = AccountRecord {
                    uid: identity.uid,
                    nickname: identity.nickname,
                    first_seen_at: now,
                    last_seen_at: now,
                };
                info!(uid = %record.uid, total = records.len() + 1, "Registered account");
                records.insert(0, record.clone());
                record
            }
        };

        write_atomic(&self.path, &serde_json::to_vec_pretty(&records)?)?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FileNode;
    use crate::value::PreferenceMap;
    use chrono::Duration;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn snapshot_with(stores: Vec<(&str, PreferenceMap)>) -> Snapshot {
        Snapshot::assemble(
            stores
                .into_iter()
                .map(|(name, map)| (name.to_string(), map))
                .collect(),
            BTreeMap::new(),
            FileNode::empty_dir(),
        )
    }

    fn account(uid: &str, nickname: &str) -> Snapshot {
        let mut map = PreferenceMap::new();
        map.insert("uid", uid);
        map.insert("nickname", nickname);
        snapshot_with(vec![("account", map)])
    }

    #[test]
    fn test_identity_aliases_last_value_wins() {
        let mut first = PreferenceMap::new();
        first.insert("uid", "100");
        first.insert("user_name", "alias");
        let mut second = PreferenceMap::new();
        second.insert("user_id", 200i64);
        second.insert("nickname", "Bob");
        second.insert("user_name", "");

        let found = identity(&snapshot_with(vec![("a", first), ("b", second)])).unwrap();
        assert_eq!(found.uid, "200");
        assert_eq!(found.nickname.as_deref(), Some("Bob"));
    }

    #[test]
    fn test_no_uid_leaves_registry_untouched() {
        let dir = TempDir::new().unwrap();
        let registry = AccountRegistry::new(dir.path().join("counter.json"));

        let mut map = PreferenceMap::new();
        map.insert("nickname", "Nobody");
        assert_eq!(registry.record(&snapshot_with(vec![("p", map)])).unwrap(), None);
        assert!(!registry.path().exists());
    }

    #[test]
    fn test_new_account_has_equal_timestamps() {
        let dir = TempDir::new().unwrap();
        let registry = AccountRegistry::new(dir.path().join("counter.json"));

        let record = registry.record(&account("123456", "Alice")).unwrap().unwrap();
        assert_eq!(record.uid, "123456");
        assert_eq!(record.nickname.as_deref(), Some("Alice"));
        assert_eq!(record.first_seen_at, record.last_seen_at);
        assert_eq!(registry.load().unwrap(), vec![record]);
    }

    #[test]
    fn test_repeated_uid_updates_in_place() {
        let dir = TempDir::new().unwrap();
        let registry = AccountRegistry::new(dir.path().join("counter.json"));
        let t0 = Utc::now();
        let t1 = t0 + Duration::minutes(5);

        registry.record_at(&account("1", "Alice"), t0).unwrap();
        registry.record_at(&account("2", "Bob"), t0).unwrap();
        registry.record_at(&account("1", "Alicia"), t1).unwrap();

        let records = registry.load().unwrap();
        assert_eq!(records.len(), 2);
        // newest registration first, updates keep their position
        assert_eq!(records[0].uid, "2");
        assert_eq!(records[1].uid, "1");
        assert_eq!(records[1].nickname.as_deref(), Some("Alicia"));
        assert_eq!(records[1].first_seen_at, t0);
        assert_eq!(records[1].last_seen_at, t1);
    }

    #[test]
    fn test_missing_nickname_keeps_previous_one() {
        let dir = TempDir::new().unwrap();
        let registry = AccountRegistry::new(dir.path().join("counter.json"));
        registry.record(&account("1", "Alice")).unwrap();

        let mut map = PreferenceMap::new();
        map.insert("uid", "1");
        let record = registry.record(&snapshot_with(vec![("p", map)])).unwrap().unwrap();
        assert_eq!(record.nickname.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_registry_file_uses_camel_case() {
        let dir = TempDir::new().unwrap();
        let registry = AccountRegistry::new(dir.path().join("counter.json"));
        registry.record(&account("7", "Eve")).unwrap();

        let raw = fs::read_to_string(registry.path()).unwrap();
        assert!(raw.contains("\"firstSeenAt\""));
        assert!(raw.contains("\"lastSeenAt\""));
    }
}
