/*!
Engine facade tying extraction, sealing, restoration and the account
registry together.
*/

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::backup::BackupDirectory;
use crate::config::EngineConfig;
use crate::context::{AppDataDir, TargetContext};
use crate::envelope::Envelope;
use crate::extract::{extract_snapshot, ExtractLimits};
use crate::metadata::{ArtifactContainer, ArtifactMetadata};
use crate::registry::{AccountRecord, AccountRegistry};
use crate::restore::{restore, RestoreReport};
use crate::snapshot::Snapshot;
use crate::storage::{LocalFileStorage, StorageAdapter};
use crate::{Result, VaultError};

#[cfg(feature = "metrics")]
use crate::observability::{RestoreTimer, VaultMetrics};

/// Result of [`VaultEngine::extract`]
#[derive(Debug, Clone)]
pub struct Extraction {
    pub snapshot: Snapshot,
    /// Plaintext backup written for this extraction, if that succeeded
    pub backup_path: Option<PathBuf>,
}

/// Terminal state of [`VaultEngine::check_and_restore`]
#[derive(Debug, Clone)]
pub enum RestoreOutcome {
    /// No artifact was pending
    NothingToRestore,
    /// The artifact was replayed and consumed
    Restored {
        metadata: ArtifactMetadata,
        report: RestoreReport,
        /// Account recorded in the registry, if the snapshot carried one
        account: Option<AccountRecord>,
    },
}

impl RestoreOutcome {
    /// One-line status suitable for a toast or a terminal
    pub fn status_line(&self) -> String {
        match self {
            RestoreOutcome::NothingToRestore => "Nothing to restore".to_string(),
            RestoreOutcome::Restored {
                report, account, ..
            } => match account {
                Some(AccountRecord {
                    uid,
                    nickname: Some(nickname),
                    ..
                }) => format!("Restored account {uid} ({nickname}): {report}"),
                Some(record) => format!("Restored account {}: {report}", record.uid),
                None => format!("Restored: {report}"),
            },
        }
    }
}

/// Snapshot and restore engine
///
/// # Example
/// ```rust
/// use appvault_core::{AppDataDir, EngineConfig, RestoreOutcome, VaultEngine};
///
/// let state = tempfile::tempdir()?;
/// let source = tempfile::tempdir()?;
/// let target = tempfile::tempdir()?;
///
/// let engine = VaultEngine::new(EngineConfig::with_state_dir(state.path()))?;
/// let extraction = engine.extract(&AppDataDir::new(source.path()));
/// engine.export_artifact(&extraction.snapshot, "demo")?;
///
/// let outcome = engine.check_and_restore(&AppDataDir::new(target.path()))?;
/// assert!(matches!(outcome, RestoreOutcome::Restored { .. }));
/// # Ok::<(), appvault_core::VaultError>(())
/// ```
#[derive(Debug)]
pub struct VaultEngine<S = LocalFileStorage>
where
    S: StorageAdapter,
{
    config: EngineConfig,
    storage: S,
    envelope: Envelope,
    registry: AccountRegistry,
    backups: BackupDirectory,
}

impl VaultEngine<LocalFileStorage> {
    /// Engine over the local filesystem
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_storage(config, LocalFileStorage::new())
    }
}

impl<S> VaultEngine<S>
where
    S: StorageAdapter,
{
    pub fn with_storage(config: EngineConfig, storage: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            envelope: Envelope::new(&config.envelope_key),
            registry: AccountRegistry::new(config.registry_path()),
            backups: BackupDirectory::new(&config.backup_dir),
            storage,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    pub fn backups(&self) -> &BackupDirectory {
        &self.backups
    }

    /// Storage key of the pending artifact
    pub fn artifact_location(&self) -> String {
        self.config.artifact_path().to_string_lossy().into_owned()
    }

    pub fn artifact_pending(&self) -> bool {
        self.storage.exists(&self.artifact_location())
    }

    /// Snapshot `source` and keep a plaintext backup of the result.
    ///
    /// Never fails: missing inputs produce empty sections and a backup that
    /// cannot be written is only logged.
    pub fn extract(&self, source: &AppDataDir) -> Extraction {
        let snapshot = extract_snapshot(source, ExtractLimits::from(&self.config));

        #[cfg(feature = "metrics")]
        VaultMetrics::global().record_extraction();

        let backup_path = match self.backups.save_snapshot(&snapshot) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Failed to write backup: {}", e);
                None
            }
        };
        Extraction {
            snapshot,
            backup_path,
        }
    }

    /// Save captured identity fields as a `login_data_<ts>.json` backup
    pub fn capture_login(&self, fields: &BTreeMap<String, serde_json::Value>) -> Result<PathBuf> {
        self.backups.save_capture(fields)
    }

    /// Seal `snapshot` into transportable text
    pub fn seal_snapshot(&self, snapshot: &Snapshot, source: &str) -> Result<(ArtifactMetadata, String)> {
        let container = ArtifactContainer::new(snapshot, source)?;
        let sealed = self.envelope.seal(&container.to_bytes()?)?;
        Ok((container.metadata().clone(), sealed))
    }

    /// Seal `snapshot` and store it as the pending artifact
    pub fn export_artifact(&self, snapshot: &Snapshot, source: &str) -> Result<ArtifactMetadata> {
        let (metadata, sealed) = self.seal_snapshot(snapshot, source)?;
        let location = self.artifact_location();
        self.storage.save(sealed.as_bytes(), &location)?;

        #[cfg(feature = "metrics")]
        VaultMetrics::global().record_artifact_size(sealed.len());

        info!(
            artifact = %location,
            snapshot_id = %metadata.snapshot_id,
            size = sealed.len(),
            "Exported artifact"
        );
        Ok(metadata)
    }

    /// Open sealed text back into metadata and snapshot
    pub fn open_artifact(&self, sealed: &str) -> Result<(ArtifactMetadata, Snapshot)> {
        let plaintext = self.envelope.open(sealed)?;
        ArtifactContainer::from_bytes(&plaintext)?.into_parts()
    }

    /// Load and open the pending artifact without consuming it
    pub fn load_artifact(&self) -> Result<Option<(ArtifactMetadata, Snapshot)>> {
        let location = self.artifact_location();
        if !self.storage.exists(&location) {
            return Ok(None);
        }
        let bytes = self.storage.load(&location)?;
        let sealed = String::from_utf8(bytes)
            .map_err(|_| VaultError::envelope("artifact is not text"))?;
        self.open_artifact(&sealed).map(Some)
    }

    /// Metadata of the pending artifact, if any
    pub fn inspect_artifact(&self) -> Result<Option<ArtifactMetadata>> {
        Ok(self.load_artifact()?.map(|(metadata, _)| metadata))
    }

    /// Restore the pending artifact into `target`, then consume it.
    ///
    /// An artifact that cannot be opened or decoded is left in place and the
    /// error returned. Item failures during restoration are reported in the
    /// outcome, and a registry failure is only logged.
    pub fn check_and_restore<T>(&self, target: &T) -> Result<RestoreOutcome>
    where
        T: TargetContext + ?Sized,
    {
        #[cfg(feature = "metrics")]
        let timer = RestoreTimer::start();

        let (metadata, snapshot) = match self.load_artifact() {
            Ok(Some(opened)) => opened,
            Ok(None) => {
                debug!(artifact = %self.artifact_location(), "No artifact pending");
                return Ok(RestoreOutcome::NothingToRestore);
            }
            Err(e) => {
                error!(artifact = %self.artifact_location(), "Artifact unreadable, keeping it: {}", e);
                #[cfg(feature = "metrics")]
                VaultMetrics::global().record_restore_failure();
                return Err(e);
            }
        };
        info!(
            snapshot_id = %metadata.snapshot_id,
            source = %metadata.source,
            created_at = %metadata.created_at,
            "Restoring artifact"
        );

        let report = restore(&snapshot, target);

        let account = match self.registry.record(&snapshot) {
            Ok(account) => account,
            Err(e) => {
                warn!("Failed to update account registry: {}", e);
                None
            }
        };

        if let Err(e) = self.storage.delete(&self.artifact_location()) {
            warn!("Restored, but failed to delete artifact: {}", e);
        }

        #[cfg(feature = "metrics")]
        {
            VaultMetrics::global().record_restore(report.total_failed());
            timer.finish();
        }

        let outcome = RestoreOutcome::Restored {
            metadata,
            report,
            account,
        };
        info!("{}", outcome.status_line());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::FileNode;
    use crate::storage::MemoryStorage;
    use crate::value::PreferenceMap;
    use tempfile::TempDir;

    fn create_test_engine(state: &TempDir) -> VaultEngine<MemoryStorage> {
        VaultEngine::with_storage(EngineConfig::with_state_dir(state.path()), MemoryStorage::new())
            .unwrap()
    }

    fn account_snapshot() -> Snapshot {
        let mut account = PreferenceMap::new();
        account.insert("uid", "42");
        account.insert("nickname", "Zed");
        Snapshot::assemble(
            BTreeMap::from([("account".to_string(), account)]),
            BTreeMap::new(),
            FileNode::empty_dir(),
        )
    }

    #[test]
    fn test_nothing_to_restore() {
        let state = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let engine = create_test_engine(&state);

        let outcome = engine.check_and_restore(&AppDataDir::new(target.path())).unwrap();
        assert!(matches!(outcome, RestoreOutcome::NothingToRestore));
        assert_eq!(outcome.status_line(), "Nothing to restore");
        assert!(engine.inspect_artifact().unwrap().is_none());
    }

    #[test]
    fn test_export_inspect_restore_consumes_artifact() {
        let state = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let engine = create_test_engine(&state);

        let exported = engine.export_artifact(&account_snapshot(), "com.example").unwrap();
        assert!(engine.artifact_pending());
        assert_eq!(engine.inspect_artifact().unwrap(), Some(exported.clone()));

        let outcome = engine.check_and_restore(&AppDataDir::new(target.path())).unwrap();
        match &outcome {
            RestoreOutcome::Restored {
                metadata,
                report,
                account,
            } => {
                assert_eq!(metadata.snapshot_id, exported.snapshot_id);
                assert_eq!(report.preferences.succeeded, 2);
                assert_eq!(account.as_ref().unwrap().uid, "42");
            }
            other => panic!("expected a restore, got {other:?}"),
        }
        assert_eq!(
            outcome.status_line(),
            "Restored account 42 (Zed): 2 preference values, 0 rows, 0 files restored"
        );
        assert!(!engine.artifact_pending());
    }

    #[test]
    fn test_corrupt_artifact_is_retained() {
        let state = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let storage = MemoryStorage::new();
        let location = EngineConfig::with_state_dir(state.path())
            .artifact_path()
            .to_string_lossy()
            .into_owned();
        storage.save(b"definitely not sealed", &location).unwrap();
        let engine =
            VaultEngine::with_storage(EngineConfig::with_state_dir(state.path()), storage).unwrap();

        let err = engine.check_and_restore(&AppDataDir::new(target.path())).unwrap_err();
        assert!(err.is_envelope_corrupt());
        assert!(engine.artifact_pending());
        assert!(engine.registry().load().unwrap().is_empty());
    }

    #[test]
    fn test_foreign_key_is_corrupt() {
        let state = TempDir::new().unwrap();
        let engine = create_test_engine(&state);
        let (_, sealed) = engine.seal_snapshot(&account_snapshot(), "x").unwrap();

        let other = VaultEngine::with_storage(
            EngineConfig::with_state_dir(state.path()).with_envelope_key("another key"),
            MemoryStorage::new(),
        )
        .unwrap();
        assert!(matches!(
            other.open_artifact(&sealed),
            Err(VaultError::EnvelopeCorrupt(_))
        ));
    }

    #[test]
    fn test_registry_failure_does_not_fail_restore() {
        let state = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let engine = create_test_engine(&state);
        // a directory where the registry file should be
        std::fs::create_dir_all(engine.config().registry_path()).unwrap();

        engine.export_artifact(&account_snapshot(), "x").unwrap();
        let outcome = engine.check_and_restore(&AppDataDir::new(target.path())).unwrap();
        assert!(matches!(outcome, RestoreOutcome::Restored { account: None, .. }));
        assert!(!engine.artifact_pending());
    }

    #[test]
    fn test_extract_writes_backup() {
        let state = TempDir::new().unwrap();
        let source = TempDir::new().unwrap();
        let engine = create_test_engine(&state);

        let extraction = engine.extract(&AppDataDir::new(source.path()));
        assert_eq!(extraction.snapshot, Snapshot::empty());
        let backup = extraction.backup_path.unwrap();
        assert!(backup.starts_with(state.path().join("backups")));
        assert_eq!(engine.backups().list().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let state = TempDir::new().unwrap();
        let config = EngineConfig::with_state_dir(state.path()).with_row_cap(0);
        assert!(matches!(
            VaultEngine::with_storage(config, MemoryStorage::new()),
            Err(VaultError::Validation(_))
        ));
    }
}
