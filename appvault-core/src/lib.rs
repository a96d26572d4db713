/*!
# AppVault Core Engine

Snapshot and restore for the private storage of an application.

An application keeps its state in three differently shaped stores: flat
key/value preference files, embedded SQLite databases and a private file
tree. This crate normalizes all three into one [`Snapshot`], seals it into a
portable encrypted artifact and later replays that artifact into a fresh
installation using only ordinary unprivileged writes.

## Pipeline

- **Extraction**: [`extract`] reads `shared_prefs/`, `databases/` and
  `files/` of an [`AppDataDir`] with bounded row, depth and size limits.
- **Sealing**: [`ArtifactContainer`] adds metadata and a content hash,
  [`Envelope`] compresses, encrypts and base64-encodes the result.
- **Restoration**: [`restore()`] replays preferences, tables and files
  through a [`TargetContext`], then [`AccountRegistry`] records the account
  identity found in the snapshot.

[`VaultEngine`] drives the whole flow, including the
artifact-present/restore/consume state machine.

## Usage

```rust
use appvault_core::{AppDataDir, EngineConfig, VaultEngine};

let state = tempfile::tempdir()?;
let app = tempfile::tempdir()?;
let engine = VaultEngine::new(EngineConfig::with_state_dir(state.path()))?;

// Capture the current state and leave it pending for the next start
let extraction = engine.extract(&AppDataDir::new(app.path()));
engine.export_artifact(&extraction.snapshot, "com.example.app")?;

// On the next start, replay it into the (fresh) installation
let outcome = engine.check_and_restore(&AppDataDir::new(app.path()))?;
println!("{}", outcome.status_line());
# Ok::<(), appvault_core::VaultError>(())
```
*/

pub mod backup;
pub mod compression;
pub mod config;
pub mod context;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod observability;
pub mod registry;
pub mod restore;
pub mod snapshot;
pub mod sql;
pub mod storage;
pub mod value;

pub use backup::{BackupDirectory, BackupEntry, BackupKind};
pub use compression::{CompressionAdapter, GzipCompressor, NoCompression};
pub use config::EngineConfig;
pub use context::{AppDataDir, PreferenceWriter, TargetContext, XmlPreferenceWriter};
pub use engine::{Extraction, RestoreOutcome, VaultEngine};
pub use envelope::Envelope;
pub use error::{Result, VaultError};
pub use extract::ExtractLimits;
pub use metadata::{ArtifactContainer, ArtifactMetadata};
pub use observability::init_observability;
#[cfg(feature = "metrics")]
pub use observability::VaultMetrics;
pub use registry::{AccountRecord, AccountRegistry};
pub use restore::{restore, ItemFailure, Phase, PhaseReport, RestoreReport};
pub use snapshot::{DatabaseImage, FileNode, Row, Snapshot, SnapshotSummary};
pub use storage::{LocalFileStorage, StorageAdapter};
pub use value::{infer, PreferenceMap, TypedValue};
