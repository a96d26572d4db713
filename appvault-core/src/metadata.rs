/*!
Artifact metadata and the container sealed inside the envelope.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::snapshot::{Snapshot, SnapshotSummary};
use crate::{Result, VaultError};

/// Current artifact format version for compatibility tracking
pub const ARTIFACT_FORMAT_VERSION: u8 = 1;

/// Metadata stored next to the snapshot in every sealed artifact
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArtifactMetadata {
    /// Format version for compatibility (current: 1)
    pub format_version: u8,

    /// Unique identifier for this artifact
    pub snapshot_id: String,

    /// When the artifact was sealed
    pub created_at: DateTime<Utc>,

    /// SHA-256 of the normalized snapshot document
    pub content_hash: String,

    /// Where the snapshot was taken from, usually a data directory or package
    pub source: String,

    /// Entry counts of the snapshot
    pub summary: SnapshotSummary,
}

impl ArtifactMetadata {
    pub fn new<S: Into<String>>(source: S) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            snapshot_id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            content_hash: String::new(),
            source: source.into(),
            summary: SnapshotSummary::default(),
        }
    }

    pub fn with_content_hash(mut self, document: &[u8]) -> Self {
        self.content_hash = Self::compute_hash(document);
        self
    }

    pub fn with_summary(mut self, summary: SnapshotSummary) -> Self {
        self.summary = summary;
        self
    }

    /// Hexadecimal SHA-256 of `data`
    pub fn compute_hash(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    pub fn verify_integrity(&self, document: &[u8]) -> Result<()> {
        let computed_hash = Self::compute_hash(document);
        if computed_hash == self.content_hash {
            Ok(())
        } else {
            Err(VaultError::IntegrityCheckFailed {
                expected: self.content_hash.clone(),
                actual: computed_hash,
            })
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.content_hash.is_empty() {
            return Err(VaultError::validation("content_hash cannot be empty"));
        }
        if self.snapshot_id.is_empty() {
            return Err(VaultError::validation("snapshot_id cannot be empty"));
        }
        Ok(())
    }

    pub fn is_compatible(&self) -> bool {
        self.format_version <= ARTIFACT_FORMAT_VERSION
    }
}

/// Plaintext payload of a sealed artifact.
///
/// The snapshot travels as a JSON value so that its hash is computed over the
/// same normalized bytes on both sides.
#[derive(Serialize, Deserialize, Debug)]
pub struct ArtifactContainer {
    metadata: ArtifactMetadata,
    snapshot: serde_json::Value,
}

impl ArtifactContainer {
    /// Wrap `snapshot`, filling in its hash and summary
    pub fn new<S: Into<String>>(snapshot: &Snapshot, source: S) -> Result<Self> {
        let value = serde_json::to_value(snapshot)?;
        let normalized = serde_json::to_vec(&value)?;
        let metadata = ArtifactMetadata::new(source)
            .with_content_hash(&normalized)
            .with_summary(snapshot.summary());
        metadata.validate()?;
        Ok(Self {
            metadata,
            snapshot: value,
        })
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a container, check its version and verify the snapshot hash
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let container: Self = serde_json::from_slice(bytes)
            .map_err(|e| VaultError::invalid_format(format!("Malformed artifact container: {e}")))?;

        if !container.metadata.is_compatible() {
            return Err(VaultError::invalid_format(format!(
                "Incompatible artifact format version: {} (current: {})",
                container.metadata.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }

        let normalized = serde_json::to_vec(&container.snapshot)?;
        container.metadata.verify_integrity(&normalized)?;
        Ok(container)
    }

    /// Split into metadata and the decoded snapshot
    pub fn into_parts(self) -> Result<(ArtifactMetadata, Snapshot)> {
        let snapshot = serde_json::from_value(self.snapshot)
            .map_err(|e| VaultError::invalid_format(format!("Malformed snapshot document: {e}")))?;
        Ok((self.metadata, snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{FileNode, Row};
    use crate::value::PreferenceMap;
    use std::collections::BTreeMap;

    fn sample_snapshot() -> Snapshot {
        let mut account = PreferenceMap::new();
        account.insert("uid", "123456");
        account.insert("volume", 3.0f32);

        let mut tables = BTreeMap::new();
        // columns deliberately out of alphabetical order
        tables.insert(
            "users".to_string(),
            vec![Row::new().with("name", "Alice").with("id", "1")],
        );

        let mut files = BTreeMap::new();
        files.insert("notes.txt".to_string(), FileNode::Text("hi".to_string()));

        Snapshot::assemble(
            BTreeMap::from([("account".to_string(), account)]),
            BTreeMap::from([("main.db".to_string(), tables)]),
            FileNode::Directory(files),
        )
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            ArtifactMetadata::compute_hash(b"test data"),
            "916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
        );
    }

    #[test]
    fn test_container_round_trip_keeps_column_order() {
        let snapshot = sample_snapshot();
        let container = ArtifactContainer::new(&snapshot, "com.example").unwrap();
        assert_eq!(container.metadata().summary.rows, 1);
        assert_eq!(container.metadata().source, "com.example");

        let bytes = container.to_bytes().unwrap();
        let (metadata, restored) = ArtifactContainer::from_bytes(&bytes)
            .unwrap()
            .into_parts()
            .unwrap();

        assert_eq!(metadata.format_version, ARTIFACT_FORMAT_VERSION);
        let row = &restored.databases()["main.db"]["users"][0];
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["name", "id"]);
        assert_eq!(restored.files(), snapshot.files());
    }

    #[test]
    fn test_tampered_snapshot_fails_integrity() {
        let container = ArtifactContainer::new(&sample_snapshot(), "test").unwrap();
        let text = String::from_utf8(container.to_bytes().unwrap()).unwrap();
        let tampered = text.replace("Alice", "Mallory");

        let err = ArtifactContainer::from_bytes(tampered.as_bytes()).unwrap_err();
        assert!(matches!(err, VaultError::IntegrityCheckFailed { .. }));
    }

    #[test]
    fn test_future_format_is_rejected() {
        let mut container = ArtifactContainer::new(&Snapshot::empty(), "test").unwrap();
        container.metadata.format_version = ARTIFACT_FORMAT_VERSION + 1;
        let bytes = container.to_bytes().unwrap();

        let err = ArtifactContainer::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, VaultError::InvalidFormat(_)));
    }

    #[test]
    fn test_malformed_container_is_invalid_format() {
        let err = ArtifactContainer::from_bytes(b"{\"metadata\":").unwrap_err();
        assert!(matches!(err, VaultError::InvalidFormat(_)));
        assert!(err.is_envelope_corrupt());
    }
}
