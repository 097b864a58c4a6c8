// src/store/snapshot.rs

//! On-disk image of the store: a JSON document for owners and scans, and one
//! side file per report blob so a flush never re-encodes the blobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::models::{Owner, Scan, ScanId};
use crate::error::EngineError;

/// Directory next to the snapshot holding the blob files.
const BLOB_DIR: &str = "artifacts";

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub owners: Vec<Owner>,
    /// Scans whose blob lives in a side file are written without `reportArtifact`.
    pub scans: Vec<Scan>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactEntry>,
}

/// Metadata of a report artifact whose bytes are stored in `file`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactEntry {
    pub scan_id: ScanId,
    pub file: String,
    pub content_type: String,
    pub attached_at: DateTime<Utc>,
}

/// A snapshot file, replaced atomically and durably on every write.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn blob_dir(&self) -> PathBuf {
        self.path.with_file_name(BLOB_DIR)
    }

    fn blob_path(&self, file: &str) -> PathBuf {
        self.blob_dir().join(file)
    }

    fn persistence(&self, what: &str, e: &dyn std::fmt::Display) -> EngineError {
        EngineError::Persistence(format!("could not {} {}: {}", what, self.path.display(), e))
    }

    /// Reads the snapshot; a missing file is an empty store.
    pub async fn load(&self) -> Result<Snapshot, EngineError> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => {
                let snapshot: Snapshot = serde_json::from_slice(&raw)
                    .map_err(|e| EngineError::Persistence(format!("corrupt snapshot {}: {}", self.path.display(), e)))?;
                info!(path = %self.path.display(), scans = snapshot.scans.len(), "Loaded store snapshot.");
                Ok(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot yet, starting empty.");
                Ok(Snapshot::default())
            }
            Err(e) => Err(EngineError::Persistence(format!("could not read {}: {}", self.path.display(), e))),
        }
    }

    /// Writes to a sibling temp file, syncs it, then renames it over the snapshot.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<(), EngineError> {
        let raw = serde_json::to_vec(snapshot).map_err(|e| self.persistence("serialize", &e))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.persistence("create directory for", &e))?;
        }
        let temp = self.temp_path();
        write_synced(&temp, &raw).await.map_err(|e| self.persistence("write", &e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| self.persistence("replace", &e))?;
        debug!(path = %self.path.display(), "Snapshot written.");
        Ok(())
    }

    /// Stores a blob under a fresh name and returns that name. The file is
    /// only referenced once a snapshot naming it has been written.
    pub async fn write_blob(&self, scan_id: ScanId, bytes: &[u8]) -> Result<String, EngineError> {
        let dir = self.blob_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| self.persistence("create artifact directory for", &e))?;
        let file = format!("{}-{}.bin", scan_id, Uuid::new_v4().simple());
        write_synced(&dir.join(&file), bytes)
            .await
            .map_err(|e| self.persistence("write artifact for", &e))?;
        debug!(scan_id = %scan_id, file = %file, size = bytes.len(), "Artifact blob written.");
        Ok(file)
    }

    pub async fn read_blob(&self, file: &str) -> Result<Vec<u8>, EngineError> {
        tokio::fs::read(self.blob_path(file))
            .await
            .map_err(|e| self.persistence(&format!("read artifact {} for", file), &e))
    }

    /// Deletes blobs no snapshot references any more. Failures are logged only.
    pub async fn remove_blobs<I>(&self, files: I)
    where
        I: IntoIterator<Item = String>,
    {
        for file in files {
            if let Err(e) = tokio::fs::remove_file(self.blob_path(&file)).await {
                warn!(file = %file, error = %e, "Could not remove artifact blob.");
            }
        }
    }

    /// Removes blob files left behind by interrupted writes.
    pub async fn prune_blobs(&self, referenced: &HashSet<String>) {
        let Ok(mut entries) = tokio::fs::read_dir(self.blob_dir()).await else {
            return;
        };
        let mut stale = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !referenced.contains(&name) {
                stale.push(name);
            }
        }
        if !stale.is_empty() {
            info!(count = stale.len(), "Removing unreferenced artifact blobs.");
            self.remove_blobs(stale).await;
        }
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{OwnerId, ScanKind};
    use url::Url;

    #[tokio::test]
    async fn missing_file_loads_empty_and_writes_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("nested").join("scans.json"));
        assert!(file.load().await.unwrap().scans.is_empty());

        let scan = Scan::new(
            OwnerId::from("u1"),
            Vec::new(),
            ScanKind::Api,
            Url::parse("http://example.com").unwrap(),
            "Example".into(),
        );
        let mut owner = Owner::new(OwnerId::from("u1"));
        owner.scan_ids.push(scan.id);
        file.write(&Snapshot {
            owners: vec![owner],
            scans: vec![scan.clone()],
            ..Snapshot::default()
        })
        .await
        .unwrap();

        let loaded = file.load().await.unwrap();
        assert_eq!(loaded.scans, vec![scan]);
        assert!(loaded.artifacts.is_empty());
        assert!(!file.temp_path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scans.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = SnapshotFile::new(path).load().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn blobs_live_beside_the_snapshot_and_stale_ones_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path().join("scans.json"));
        let scan_id = ScanId::new();

        let kept = file.write_blob(scan_id, b"%PDF-kept").await.unwrap();
        let stale = file.write_blob(scan_id, b"%PDF-stale").await.unwrap();
        assert_ne!(kept, stale);
        assert!(dir.path().join("artifacts").join(&kept).exists());
        assert_eq!(file.read_blob(&kept).await.unwrap(), b"%PDF-kept");

        file.prune_blobs(&HashSet::from([kept.clone()])).await;
        assert!(file.read_blob(&stale).await.is_err());
        assert_eq!(file.read_blob(&kept).await.unwrap(), b"%PDF-kept");
    }
}
