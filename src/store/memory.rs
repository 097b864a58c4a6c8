// src/store/memory.rs

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::snapshot::{ArtifactEntry, Snapshot, SnapshotFile};
use super::ScanRepository;
use crate::core::guard::{authorize, Principal};
use crate::core::models::{DeleteOutcome, Owner, OwnerId, ReportArtifact, Scan, ScanId, ScanSummary};
use crate::error::{EngineError, EngineResult, NotFound, ValidationErrors};

#[derive(Debug, Default)]
struct StoreState {
    owners: BTreeMap<OwnerId, Owner>,
    scans: HashMap<ScanId, Scan>,
    /// Side file holding each report blob, when mirrored to disk.
    blob_files: HashMap<ScanId, String>,
}

impl StoreState {
    fn from_parts(owners: Vec<Owner>, scans: Vec<Scan>) -> Self {
        Self {
            owners: owners.into_iter().map(|o| (o.id.clone(), o)).collect(),
            scans: scans.into_iter().map(|s| (s.id, s)).collect(),
            blob_files: HashMap::new(),
        }
    }

    /// Blobs with a side file are written as references only.
    fn to_snapshot(&self) -> Snapshot {
        let mut ordered: Vec<&Scan> = self.scans.values().collect();
        ordered.sort_by_key(|s| (s.created_at, s.id));

        let mut artifacts = Vec::new();
        let scans = ordered
            .into_iter()
            .map(|scan| match (&scan.report_artifact, self.blob_files.get(&scan.id)) {
                (Some(artifact), Some(file)) => {
                    artifacts.push(ArtifactEntry {
                        scan_id: scan.id,
                        file: file.clone(),
                        content_type: artifact.content_type.clone(),
                        attached_at: artifact.attached_at,
                    });
                    scan.without_artifact()
                }
                (Some(_), None) => scan.clone(),
                (None, _) => scan.without_artifact(),
            })
            .collect();

        Snapshot {
            owners: self.owners.values().cloned().collect(),
            scans,
            artifacts,
        }
    }

    /// Restores the owner/scan invariant after loading: orphaned scans are
    /// dropped and every owner index is rebuilt from the scans. Returns the
    /// number of corrections made.
    fn repair(&mut self) -> usize {
        let mut fixes = 0;

        let orphans: Vec<ScanId> = self
            .scans
            .values()
            .filter(|s| !self.owners.contains_key(&s.owner_id))
            .map(|s| s.id)
            .collect();
        for id in orphans {
            warn!(scan_id = %id, "Dropping scan whose owner no longer exists.");
            self.scans.remove(&id);
            self.blob_files.remove(&id);
            fixes += 1;
        }

        for owner in self.owners.values_mut() {
            let mut owned: Vec<&Scan> = self.scans.values().filter(|s| s.owner_id == owner.id).collect();
            owned.sort_by_key(|s| (s.created_at, s.id));
            let expected: Vec<ScanId> = owned.iter().map(|s| s.id).collect();

            let current: HashSet<ScanId> = owner.scan_ids.iter().copied().collect();
            let wanted: HashSet<ScanId> = expected.iter().copied().collect();
            if current != wanted || owner.scan_ids.len() != expected.len() {
                warn!(owner = %owner.id, "Rebuilding inconsistent scan index.");
                owner.scan_ids = expected;
                fixes += 1;
            }
        }
        fixes
    }
}

/// Repository holding everything in memory behind one lock, optionally
/// mirrored to a JSON snapshot with report blobs in side files.
///
/// Every mutation runs under the write lock and, when a snapshot is
/// configured, is flushed before the lock is released. A failed flush undoes
/// the in-memory change, so readers never see a half-applied pair.
#[derive(Debug, Default)]
pub struct MemoryScanStore {
    state: RwLock<StoreState>,
    snapshot: Option<SnapshotFile>,
}

impl MemoryScanStore {
    /// A purely in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens (or starts) a store mirrored to `path`.
    pub async fn open(path: impl Into<PathBuf>) -> EngineResult<Self> {
        let file = SnapshotFile::new(path);
        let snapshot = file.load().await?;
        let mut state = StoreState::from_parts(snapshot.owners, snapshot.scans);
        let mut fixes = 0;

        for entry in snapshot.artifacts {
            let Some(scan) = state.scans.get_mut(&entry.scan_id) else {
                warn!(scan_id = %entry.scan_id, "Dropping artifact of an unknown scan.");
                fixes += 1;
                continue;
            };
            match file.read_blob(&entry.file).await {
                Ok(bytes) => {
                    scan.report_artifact = Some(ReportArtifact {
                        content_type: entry.content_type,
                        bytes,
                        attached_at: entry.attached_at,
                    });
                    state.blob_files.insert(entry.scan_id, entry.file);
                }
                Err(e) => {
                    warn!(scan_id = %entry.scan_id, error = %e, "Dropping artifact whose blob cannot be read.");
                    fixes += 1;
                }
            }
        }

        // Snapshots that still embed blobs get them moved to side files.
        let embedded: Vec<ScanId> = state
            .scans
            .values()
            .filter(|s| s.report_artifact.is_some() && !state.blob_files.contains_key(&s.id))
            .map(|s| s.id)
            .collect();
        for scan_id in embedded {
            if let Some(artifact) = state.scans.get(&scan_id).and_then(|s| s.report_artifact.as_ref()) {
                let name = file.write_blob(scan_id, &artifact.bytes).await?;
                state.blob_files.insert(scan_id, name);
                fixes += 1;
            }
        }

        fixes += state.repair();
        if fixes > 0 {
            info!(fixes, "Repaired store on load.");
            file.write(&state.to_snapshot()).await?;
        }
        let referenced: HashSet<String> = state.blob_files.values().cloned().collect();
        file.prune_blobs(&referenced).await;

        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(file),
        })
    }

    async fn flush(&self, state: &StoreState) -> EngineResult<()> {
        match &self.snapshot {
            Some(file) => file.write(&state.to_snapshot()).await,
            None => Ok(()),
        }
    }

    async fn discard_blobs<I>(&self, files: I)
    where
        I: IntoIterator<Item = String> + Send,
        I::IntoIter: Send,
    {
        if let Some(file) = &self.snapshot {
            file.remove_blobs(files).await;
        }
    }
}

#[async_trait]
impl ScanRepository for MemoryScanStore {
    async fn register_owner(&self, owner_id: OwnerId) -> EngineResult<Owner> {
        if owner_id.as_str().trim().is_empty() {
            return Err(ValidationErrors::single("ownerId", "cannot be empty").into());
        }
        let mut state = self.state.write().await;
        if state.owners.contains_key(&owner_id) {
            return Err(ValidationErrors::single("ownerId", format!("'{}' is already registered", owner_id)).into());
        }
        let owner = Owner::new(owner_id.clone());
        state.owners.insert(owner_id.clone(), owner.clone());
        if let Err(e) = self.flush(&state).await {
            state.owners.remove(&owner_id);
            return Err(e);
        }
        info!(owner = %owner_id, "Owner registered.");
        Ok(owner)
    }

    async fn find_owner(&self, owner_id: &OwnerId) -> EngineResult<Owner> {
        let state = self.state.read().await;
        state
            .owners
            .get(owner_id)
            .cloned()
            .ok_or_else(|| NotFound::Owner(owner_id.clone()).into())
    }

    async fn remove_owner(&self, owner_id: &OwnerId) -> EngineResult<DeleteOutcome> {
        let mut state = self.state.write().await;
        let owner = state
            .owners
            .remove(owner_id)
            .ok_or_else(|| EngineError::from(NotFound::Owner(owner_id.clone())))?;

        let owned: Vec<ScanId> = state.scans.values().filter(|s| &s.owner_id == owner_id).map(|s| s.id).collect();
        let removed: Vec<Scan> = owned.iter().filter_map(|id| state.scans.remove(id)).collect();
        let removed_blobs: Vec<(ScanId, String)> = owned
            .iter()
            .filter_map(|id| state.blob_files.remove(id).map(|file| (*id, file)))
            .collect();

        if let Err(e) = self.flush(&state).await {
            state.owners.insert(owner_id.clone(), owner);
            state.scans.extend(removed.into_iter().map(|s| (s.id, s)));
            state.blob_files.extend(removed_blobs);
            return Err(e);
        }
        self.discard_blobs(removed_blobs.into_iter().map(|(_, file)| file)).await;
        info!(owner = %owner_id, scans = owned.len(), "Owner removed with its scans.");
        Ok(DeleteOutcome::new(owned))
    }

    async fn create(&self, principal: &Principal, scan: Scan) -> EngineResult<Scan> {
        if !principal.owns(&scan) {
            return Err(NotFound::Owner(scan.owner_id.clone()).into());
        }
        let mut violations = ValidationErrors::new();
        for (index, issue) in scan.issues.iter().enumerate() {
            if let Err(e) = issue.validate() {
                violations.push("issues", format!("issue {}: {}", index, e));
            }
        }
        violations.into_result()?;

        let mut state = self.state.write().await;
        let scan_id = scan.id;
        if state.scans.contains_key(&scan_id) {
            return Err(ValidationErrors::single("id", format!("scan {} already exists", scan_id)).into());
        }
        let owner = state
            .owners
            .get_mut(&scan.owner_id)
            .ok_or_else(|| EngineError::from(NotFound::Owner(scan.owner_id.clone())))?;
        owner.scan_ids.push(scan_id);
        state.scans.insert(scan_id, scan.clone());

        if let Err(e) = self.flush(&state).await {
            warn!(scan_id = %scan_id, error = %e, "Rolling back scan creation.");
            state.scans.remove(&scan_id);
            if let Some(owner) = state.owners.get_mut(&scan.owner_id) {
                owner.scan_ids.retain(|id| *id != scan_id);
            }
            return Err(e);
        }
        info!(scan_id = %scan_id, owner = %scan.owner_id, "Scan stored.");
        Ok(scan)
    }

    async fn find_by_owner(&self, principal: &Principal) -> EngineResult<Vec<Scan>> {
        let state = self.state.read().await;
        if !state.owners.contains_key(principal.owner_id()) {
            return Err(NotFound::Owner(principal.owner_id().clone()).into());
        }
        let mut scans: Vec<Scan> = state.scans.values().filter(|s| principal.owns(s)).cloned().collect();
        scans.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        debug!(owner = %principal.owner_id(), scans = scans.len(), "Listed scans.");
        Ok(scans)
    }

    async fn list_summaries(&self, principal: &Principal) -> EngineResult<Vec<ScanSummary>> {
        let state = self.state.read().await;
        if !state.owners.contains_key(principal.owner_id()) {
            return Err(NotFound::Owner(principal.owner_id().clone()).into());
        }
        let mut summaries: Vec<ScanSummary> = state
            .scans
            .values()
            .filter(|s| principal.owns(s))
            .map(Scan::summary)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(summaries)
    }

    async fn find_one(&self, scan_id: ScanId, principal: &Principal) -> EngineResult<Scan> {
        let state = self.state.read().await;
        Ok(authorize(principal, state.scans.get(&scan_id), scan_id)?.clone())
    }

    async fn attach_artifact(&self, scan_id: ScanId, principal: &Principal, artifact: ReportArtifact) -> EngineResult<()> {
        let mut state = self.state.write().await;
        authorize(principal, state.scans.get(&scan_id), scan_id)?;
        let new_blob = match &self.snapshot {
            Some(file) => Some(file.write_blob(scan_id, &artifact.bytes).await?),
            None => None,
        };
        let previous = state
            .scans
            .get_mut(&scan_id)
            .and_then(|scan| scan.report_artifact.replace(artifact));
        let previous_blob = match &new_blob {
            Some(file) => state.blob_files.insert(scan_id, file.clone()),
            None => None,
        };

        if let Err(e) = self.flush(&state).await {
            if let Some(scan) = state.scans.get_mut(&scan_id) {
                scan.report_artifact = previous;
            }
            match previous_blob {
                Some(old) => state.blob_files.insert(scan_id, old),
                None => state.blob_files.remove(&scan_id),
            };
            self.discard_blobs(new_blob).await;
            return Err(e);
        }
        self.discard_blobs(previous_blob).await;
        info!(scan_id = %scan_id, replaced = previous.is_some(), "Report artifact attached.");
        Ok(())
    }

    async fn delete_many(&self, scan_ids: &[ScanId], principal: &Principal) -> EngineResult<DeleteOutcome> {
        if scan_ids.is_empty() {
            return Err(ValidationErrors::single("scanIds", "no scan ids provided").into());
        }
        let mut state = self.state.write().await;
        if !state.owners.contains_key(principal.owner_id()) {
            return Err(NotFound::Owner(principal.owner_id().clone()).into());
        }

        let mut seen = HashSet::new();
        let owned: Vec<ScanId> = scan_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .filter(|id| state.scans.get(id).is_some_and(|s| principal.owns(s)))
            .collect();
        if owned.len() < seen.len() {
            debug!(owner = %principal.owner_id(), ignored = seen.len() - owned.len(), "Ignoring ids not owned by caller.");
        }

        let removed: Vec<Scan> = owned.iter().filter_map(|id| state.scans.remove(id)).collect();
        let removed_blobs: Vec<(ScanId, String)> = owned
            .iter()
            .filter_map(|id| state.blob_files.remove(id).map(|file| (*id, file)))
            .collect();
        let owned_set: HashSet<ScanId> = owned.iter().copied().collect();
        let previous_index = match state.owners.get_mut(principal.owner_id()) {
            Some(owner) => {
                let previous = owner.scan_ids.clone();
                owner.scan_ids.retain(|id| !owned_set.contains(id));
                previous
            }
            None => Vec::new(),
        };

        if let Err(e) = self.flush(&state).await {
            warn!(owner = %principal.owner_id(), error = %e, "Rolling back bulk delete.");
            state.scans.extend(removed.into_iter().map(|s| (s.id, s)));
            state.blob_files.extend(removed_blobs);
            if let Some(owner) = state.owners.get_mut(principal.owner_id()) {
                owner.scan_ids = previous_index;
            }
            return Err(e);
        }
        self.discard_blobs(removed_blobs.into_iter().map(|(_, file)| file)).await;
        info!(owner = %principal.owner_id(), deleted = owned.len(), "Scans deleted.");
        Ok(DeleteOutcome::new(owned))
    }
}
