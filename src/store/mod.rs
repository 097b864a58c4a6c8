// src/store/mod.rs

//! Persistence of scans and of each owner's scan index.

pub mod artifact;
pub mod memory;
pub mod snapshot;

use async_trait::async_trait;

use crate::core::guard::Principal;
use crate::core::models::{DeleteOutcome, Owner, OwnerId, ReportArtifact, Scan, ScanId, ScanSummary};
use crate::error::{EngineError, EngineResult, NotFound};

pub use self::artifact::{ArtifactStore, ReportDownload};
pub use self::memory::MemoryScanStore;

/// Scan persistence, scoped to the calling principal.
///
/// Implementations keep `Owner::scan_ids` equal to the set of scans whose
/// `owner_id` names that owner: every mutation that touches one side touches
/// the other in the same critical section, and a failed write leaves neither
/// side changed.
#[async_trait]
pub trait ScanRepository: Send + Sync {
    async fn register_owner(&self, owner_id: OwnerId) -> EngineResult<Owner>;

    async fn find_owner(&self, owner_id: &OwnerId) -> EngineResult<Owner>;

    /// Removes the owner together with every scan it owns.
    async fn remove_owner(&self, owner_id: &OwnerId) -> EngineResult<DeleteOutcome>;

    /// Inserts `scan` and appends its id to the owner's index.
    async fn create(&self, principal: &Principal, scan: Scan) -> EngineResult<Scan>;

    /// All scans of the principal, newest first.
    async fn find_by_owner(&self, principal: &Principal) -> EngineResult<Vec<Scan>>;

    /// Same order as `find_by_owner`, without copying report blobs.
    async fn list_summaries(&self, principal: &Principal) -> EngineResult<Vec<ScanSummary>>;

    async fn find_one(&self, scan_id: ScanId, principal: &Principal) -> EngineResult<Scan>;

    /// Sets or replaces the report artifact.
    async fn attach_artifact(&self, scan_id: ScanId, principal: &Principal, artifact: ReportArtifact) -> EngineResult<()>;

    /// Deletes the requested scans the principal owns; other ids are ignored.
    async fn delete_many(&self, scan_ids: &[ScanId], principal: &Principal) -> EngineResult<DeleteOutcome>;

    async fn delete_one(&self, scan_id: ScanId, principal: &Principal) -> EngineResult<()> {
        let outcome = self.delete_many(&[scan_id], principal).await?;
        if outcome.count == 0 {
            return Err(EngineError::NotFound(NotFound::Scan(scan_id)));
        }
        Ok(())
    }
}
