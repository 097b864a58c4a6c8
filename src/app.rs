// src/app.rs

use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::core::checker::CheckerRegistry;
use crate::core::fetcher::{Fetcher, HttpFetcher};
use crate::core::guard::Principal;
use crate::core::models::{DeleteOutcome, Issue, Owner, OwnerId, ScanId, ScanSummary, Severity};
use crate::core::orchestrator::{Orchestrator, ScanRequest};
use crate::error::{EngineError, EngineResult};
use crate::store::{ArtifactStore, MemoryScanStore, ReportDownload, ScanRepository};

/// Severity tally and a 0-100 score for one scan.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskSummary {
    pub score: u8,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub info: usize,
    pub errors: usize,
}

impl RiskSummary {
    pub fn of(issues: &[Issue]) -> Self {
        let findings = issues.iter().filter(|i| !i.is_sentinel());
        let mut summary = RiskSummary::default();
        for issue in findings {
            match issue.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Info => summary.info += 1,
                Severity::Error => summary.errors += 1,
            }
        }
        let penalty = summary.critical * 15 + summary.high * 10 + summary.medium * 5 + summary.low * 2;
        summary.score = 100usize.saturating_sub(penalty) as u8;
        summary
    }
}

/// One row of the listing surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanListing {
    #[serde(flatten)]
    pub scan: ScanSummary,
    pub risk: RiskSummary,
}

/// The engine as a whole: the surfaces callers use, wired to one repository.
#[derive(Clone)]
pub struct ScanEngine {
    repository: Arc<dyn ScanRepository>,
    orchestrator: Orchestrator,
    artifacts: ArtifactStore,
}

impl ScanEngine {
    /// Opens the snapshot-backed store under `config.data_dir` with the
    /// default fetcher and checkers.
    pub async fn open(config: &EngineConfig) -> EngineResult<Self> {
        let repository = Arc::new(MemoryScanStore::open(config.store_path()).await?);
        let fetcher = HttpFetcher::new(config).map_err(|e| EngineError::Setup(e.to_string()))?;
        info!(store = %config.store_path().display(), "Scan engine ready.");
        Ok(Self::with_components(
            config,
            repository,
            Arc::new(fetcher),
            CheckerRegistry::with_defaults(config),
        ))
    }

    pub fn with_components(
        config: &EngineConfig,
        repository: Arc<dyn ScanRepository>,
        fetcher: Arc<dyn Fetcher>,
        checkers: CheckerRegistry,
    ) -> Self {
        let orchestrator = Orchestrator::new(fetcher, checkers, Arc::clone(&repository), config);
        let artifacts = ArtifactStore::new(Arc::clone(&repository), config);
        Self {
            repository,
            orchestrator,
            artifacts,
        }
    }

    pub async fn register_owner(&self, owner_id: OwnerId) -> EngineResult<Owner> {
        self.repository.register_owner(owner_id).await
    }

    pub async fn remove_owner(&self, owner_id: &OwnerId) -> EngineResult<DeleteOutcome> {
        self.repository.remove_owner(owner_id).await
    }

    pub async fn submit(&self, principal: &Principal, request: ScanRequest) -> EngineResult<ScanSummary> {
        Ok(self.orchestrator.start_scan(principal, request).await?.summary())
    }

    pub async fn list(&self, principal: &Principal) -> EngineResult<Vec<ScanListing>> {
        let summaries = self.repository.list_summaries(principal).await?;
        Ok(summaries
            .into_iter()
            .map(|scan| ScanListing {
                risk: RiskSummary::of(&scan.issues),
                scan,
            })
            .collect())
    }

    pub async fn show(&self, principal: &Principal, scan_id: ScanId) -> EngineResult<ScanListing> {
        let scan = self.repository.find_one(scan_id, principal).await?;
        Ok(ScanListing {
            risk: RiskSummary::of(&scan.issues),
            scan: scan.summary(),
        })
    }

    pub async fn attach_report(
        &self,
        principal: &Principal,
        scan_id: ScanId,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> EngineResult<()> {
        self.artifacts.attach(principal, scan_id, bytes, content_type).await
    }

    pub async fn download_report(&self, principal: &Principal, scan_id: ScanId) -> EngineResult<ReportDownload> {
        self.artifacts.retrieve(principal, scan_id).await
    }

    pub async fn delete(&self, principal: &Principal, scan_ids: &[ScanId]) -> EngineResult<DeleteOutcome> {
        self.repository.delete_many(scan_ids, principal).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::knowledge_base::issue_for;
    use crate::core::models::{Scan, ScanKind};
    use url::Url;

    #[test]
    fn risk_summary_ignores_sentinel_and_scores_findings() {
        let url = Url::parse("https://example.com").unwrap();
        let clean = Scan::new(OwnerId::from("u1"), Vec::new(), ScanKind::Api, url.clone(), "x".into());
        assert_eq!(RiskSummary::of(&clean.issues).score, 100);
        assert_eq!(RiskSummary::of(&clean.issues).info, 0);

        let issues = vec![
            issue_for("TLS_CERT_EXPIRED", None).unwrap(),
            issue_for("HEADERS_CSP_MISSING", None).unwrap(),
            Issue::checker_failure("transport", "timeout"),
        ];
        let scan = Scan::new(OwnerId::from("u1"), issues, ScanKind::Api, url, "x".into());
        let risk = RiskSummary::of(&scan.issues);
        assert_eq!((risk.critical, risk.medium, risk.errors), (1, 1, 1));
        assert_eq!(risk.score, 80);
    }
}
