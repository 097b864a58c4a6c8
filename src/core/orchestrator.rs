// src/core/orchestrator.rs

//! Runs one scan request end to end: validation, owner lookup, header fetch,
//! checkers in registry order, aggregation and persistence.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::EngineConfig;
use crate::core::checker::{CheckContext, CheckerRegistry};
use crate::core::fetcher::Fetcher;
use crate::core::guard::Principal;
use crate::core::models::{Issue, Scan, ScanKind};
use crate::error::{EngineError, EngineResult, ValidationErrors};
use crate::store::ScanRepository;

/// Raw submission as it arrives from the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub target_address: String,
    pub label: String,
    pub scan_kind: String,
}

/// A request whose fields all passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidScanRequest {
    pub target: Url,
    pub label: String,
    pub scan_kind: ScanKind,
}

impl ScanRequest {
    pub fn new(target_address: impl Into<String>, label: impl Into<String>, scan_kind: impl Into<String>) -> Self {
        Self {
            target_address: target_address.into(),
            label: label.into(),
            scan_kind: scan_kind.into(),
        }
    }

    /// Checks every field and reports all violations at once.
    pub fn validate(&self) -> Result<ValidScanRequest, ValidationErrors> {
        let mut violations = ValidationErrors::new();

        let target = match Url::parse(self.target_address.trim()) {
            Ok(url) if !matches!(url.scheme(), "http" | "https") => {
                violations.push("targetAddress", format!("scheme '{}' is not supported, use http or https", url.scheme()));
                None
            }
            Ok(url) if url.host_str().is_none_or(str::is_empty) => {
                violations.push("targetAddress", "the URL has no host");
                None
            }
            Ok(url) => Some(url),
            Err(e) => {
                violations.push("targetAddress", format!("please provide a valid URL ({})", e));
                None
            }
        };

        let scan_kind = match self.scan_kind.trim().parse::<ScanKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                violations.push("scanKind", "must be 'Web Application' or 'API'");
                None
            }
        };

        let label = self.label.trim();
        if label.is_empty() {
            violations.push("label", "cannot be empty");
        }

        violations.into_result()?;
        match (target, scan_kind) {
            (Some(target), Some(scan_kind)) => Ok(ValidScanRequest {
                target,
                label: label.to_string(),
                scan_kind,
            }),
            // Unreachable: a missing field always recorded a violation.
            _ => Err(ValidationErrors::single("request", "invalid request")),
        }
    }
}

/// Sequences fetch, checkers and persistence for a scan.
#[derive(Clone)]
pub struct Orchestrator {
    fetcher: Arc<dyn Fetcher>,
    checkers: CheckerRegistry,
    repository: Arc<dyn ScanRepository>,
    fetch_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        checkers: CheckerRegistry,
        repository: Arc<dyn ScanRepository>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            fetcher,
            checkers,
            repository,
            fetch_timeout: config.fetch_timeout(),
        }
    }

    pub async fn start_scan(&self, principal: &Principal, request: ScanRequest) -> EngineResult<Scan> {
        let request = request.validate()?;
        info!(owner = %principal.owner_id(), target = %request.target, kind = %request.scan_kind, "Scan requested.");

        self.repository.find_owner(principal.owner_id()).await?;

        let headers = self
            .fetcher
            .fetch(&request.target, self.fetch_timeout)
            .await
            .map_err(|source| EngineError::Fetch {
                target: request.target.to_string(),
                source,
            })?;

        let ctx = CheckContext {
            target: request.target.clone(),
            headers,
        };
        let issues = self.run_checks(&ctx).await;

        let scan = Scan::new(
            principal.owner_id().clone(),
            issues,
            request.scan_kind,
            request.target,
            request.label,
        );
        let scan = self.repository.create(principal, scan).await?;
        info!(scan_id = %scan.id, findings = scan.finding_count(), "Scan completed.");
        Ok(scan)
    }

    /// Runs every applicable checker in order and merges their output.
    /// Checker failures become Error-severity issues; sentinel-only results
    /// contribute nothing.
    pub async fn run_checks(&self, ctx: &CheckContext) -> Vec<Issue> {
        let mut issues = Vec::new();
        for checker in self.checkers.iter() {
            if !checker.applies_to(&ctx.target) {
                debug!(checker = checker.name(), target = %ctx.target, "Checker not applicable, skipping.");
                continue;
            }
            match checker.run(ctx).await {
                Ok(found) => {
                    let before = issues.len();
                    issues.extend(found.into_iter().filter(|i| !i.is_sentinel()));
                    debug!(checker = checker.name(), findings = issues.len() - before, "Checker finished.");
                }
                Err(e) => {
                    warn!(checker = checker.name(), error = %e, "Checker failed, recording error issue.");
                    issues.push(Issue::checker_failure(checker.name(), e.to_string()));
                }
            }
        }
        issues
    }
}
