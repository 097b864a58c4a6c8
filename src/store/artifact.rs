// src/store/artifact.rs

use chrono::Utc;
use std::sync::Arc;
use tracing::info;

use super::ScanRepository;
use crate::config::EngineConfig;
use crate::core::guard::Principal;
use crate::core::models::{ReportArtifact, ScanId};
use crate::error::{EngineResult, NotFound, ValidationErrors};

/// A report ready to hand back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDownload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ReportDownload {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

/// Attaches and serves the report blob of a scan.
#[derive(Clone)]
pub struct ArtifactStore {
    repository: Arc<dyn ScanRepository>,
    max_bytes: usize,
    content_type: String,
}

impl ArtifactStore {
    pub fn new(repository: Arc<dyn ScanRepository>, config: &EngineConfig) -> Self {
        Self {
            repository,
            max_bytes: config.artifact_max_bytes,
            content_type: config.artifact_content_type.clone(),
        }
    }

    /// Stores `bytes` as the report of `scan_id`, replacing any earlier one.
    pub async fn attach(
        &self,
        principal: &Principal,
        scan_id: ScanId,
        bytes: Vec<u8>,
        declared_content_type: &str,
    ) -> EngineResult<()> {
        let mut violations = ValidationErrors::new();
        if bytes.is_empty() {
            violations.push("reportArtifact", "the report is empty");
        } else if bytes.len() > self.max_bytes {
            violations.push(
                "reportArtifact",
                format!("{} bytes exceeds the {} byte limit", bytes.len(), self.max_bytes),
            );
        }
        if !declared_content_type.trim().eq_ignore_ascii_case(&self.content_type) {
            violations.push(
                "contentType",
                format!("'{}' is not accepted, expected '{}'", declared_content_type, self.content_type),
            );
        }
        violations.into_result()?;

        let size = bytes.len();
        let artifact = ReportArtifact {
            content_type: self.content_type.clone(),
            bytes,
            attached_at: Utc::now(),
        };
        self.repository.attach_artifact(scan_id, principal, artifact).await?;
        info!(scan_id = %scan_id, size, "Report uploaded.");
        Ok(())
    }

    /// Returns the report with a filename derived from the scan label.
    pub async fn retrieve(&self, principal: &Principal, scan_id: ScanId) -> EngineResult<ReportDownload> {
        let scan = self.repository.find_one(scan_id, principal).await?;
        let artifact = scan.report_artifact.ok_or(NotFound::Artifact(scan_id))?;
        Ok(ReportDownload {
            filename: format!("{}.pdf", filename_stem(&scan.label)),
            content_type: artifact.content_type,
            bytes: artifact.bytes,
        })
    }
}

/// Keeps letters, digits, spaces, `-`, `_` and `.`; everything else becomes `_`.
fn filename_stem(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        "report".to_string()
    } else {
        cleaned.to_string()
    }
}
