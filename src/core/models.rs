// src/core/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString};
use url::Url;
use uuid::Uuid;

use crate::error::IssueError;

// --- Issue Model ---

/// Description carried by the reserved "nothing wrong" issue.
///
/// Every component compares against this constant (through [`Issue::is_sentinel`])
/// instead of matching free text.
pub const NO_ISSUES_FOUND: &str = "No issues found";

/// Severity taxonomy shared by every checker. `Error` is reserved for checkers
/// that could not complete.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    Error,
}

/// One normalized finding, or one checker failure when `severity` is `Error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerability_name: Option<String>,
    pub description: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_of_concept: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl Issue {
    /// Builds a named finding. `Severity::Error` is rejected here; failures go
    /// through [`Issue::checker_failure`].
    pub fn finding(
        vulnerability_name: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Result<Self, IssueError> {
        if severity == Severity::Error {
            return Err(IssueError::MissingErrorDetail);
        }
        let issue = Self {
            vulnerability_name: Some(vulnerability_name.into()),
            description: description.into(),
            severity,
            proof_of_concept: None,
            remediation: None,
            references: Vec::new(),
            error_detail: None,
        };
        issue.validate()?;
        Ok(issue)
    }

    /// Records that a checker could not run to completion.
    pub fn checker_failure(checker: &str, detail: impl Into<String>) -> Self {
        let mut detail = detail.into();
        if detail.trim().is_empty() {
            detail = "unknown failure".to_string();
        }
        Self {
            vulnerability_name: None,
            description: format!("The {} check could not be completed.", checker),
            severity: Severity::Error,
            proof_of_concept: None,
            remediation: None,
            references: Vec::new(),
            error_detail: Some(detail),
        }
    }

    /// The reserved "no issues found" placeholder.
    pub fn no_issues() -> Self {
        Self {
            vulnerability_name: None,
            description: NO_ISSUES_FOUND.to_string(),
            severity: Severity::Info,
            proof_of_concept: None,
            remediation: None,
            references: Vec::new(),
            error_detail: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.vulnerability_name.is_none()
            && self.error_detail.is_none()
            && self.severity == Severity::Info
            && self.description == NO_ISSUES_FOUND
    }

    pub fn with_proof_of_concept(mut self, poc: impl Into<String>) -> Self {
        self.proof_of_concept = Some(poc.into());
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn with_references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references.extend(references.into_iter().map(Into::into));
        self
    }

    /// Checks the construction rules: error issues carry a detail and no
    /// remediation; anything else is either named or the sentinel.
    pub fn validate(&self) -> Result<(), IssueError> {
        if self.severity == Severity::Error {
            let has_detail = self.error_detail.as_deref().is_some_and(|d| !d.trim().is_empty());
            if !has_detail {
                return Err(IssueError::MissingErrorDetail);
            }
            if self.remediation.is_some() {
                return Err(IssueError::RemediationOnError);
            }
            return Ok(());
        }
        let named = self
            .vulnerability_name
            .as_deref()
            .is_some_and(|n| !n.trim().is_empty());
        if named || self.is_sentinel() {
            Ok(())
        } else {
            Err(IssueError::MissingVulnerabilityName)
        }
    }
}

// --- Identifiers ---

/// Opaque scan identifier, generated when the scan is built.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ScanId(Uuid);

impl ScanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ScanId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Identity of an owner, as handed over by the upstream authentication step.
/// The concrete scheme behind it (session, token, database key) is opaque here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Scan & Owner ---

/// The two kinds of assessment a caller can request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum ScanKind {
    #[serde(rename = "Web Application")]
    #[strum(to_string = "Web Application", serialize = "web", serialize = "webapplication")]
    WebApplication,
    #[serde(rename = "API")]
    #[strum(to_string = "API")]
    Api,
}

/// Opaque report blob attached to a finished scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportArtifact {
    pub content_type: String,
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub attached_at: DateTime<Utc>,
}

/// One executed assessment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub id: ScanId,
    pub owner_id: OwnerId,
    pub issues: Vec<Issue>,
    pub scan_kind: ScanKind,
    pub target_address: Url,
    pub label: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_artifact: Option<ReportArtifact>,
}

impl Scan {
    /// Builds a fresh scan. An empty issue list becomes the single sentinel entry.
    pub fn new(owner_id: OwnerId, issues: Vec<Issue>, scan_kind: ScanKind, target_address: Url, label: String) -> Self {
        let issues = if issues.is_empty() { vec![Issue::no_issues()] } else { issues };
        Self {
            id: ScanId::new(),
            owner_id,
            issues,
            scan_kind,
            target_address,
            label,
            created_at: Utc::now(),
            report_artifact: None,
        }
    }

    /// Number of real findings, ignoring the sentinel and checker failures.
    pub fn finding_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| !i.is_sentinel() && i.severity != Severity::Error)
            .count()
    }

    /// Copy of the scan without its report blob.
    pub fn without_artifact(&self) -> Scan {
        Scan {
            id: self.id,
            owner_id: self.owner_id.clone(),
            issues: self.issues.clone(),
            scan_kind: self.scan_kind,
            target_address: self.target_address.clone(),
            label: self.label.clone(),
            created_at: self.created_at,
            report_artifact: None,
        }
    }

    pub fn summary(&self) -> ScanSummary {
        ScanSummary {
            id: self.id,
            issues: self.issues.clone(),
            scan_kind: self.scan_kind,
            target_address: self.target_address.to_string(),
            label: self.label.clone(),
            created_at: self.created_at,
            has_artifact: self.report_artifact.is_some(),
        }
    }
}

/// What the submission and listing surfaces hand back: a scan without its blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub id: ScanId,
    pub issues: Vec<Issue>,
    pub scan_kind: ScanKind,
    pub target_address: String,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub has_artifact: bool,
}

/// The owner record, reduced to its index of scans.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub id: OwnerId,
    #[serde(default)]
    pub scan_ids: Vec<ScanId>,
}

impl Owner {
    pub fn new(id: OwnerId) -> Self {
        Self { id, scan_ids: Vec::new() }
    }
}

/// Result of a bulk delete: only the identifiers that were actually removed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOutcome {
    pub deleted_ids: Vec<ScanId>,
    pub count: usize,
}

impl DeleteOutcome {
    pub fn new(deleted_ids: Vec<ScanId>) -> Self {
        let count = deleted_ids.len();
        Self { deleted_ids, count }
    }
}

// Report blobs embedded in JSON are base64 text.
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Url {
        Url::parse("https://example.com").unwrap()
    }

    #[test]
    fn error_issue_requires_detail_and_no_remediation() {
        let failure = Issue::checker_failure("transport", "connection refused");
        assert!(failure.validate().is_ok());

        let with_fix = failure.clone().with_remediation("retry later");
        assert_eq!(with_fix.validate(), Err(IssueError::RemediationOnError));

        let mut blank = failure;
        blank.error_detail = None;
        assert_eq!(blank.validate(), Err(IssueError::MissingErrorDetail));
    }

    #[test]
    fn findings_must_be_named() {
        assert_eq!(
            Issue::finding("", Severity::Low, "x").unwrap_err(),
            IssueError::MissingVulnerabilityName
        );
        assert_eq!(
            Issue::finding("Broken", Severity::Error, "x").unwrap_err(),
            IssueError::MissingErrorDetail
        );
        assert!(Issue::no_issues().validate().is_ok());
    }

    #[test]
    fn blank_failure_detail_is_replaced() {
        let failure = Issue::checker_failure("headers", "   ");
        assert_eq!(failure.error_detail.as_deref(), Some("unknown failure"));
    }

    #[test]
    fn empty_scan_falls_back_to_sentinel() {
        let scan = Scan::new(OwnerId::from("u1"), Vec::new(), ScanKind::Api, target(), "Example".into());
        assert_eq!(scan.issues, vec![Issue::no_issues()]);
        assert!(scan.issues[0].is_sentinel());
        assert_eq!(scan.finding_count(), 0);
    }

    #[test]
    fn scan_kind_parses_display_names() {
        assert_eq!("Web Application".parse::<ScanKind>().unwrap(), ScanKind::WebApplication);
        assert_eq!("api".parse::<ScanKind>().unwrap(), ScanKind::Api);
        assert!("desktop".parse::<ScanKind>().is_err());
        assert_eq!(ScanKind::WebApplication.to_string(), "Web Application");
    }

    #[test]
    fn scan_serializes_with_wire_names() {
        let mut scan = Scan::new(OwnerId::from("u1"), Vec::new(), ScanKind::WebApplication, target(), "Example".into());
        scan.report_artifact = Some(ReportArtifact {
            content_type: "application/pdf".into(),
            bytes: b"%PDF-1.7".to_vec(),
            attached_at: Utc::now(),
        });

        let json = serde_json::to_value(&scan).unwrap();
        assert_eq!(json["scanKind"], "Web Application");
        assert_eq!(json["issues"][0]["description"], NO_ISSUES_FOUND);
        assert_eq!(json["reportArtifact"]["bytes"], "JVBERi0xLjc=");

        let back: Scan = serde_json::from_value(json).unwrap();
        assert_eq!(back, scan);
    }
}
