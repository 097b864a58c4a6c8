// src/core/guard.rs

//! Ownership scoping for every repository operation.
//!
//! The principal arrives already authenticated; the only decision made here is
//! whether a record belongs to it. Foreign records are reported as missing so
//! callers cannot discover other owners' scans.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::models::{OwnerId, Scan, ScanId};
use crate::error::NotFound;

/// The authenticated caller on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    owner_id: OwnerId,
}

impl Principal {
    pub fn new(owner_id: impl Into<OwnerId>) -> Self {
        Self { owner_id: owner_id.into() }
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn owns(&self, scan: &Scan) -> bool {
        scan.owner_id == self.owner_id
    }
}

/// Lets `scan` through only when it belongs to `principal`.
pub fn authorize<'a>(principal: &Principal, scan: Option<&'a Scan>, requested: ScanId) -> Result<&'a Scan, NotFound> {
    match scan {
        Some(scan) if principal.owns(scan) => Ok(scan),
        Some(_) => {
            debug!(owner = %principal.owner_id(), scan_id = %requested, "Scan belongs to another owner.");
            Err(NotFound::Scan(requested))
        }
        None => Err(NotFound::Scan(requested)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ScanKind;
    use url::Url;

    fn scan_of(owner: &str) -> Scan {
        Scan::new(
            OwnerId::from(owner),
            Vec::new(),
            ScanKind::WebApplication,
            Url::parse("https://example.com").unwrap(),
            "Example".into(),
        )
    }

    #[test]
    fn foreign_and_missing_scans_look_identical() {
        let scan = scan_of("a");
        let intruder = Principal::new("b");

        let foreign = authorize(&intruder, Some(&scan), scan.id).unwrap_err();
        let missing = authorize(&intruder, None, scan.id).unwrap_err();
        assert_eq!(foreign, missing);
        assert_eq!(foreign, NotFound::Scan(scan.id));
    }

    #[test]
    fn owner_is_let_through() {
        let scan = scan_of("a");
        let owner = Principal::new("a");
        assert_eq!(authorize(&owner, Some(&scan), scan.id).unwrap().id, scan.id);
        assert!(authorize(&owner, None, ScanId::new()).is_err());
    }
}
