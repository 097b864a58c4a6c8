// src/lib.rs

//! Scan orchestration and findings aggregation.
//!
//! A principal submits a target address; the engine fetches it, runs the
//! registered checkers, normalizes their output into [`crate::core::models::Issue`]s
//! and stores the resulting [`crate::core::models::Scan`] under that principal.

pub mod app;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod store;

pub use app::{RiskSummary, ScanEngine, ScanListing};
pub use config::EngineConfig;
pub use crate::core::guard::Principal;
pub use crate::core::models::{DeleteOutcome, Issue, OwnerId, Scan, ScanId, ScanKind, ScanSummary, Severity};
pub use crate::core::orchestrator::ScanRequest;
pub use error::{EngineError, EngineResult};
