// src/core/mod.rs

/// Issue taxonomy, scan and owner records, identifiers.
pub mod models;

/// Static catalog of findings with their wording and remediation.
pub mod knowledge_base;

/// Bounded header retrieval feeding the checkers.
pub mod fetcher;

/// The `Checker` capability, its registry and the two reference checkers.
pub mod checker;

/// Ownership scoping of repository calls.
pub mod guard;

/// Fetch, check, aggregate, persist.
pub mod orchestrator;
