// src/core/checker/mod.rs

//! Pluggable inspection units and the ordered registry the orchestrator walks.

pub mod headers_checker;
pub mod transport_checker;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use url::Url;

use crate::config::EngineConfig;
use crate::core::models::Issue;
use crate::error::CheckerError;

pub use self::headers_checker::HeaderChecker;
pub use self::transport_checker::TransportChecker;

/// Everything a checker may look at for one scan.
#[derive(Debug, Clone)]
pub struct CheckContext {
    pub target: Url,
    /// Headers from the orchestrator's single fetch of `target`.
    pub headers: HeaderMap,
}

/// Inspects one aspect of a target.
///
/// `Ok(vec![])` means "checked and clean" and must not be confused with `Err`,
/// which means the checker could not finish.
#[async_trait]
pub trait Checker: Send + Sync {
    /// Short name used in logs and in failure issues.
    fn name(&self) -> &'static str;

    /// Whether this checker has anything to say about `target`.
    fn applies_to(&self, _target: &Url) -> bool {
        true
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Issue>, CheckerError>;
}

/// Checkers in execution order. Output order of a scan follows this order.
#[derive(Clone, Default)]
pub struct CheckerRegistry {
    checkers: Vec<Arc<dyn Checker>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The header checker followed by the transport checker.
    pub fn with_defaults(config: &EngineConfig) -> Self {
        Self::new()
            .with_checker(HeaderChecker::new())
            .with_checker(TransportChecker::new(config))
    }

    pub fn with_checker<C: Checker + 'static>(mut self, checker: C) -> Self {
        self.register(Arc::new(checker));
        self
    }

    pub fn register(&mut self, checker: Arc<dyn Checker>) {
        self.checkers.push(checker);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Checker>> {
        self.checkers.iter()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.checkers.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }
}

impl std::fmt::Debug for CheckerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckerRegistry").field("checkers", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_headers_before_transport() {
        let registry = CheckerRegistry::with_defaults(&EngineConfig::default());
        assert_eq!(registry.names(), vec!["headers", "transport"]);
    }

    #[test]
    fn transport_applies_only_to_https() {
        let registry = CheckerRegistry::with_defaults(&EngineConfig::default());
        let http = Url::parse("http://example.com").unwrap();
        let https = Url::parse("https://example.com").unwrap();

        let applicable = |url: &Url| registry.iter().filter(|c| c.applies_to(url)).count();
        assert_eq!(applicable(&http), 1);
        assert_eq!(applicable(&https), 2);
    }
}
