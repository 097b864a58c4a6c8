// src/core/checker/headers_checker.rs

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};
use url::Url;

use super::{CheckContext, Checker};
use crate::core::knowledge_base::issue_for;
use crate::core::models::Issue;
use crate::error::CheckerError;

/// One year, the minimum HSTS lifetime we accept.
const HSTS_MIN_MAX_AGE: u64 = 31_536_000;

static RE_HSTS_MAX_AGE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)max-age\s*=\s*"?(\d+)"?"#).unwrap());
static RE_FRAME_ANCESTORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(^|;)\s*frame-ancestors\s").unwrap());
static RE_VERSIONED_PRODUCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z][\w.-]*/\d+(\.\d+)*").unwrap());

/// Reads a header as text. Non-UTF-8 values count as present.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    match value.to_str() {
        Ok(s) => {
            debug!(header_name = name, value = s, "Header found.");
            Some(s.to_string())
        }
        Err(_) => {
            warn!(header_name = name, "Header found but contained invalid UTF-8.");
            Some("[Invalid UTF-8]".to_string())
        }
    }
}

fn missing_poc(target: &Url, header: &str) -> String {
    format!("GET {} returned no '{}' header.", target, header)
}

/// Evaluates the fetched response headers against the security-header rules.
#[derive(Debug, Clone, Default)]
pub struct HeaderChecker;

impl HeaderChecker {
    pub fn new() -> Self {
        Self
    }

    /// Pure rule evaluation, kept separate from the trait so it can be tested
    /// without a context.
    pub fn analyze(&self, target: &Url, headers: &HeaderMap) -> Vec<Issue> {
        let is_https = target.scheme() == "https";
        let mut codes: Vec<(&'static str, Option<String>)> = Vec::new();

        let csp = header_value(headers, "content-security-policy");
        if csp.is_none() {
            codes.push(("HEADERS_CSP_MISSING", Some(missing_poc(target, "Content-Security-Policy"))));
        }

        if is_https {
            match header_value(headers, "strict-transport-security") {
                None => codes.push(("HEADERS_HSTS_MISSING", Some(missing_poc(target, "Strict-Transport-Security")))),
                Some(value) => {
                    let max_age = RE_HSTS_MAX_AGE
                        .captures(&value)
                        .and_then(|c| c.get(1))
                        .and_then(|m| m.as_str().parse::<u64>().ok());
                    if max_age.is_none_or(|age| age < HSTS_MIN_MAX_AGE) {
                        codes.push(("HEADERS_HSTS_WEAK", Some(format!("Strict-Transport-Security: {}", value))));
                    }
                }
            }
        }

        let frame_ancestors = csp.as_deref().is_some_and(|v| RE_FRAME_ANCESTORS.is_match(v));
        if header_value(headers, "x-frame-options").is_none() && !frame_ancestors {
            codes.push(("HEADERS_X_FRAME_OPTIONS_MISSING", Some(missing_poc(target, "X-Frame-Options"))));
        }

        match header_value(headers, "x-content-type-options") {
            Some(v) if v.trim().eq_ignore_ascii_case("nosniff") => {}
            Some(v) => codes.push((
                "HEADERS_X_CONTENT_TYPE_OPTIONS_MISSING",
                Some(format!("X-Content-Type-Options: {}", v)),
            )),
            None => codes.push((
                "HEADERS_X_CONTENT_TYPE_OPTIONS_MISSING",
                Some(missing_poc(target, "X-Content-Type-Options")),
            )),
        }

        if header_value(headers, "referrer-policy").is_none() {
            codes.push(("HEADERS_REFERRER_POLICY_MISSING", Some(missing_poc(target, "Referrer-Policy"))));
        }

        if let Some(server) = header_value(headers, "server") {
            if RE_VERSIONED_PRODUCT.is_match(&server) {
                codes.push(("HEADERS_SERVER_VERSION_DISCLOSED", Some(format!("Server: {}", server))));
            }
        }

        if let Some(powered_by) = header_value(headers, "x-powered-by") {
            codes.push(("HEADERS_POWERED_BY_DISCLOSED", Some(format!("X-Powered-By: {}", powered_by))));
        }

        for cookie in headers.get_all("set-cookie").iter().filter_map(|v| v.to_str().ok()) {
            let mut parts = cookie.split(';');
            let name = parts
                .next()
                .and_then(|pair| pair.split('=').next())
                .map(str::trim)
                .unwrap_or_default();
            let attributes: Vec<String> = parts.map(|a| a.trim().to_ascii_lowercase()).collect();
            let has = |flag: &str| attributes.iter().any(|a| a == flag);

            if is_https && !has("secure") {
                codes.push(("HEADERS_COOKIE_INSECURE", Some(format!("Set-Cookie: {} (no Secure attribute)", name))));
            }
            if !has("httponly") {
                codes.push(("HEADERS_COOKIE_NO_HTTPONLY", Some(format!("Set-Cookie: {} (no HttpOnly attribute)", name))));
            }
        }

        codes
            .into_iter()
            .filter_map(|(code, poc)| issue_for(code, poc))
            .collect()
    }
}

#[async_trait]
impl Checker for HeaderChecker {
    fn name(&self) -> &'static str {
        "headers"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Issue>, CheckerError> {
        let scheme = ctx.target.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(CheckerError::UnsupportedScheme(scheme.to_string()));
        }
        info!(target = %ctx.target, headers = ctx.headers.len(), "Starting headers check.");
        let issues = self.analyze(&ctx.target, &ctx.headers);
        info!(findings = issues.len(), "Headers check finished.");
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn hardened() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("content-security-policy", HeaderValue::from_static("default-src 'self'"));
        headers.insert(
            "strict-transport-security",
            HeaderValue::from_static("max-age=63072000; includeSubDomains"),
        );
        headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
        headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
        headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
        headers
    }

    fn names(issues: &[Issue]) -> Vec<&str> {
        issues.iter().filter_map(|i| i.vulnerability_name.as_deref()).collect()
    }

    #[test]
    fn hardened_response_is_clean() {
        let target = Url::parse("https://example.com").unwrap();
        assert!(HeaderChecker::new().analyze(&target, &hardened()).is_empty());
    }

    #[test]
    fn missing_csp_is_single_medium_finding() {
        let target = Url::parse("https://example.com").unwrap();
        let mut headers = hardened();
        headers.remove("content-security-policy");

        let issues = HeaderChecker::new().analyze(&target, &headers);
        assert_eq!(names(&issues), vec!["Missing Content-Security-Policy"]);
        assert_eq!(issues[0].severity, crate::core::models::Severity::Medium);
        assert!(issues[0].proof_of_concept.as_deref().unwrap().contains("Content-Security-Policy"));
    }

    #[test]
    fn hsts_rules_only_apply_to_https() {
        let mut headers = hardened();
        headers.remove("strict-transport-security");

        let http = Url::parse("http://example.com").unwrap();
        assert!(HeaderChecker::new().analyze(&http, &headers).is_empty());

        let https = Url::parse("https://example.com").unwrap();
        assert_eq!(
            names(&HeaderChecker::new().analyze(&https, &headers)),
            vec!["Missing Strict-Transport-Security"]
        );

        headers.insert("strict-transport-security", HeaderValue::from_static("max-age=300"));
        assert_eq!(
            names(&HeaderChecker::new().analyze(&https, &headers)),
            vec!["Weak Strict-Transport-Security max-age"]
        );
    }

    #[test]
    fn frame_ancestors_replaces_x_frame_options() {
        let target = Url::parse("https://example.com").unwrap();
        let mut headers = hardened();
        headers.remove("x-frame-options");
        headers.insert(
            "content-security-policy",
            HeaderValue::from_static("default-src 'self'; frame-ancestors 'none'"),
        );
        assert!(HeaderChecker::new().analyze(&target, &headers).is_empty());
    }

    #[test]
    fn disclosure_and_cookie_findings_quote_the_header() {
        let target = Url::parse("https://example.com").unwrap();
        let mut headers = hardened();
        headers.insert("server", HeaderValue::from_static("nginx/1.18.0 (Ubuntu)"));
        headers.insert("x-powered-by", HeaderValue::from_static("Express"));
        headers.append("set-cookie", HeaderValue::from_static("sid=abc; Path=/"));
        headers.append("set-cookie", HeaderValue::from_static("pref=1; Secure; HttpOnly"));

        let issues = HeaderChecker::new().analyze(&target, &headers);
        let pocs: Vec<&str> = issues.iter().filter_map(|i| i.proof_of_concept.as_deref()).collect();
        assert_eq!(issues.len(), 4);
        assert!(pocs.contains(&"Server: nginx/1.18.0 (Ubuntu)"));
        assert!(pocs.contains(&"X-Powered-By: Express"));
        assert!(pocs.contains(&"Set-Cookie: sid (no Secure attribute)"));
        assert!(pocs.contains(&"Set-Cookie: sid (no HttpOnly attribute)"));
    }

    #[test]
    fn plain_server_name_is_not_a_disclosure() {
        let target = Url::parse("https://example.com").unwrap();
        let mut headers = hardened();
        headers.insert("server", HeaderValue::from_static("cloudflare"));
        assert!(HeaderChecker::new().analyze(&target, &headers).is_empty());
    }

    #[test]
    fn non_utf8_header_counts_as_present() {
        let target = Url::parse("https://example.com").unwrap();
        let mut headers = hardened();
        headers.insert("x-frame-options", HeaderValue::from_bytes(b"DENY\xff").unwrap());
        headers.insert("x-powered-by", HeaderValue::from_bytes(b"PHP\xfe").unwrap());

        let issues = HeaderChecker::new().analyze(&target, &headers);
        assert_eq!(names(&issues), vec!["X-Powered-By Disclosure"]);
        assert_eq!(issues[0].proof_of_concept.as_deref(), Some("X-Powered-By: [Invalid UTF-8]"));
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let ctx = CheckContext {
            target: Url::parse("ftp://example.com").unwrap(),
            headers: HeaderMap::new(),
        };
        let err = HeaderChecker::new().run(&ctx).await.unwrap_err();
        assert!(matches!(err, CheckerError::UnsupportedScheme(s) if s == "ftp"));
    }
}
