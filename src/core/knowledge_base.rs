//! Static catalog of every finding the reference checkers can report.
//! Checkers only decide *whether* something is wrong; the wording, severity,
//! remediation and references live here so they stay consistent across scans.

use crate::core::models::{Issue, Severity};
use crate::error::IssueError;
use std::fmt;
use tracing::warn;

/// High-level grouping of findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FindingCategory {
    /// Findings derived from HTTP response headers.
    Http,
    /// Findings derived from the TLS handshake and the peer certificate.
    Transport,
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingCategory::Http => write!(f, "HTTP Security Headers"),
            FindingCategory::Transport => write!(f, "SSL/TLS Configuration"),
        }
    }
}

/// Everything needed to present one kind of finding.
pub struct FindingDetail {
    /// Machine-readable identifier (e.g. "HEADERS_CSP_MISSING").
    pub code: &'static str,
    /// Becomes the issue's vulnerability name.
    pub title: &'static str,
    pub category: FindingCategory,
    pub severity: Severity,
    pub description: &'static str,
    pub remediation: &'static str,
    pub references: &'static [&'static str],
}

impl FindingDetail {
    /// Builds the normalized issue for this finding.
    pub fn to_issue(&self) -> Result<Issue, IssueError> {
        Ok(Issue::finding(self.title, self.severity, self.description)?
            .with_remediation(self.remediation)
            .with_references(self.references.iter().copied()))
    }
}

static FINDINGS: &[FindingDetail] = &[
    // --- HTTP Headers ---
    FindingDetail {
        code: "HEADERS_CSP_MISSING",
        title: "Missing Content-Security-Policy",
        category: FindingCategory::Http,
        severity: Severity::Medium,
        description: "The response does not define a Content-Security-Policy. Without it the browser loads scripts and other resources from any origin, which makes Cross-Site Scripting and data injection far easier to exploit.",
        remediation: "Send a Content-Security-Policy header listing the trusted sources for scripts, styles and other assets. Start from \"default-src 'self'\" and open it up only where needed.",
        references: &[
            "https://developer.mozilla.org/en-US/docs/Web/HTTP/CSP",
            "https://owasp.org/www-project-secure-headers/#content-security-policy",
        ],
    },
    FindingDetail {
        code: "HEADERS_HSTS_MISSING",
        title: "Missing Strict-Transport-Security",
        category: FindingCategory::Http,
        severity: Severity::Medium,
        description: "The HTTPS response does not set Strict-Transport-Security, so browsers may still contact the site over plain HTTP and are exposed to protocol downgrade and cookie hijacking.",
        remediation: "Add 'Strict-Transport-Security: max-age=31536000; includeSubDomains' to every HTTPS response.",
        references: &[
            "https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Strict-Transport-Security",
            "https://owasp.org/www-project-secure-headers/#http-strict-transport-security",
        ],
    },
    FindingDetail {
        code: "HEADERS_HSTS_WEAK",
        title: "Weak Strict-Transport-Security max-age",
        category: FindingCategory::Http,
        severity: Severity::Low,
        description: "Strict-Transport-Security is present but its max-age is shorter than one year, so the HTTPS-only policy expires quickly in the browser.",
        remediation: "Raise max-age to at least 31536000 seconds.",
        references: &["https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Strict-Transport-Security"],
    },
    FindingDetail {
        code: "HEADERS_X_FRAME_OPTIONS_MISSING",
        title: "Missing X-Frame-Options",
        category: FindingCategory::Http,
        severity: Severity::Medium,
        description: "Neither X-Frame-Options nor a CSP frame-ancestors directive restricts framing, so the page can be embedded in a hostile site for clickjacking.",
        remediation: "Set 'X-Frame-Options: DENY' (or SAMEORIGIN), or add a frame-ancestors directive to the Content-Security-Policy.",
        references: &["https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/X-Frame-Options"],
    },
    FindingDetail {
        code: "HEADERS_X_CONTENT_TYPE_OPTIONS_MISSING",
        title: "Missing X-Content-Type-Options",
        category: FindingCategory::Http,
        severity: Severity::Low,
        description: "X-Content-Type-Options is absent or not set to 'nosniff', allowing browsers to MIME-sniff responses and execute content disguised as another type.",
        remediation: "Add 'X-Content-Type-Options: nosniff' to every response.",
        references: &["https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/X-Content-Type-Options"],
    },
    FindingDetail {
        code: "HEADERS_REFERRER_POLICY_MISSING",
        title: "Missing Referrer-Policy",
        category: FindingCategory::Http,
        severity: Severity::Low,
        description: "No Referrer-Policy is set, so full URLs, including paths and query strings, may leak to third-party sites through the Referer header.",
        remediation: "Add 'Referrer-Policy: strict-origin-when-cross-origin' or a stricter policy such as 'no-referrer'.",
        references: &["https://developer.mozilla.org/en-US/docs/Web/HTTP/Headers/Referrer-Policy"],
    },
    FindingDetail {
        code: "HEADERS_SERVER_VERSION_DISCLOSED",
        title: "Server Version Disclosure",
        category: FindingCategory::Http,
        severity: Severity::Low,
        description: "The Server header reveals the software version, which helps attackers pick exploits for known vulnerabilities.",
        remediation: "Configure the web server to omit version numbers from the Server header (e.g. 'server_tokens off' in nginx, 'ServerTokens Prod' in Apache).",
        references: &["https://owasp.org/www-project-web-security-testing-guide/latest/4-Web_Application_Security_Testing/01-Information_Gathering/02-Fingerprint_Web_Server"],
    },
    FindingDetail {
        code: "HEADERS_POWERED_BY_DISCLOSED",
        title: "X-Powered-By Disclosure",
        category: FindingCategory::Http,
        severity: Severity::Low,
        description: "The X-Powered-By header advertises the application framework in use.",
        remediation: "Remove the X-Powered-By header from responses.",
        references: &["https://owasp.org/www-project-secure-headers/#x-powered-by"],
    },
    FindingDetail {
        code: "HEADERS_COOKIE_INSECURE",
        title: "Cookie Without Secure Flag",
        category: FindingCategory::Http,
        severity: Severity::Medium,
        description: "A cookie is set over HTTPS without the Secure attribute and can be sent over unencrypted connections.",
        remediation: "Add the Secure attribute to every cookie set by the application.",
        references: &["https://developer.mozilla.org/en-US/docs/Web/HTTP/Cookies#restrict_access_to_cookies"],
    },
    FindingDetail {
        code: "HEADERS_COOKIE_NO_HTTPONLY",
        title: "Cookie Without HttpOnly Flag",
        category: FindingCategory::Http,
        severity: Severity::Medium,
        description: "A cookie is readable from JavaScript because it lacks the HttpOnly attribute, so a single XSS flaw can steal it.",
        remediation: "Add the HttpOnly attribute to session and other sensitive cookies.",
        references: &["https://owasp.org/www-community/HttpOnly"],
    },
    // --- Transport ---
    FindingDetail {
        code: "TLS_CERT_UNTRUSTED",
        title: "Untrusted TLS Certificate",
        category: FindingCategory::Transport,
        severity: Severity::High,
        description: "The certificate presented by the server could not be verified against the system trust store or does not match the host name.",
        remediation: "Install a certificate issued by a publicly trusted CA for this host name and serve the complete intermediate chain.",
        references: &["https://www.ssllabs.com/ssltest/"],
    },
    FindingDetail {
        code: "TLS_CERT_EXPIRED",
        title: "Expired TLS Certificate",
        category: FindingCategory::Transport,
        severity: Severity::Critical,
        description: "The server certificate is outside its validity period. Browsers block the site with a security warning.",
        remediation: "Renew the certificate immediately and automate renewals (e.g. Let's Encrypt / Certbot).",
        references: &["https://letsencrypt.org/docs/"],
    },
    FindingDetail {
        code: "TLS_CERT_EXPIRING_SOON",
        title: "TLS Certificate Expiring Soon",
        category: FindingCategory::Transport,
        severity: Severity::Medium,
        description: "The server certificate expires within the warning window.",
        remediation: "Renew the certificate before it expires and verify that automated renewal works.",
        references: &["https://letsencrypt.org/docs/"],
    },
    FindingDetail {
        code: "TLS_CERT_SELF_SIGNED",
        title: "Self-Signed TLS Certificate",
        category: FindingCategory::Transport,
        severity: Severity::High,
        description: "The certificate is signed by its own subject, so clients cannot authenticate the server.",
        remediation: "Replace the certificate with one issued by a trusted certificate authority.",
        references: &["https://owasp.org/www-project-web-security-testing-guide/latest/4-Web_Application_Security_Testing/09-Testing_for_Weak_Cryptography/01-Testing_for_Weak_Transport_Layer_Security"],
    },
    FindingDetail {
        code: "TLS_WEAK_SIGNATURE",
        title: "Weak Certificate Signature Algorithm",
        category: FindingCategory::Transport,
        severity: Severity::High,
        description: "The certificate is signed with MD5 or SHA-1, both of which are vulnerable to collision attacks.",
        remediation: "Reissue the certificate with a SHA-256 (or stronger) signature.",
        references: &["https://security.googleblog.com/2014/09/gradually-sunsetting-sha-1.html"],
    },
    FindingDetail {
        code: "TLS_WEAK_KEY",
        title: "Weak Certificate Key",
        category: FindingCategory::Transport,
        severity: Severity::High,
        description: "The certificate uses an RSA key shorter than 2048 bits, which can be factored with modest resources.",
        remediation: "Generate a new key of at least 2048 bits (or use ECDSA P-256) and reissue the certificate.",
        references: &["https://www.keylength.com/"],
    },
    FindingDetail {
        code: "TLS_LEGACY_PROTOCOL",
        title: "Legacy TLS Protocol Supported",
        category: FindingCategory::Transport,
        severity: Severity::Medium,
        description: "The server completes handshakes using TLS 1.0 or TLS 1.1, which are deprecated and lack modern cipher suites.",
        remediation: "Disable TLS 1.0 and 1.1 on the server and allow only TLS 1.2 and TLS 1.3.",
        references: &["https://datatracker.ietf.org/doc/html/rfc8996"],
    },
];

/// Looks up a finding by its code.
pub fn get_finding_detail(code: &str) -> Option<&'static FindingDetail> {
    FINDINGS.iter().find(|f| f.code == code)
}

/// Builds the issue for `code`, attaching `poc` when the checker has evidence.
/// Returns `None` for codes missing from the catalog.
pub fn issue_for(code: &str, poc: Option<String>) -> Option<Issue> {
    let issue = match get_finding_detail(code)?.to_issue() {
        Ok(issue) => issue,
        Err(e) => {
            warn!(code, error = %e, "Catalog entry is not a valid finding.");
            return None;
        }
    };
    Some(match poc {
        Some(poc) => issue.with_proof_of_concept(poc),
        None => issue,
    })
}

/// All catalog entries of one category.
pub fn findings_in(category: FindingCategory) -> impl Iterator<Item = &'static FindingDetail> {
    FINDINGS.iter().filter(move |f| f.category == category)
}
