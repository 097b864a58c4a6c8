// src/core/checker/transport_checker.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use native_tls::{HandshakeError, Protocol, TlsConnector};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::spawn_blocking;
use tracing::{debug, error, info, warn};
use url::{Host, Url};
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use super::{CheckContext, Checker};
use crate::config::EngineConfig;
use crate::core::knowledge_base::issue_for;
use crate::core::models::Issue;
use crate::error::CheckerError;

/// md5WithRSAEncryption, sha1WithRSAEncryption, ecdsa-with-SHA1, dsa-with-sha1.
const WEAK_SIGNATURE_OIDS: &[&str] = &[
    "1.2.840.113549.1.1.4",
    "1.2.840.113549.1.1.5",
    "1.2.840.10045.4.1",
    "1.2.840.10040.4.3",
];

const MIN_RSA_KEY_BITS: usize = 2048;

/// Certificate properties the analysis cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateFacts {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub signature_oid: String,
    pub rsa_key_bits: Option<usize>,
}

/// Everything learned from the handshakes with one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFacts {
    /// Why the verified handshake failed, if it did.
    pub trust_error: Option<String>,
    pub certificate: Option<CertificateFacts>,
    /// The server completed a TLS 1.0/1.1-only handshake.
    pub legacy_protocol: bool,
}

/// Connects to https targets to inspect the certificate and protocol support.
#[derive(Debug, Clone)]
pub struct TransportChecker {
    timeout: Duration,
    expiry_warning_days: i64,
}

impl TransportChecker {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            timeout: config.transport_timeout(),
            expiry_warning_days: config.certificate_expiry_warning_days,
        }
    }

    /// Turns handshake facts into issues. A clean endpoint yields the
    /// single sentinel issue.
    pub fn analyze(&self, facts: &TransportFacts, now: DateTime<Utc>) -> Vec<Issue> {
        let mut issues = Vec::new();

        if let Some(reason) = &facts.trust_error {
            issues.extend(issue_for("TLS_CERT_UNTRUSTED", Some(format!("Verified handshake failed: {}", reason))));
        }

        if let Some(cert) = &facts.certificate {
            let validity = format!("Valid from {} until {}", cert.not_before, cert.not_after);
            if now < cert.not_before || now > cert.not_after {
                debug!(expiry_date = %cert.not_after, "Certificate outside validity period.");
                issues.extend(issue_for("TLS_CERT_EXPIRED", Some(validity)));
            } else {
                let days_left = cert.not_after.signed_duration_since(now).num_days();
                if days_left <= self.expiry_warning_days {
                    debug!(days_left, "Certificate is expiring soon.");
                    issues.extend(issue_for(
                        "TLS_CERT_EXPIRING_SOON",
                        Some(format!("{} ({} days left)", validity, days_left)),
                    ));
                }
            }

            if cert.subject == cert.issuer {
                issues.extend(issue_for("TLS_CERT_SELF_SIGNED", Some(format!("Subject and issuer: {}", cert.subject))));
            }

            if WEAK_SIGNATURE_OIDS.contains(&cert.signature_oid.as_str()) {
                issues.extend(issue_for(
                    "TLS_WEAK_SIGNATURE",
                    Some(format!("Signature algorithm OID {}", cert.signature_oid)),
                ));
            }

            if let Some(bits) = cert.rsa_key_bits.filter(|b| *b < MIN_RSA_KEY_BITS) {
                issues.extend(issue_for("TLS_WEAK_KEY", Some(format!("RSA key of {} bits", bits))));
            }
        }

        if facts.legacy_protocol {
            issues.extend(issue_for(
                "TLS_LEGACY_PROTOCOL",
                Some("Handshake restricted to TLS 1.0/1.1 succeeded.".to_string()),
            ));
        }

        if issues.is_empty() {
            vec![Issue::no_issues()]
        } else {
            issues
        }
    }
}

#[async_trait]
impl Checker for TransportChecker {
    fn name(&self) -> &'static str {
        "transport"
    }

    fn applies_to(&self, target: &Url) -> bool {
        target.scheme() == "https"
    }

    async fn run(&self, ctx: &CheckContext) -> Result<Vec<Issue>, CheckerError> {
        if ctx.target.scheme() != "https" {
            return Err(CheckerError::UnsupportedScheme(ctx.target.scheme().to_string()));
        }
        let host = match ctx.target.host() {
            Some(Host::Domain(d)) => d.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => return Err(CheckerError::MissingHost),
        };
        let port = ctx.target.port_or_known_default().unwrap_or(443);
        info!(host = %host, port, "Starting transport check.");

        // Up to three handshakes share one budget.
        let budget = self.timeout * 3;
        let sockets = Arc::new(HandshakeSockets::new(self.timeout, budget));
        debug!("Spawning blocking task for TLS handshakes.");
        let task = spawn_blocking({
            let sockets = Arc::clone(&sockets);
            move || gather_facts(|mode| handshake(&sockets, mode, &host, port))
        });

        let facts = match tokio::time::timeout(budget, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                error!(panic = %e, "Blocking TLS task panicked!");
                return Err(CheckerError::Network(format!("handshake task failed: {}", e)));
            }
            Err(_) => {
                sockets.close_all();
                warn!(budget_secs = budget.as_secs(), "Transport check timed out, connections closed.");
                return Err(CheckerError::Timeout(budget.as_secs()));
            }
        };

        let issues = self.analyze(&facts, Utc::now());
        info!(findings = issues.iter().filter(|i| !i.is_sentinel()).count(), "Transport check finished.");
        Ok(issues)
    }
}

/// The three handshakes a check may attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeMode {
    Verified,
    Unverified,
    LegacyOnly,
}

/// What one completed handshake yielded.
#[derive(Debug, Clone, Default)]
struct Session {
    certificate_der: Option<Vec<u8>>,
}

/// `Err` is a hard failure (timeout, network). `Ok(Err(reason))` means the
/// peer refused the handshake.
type Attempt = Result<Result<Session, String>, CheckerError>;

/// OpenSSL messages for a legacy handshake the local library refuses to attempt.
const LOCAL_LEGACY_REFUSALS: &[&str] = &["no protocols available", "legacy sigalg", "unsupported protocol"];

/// Deadline and socket registry shared between the blocking task and its caller.
///
/// Each socket is registered while its handshake runs, so a caller whose
/// deadline fired can shut every open connection down from outside the
/// blocking thread.
#[derive(Debug)]
struct HandshakeSockets {
    step: Duration,
    budget: Duration,
    deadline: Instant,
    cancelled: AtomicBool,
    open: Mutex<Vec<(u64, TcpStream)>>,
    next_id: AtomicU64,
}

impl HandshakeSockets {
    fn new(step: Duration, budget: Duration) -> Self {
        Self {
            step,
            budget,
            deadline: Instant::now() + budget,
            cancelled: AtomicBool::new(false),
            open: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn budget_exceeded(&self) -> CheckerError {
        CheckerError::Timeout(self.budget.as_secs())
    }

    fn step_exceeded(&self) -> CheckerError {
        CheckerError::Timeout(self.step.as_secs())
    }

    fn is_over(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || Instant::now() >= self.deadline
    }

    /// Timeout for the next blocking step, capped by what is left of the budget.
    fn next_wait(&self) -> Result<Duration, CheckerError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(self.budget_exceeded());
        }
        match self.deadline.checked_duration_since(Instant::now()) {
            Some(left) if !left.is_zero() => Ok(left.min(self.step)),
            _ => Err(self.budget_exceeded()),
        }
    }

    fn track(&self, stream: &TcpStream) -> Result<TrackedSocket<'_>, CheckerError> {
        let handle = stream.try_clone().map_err(|e| CheckerError::Network(e.to_string()))?;
        let mut open = self
            .open
            .lock()
            .map_err(|_| CheckerError::Network("socket registry poisoned".to_string()))?;
        if self.cancelled.load(Ordering::SeqCst) {
            let _ = handle.shutdown(Shutdown::Both);
            return Err(self.budget_exceeded());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        open.push((id, handle));
        Ok(TrackedSocket { sockets: self, id })
    }

    /// Stops further connections and shuts down every registered socket.
    fn close_all(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Ok(mut open) = self.open.lock() {
            for (_, socket) in open.drain(..) {
                let _ = socket.shutdown(Shutdown::Both);
            }
        }
    }
}

/// Unregisters (and closes) the registry's handle when the handshake is done.
struct TrackedSocket<'a> {
    sockets: &'a HandshakeSockets,
    id: u64,
}

impl Drop for TrackedSocket<'_> {
    fn drop(&mut self) {
        if let Ok(mut open) = self.sockets.open.lock() {
            open.retain(|(id, _)| *id != self.id);
        }
    }
}

fn connect(sockets: &HandshakeSockets, host: &str, port: u16) -> Result<TcpStream, CheckerError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| CheckerError::Network(format!("could not resolve {}: {}", host, e)))?
        .collect();

    let mut last_error = None;
    for addr in addrs {
        let wait = sockets.next_wait()?;
        debug!(%addr, "Connecting TCP stream.");
        match TcpStream::connect_timeout(&addr, wait) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(wait))
                    .and_then(|_| stream.set_write_timeout(Some(wait)))
                    .map_err(|e| CheckerError::Network(e.to_string()))?;
                return Ok(stream);
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {
                last_error = Some(sockets.step_exceeded());
            }
            Err(e) => last_error = Some(CheckerError::Network(format!("TCP connection to {} failed: {}", addr, e))),
        }
    }
    Err(last_error.unwrap_or_else(|| CheckerError::Network(format!("no address found for {}", host))))
}

/// True when a handshake failure came from a socket read or write timing out.
fn is_io_timeout(error: &native_tls::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(e) = source {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(io.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) {
                return true;
            }
        }
        source = e.source();
    }
    false
}

fn build_connector(mode: HandshakeMode) -> Result<TlsConnector, CheckerError> {
    let mut builder = TlsConnector::builder();
    let verify = mode == HandshakeMode::Verified;
    builder
        .danger_accept_invalid_certs(!verify)
        .danger_accept_invalid_hostnames(!verify);
    if mode == HandshakeMode::LegacyOnly {
        builder
            .min_protocol_version(Some(Protocol::Tlsv10))
            .max_protocol_version(Some(Protocol::Tlsv11));
    }
    builder.build().map_err(|e| {
        error!(error = %e, ?mode, "Failed to create TlsConnector");
        CheckerError::Tls(format!("TlsConnector Error: {}", e))
    })
}

fn handshake(sockets: &HandshakeSockets, mode: HandshakeMode, host: &str, port: u16) -> Attempt {
    let connector = build_connector(mode)?;
    let stream = connect(sockets, host, port)?;
    let _tracked = sockets.track(&stream)?;
    debug!(host, ?mode, "Performing TLS handshake.");

    let tls = match connector.connect(host, stream) {
        Ok(tls) => tls,
        Err(HandshakeError::WouldBlock(_)) => return Err(sockets.step_exceeded()),
        Err(HandshakeError::Failure(e)) => {
            if sockets.is_over() {
                return Err(sockets.budget_exceeded());
            }
            if is_io_timeout(&e) {
                return Err(sockets.step_exceeded());
            }
            return Ok(Err(e.to_string()));
        }
    };

    let certificate_der = match tls.peer_certificate() {
        Ok(Some(cert)) => Some(
            cert.to_der()
                .map_err(|e| CheckerError::Parse(format!("Could not convert certificate to DER: {}", e)))?,
        ),
        Ok(None) => {
            debug!("TLS connection successful, but no peer certificate provided.");
            None
        }
        Err(e) => return Err(CheckerError::Tls(format!("Could not get peer certificate: {}", e))),
    };
    Ok(Ok(Session { certificate_der }))
}

/// Verified handshake first; on failure an unverified one so the certificate
/// can still be inspected, and when both are refused a legacy-only one. A
/// legacy-only handshake is always attempted to learn protocol support.
fn gather_facts<H>(mut handshake: H) -> Result<TransportFacts, CheckerError>
where
    H: FnMut(HandshakeMode) -> Attempt,
{
    let mut legacy_protocol = None;
    let (session, trust_error) = match handshake(HandshakeMode::Verified)? {
        Ok(session) => (session, None),
        Err(reason) => {
            warn!(error = %reason, "Verified TLS handshake failed, retrying without verification.");
            match handshake(HandshakeMode::Unverified)? {
                Ok(session) => (session, Some(reason)),
                Err(modern) => {
                    debug!(error = %modern, "Modern handshakes refused, trying legacy protocols.");
                    match handshake(HandshakeMode::LegacyOnly) {
                        Ok(Ok(session)) => {
                            legacy_protocol = Some(true);
                            (session, Some(reason))
                        }
                        Err(e @ CheckerError::Timeout(_)) => return Err(e),
                        Ok(Err(legacy)) => {
                            log_legacy_refusal(&legacy);
                            return Err(CheckerError::Tls(format!("TLS Handshake Error: {}", modern)));
                        }
                        Err(e) => {
                            warn!(error = %e, "Legacy protocol check could not run.");
                            return Err(CheckerError::Tls(format!("TLS Handshake Error: {}", modern)));
                        }
                    }
                }
            }
        }
    };

    let certificate = session.certificate_der.as_deref().map(certificate_facts).transpose()?;

    let legacy_protocol = match legacy_protocol {
        Some(supported) => supported,
        None => match handshake(HandshakeMode::LegacyOnly) {
            Ok(Ok(_)) => true,
            Ok(Err(reason)) => {
                log_legacy_refusal(&reason);
                false
            }
            Err(e @ CheckerError::Timeout(_)) => return Err(e),
            Err(e) => {
                warn!(error = %e, "Legacy protocol check could not run, support is unknown.");
                false
            }
        },
    };
    debug!(legacy_protocol, "Legacy protocol check finished.");

    Ok(TransportFacts {
        trust_error,
        certificate,
        legacy_protocol,
    })
}

fn log_legacy_refusal(reason: &str) {
    let lowered = reason.to_ascii_lowercase();
    if LOCAL_LEGACY_REFUSALS.iter().any(|m| lowered.contains(m)) {
        warn!(error = %reason, "Local TLS library refuses TLS 1.0/1.1, legacy support is unknown.");
    } else {
        debug!(error = %reason, "Server refused TLS 1.0/1.1.");
    }
}

fn certificate_facts(der: &[u8]) -> Result<CertificateFacts, CheckerError> {
    let (_, x509) = parse_x509_certificate(der).map_err(|e| {
        error!(error = %e, "Failed to parse X.509 certificate");
        CheckerError::Parse(format!("X.509 Parse Error: {}", e))
    })?;
    info!(subject = %x509.subject(), issuer = %x509.issuer(), "Successfully parsed certificate.");

    let validity = x509.validity();
    let rsa_key_bits = match x509.public_key().parsed() {
        Ok(PublicKey::RSA(rsa)) => Some(rsa.key_size()),
        _ => None,
    };

    Ok(CertificateFacts {
        subject: x509.subject().to_string(),
        issuer: x509.issuer().to_string(),
        not_before: asn1_time_to_chrono_utc(&validity.not_before),
        not_after: asn1_time_to_chrono_utc(&validity.not_after),
        signature_oid: x509.signature_algorithm.algorithm.to_id_string(),
        rsa_key_bits,
    })
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use reqwest::header::HeaderMap;

    fn checker() -> TransportChecker {
        TransportChecker::new(&EngineConfig::default())
    }

    fn good_cert(now: DateTime<Utc>) -> CertificateFacts {
        CertificateFacts {
            subject: "CN=example.com".into(),
            issuer: "CN=R3, O=Let's Encrypt".into(),
            not_before: now - ChronoDuration::days(10),
            not_after: now + ChronoDuration::days(80),
            signature_oid: "1.2.840.113549.1.1.11".into(),
            rsa_key_bits: Some(2048),
        }
    }

    fn names(issues: &[Issue]) -> Vec<&str> {
        issues.iter().filter_map(|i| i.vulnerability_name.as_deref()).collect()
    }

    #[test]
    fn clean_endpoint_yields_sentinel() {
        let now = Utc::now();
        let facts = TransportFacts {
            trust_error: None,
            certificate: Some(good_cert(now)),
            legacy_protocol: false,
        };
        let issues = checker().analyze(&facts, now);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].is_sentinel());
    }

    #[test]
    fn expired_and_expiring_are_exclusive() {
        let now = Utc::now();
        let mut cert = good_cert(now);
        cert.not_after = now - ChronoDuration::days(1);
        let facts = TransportFacts { trust_error: None, certificate: Some(cert.clone()), legacy_protocol: false };
        assert_eq!(names(&checker().analyze(&facts, now)), vec!["Expired TLS Certificate"]);

        cert.not_after = now + ChronoDuration::days(5);
        let facts = TransportFacts { certificate: Some(cert), ..facts };
        assert_eq!(names(&checker().analyze(&facts, now)), vec!["TLS Certificate Expiring Soon"]);
    }

    #[test]
    fn weak_material_and_trust_failures_are_reported() {
        let now = Utc::now();
        let mut cert = good_cert(now);
        cert.issuer = cert.subject.clone();
        cert.signature_oid = "1.2.840.113549.1.1.5".into();
        cert.rsa_key_bits = Some(1024);
        let facts = TransportFacts {
            trust_error: Some("self signed certificate".into()),
            certificate: Some(cert),
            legacy_protocol: true,
        };

        let issues = checker().analyze(&facts, now);
        assert_eq!(
            names(&issues),
            vec![
                "Untrusted TLS Certificate",
                "Self-Signed TLS Certificate",
                "Weak Certificate Signature Algorithm",
                "Weak Certificate Key",
                "Legacy TLS Protocol Supported",
            ]
        );
        assert!(issues.iter().all(|i| !i.is_sentinel()));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let ctx = CheckContext {
            target: Url::parse(&format!("https://127.0.0.1:{}/", port)).unwrap(),
            headers: HeaderMap::new(),
        };
        let err = checker().run(&ctx).await.unwrap_err();
        assert!(matches!(err, CheckerError::Network(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn non_tls_endpoint_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else { break };
                drop(socket);
            }
        });

        let ctx = CheckContext {
            target: Url::parse(&format!("https://127.0.0.1:{}/", port)).unwrap(),
            headers: HeaderMap::new(),
        };
        let err = checker().run(&ctx).await.unwrap_err();
        assert!(matches!(err, CheckerError::Tls(_)), "got {err:?}");
    }

    fn scripted(
        verified: Option<&'static str>,
        unverified: Option<&'static str>,
        legacy: Result<Option<&'static str>, &'static str>,
    ) -> impl FnMut(HandshakeMode) -> Attempt {
        move |mode| {
            let outcome = match mode {
                HandshakeMode::Verified => Ok(verified),
                HandshakeMode::Unverified => Ok(unverified),
                HandshakeMode::LegacyOnly => legacy,
            };
            match outcome {
                Ok(None) => Ok(Ok(Session::default())),
                Ok(Some(refusal)) => Ok(Err(refusal.to_string())),
                Err(hard) if hard == "timeout" => Err(CheckerError::Timeout(1)),
                Err(hard) => Err(CheckerError::Tls(hard.to_string())),
            }
        }
    }

    #[test]
    fn legacy_only_server_is_reported_not_failed() {
        let facts = gather_facts(scripted(
            Some("tlsv1 alert protocol version"),
            Some("tlsv1 alert protocol version"),
            Ok(None),
        ))
        .unwrap();
        assert!(facts.legacy_protocol);
        assert!(facts.trust_error.is_some());

        let issues = checker().analyze(&facts, Utc::now());
        assert_eq!(names(&issues), vec!["Untrusted TLS Certificate", "Legacy TLS Protocol Supported"]);
    }

    #[test]
    fn refused_everywhere_is_a_tls_error() {
        let err = gather_facts(scripted(Some("bad cert"), Some("protocol version"), Ok(Some("protocol version"))))
            .unwrap_err();
        assert!(matches!(err, CheckerError::Tls(ref m) if m.contains("protocol version")), "got {err:?}");
    }

    #[test]
    fn unavailable_legacy_handshake_does_not_fail_the_check() {
        let facts = gather_facts(scripted(None, None, Err("TlsConnector Error: unsupported"))).unwrap();
        assert!(!facts.legacy_protocol);
        assert!(facts.trust_error.is_none());

        let facts = gather_facts(scripted(None, None, Ok(Some("legacy sigalg disallowed or unsupported")))).unwrap();
        assert!(!facts.legacy_protocol);
    }

    #[test]
    fn legacy_handshake_timeout_is_propagated() {
        let err = gather_facts(scripted(None, None, Err("timeout"))).unwrap_err();
        assert!(matches!(err, CheckerError::Timeout(_)), "got {err:?}");
    }

    #[test]
    fn closed_registry_refuses_new_sockets() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let sockets = HandshakeSockets::new(Duration::from_secs(1), Duration::from_secs(3));
        {
            let _tracked = sockets.track(&stream).unwrap();
            assert_eq!(sockets.open.lock().unwrap().len(), 1);
        }
        assert!(sockets.open.lock().unwrap().is_empty());

        sockets.close_all();
        assert!(matches!(sockets.track(&stream), Err(CheckerError::Timeout(3))));
        assert!(matches!(sockets.next_wait(), Err(CheckerError::Timeout(3))));
    }

    fn short_timeout_checker() -> TransportChecker {
        TransportChecker::new(&EngineConfig {
            transport_timeout_secs: 1,
            ..EngineConfig::default()
        })
    }

    #[tokio::test]
    async fn silent_server_hits_the_io_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let ctx = CheckContext {
            target: Url::parse(&format!("https://127.0.0.1:{}/", port)).unwrap(),
            headers: HeaderMap::new(),
        };
        let started = Instant::now();
        let err = short_timeout_checker().run(&ctx).await.unwrap_err();
        assert!(matches!(err, CheckerError::Timeout(_)), "got {err:?}");
        assert!(started.elapsed() < Duration::from_millis(3500), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn trickling_server_is_cut_off_and_disconnected() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (closed_tx, closed_rx) = tokio::sync::oneshot::channel::<Instant>();
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else { return };
            let (mut rd, mut wr) = socket.split();
            // Handshake record header announcing 16 KiB, then one byte at a time.
            if wr.write_all(&[0x16, 0x03, 0x01, 0x40, 0x00]).await.is_err() {
                return;
            }
            let mut buf = [0u8; 4096];
            loop {
                tokio::select! {
                    read = rd.read(&mut buf) => match read {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {}
                    },
                    _ = tokio::time::sleep(Duration::from_millis(300)) => {
                        if wr.write_all(&[0x02]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            let _ = closed_tx.send(Instant::now());
        });

        let ctx = CheckContext {
            target: Url::parse(&format!("https://127.0.0.1:{}/", port)).unwrap(),
            headers: HeaderMap::new(),
        };
        let started = Instant::now();
        let err = short_timeout_checker().run(&ctx).await.unwrap_err();
        assert!(matches!(err, CheckerError::Timeout(3)), "got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(4), "took {:?}", started.elapsed());

        let closed = tokio::time::timeout(Duration::from_secs(2), closed_rx).await;
        assert!(matches!(closed, Ok(Ok(_))), "connection still open after the check returned");
    }

    #[tokio::test]
    async fn http_targets_are_rejected() {
        let ctx = CheckContext {
            target: Url::parse("http://example.com").unwrap(),
            headers: HeaderMap::new(),
        };
        assert!(!checker().applies_to(&ctx.target));
        assert!(matches!(checker().run(&ctx).await, Err(CheckerError::UnsupportedScheme(_))));
    }
}
