// src/core/fetcher.rs

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::EngineConfig;
use crate::error::FetchError;

/// Retrieves the response headers the header checker inspects.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `target`, giving up after `timeout`. Redirects count toward
    /// the same deadline.
    async fn fetch(&self, target: &Url, timeout: Duration) -> Result<HeaderMap, FetchError>;
}

/// `reqwest`-backed fetcher with a bounded redirect chain.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &EngineConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(Policy::limited(config.max_redirects))
            .connect_timeout(config.fetch_timeout())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, target: &Url, timeout: Duration) -> Result<HeaderMap, FetchError> {
        info!(target = %target, "Fetching response headers.");

        let request = self.client.get(target.clone()).timeout(timeout).send();
        // The outer deadline also covers a server that trickles the response head.
        let response = match tokio::time::timeout(timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if e.is_timeout() => {
                warn!(target = %target, "Header fetch timed out.");
                return Err(FetchError::Timeout(timeout.as_secs()));
            }
            Ok(Err(e)) if e.is_redirect() => {
                warn!(target = %target, error = %e, "Redirect limit exceeded.");
                return Err(FetchError::TooManyRedirects);
            }
            Ok(Err(e)) => {
                warn!(target = %target, error = %e, "Header fetch failed.");
                return Err(FetchError::Request(e));
            }
            Err(_) => {
                warn!(target = %target, "Header fetch timed out.");
                return Err(FetchError::Timeout(timeout.as_secs()));
            }
        };

        debug!(status = %response.status(), final_url = %response.url(), "Received HTTP response.");
        // Only the head is needed; dropping the response releases the connection.
        Ok(response.headers().clone())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves `response` verbatim to every connection, returning the base URL.
    pub(crate) async fn serve(response: &'static str) -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    fn fetcher(max_redirects: usize) -> HttpFetcher {
        let config = EngineConfig {
            max_redirects,
            ..EngineConfig::default()
        };
        HttpFetcher::new(&config).unwrap()
    }

    #[tokio::test]
    async fn returns_response_headers() {
        let url = serve(
            "HTTP/1.1 200 OK\r\nContent-Length: 0\r\nX-Frame-Options: DENY\r\nServer: nginx/1.18.0\r\n\r\n",
        )
        .await;

        let headers = fetcher(5).fetch(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get("server").unwrap(), "nginx/1.18.0");
    }

    #[tokio::test]
    async fn times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let url = Url::parse(&format!("http://{}/", addr)).unwrap();

        let err = fetcher(5).fetch(&url, Duration::from_millis(300)).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn stops_redirect_loops() {
        let url = serve("HTTP/1.1 302 Found\r\nLocation: /again\r\nContent-Length: 0\r\n\r\n").await;

        let err = fetcher(2).fetch(&url, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, FetchError::TooManyRedirects), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_target_is_request_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let url = Url::parse(&format!("http://{}/", addr)).unwrap();

        let err = fetcher(5).fetch(&url, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, FetchError::Request(_)), "got {err:?}");
    }
}
