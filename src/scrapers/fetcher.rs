use crate::config::HttpConfig;
use crate::errors::{DataHubError, Result};
use crate::scrapers::base::PageFetcher;
use async_trait::async_trait;
use log::{info, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::{Duration, SystemTime};
use tokio::time::sleep;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_LANG: &str = "en-US,en;q=0.9";

/// Upper bound for any single wait between attempts
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Pooled HTTP client with browser-like headers and bounded retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
    backoff: Duration,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(ACCEPT_LANG));

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .build()?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            backoff: config.backoff,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let mut attempt: u32 = 0;

        loop {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body = resp.text().await?;
                        info!("Fetched {} OK - {} chars", url, body.len());
                        return Ok(body);
                    }

                    if !is_retryable_status(status) || attempt >= self.max_retries {
                        return Err(DataHubError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }

                    attempt += 1;
                    let delay = retry_after(resp.headers(), SystemTime::now())
                        .map(|d| d.min(MAX_BACKOFF))
                        .unwrap_or_else(|| backoff_delay(self.backoff, attempt));
                    warn!(
                        "{} returned {}, retry {}/{} in {:.1}s",
                        url,
                        status.as_u16(),
                        attempt,
                        self.max_retries,
                        delay.as_secs_f64()
                    );
                    sleep(delay).await;
                }
                Err(e) if (e.is_timeout() || e.is_connect()) && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = backoff_delay(self.backoff, attempt);
                    warn!(
                        "Request to {} failed ({}), retry {}/{} in {:.1}s",
                        url,
                        e,
                        attempt,
                        self.max_retries,
                        delay.as_secs_f64()
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(DataHubError::RequestError(e)),
            }
        }
    }
}

pub fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 500 | 502 | 503 | 504)
}

/// `base * 2^(attempt-1)` for the 1-based retry `attempt`, capped at 60s.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// Wait requested by a `Retry-After` header, as delta-seconds or an HTTP-date.
pub fn retry_after(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = httpdate::parse_http_date(raw).ok()?;
    Some(at.duration_since(now).unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn retryable_statuses() {
        for code in [500u16, 502, 503, 504] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200u16, 404, 429, 501] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 40), MAX_BACKOFF);
    }

    #[test]
    fn retry_after_seconds_and_http_date() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after(&headers, now), Some(Duration::from_secs(7)));

        let later = httpdate::fmt_http_date(now + Duration::from_secs(12));
        headers.insert(RETRY_AFTER, HeaderValue::from_str(&later).unwrap());
        assert_eq!(retry_after(&headers, now), Some(Duration::from_secs(12)));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after(&headers, now), None);
        assert_eq!(retry_after(&HeaderMap::new(), now), None);
    }

    /// Serves each canned response to one connection, in order.
    async fn serve(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/market-watch", addr)
    }

    /// Accepts connections and never answers; counts the connections.
    async fn stall() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });
        (format!("http://{}/market-watch", addr), accepted)
    }

    fn response(status: &str, body: &str) -> String {
        response_with(status, "", body)
    }

    fn response_with(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
            status,
            body.len(),
            extra_headers,
            body
        )
    }

    fn fast_config(max_retries: u32) -> HttpConfig {
        HttpConfig {
            timeout: Duration::from_secs(5),
            max_retries,
            backoff: Duration::from_millis(1),
            pool_max_idle_per_host: 4,
        }
    }

    #[tokio::test]
    async fn retries_server_errors_then_succeeds() {
        let url = serve(vec![
            response("503 Service Unavailable", ""),
            response("502 Bad Gateway", ""),
            response("200 OK", "<table></table>"),
        ])
        .await;

        let fetcher = HttpFetcher::new(&fast_config(3)).unwrap();
        let body = fetcher.fetch_page(&url).await.unwrap();
        assert_eq!(body, "<table></table>");
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let url = serve(vec![
            response("500 Internal Server Error", ""),
            response("500 Internal Server Error", ""),
        ])
        .await;

        let fetcher = HttpFetcher::new(&fast_config(1)).unwrap();
        let err = fetcher.fetch_page(&url).await.unwrap_err();
        assert!(matches!(err, DataHubError::HttpStatus { status: 500, .. }));
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let url = serve(vec![response("404 Not Found", "")]).await;

        let fetcher = HttpFetcher::new(&fast_config(3)).unwrap();
        let err = fetcher.fetch_page(&url).await.unwrap_err();
        assert!(matches!(err, DataHubError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn timeouts_are_retried_then_reported_as_transport() {
        let (url, accepted) = stall().await;
        let config = HttpConfig {
            timeout: Duration::from_millis(200),
            ..fast_config(1)
        };

        let fetcher = HttpFetcher::new(&config).unwrap();
        let err = fetcher.fetch_page(&url).await.unwrap_err();
        match &err {
            DataHubError::RequestError(e) => assert!(e.is_timeout(), "{}", e),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.is_transport());
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_after_replaces_backoff() {
        let url = serve(vec![
            response_with("503 Service Unavailable", "Retry-After: 0\r\n", ""),
            response("200 OK", "<table></table>"),
        ])
        .await;
        // a 30s backoff would outlast the deadline below
        let config = HttpConfig {
            backoff: Duration::from_secs(30),
            ..fast_config(2)
        };

        let fetcher = HttpFetcher::new(&config).unwrap();
        let body = tokio::time::timeout(Duration::from_secs(5), fetcher.fetch_page(&url))
            .await
            .expect("Retry-After was not honoured")
            .unwrap();
        assert_eq!(body, "<table></table>");
    }
}
