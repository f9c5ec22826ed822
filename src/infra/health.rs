use std::time::Duration;

use anyhow::{Context, Error};
use async_trait::async_trait;
use log::{info, warn};
use tokio::time::sleep;

use crate::config::HealthConfig;
use crate::domain::port::HealthChecker;

/// Polls a liveness endpoint after a replacement starts: one warmup delay,
/// then bounded GET attempts with backoff. Only HTTP 200 counts as healthy.
pub struct HttpHealthChecker {
    client: reqwest::Client,
    attempts: u32,
    warmup: Duration,
    backoff: Duration,
}

impl HttpHealthChecker {
    pub fn new(config: &HealthConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("building health-check HTTP client")?;
        Ok(HttpHealthChecker {
            client,
            attempts: config.attempts.max(1),
            warmup: Duration::from_secs(config.warmup_secs),
            backoff: Duration::from_secs(config.backoff_secs),
        })
    }
}

#[async_trait]
impl HealthChecker for HttpHealthChecker {
    async fn check(&self, url: &str) -> bool {
        if url.is_empty() {
            return true;
        }
        // Give the process a moment to bind before the first probe.
        sleep(self.warmup).await;
        for attempt in 1..=self.attempts {
            match self.client.get(url).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::OK => {
                    info!("Health probe of {} succeeded on attempt {}", url, attempt);
                    return true;
                }
                Ok(response) => warn!(
                    "Health probe {}/{} of {} returned {}",
                    attempt,
                    self.attempts,
                    url,
                    response.status()
                ),
                Err(e) => warn!(
                    "Health probe {}/{} of {} failed: {}",
                    attempt, self.attempts, url, e
                ),
            }
            if attempt < self.attempts {
                sleep(self.backoff).await;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Minimal HTTP stub: answers every connection with the status line for
    /// the next entry of `statuses` (the last entry repeats) and counts
    /// requests served.
    async fn stub_server(statuses: Vec<&'static str>, hits: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/health", listener.local_addr().unwrap());
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { return };
                let served = hits.fetch_add(1, Ordering::SeqCst);
                let status = statuses[served.min(statuses.len() - 1)];
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });
        url
    }

    fn instant_checker(attempts: u32) -> HttpHealthChecker {
        HttpHealthChecker {
            client: reqwest::Client::new(),
            attempts,
            warmup: Duration::ZERO,
            backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn persistent_503_exhausts_exactly_three_attempts() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = stub_server(vec!["503 Service Unavailable"], Arc::clone(&hits)).await;

        assert!(!instant_checker(3).check(&url).await);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn first_200_short_circuits() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = stub_server(vec!["200 OK"], Arc::clone(&hits)).await;

        assert!(instant_checker(3).check(&url).await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_before_attempts_are_exhausted() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = stub_server(
            vec!["503 Service Unavailable", "200 OK"],
            Arc::clone(&hits),
        )
        .await;

        assert!(instant_checker(3).check(&url).await);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_200_success_statuses_are_not_healthy() {
        let hits = Arc::new(AtomicUsize::new(0));
        let url = stub_server(vec!["301 Moved Permanently"], Arc::clone(&hits)).await;

        // Redirect without a Location target ends as non-200.
        assert!(!instant_checker(1).check(&url).await);
    }

    #[tokio::test]
    async fn empty_url_is_trivially_healthy() {
        assert!(instant_checker(3).check("").await);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unhealthy() {
        // Nothing listens here; connection is refused immediately.
        assert!(!instant_checker(2).check("http://127.0.0.1:1/health").await);
    }
}
