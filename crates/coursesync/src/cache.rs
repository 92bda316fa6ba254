//! Invalidation of the read API's cached catalog views.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Cache key of the "all courses" view.
pub const COURSES_KEY: &str = "/courses";

/// Cache key of the "all sections" view.
pub const SECTIONS_KEY: &str = "/sections";

/// Errors raised while asking the read API to drop a cached view.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvictError {
    #[error("Cache invalidation request for '{key}' failed: {message}")]
    Request { key: String, message: String },

    #[error("Cache invalidation for '{key}' returned status {status}")]
    Status { key: String, status: u16 },

    #[error("Invalid cache invalidation URL: {message}")]
    InvalidUrl { message: String },
}

/// Something that can drop a cached response by key.
#[async_trait]
pub trait CacheEvictor: Send + Sync {
    async fn evict(&self, key: &str) -> Result<(), EvictError>;
}

/// Where the read API accepts invalidation requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Receives `DELETE <invalidate_url>?key=<cache key>`
    pub invalidate_url: String,
    pub timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            invalidate_url: "http://127.0.0.1:3000/cache".to_string(),
            timeout_secs: 5,
        }
    }
}

/// Evicts keys by calling the read API's invalidation endpoint.
pub struct HttpCacheEvictor {
    client: Client,
    endpoint: Url,
}

impl HttpCacheEvictor {
    pub fn with_config(config: &CacheConfig) -> Result<Self, EvictError> {
        let endpoint = Url::parse(&config.invalidate_url).map_err(|e| EvictError::InvalidUrl {
            message: format!("{}: {e}", config.invalidate_url),
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EvictError::Request {
                key: String::new(),
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client, endpoint })
    }

    fn key_url(&self, key: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("key", key);
        url
    }
}

#[async_trait]
impl CacheEvictor for HttpCacheEvictor {
    async fn evict(&self, key: &str) -> Result<(), EvictError> {
        let url = self.key_url(key);
        let response = self
            .client
            .delete(url.clone())
            .send()
            .await
            .map_err(|e| EvictError::Request {
                key: key.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EvictError::Status {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }

        debug!(key = %key, url = %url, "Evicted cached view");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accepts `requests` connections, answers each with `status`, and
    /// returns the request lines it saw.
    async fn serve(status: &'static str, requests: usize) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let mut lines = Vec::new();
            for _ in 0..requests {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let request = String::from_utf8_lossy(&buf).to_string();
                lines.push(request.lines().next().unwrap_or_default().to_string());

                let response =
                    format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
            lines
        });

        (format!("http://{addr}/cache"), handle)
    }

    fn evictor(url: String) -> HttpCacheEvictor {
        HttpCacheEvictor::with_config(&CacheConfig {
            invalidate_url: url,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_evict_sends_each_key_to_endpoint() {
        let (url, server) = serve("204 No Content", 2).await;
        let evictor = evictor(url);

        evictor.evict(COURSES_KEY).await.unwrap();
        evictor.evict(SECTIONS_KEY).await.unwrap();

        assert_eq!(
            server.await.unwrap(),
            vec![
                "DELETE /cache?key=%2Fcourses HTTP/1.1",
                "DELETE /cache?key=%2Fsections HTTP/1.1"
            ]
        );
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let (url, server) = serve("500 Internal Server Error", 1).await;

        let err = evictor(url).evict(COURSES_KEY).await.unwrap_err();

        assert_eq!(
            err,
            EvictError::Status {
                key: COURSES_KEY.to_string(),
                status: 500
            }
        );
        server.await.unwrap();
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result = HttpCacheEvictor::with_config(&CacheConfig {
            invalidate_url: "not a url".to_string(),
            timeout_secs: 5,
        });
        assert!(matches!(result, Err(EvictError::InvalidUrl { .. })));
    }
}
