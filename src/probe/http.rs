//! HTTP fetcher backed by reqwest.

use std::time::Duration;

use super::{truncate_bytes, Fetcher, ProbeError, RawResponse, MAX_BODY_BYTES};

/// Real network transport.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("downtally/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Config(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<RawResponse, ProbeError> {
        let mut response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else {
                    ProbeError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        // Once the status is in hand the response counts; a broken body only
        // shortens what we keep.
        let mut body: Vec<u8> = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let room = MAX_BODY_BYTES - body.len();
                    body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                    if body.len() >= MAX_BODY_BYTES {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("Body read from {} failed after {} bytes: {}", url, body.len(), e);
                    break;
                }
            }
        }

        let body = String::from_utf8_lossy(&body);
        Ok(RawResponse::new(status, truncate_bytes(&body, MAX_BODY_BYTES)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one connection with `head` followed by `body`, then hang up.
    async fn serve_once(head: String, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(&body).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}/", addr)
    }

    fn local_fetcher() -> HttpFetcher {
        HttpFetcher {
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_http_fetch_invalid_address() {
        let fetcher = HttpFetcher::new().unwrap();
        let result = fetcher
            .fetch("http://256.256.256.256", Duration::from_millis(100))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cut_off_body_keeps_status() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n".to_string(),
            b"partial".to_vec(),
        )
        .await;

        let fetcher = local_fetcher();
        let resp = fetcher.fetch(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(resp.status, Some(503));
        assert!(!resp.ok);
        assert!("partial".starts_with(&resp.body), "unexpected body {:?}", resp.body);
        assert!(resp.is_usable());
    }

    #[tokio::test]
    async fn test_large_body_is_bounded() {
        let size = MAX_BODY_BYTES * 3;
        let url = serve_once(
            format!("HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n", size),
            vec![b'a'; size],
        )
        .await;

        let fetcher = local_fetcher();
        let resp = fetcher.fetch(&url, Duration::from_secs(5)).await.unwrap();
        assert_eq!(resp.status, Some(200));
        assert_eq!(resp.body.len(), MAX_BODY_BYTES);
    }
}
