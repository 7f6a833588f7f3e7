//! Network transport used to deliver records
//!
//! The sync engine only needs one operation, an HTTP GET that reports the
//! status code, headers and body. [`HttpTransport`] implements it with
//! reqwest; tests supply scripted transports.

use std::time::Duration;

use thiserror::Error;

use crate::config::EndpointConfig;
use crate::error::{Error, Result};

/// A fully read HTTP response.
///
/// The underlying connection has already been released by the time a
/// `Response` exists; dropping it frees nothing but memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header (builder style)
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// True for the redirect statuses that carry a `Location` target
    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }
}

/// Failure to obtain a response at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_body() || e.is_decode() {
            TransportError::Malformed(e.to_string())
        } else {
            TransportError::Connect(e.to_string())
        }
    }
}

/// Performs HTTP GET requests.
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn get(&self, url: &str) -> std::result::Result<Response, TransportError>;
}

/// reqwest-backed transport.
///
/// Automatic redirects are disabled: the sync engine follows at most one hop
/// itself.
pub struct HttpTransport {
    http_client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    pub fn from_config(config: &EndpointConfig) -> Result<Self> {
        Self::new(config.timeout())
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> std::result::Result<Response, TransportError> {
        let response = self.http_client.get(url).send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        // Reading the body to the end hands the connection back to the pool.
        let body = response.text().await?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(raw: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut read = 0;
            while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf[read..]).await.unwrap();
                if n == 0 {
                    break;
                }
                read += n;
            }
            socket.write_all(raw.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}/exec", addr)
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = Response::new(302, "").with_header("location", "https://example.com/next");
        assert_eq!(response.header("Location"), Some("https://example.com/next"));
        assert_eq!(response.header("LOCATION"), Some("https://example.com/next"));
        assert!(response.header("Content-Type").is_none());
        assert!(response.is_redirect());
        assert!(!Response::new(200, "").is_redirect());
    }

    #[tokio::test]
    async fn test_http_transport_reads_body() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 7\r\nConnection: close\r\n\r\nSuccess",
        )
        .await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let response = transport.get(&url).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "Success");
    }

    #[tokio::test]
    async fn test_http_transport_does_not_follow_redirects() {
        let url = serve_once(
            "HTTP/1.1 302 Found\r\nLocation: /elsewhere\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

        let response = transport.get(&url).await.unwrap();
        assert_eq!(response.status, 302);
        assert_eq!(response.header("Location"), Some("/elsewhere"));
    }

    #[tokio::test]
    async fn test_http_transport_connection_refused() {
        // Bind then drop to get a port with nothing listening.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
        let err = transport.get(&format!("http://{}/exec", addr)).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
