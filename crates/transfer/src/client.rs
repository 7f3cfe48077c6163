//! Single-attempt HTTP transport.
//!
//! Async HTTP client using `reqwest` multipart forms. Retries live in
//! [`RetryingClient`](crate::RetryingClient); this layer only maps one POST to
//! a status code or a connection failure.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::TransferError;
use crate::types::MultipartRequest;

/// Boxed future returned by [`Transport`] and [`Sleeper`](crate::Sleeper).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Sends one multipart request.
///
/// Returns the HTTP status code of whatever the remote answered, or
/// [`TransferError::Connection`] if no answer arrived. Kept as a trait so the
/// upload engine can be exercised with scripted mocks.
pub trait Transport: Send + Sync {
    fn send<'a>(&'a self, request: &'a MultipartRequest) -> BoxFuture<'a, Result<u16, TransferError>>;
}

/// `reqwest`-backed transport rooted at the backup API endpoint.
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport for `base_url` (e.g. `https://api.example.com`).
    pub fn new(base_url: &str) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_form(request: &MultipartRequest) -> Form {
        let mut form = Form::new();
        for (name, value) in &request.fields {
            form = form.text(*name, value.clone());
        }
        let part = Part::bytes(request.part.data.clone()).file_name(request.part.file_name.clone());
        form.part(request.part.field, part)
    }
}

impl Transport for HttpTransport {
    fn send<'a>(&'a self, request: &'a MultipartRequest) -> BoxFuture<'a, Result<u16, TransferError>> {
        Box::pin(async move {
            let url = format!("{}{}", self.base_url, request.endpoint.path());
            let resp = self
                .http
                .post(&url)
                .multipart(Self::build_form(request))
                .send()
                .await
                .map_err(|e| TransferError::Connection(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                debug!(url = %url, status = status.as_u16(), body = %body, "request rejected");
            }
            Ok(status.as_u16())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Endpoint;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Starts a one-shot mock HTTP server answering with `status`.
    ///
    /// The join handle yields the raw request bytes it received.
    async fn mock_server(status: u16) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = vec![0u8; 8192];
            // Read until the closing multipart boundary (or a chunked body end).
            loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request.ends_with(b"--\r\n") || request.ends_with(b"0\r\n\r\n") {
                    break;
                }
            }

            let body = "{}";
            let resp = format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            request
        });

        (url, handle)
    }

    #[tokio::test]
    async fn posts_multipart_fields_and_file() {
        let (url, handle) = mock_server(200).await;
        let transport = HttpTransport::new(&url).unwrap();

        let req = MultipartRequest::upload("bkp_abc", "IMG_000001.jpg", b"JPEGDATA".to_vec());
        let status = transport.send(&req).await.unwrap();
        assert_eq!(status, 200);

        let raw = String::from_utf8_lossy(&handle.await.unwrap()).into_owned();
        assert!(raw.starts_with("POST /api/upload HTTP/1.1"));
        assert!(raw.contains("name=\"backup_id\"\r\n\r\nbkp_abc"));
        assert!(raw.contains("name=\"backup_name\"\r\n\r\nIMG_000001.jpg"));
        assert!(raw.contains("name=\"file\"; filename=\"IMG_000001.jpg\""));
        assert!(raw.contains("JPEGDATA"));
    }

    #[tokio::test]
    async fn returns_error_status_without_failing() {
        let (url, _handle) = mock_server(503).await;
        let transport = HttpTransport::new(&url).unwrap();

        let req = MultipartRequest::manifest("bkp_abc", "state.db", vec![1, 2, 3]);
        assert_eq!(req.endpoint, Endpoint::Manifest);
        assert_eq!(transport.send(&req).await.unwrap(), 503);
    }

    #[tokio::test]
    async fn refused_connection_is_connection_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new(&format!("http://127.0.0.1:{port}")).unwrap();
        let req = MultipartRequest::upload("bkp_abc", "IMG_000001.jpg", vec![0]);
        let err = transport.send(&req).await.unwrap_err();
        assert!(err.is_connection(), "unexpected error: {err}");
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let transport = HttpTransport::new("http://localhost:9000/").unwrap();
        assert_eq!(transport.base_url(), "http://localhost:9000");
    }
}
