use std::time::Duration;

use docforge_core::document::DocumentModel;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_PDF_ENDPOINT: &str = "http://localhost:3000/api/pdf";
pub const DEFAULT_PDF_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("PDF service responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct PdfRequest<'a> {
    document: &'a DocumentModel,
}

/// PDF 生成服务客户端。文档中的图表与 Logo 应已内联为 data URL。
#[derive(Debug, Clone)]
pub struct PdfClient {
    http: reqwest::Client,
    endpoint: String,
}

impl PdfClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, PdfError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    #[inline]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 提交文档并返回生成的 PDF 字节。
    pub async fn generate(&self, document: &DocumentModel) -> Result<Vec<u8>, PdfError> {
        let body = request_body(document)?;
        debug!(endpoint = %self.endpoint, bytes = body.len(), "提交 PDF 生成请求");

        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PdfError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let pdf = response.bytes().await?.to_vec();
        info!(document_id = %document.id, bytes = pdf.len(), "PDF 已生成");
        Ok(pdf)
    }
}

fn request_body(document: &DocumentModel) -> Result<Vec<u8>, PdfError> {
    Ok(serde_json::to_vec(&PdfRequest { document })?)
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    use super::*;

    const IO_DEADLINE: Duration = Duration::from_secs(5);
    const MAX_REQUEST: usize = 1 << 20;

    /// 读取一个完整的 HTTP 请求并返回请求体；连接提前关闭时返回空体。
    async fn read_body(socket: &mut TcpStream) -> Vec<u8> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            assert!(buffer.len() <= MAX_REQUEST, "request exceeds {MAX_REQUEST} bytes");
            let read = socket.read(&mut chunk).await.expect("read request");
            if read == 0 {
                return Vec::new();
            }
            buffer.extend_from_slice(&chunk[..read]);
            let Some(header_end) = find(&buffer, b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buffer[..header_end]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let start = header_end + 4;
            if buffer.len() >= start + length {
                return buffer[start..start + length].to_vec();
            }
        }
    }

    /// 接受一个连接，返回固定响应，并把请求体交给测试。每一步都有超时。
    async fn serve_once(
        listener: TcpListener,
        status_line: &'static str,
        payload: &'static [u8],
        captured: oneshot::Sender<Vec<u8>>,
    ) {
        let (mut socket, _) = tokio::time::timeout(IO_DEADLINE, listener.accept())
            .await
            .expect("no connection within deadline")
            .expect("accept");
        let body = tokio::time::timeout(IO_DEADLINE, read_body(&mut socket))
            .await
            .expect("request not complete within deadline");
        let _ = captured.send(body);

        let response = format!(
            "{status_line}\r\nContent-Type: application/pdf\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            payload.len()
        );
        socket.write_all(response.as_bytes()).await.expect("write head");
        socket.write_all(payload).await.expect("write body");
        socket.shutdown().await.ok();
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    #[tokio::test]
    async fn posts_document_and_returns_pdf_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, rx) = oneshot::channel();
        let server = tokio::spawn(serve_once(listener, "HTTP/1.1 200 OK", b"%PDF-1.7", tx));

        let client = PdfClient::new(format!("http://{addr}/api/pdf"), Duration::from_secs(5))
            .expect("client");
        let document = DocumentModel::new("doc-1", "Report");
        let pdf = client.generate(&document).await.expect("generate");
        assert_eq!(pdf, b"%PDF-1.7");

        let body: serde_json::Value =
            serde_json::from_slice(&rx.await.expect("request body")).expect("json body");
        assert_eq!(body["document"]["id"], "doc-1");
        server.await.expect("server task");
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (tx, _rx) = oneshot::channel();
        let server = tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 500 Internal Server Error",
            b"renderer crashed",
            tx,
        ));

        let client = PdfClient::new(format!("http://{addr}/api/pdf"), Duration::from_secs(5))
            .expect("client");
        let err = client
            .generate(&DocumentModel::new("doc", "Doc"))
            .await
            .unwrap_err();
        match err {
            PdfError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "renderer crashed");
            }
            other => panic!("unexpected error {other:?}"),
        }
        server.await.expect("server task");
    }
}
