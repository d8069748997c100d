use crate::dns::ScatterDns;
use async_trait::async_trait;
use bytes::Bytes;
use coskit_core::{Error, FileRead, HttpSend, Result};
use std::sync::Arc;

/// FileRead backed by tokio's filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFileRead;

#[async_trait]
impl FileRead for TokioFileRead {
    async fn file_read(&self, path: &str) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }
}

/// HttpSend backed by a `reqwest::Client`.
#[derive(Debug, Default)]
pub struct ReqwestHttpSend {
    client: reqwest::Client,
}

impl ReqwestHttpSend {
    /// Create a new ReqwestHttpSend around an existing `reqwest::Client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Create a client whose resolver scatters internal-network hostnames
    /// across all their resolved addresses.
    pub fn with_dns_scatter() -> Result<Self> {
        let client = reqwest::Client::builder()
            .dns_resolver(Arc::new(ScatterDns))
            .build()
            .map_err(|e| Error::unexpected("failed to build HTTP client").with_source(e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpSend for ReqwestHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let req = reqwest::Request::try_from(req)
            .map_err(|e| Error::request_invalid("failed to build outgoing request").with_source(e))?;

        let resp = self
            .client
            .execute(req)
            .await
            .map_err(|e| Error::unexpected(format!("request failed: {e}")).with_source(e))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::unexpected("failed to read response body").with_source(e))?;

        let mut builder = http::Response::builder().status(status);
        if let Some(h) = builder.headers_mut() {
            *h = headers;
        }
        Ok(builder.body(body)?)
    }
}
