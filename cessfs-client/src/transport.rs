//! Miner fragment transport
//!
//! HTTP client for the storage miner fragment endpoint:
//! - `PUT <endpoint>/fragment` with a multipart `file` field named by the fragment hash
//! - `GET <endpoint>/fragment` with a `Fragment` header naming the hash
//!
//! Every request carries `Fid`, `Account`, `Message` and `Signature` headers.
//! `Message` is a fresh random nonce and `Signature` its base58 sr25519
//! signature.

use crate::keyring::Keyring;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const HEADER_FID: &str = "Fid";
pub const HEADER_ACCOUNT: &str = "Account";
pub const HEADER_MESSAGE: &str = "Message";
pub const HEADER_SIGNATURE: &str = "Signature";
pub const HEADER_FRAGMENT: &str = "Fragment";

/// Multipart field carrying the fragment bytes
pub const FORM_FIELD: &str = "file";

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Miner returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Malformed miner response: {0}")]
    Malformed(String),

    #[error("Miner rejected request: {0}")]
    Rejected(String),

    #[error("Miner response exceeds {limit} bytes")]
    TooLarge { limit: usize },
}

/// Moves fragments to and from miners
#[async_trait::async_trait]
pub trait MinerTransport: Send + Sync {
    /// Store one fragment on the miner at `endpoint`
    async fn put_fragment(
        &self,
        endpoint: &str,
        fid: &str,
        fragment_hash: &str,
        data: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Fetch one fragment from the miner at `endpoint`, refusing bodies
    /// longer than `max_len`
    async fn get_fragment(
        &self,
        endpoint: &str,
        fid: &str,
        fragment_hash: &str,
        max_len: usize,
    ) -> Result<Vec<u8>, TransportError>;
}

/// Signed HTTP transport
pub struct HttpMinerTransport {
    client: Client,
    keyring: Arc<Keyring>,
}

impl HttpMinerTransport {
    /// Create a transport whose requests time out after `timeout`
    pub fn new(keyring: Arc<Keyring>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, keyring })
    }

    fn fragment_url(endpoint: &str) -> String {
        let base = endpoint.trim_end_matches('/');
        if base.starts_with("http://") || base.starts_with("https://") {
            format!("{}/fragment", base)
        } else {
            format!("http://{}/fragment", base)
        }
    }

    fn signed(&self, request: RequestBuilder, fid: &str) -> RequestBuilder {
        let nonce = self.keyring.signed_nonce();
        request
            .header(HEADER_FID, fid)
            .header(HEADER_ACCOUNT, self.keyring.account())
            .header(HEADER_MESSAGE, nonce.message)
            .header(HEADER_SIGNATURE, nonce.signature)
    }
}

#[async_trait::async_trait]
impl MinerTransport for HttpMinerTransport {
    async fn put_fragment(
        &self,
        endpoint: &str,
        fid: &str,
        fragment_hash: &str,
        data: Vec<u8>,
    ) -> Result<(), TransportError> {
        let url = Self::fragment_url(endpoint);
        let size = data.len();
        let form = Form::new().part(
            FORM_FIELD,
            Part::bytes(data).file_name(fragment_hash.to_string()),
        );

        let response = self
            .signed(self.client.put(&url), fid)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status != StatusCode::OK {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: body,
            });
        }
        check_put_response(&body)?;

        debug!(url = %url, fragment = %fragment_hash, size, "Fragment uploaded");
        Ok(())
    }

    async fn get_fragment(
        &self,
        endpoint: &str,
        fid: &str,
        fragment_hash: &str,
        max_len: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let url = Self::fragment_url(endpoint);
        let mut response = self
            .signed(self.client.get(&url), fid)
            .header(HEADER_FRAGMENT, fragment_hash)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        if response
            .content_length()
            .is_some_and(|len| len > max_len as u64)
        {
            return Err(TransportError::TooLarge { limit: max_len });
        }

        // Content-Length may be absent or wrong; cap what is actually read
        let mut data = Vec::with_capacity(max_len);
        while let Some(chunk) = response.chunk().await? {
            if data.len() + chunk.len() > max_len {
                return Err(TransportError::TooLarge { limit: max_len });
            }
            data.extend_from_slice(&chunk);
        }
        debug!(url = %url, fragment = %fragment_hash, size = data.len(), "Fragment downloaded");
        Ok(data)
    }
}

/// Accept an empty body or a JSON body; a JSON `code` other than 200 is a rejection
fn check_put_response(body: &str) -> Result<(), TransportError> {
    let body = body.trim();
    if body.is_empty() {
        return Ok(());
    }
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| TransportError::Malformed(e.to_string()))?;
    if let Some(code) = value.get("code").and_then(|c| c.as_u64()) {
        if code != 200 {
            let msg = value
                .get("msg")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string();
            return Err(TransportError::Rejected(format!("code {}: {}", code, msg)));
        }
    }
    Ok(())
}
