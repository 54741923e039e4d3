//! # HTTP Encrypted Store Client
//!
//! Talks to a Tessera-style private transaction manager over REST.
//!
//! | Call | Request | Response |
//! |------|---------|----------|
//! | `send` | `POST /send {payload, from, to}` | `{key}` |
//! | `receive` | `GET /transaction/{key}` | `{payload}`, 404 when absent |
//! | `is_sender` | `GET /transaction/{key}/isSender` | `true` / `false` |
//! | `participants` | `GET /transaction/{key}/participants` | comma-separated keys |
//! | `upcheck` | `GET /upcheck` | any 2xx |

use crate::domain::{EncryptedPayloadHash, ExtensionError};
use crate::ports::EncryptedStore;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct SendRequest<'a> {
    payload: String,
    #[serde(skip_serializing_if = "str::is_empty")]
    from: &'a str,
    to: &'a [String],
}

#[derive(Deserialize)]
struct SendResponse {
    key: String,
}

#[derive(Deserialize)]
struct ReceiveResponse {
    payload: String,
}

/// Encrypted store reached over HTTP.
pub struct HttpEncryptedStore {
    client: Client,
    base: Url,
}

impl HttpEncryptedStore {
    /// Creates a client for the store at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, ExtensionError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ExtensionError::StoreUnavailable(e.to_string()))?;
        Self::with_client(base_url, client)
    }

    /// Creates a client for the store at `base_url` using `client`.
    pub fn with_client(base_url: &str, client: Client) -> Result<Self, ExtensionError> {
        let base = Url::parse(base_url)
            .map_err(|e| ExtensionError::StoreUnavailable(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ExtensionError::StoreUnavailable(format!(
                "{base_url}: not a base URL"
            )));
        }

        Ok(Self { client, base })
    }

    /// Confirms the store answers. Used as a startup gate.
    pub async fn upcheck(&self) -> Result<(), ExtensionError> {
        let url = self.endpoint(&["upcheck"])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ExtensionError::StoreUnavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ExtensionError::StoreUnavailable(format!(
                "upcheck returned {}",
                response.status()
            )))
        }
    }

    /// Builds `base/segments..`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ExtensionError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ExtensionError::Store("store URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_text(&self, url: Url) -> Result<String, ExtensionError> {
        let response = self.client.get(url).send().await.map_err(store_err)?;
        let response = response.error_for_status().map_err(store_err)?;
        response.text().await.map_err(store_err)
    }
}

fn store_err(e: reqwest::Error) -> ExtensionError {
    ExtensionError::Store(e.to_string())
}

/// Splits the comma-separated participants body.
fn parse_participants(body: &str) -> Vec<String> {
    body.split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl EncryptedStore for HttpEncryptedStore {
    async fn send(
        &self,
        payload: &[u8],
        from: &str,
        to: &[String],
    ) -> Result<EncryptedPayloadHash, ExtensionError> {
        let request = SendRequest {
            payload: STANDARD.encode(payload),
            from,
            to,
        };

        let response: SendResponse = self
            .client
            .post(self.endpoint(&["send"])?)
            .json(&request)
            .send()
            .await
            .map_err(store_err)?
            .error_for_status()
            .map_err(store_err)?
            .json()
            .await
            .map_err(store_err)?;

        debug!(recipients = to.len(), "[qc-18] Payload sent to encrypted store");
        EncryptedPayloadHash::from_base64(&response.key)
    }

    async fn receive(
        &self,
        hash: &EncryptedPayloadHash,
    ) -> Result<Option<Vec<u8>>, ExtensionError> {
        let url = self.endpoint(&["transaction", &hash.to_base64()])?;
        let response = self.client.get(url).send().await.map_err(store_err)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: ReceiveResponse = response
            .error_for_status()
            .map_err(store_err)?
            .json()
            .await
            .map_err(store_err)?;

        STANDARD
            .decode(body.payload)
            .map(Some)
            .map_err(|e| ExtensionError::Store(format!("payload is not base64: {e}")))
    }

    async fn participants(
        &self,
        hash: &EncryptedPayloadHash,
    ) -> Result<Vec<String>, ExtensionError> {
        let url = self.endpoint(&["transaction", &hash.to_base64(), "participants"])?;
        Ok(parse_participants(&self.get_text(url).await?))
    }

    async fn is_sender(&self, hash: &EncryptedPayloadHash) -> Result<bool, ExtensionError> {
        let url = self.endpoint(&["transaction", &hash.to_base64(), "isSender"])?;
        match self.get_text(url).await?.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(ExtensionError::Store(format!(
                "unexpected isSender body: {other}"
            ))),
        }
    }
}
