//! Client for a Vault-Transit-style encryption API.
//!
//! Endpoints used, relative to the configured address and mount:
//!
//! - `POST /v1/{mount}/encrypt/{key}`: `{"plaintext", "context"}` or `{"batch_input": [...]}`
//! - `POST /v1/{mount}/decrypt/{key}`: `{"ciphertext", "context"}` or `{"batch_input": [...]}`
//!
//! Plaintext and context travel base64-encoded. The token is sent in the
//! `X-Vault-Token` header and marked sensitive so it never appears in
//! `Debug` output of the request.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::{
    body::Body,
    header::{HeaderValue, CONTENT_TYPE},
    Method, Request, StatusCode,
};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use super::{BatchResults, DecryptItem, EncryptItem, KeyService, KeyServiceError};
use crate::secret::SecretBytes;

/// Default secrets-engine mount path.
pub const DEFAULT_MOUNT: &str = "transit";

/// Header carrying the authentication token.
const TOKEN_HEADER: &str = "X-Vault-Token";

/// Upper bound on a response body; larger bodies are rejected.
const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

/// Vault reports a context mismatch as an AEAD authentication failure.
const AUTH_FAILURE_MARKER: &str = "message authentication failed";

/// Key service speaking the Transit HTTP API over a pooled hyper client.
pub struct TransitKeyService {
    client: Client<HttpsConnector<HttpConnector>, String>,
    addr: String,
    mount: String,
    token: SecretBytes,
}

impl TransitKeyService {
    /// Create a client for the service at `addr` (e.g. `https://vault:8200`).
    ///
    /// # Errors
    ///
    /// Returns [`KeyServiceError::Transport`] if the TLS configuration cannot
    /// be built.
    pub fn new(addr: &str, token: SecretBytes) -> Result<Self, KeyServiceError> {
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| KeyServiceError::Transport(format!("tls setup failed: {e}")))?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            addr: addr.trim_end_matches('/').to_owned(),
            mount: DEFAULT_MOUNT.to_owned(),
            token,
        })
    }

    /// Use a secrets-engine mount other than [`DEFAULT_MOUNT`].
    pub fn with_mount(mut self, mount: &str) -> Self {
        self.mount = mount.trim_matches('/').to_owned();
        self
    }

    fn url(&self, operation: &str, key_name: &str) -> String {
        format!("{}/v1/{}/{operation}/{key_name}", self.addr, self.mount)
    }

    async fn post<T: Serialize>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<(StatusCode, Vec<u8>), KeyServiceError> {
        let json = serde_json::to_string(body)
            .map_err(|e| KeyServiceError::Transport(format!("request encoding failed: {e}")))?;

        let mut token = HeaderValue::from_bytes(self.token.expose())
            .map_err(|_| KeyServiceError::Transport("token is not a valid header value".into()))?;
        token.set_sensitive(true);

        let req = Request::builder()
            .method(Method::POST)
            .uri(url)
            .header(CONTENT_TYPE, "application/json")
            .header(TOKEN_HEADER, token)
            .body(json)
            .map_err(|e| KeyServiceError::Transport(format!("invalid request: {e}")))?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| KeyServiceError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = read_body(resp.into_body(), MAX_RESPONSE_BYTES).await?;
        debug!(status = status.as_u16(), bytes = body.len(), "key service response");
        Ok((status, body))
    }
}

/// Collect a response body, failing once it exceeds `limit` bytes.
async fn read_body<B>(body: B, limit: usize) -> Result<Vec<u8>, KeyServiceError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let collected = Limited::new(body, limit).collect().await.map_err(|e| {
        if e.is::<LengthLimitError>() {
            KeyServiceError::Transport("response body too large".into())
        } else {
            KeyServiceError::Transport(e.to_string())
        }
    })?;
    Ok(collected.to_bytes().to_vec())
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EncryptBody {
    plaintext: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

#[derive(Debug, Serialize)]
struct DecryptBody<'a> {
    ciphertext: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchBody<T> {
    batch_input: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct VaultResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ItemData {
    #[serde(default)]
    ciphertext: Option<String>,
    #[serde(default)]
    plaintext: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BatchData {
    #[serde(default)]
    batch_results: Vec<ItemData>,
}

fn encode_context(context: &str) -> Option<String> {
    (!context.is_empty()).then(|| STANDARD.encode(context))
}

fn classify(message: &str) -> KeyServiceError {
    if message.contains(AUTH_FAILURE_MARKER) {
        KeyServiceError::ContextMismatch
    } else {
        KeyServiceError::Remote(message.to_owned())
    }
}

/// Decode a response body, turning non-2xx statuses and `errors` arrays into
/// [`KeyServiceError`]s.
fn parse_response<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<T, KeyServiceError> {
    let parsed: VaultResponse<T> = match serde_json::from_slice(body) {
        Ok(p) => p,
        Err(_) if !status.is_success() => {
            return Err(KeyServiceError::Remote(format!("status {}", status.as_u16())))
        }
        Err(e) => return Err(KeyServiceError::Remote(format!("invalid response body: {e}"))),
    };

    match parsed.data {
        Some(data) if status.is_success() => Ok(data),
        // Batch calls answer 400 with per-item errors inside `data`; keep it so
        // each item reports its own failure.
        Some(data) if status == StatusCode::BAD_REQUEST => Ok(data),
        _ => {
            let message = if parsed.errors.is_empty() {
                format!("status {}", status.as_u16())
            } else {
                parsed.errors.join("; ")
            };
            Err(classify(&message))
        }
    }
}

fn item_ciphertext(item: ItemData) -> Result<String, KeyServiceError> {
    if let Some(err) = item.error.filter(|e| !e.is_empty()) {
        return Err(classify(&err));
    }
    item.ciphertext
        .filter(|c| !c.is_empty())
        .ok_or(KeyServiceError::NoCiphertextReturned)
}

fn item_plaintext(item: ItemData) -> Result<Vec<u8>, KeyServiceError> {
    if let Some(err) = item.error.filter(|e| !e.is_empty()) {
        return Err(classify(&err));
    }
    let encoded = item.plaintext.ok_or(KeyServiceError::NoPlaintextReturned)?;
    STANDARD
        .decode(encoded)
        .map_err(|_| KeyServiceError::Remote("plaintext is not valid base64".into()))
}

fn check_batch_len<T>(results: Vec<T>, expected: usize) -> Result<Vec<T>, KeyServiceError> {
    if results.len() != expected {
        return Err(KeyServiceError::BatchLengthMismatch {
            expected,
            got: results.len(),
        });
    }
    Ok(results)
}

#[async_trait]
impl KeyService for TransitKeyService {
    fn backend(&self) -> &'static str {
        "transit"
    }

    async fn encrypt(
        &self,
        key_name: &str,
        plaintext: &[u8],
        context: &str,
    ) -> Result<String, KeyServiceError> {
        let body = EncryptBody {
            plaintext: STANDARD.encode(plaintext),
            context: encode_context(context),
        };
        let (status, bytes) = self.post(&self.url("encrypt", key_name), &body).await?;
        item_ciphertext(parse_response(status, &bytes)?)
    }

    async fn decrypt(
        &self,
        key_name: &str,
        ciphertext: &str,
        context: &str,
    ) -> Result<Vec<u8>, KeyServiceError> {
        let body = DecryptBody {
            ciphertext,
            context: encode_context(context),
        };
        let (status, bytes) = self.post(&self.url("decrypt", key_name), &body).await?;
        item_plaintext(parse_response(status, &bytes)?)
    }

    async fn encrypt_batch(
        &self,
        key_name: &str,
        items: &[EncryptItem],
    ) -> Result<BatchResults<String>, KeyServiceError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let body = BatchBody {
            batch_input: items
                .iter()
                .map(|item| EncryptBody {
                    plaintext: STANDARD.encode(&item.plaintext),
                    context: encode_context(&item.context),
                })
                .collect(),
        };
        let (status, bytes) = self.post(&self.url("encrypt", key_name), &body).await?;
        let data: BatchData = parse_response(status, &bytes)?;
        let results = check_batch_len(data.batch_results, items.len())?;
        Ok(results.into_iter().map(item_ciphertext).collect())
    }

    async fn decrypt_batch(
        &self,
        key_name: &str,
        items: &[DecryptItem],
    ) -> Result<BatchResults<Vec<u8>>, KeyServiceError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let body = BatchBody {
            batch_input: items
                .iter()
                .map(|item| DecryptBody {
                    ciphertext: &item.ciphertext,
                    context: encode_context(&item.context),
                })
                .collect(),
        };
        let (status, bytes) = self.post(&self.url("decrypt", key_name), &body).await?;
        let data: BatchData = parse_response(status, &bytes)?;
        let results = check_batch_len(data.batch_results, items.len())?;
        Ok(results.into_iter().map(item_plaintext).collect())
    }
}
