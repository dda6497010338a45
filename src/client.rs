//! # Upstream Clients
//!
//! Contracts for the collaborators the hub and adapter call over the wire:
//! the encrypted-document storage service (EDV), the key service (KMS), the
//! vault service that owns document metadata, and the hub itself as seen by
//! the delegation adapter. HTTP implementations sign each request as a
//! capability invocation; request deadlines surface as
//! [`Error::DeadlineExceeded`] so callers can tell a slow collaborator from
//! a broken one.

use std::sync::Arc;

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use confida_zcap::httpsig::{edv_action, kms_action, RequestSigner};
use confida_zcap::SignatureBinding;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Error;
use crate::jwe::EncryptedDocument;
use crate::model::{ComparisonResult, CreateProfileRequest, DocQuery, Operator, Profile, Query};

/// Reads encrypted documents from a storage service.
#[async_trait]
pub trait EdvClient: Send + Sync {
    /// Fetch an encrypted document, presenting the delegated storage
    /// capability.
    async fn read_document(
        &self, base: &str, zcap: &str, vault_id: &str, doc_id: &str,
    ) -> Result<EncryptedDocument, Error>;
}

/// Unwraps content encryption keys at a key service.
#[async_trait]
pub trait KmsClient: Send + Sync {
    /// Unwrap a recipient's wrapped content encryption key, presenting the
    /// delegated key capability.
    async fn unwrap(
        &self, base: &str, zcap: &str, kid: &str, encrypted_key: &str,
    ) -> Result<Vec<u8>, Error>;
}

/// Resolves document storage metadata at the vault service.
#[async_trait]
pub trait VaultClient: Send + Sync {
    /// Fetch a document's storage metadata.
    async fn doc_metadata(&self, vault_id: &str, doc_id: &str) -> Result<DocMeta, Error>;
}

/// Document storage metadata as returned by the vault service.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DocMeta {
    /// URI of the encrypted document inside the storage service.
    pub uri: String,

    /// URI of the key protecting the document at the key service.
    #[serde(rename = "encKeyURI")]
    pub enc_key_uri: String,
}

/// The hub as seen by the delegation adapter.
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Create a profile for `controller`.
    async fn create_profile(&self, controller: &str) -> Result<Profile, Error>;

    /// Register a query under a profile, returning its location.
    async fn create_query(&self, profile_id: &str, query: &DocQuery) -> Result<String, Error>;

    /// Evaluate a comparison.
    async fn compare(&self, op: &Operator) -> Result<ComparisonResult, Error>;
}

/// HTTP storage service client. Reads are signed capability invocations.
pub struct HttpEdvClient {
    http: reqwest::Client,
    binding: SignatureBinding,
    key_id: String,
}

impl HttpEdvClient {
    /// Create a client signing as the key identified by `key_id`.
    #[must_use]
    pub fn new(http: reqwest::Client, binding: SignatureBinding, key_id: impl Into<String>) -> Self {
        Self { http, binding, key_id: key_id.into() }
    }
}

#[async_trait]
impl EdvClient for HttpEdvClient {
    #[instrument(level = "debug", skip(self, zcap))]
    async fn read_document(
        &self, base: &str, zcap: &str, vault_id: &str, doc_id: &str,
    ) -> Result<EncryptedDocument, Error> {
        // `base` carries the vault collection mount, e.g.
        // `https://edv.example.com/encrypted-data-vaults`.
        let url = format!("{base}/{vault_id}/documents/{doc_id}");
        let request = signed_request(
            &self.binding,
            &self.key_id,
            zcap,
            Arc::new(edv_action),
            http::Method::GET,
            &url,
            Vec::new(),
        )
        .await?;
        let response = check_status(self.http.execute(request).await, "storage service")?;
        response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("storage service response: {e}")))
    }
}

/// HTTP key service client. Unwraps are signed capability invocations.
pub struct HttpKmsClient {
    http: reqwest::Client,
    binding: SignatureBinding,
    key_id: String,
}

impl HttpKmsClient {
    /// Create a client signing as the key identified by `key_id`.
    #[must_use]
    pub fn new(http: reqwest::Client, binding: SignatureBinding, key_id: impl Into<String>) -> Self {
        Self { http, binding, key_id: key_id.into() }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnwrapRequest<'a> {
    key_id: &'a str,
    wrapped_key: &'a str,
}

#[derive(Deserialize)]
struct UnwrapResponse {
    key: String,
}

#[async_trait]
impl KmsClient for HttpKmsClient {
    #[instrument(level = "debug", skip(self, zcap, encrypted_key))]
    async fn unwrap(
        &self, base: &str, zcap: &str, kid: &str, encrypted_key: &str,
    ) -> Result<Vec<u8>, Error> {
        let url = format!("{base}/unwrap");
        let body = serde_json::to_vec(&UnwrapRequest { key_id: kid, wrapped_key: encrypted_key })
            .map_err(|e| Error::Internal(format!("key service request: {e}")))?;
        let request = signed_request(
            &self.binding,
            &self.key_id,
            zcap,
            Arc::new(kms_action),
            http::Method::POST,
            &url,
            body,
        )
        .await?;
        let response = check_status(self.http.execute(request).await, "key service")?;
        let unwrapped: UnwrapResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("key service response: {e}")))?;
        Base64UrlUnpadded::decode_vec(&unwrapped.key)
            .map_err(|_| Error::Internal("key service returned an undecodable key".to_string()))
    }
}

/// HTTP vault service client.
pub struct HttpVaultClient {
    http: reqwest::Client,
    base: String,
}

impl HttpVaultClient {
    /// Create a client against the vault service at `base`.
    #[must_use]
    pub fn new(http: reqwest::Client, base: impl Into<String>) -> Self {
        Self { http, base: base.into() }
    }
}

#[async_trait]
impl VaultClient for HttpVaultClient {
    #[instrument(level = "debug", skip(self))]
    async fn doc_metadata(&self, vault_id: &str, doc_id: &str) -> Result<DocMeta, Error> {
        let url = format!("{}/vaults/{vault_id}/docs/{doc_id}/metadata", self.base);
        let response = check_status(self.http.get(url).send().await, "vault service")?;
        response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("vault service response: {e}")))
    }
}

/// HTTP hub client.
pub struct HttpHubClient {
    http: reqwest::Client,
    base: String,
}

impl HttpHubClient {
    /// Create a client against the hub at `base`.
    #[must_use]
    pub fn new(http: reqwest::Client, base: impl Into<String>) -> Self {
        Self { http, base: base.into() }
    }
}

#[async_trait]
impl HubClient for HttpHubClient {
    async fn create_profile(&self, controller: &str) -> Result<Profile, Error> {
        let url = format!("{}/hubstore/profiles", self.base);
        let request = CreateProfileRequest { controller: controller.to_string() };
        let response =
            check_status(self.http.post(url).json(&request).send().await, "hub")?;
        response.json().await.map_err(|e| Error::Internal(format!("hub response: {e}")))
    }

    async fn create_query(&self, profile_id: &str, query: &DocQuery) -> Result<String, Error> {
        let url = format!("{}/hubstore/profiles/{profile_id}/queries", self.base);
        let body = Query::DocQuery(query.clone());
        let response = check_status(self.http.post(url).json(&body).send().await, "hub")?;
        response
            .headers()
            .get(http::header::LOCATION)
            .and_then(|location| location.to_str().ok())
            .map(ToString::to_string)
            .ok_or_else(|| Error::Internal("hub returned no query location".to_string()))
    }

    async fn compare(&self, op: &Operator) -> Result<ComparisonResult, Error> {
        let url = format!("{}/compare", self.base);
        let body = serde_json::json!({ "op": op });
        let response = check_status(self.http.post(url).json(&body).send().await, "hub")?;
        response.json().await.map_err(|e| Error::Internal(format!("hub response: {e}")))
    }
}

/// Build and sign a capability invocation request, then hand it to reqwest.
async fn signed_request(
    binding: &SignatureBinding, key_id: &str, zcap: &str,
    action: confida_zcap::httpsig::ActionClassifier, method: http::Method, url: &str,
    body: Vec<u8>,
) -> Result<reqwest::Request, Error> {
    let mut request = http::Request::builder()
        .method(method)
        .uri(url)
        .body(body)
        .map_err(|e| Error::Internal(format!("failed to build request: {e}")))?;
    let signer = RequestSigner::new(binding.clone(), key_id, zcap, action);
    signer
        .sign(&mut request)
        .await
        .map_err(|e| Error::Internal(format!("failed to sign request: {e}")))?;
    reqwest::Request::try_from(request)
        .map_err(|e| Error::Internal(format!("failed to build request: {e}")))
}

/// Map a reqwest outcome, folding timeouts into deadline errors and non-2xx
/// statuses into internal errors naming the collaborator.
fn check_status(
    outcome: Result<reqwest::Response, reqwest::Error>, who: &str,
) -> Result<reqwest::Response, Error> {
    let response = outcome.map_err(|e| {
        if e.is_timeout() {
            Error::DeadlineExceeded(format!("{who} did not answer in time"))
        } else {
            Error::Internal(format!("{who}: {e}"))
        }
    })?;
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(Error::Internal(format!("{who} returned {status}")))
    }
}
