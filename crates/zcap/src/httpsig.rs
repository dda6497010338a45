//! # HTTP Capability Invocation
//!
//! Wraps outgoing HTTP requests in a capability invocation: a header
//! carrying the compressed capability and the action being invoked, plus an
//! HTTP message signature keyed by the invoker's DID URL. The signature
//! covers `(request-target)` and `date`, and additionally `digest` when the
//! request has a body. Receiving services verify the signature and the
//! capability before honouring the invocation.

use std::sync::Arc;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use http::header::{HeaderMap, HeaderName, HeaderValue, DATE};
use http::{Method, Request};
use sha2::{Digest, Sha256};

use crate::binding::SignatureBinding;
use crate::error::Error;

/// Header carrying the compressed capability and the invoked action.
pub const CAPABILITY_INVOCATION: &str = "capability-invocation";

/// Header carrying the HTTP message signature.
pub const SIGNATURE: &str = "signature";

/// Header carrying the body digest.
pub const DIGEST: &str = "digest";

/// Pseudo-header covering the method and request path.
const REQUEST_TARGET: &str = "(request-target)";

/// Classifies a request into the action name carried by the invocation
/// header.
pub type ActionClassifier = Arc<dyn Fn(&Method, &str) -> String + Send + Sync>;

/// Action classifier for key service requests.
///
/// The last path segment selects `sign`, `wrap`, `unwrap` or `exportKey`;
/// anything else is a `createKey`.
#[must_use]
pub fn kms_action(_method: &Method, path: &str) -> String {
    let last = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    match last {
        "sign" | "wrap" | "unwrap" => last.to_string(),
        "export" => "exportKey".to_string(),
        _ => "createKey".to_string(),
    }
}

/// Action classifier for storage service requests: GET is a `read`,
/// everything else a `write`.
#[must_use]
pub fn edv_action(method: &Method, _path: &str) -> String {
    if method == Method::GET { "read".to_string() } else { "write".to_string() }
}

/// Signs outgoing requests with a capability invocation.
#[derive(Clone)]
pub struct RequestSigner {
    binding: SignatureBinding,
    key_id: String,
    capability: String,
    action: ActionClassifier,
}

impl RequestSigner {
    /// Create a signer invoking `capability` (compressed wire form) as the
    /// key identified by `key_id`.
    #[must_use]
    pub fn new(
        binding: SignatureBinding, key_id: impl Into<String>, capability: impl Into<String>,
        action: ActionClassifier,
    ) -> Self {
        Self { binding, key_id: key_id.into(), capability: capability.into(), action }
    }

    /// Sign a request in place.
    ///
    /// Sets the `capability-invocation`, `date`, `digest` (bodied requests
    /// only) and `signature` headers.
    ///
    /// # Errors
    ///
    /// Fails if the signing key cannot be dereferenced or used, or if a
    /// header value cannot be constructed.
    pub async fn sign<T: AsRef<[u8]>>(&self, request: &mut Request<T>) -> Result<(), Error> {
        let method = request.method().clone();
        let path = request
            .uri()
            .path_and_query()
            .map_or_else(|| request.uri().path().to_string(), ToString::to_string);
        let action = (self.action)(&method, request.uri().path());
        let digest = match request.body().as_ref() {
            [] => None,
            body => Some(format!("SHA-256={}", Base64::encode_string(&Sha256::digest(body)))),
        };

        let headers = request.headers_mut();
        let invocation =
            format!(r#"zcap capability="{}",action="{action}""#, self.capability);
        headers.insert(
            HeaderName::from_static(CAPABILITY_INVOCATION),
            header_value(&invocation)?,
        );
        headers.insert(DATE, header_value(&imf_date(Utc::now()))?);

        let mut names = vec![REQUEST_TARGET, "date"];
        if let Some(digest) = digest {
            headers.insert(HeaderName::from_static(DIGEST), header_value(&digest)?);
            names.push("digest");
        }

        let signing = signing_string(&method, &path, headers, &names)?;
        let algorithm = self.binding.algorithm(&self.key_id).await?;
        let signature = self.binding.sign(&self.key_id, signing.as_bytes()).await?;
        let signature_header = format!(
            r#"keyId="{}",algorithm="{algorithm}",headers="{}",signature="{}""#,
            self.key_id,
            names.join(" "),
            Base64::encode_string(&signature),
        );
        headers.insert(HeaderName::from_static(SIGNATURE), header_value(&signature_header)?);
        Ok(())
    }
}

/// The `Date` header value: an IMF-fixdate, always GMT.
#[must_use]
pub fn imf_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Construct the string covered by an HTTP message signature: one line per
/// covered header in order, with `(request-target)` expanding to the
/// lowercased method and the request path.
///
/// # Errors
///
/// Fails with [`Error::SigningFailed`] if a covered header is absent or not
/// valid text.
pub fn signing_string(
    method: &Method, target: &str, headers: &HeaderMap, names: &[&str],
) -> Result<String, Error> {
    let mut lines = Vec::with_capacity(names.len());
    for name in names {
        if *name == REQUEST_TARGET {
            lines.push(format!(
                "{REQUEST_TARGET}: {} {target}",
                method.as_str().to_lowercase()
            ));
        } else {
            let value = headers
                .get(*name)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| Error::SigningFailed(format!("missing header {name}")))?;
            lines.push(format!("{name}: {value}"));
        }
    }
    Ok(lines.join("\n"))
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::SigningFailed(format!("invalid header value {value}")))
}
