//! # did:key
//!
//! The `key` method needs no I/O: the method-specific ID *is* the
//! multibase-encoded public key, and the resolved document is synthesized
//! from it, listing the one verification method under every relationship.

use std::str::FromStr;

use async_trait::async_trait;
use multibase::Base;

use crate::core::Kind;
use crate::document::{Document, DID_CONTEXT};
use crate::error::Error;
use crate::resolve::MethodResolver;
use crate::url::Url;
use crate::verification::{KeyFormat, PublicKeyJwk, VerificationMethod};

/// Multicodec prefix for an Ed25519 public key.
const ED25519_CODEC: [u8; 2] = [0xed, 0x01];

/// Build a `did:key` DID from raw Ed25519 public key bytes.
///
/// # Errors
///
/// Returns an error if the key is not 32 bytes.
pub fn did_from_verifying_key(verifying_key: &[u8]) -> Result<String, Error> {
    if verifying_key.len() != 32 {
        return Err(Error::InvalidKey("Ed25519 key must be 32 bytes".into()));
    }
    let mut codec = ED25519_CODEC.to_vec();
    codec.extend_from_slice(verifying_key);
    Ok(format!("did:key:{}", multibase::encode(Base::Base58Btc, codec)))
}

/// Build the DID URL of the verification method for an Ed25519 public key.
///
/// By convention the fragment repeats the multibase key:
/// `did:key:z6Mk…#z6Mk…`.
///
/// # Errors
///
/// Returns an error if the key is not 32 bytes.
pub fn did_key_url(verifying_key: &[u8]) -> Result<String, Error> {
    let did = did_from_verifying_key(verifying_key)?;
    let multikey = did.trim_start_matches("did:key:").to_string();
    Ok(format!("{did}#{multikey}"))
}

/// Synthesize the DID document for a `did:key` DID.
///
/// # Errors
///
/// Returns an error if the DID is not a well-formed Ed25519 `did:key`.
pub fn resolve(did: &str) -> Result<Document, Error> {
    let url = Url::from_str(did)?;
    if url.method != "key" {
        return Err(Error::MethodNotSupported(url.method));
    }
    // Decoding validates the multibase encoding and the multicodec prefix.
    PublicKeyJwk::from_multibase(&url.id)?;

    let vm_id = format!("{}#{}", url.did(), url.id);
    let vm = VerificationMethod {
        id: vm_id.clone(),
        controller: url.did(),
        key: KeyFormat::Multikey {
            public_key_multibase: url.id.clone(),
        },
    };
    let reference = vec![Kind::<VerificationMethod>::String(vm_id)];

    Ok(Document {
        context: Some(vec![Kind::String(DID_CONTEXT.to_string())]),
        id: url.did(),
        verification_method: Some(vec![vm]),
        authentication: Some(reference.clone()),
        assertion_method: Some(reference.clone()),
        capability_invocation: Some(reference.clone()),
        capability_delegation: Some(reference),
        ..Document::default()
    })
}

/// Resolver for the `key` method.
pub struct KeyResolver;

#[async_trait]
impl MethodResolver for KeyResolver {
    fn method(&self) -> &str {
        "key"
    }

    async fn resolve(&self, did: &str) -> anyhow::Result<Document> {
        Ok(resolve(did)?)
    }
}
