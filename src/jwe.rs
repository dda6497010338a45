//! # Encrypted Documents
//!
//! Envelope formats shared with the storage collaborator: an encrypted
//! document wraps a JWE (flattened JSON serialization, A256GCM content
//! encryption) whose plaintext is a structured document. The hub only ever
//! decrypts; the encrypt half exists so vault-side fixtures can build
//! documents the hub accepts.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use base64ct::{Base64UrlUnpadded, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// AEAD tag length in bytes.
const TAG_LEN: usize = 16;

/// The JWE protected header: A256GCM, no key-management parameters (the
/// content key is wrapped out of band by the key service).
const PROTECTED: &[u8] = br#"{"enc":"A256GCM"}"#;

/// An encrypted document as held by the storage service.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct EncryptedDocument {
    /// Document ID within its vault.
    pub id: String,

    /// Version sequence, incremented by the storage service on update.
    #[serde(default)]
    pub sequence: u64,

    /// The encrypted payload.
    pub jwe: Jwe,
}

/// The decrypted payload of an encrypted document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct StructuredDocument {
    /// Document ID, matching the enclosing encrypted document.
    pub id: String,

    /// Unencrypted metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,

    /// The document content.
    pub content: Value,
}

/// A JWE in flattened JSON serialization with a recipient list.
///
/// Field names follow RFC 7516; `encrypted_key` keeps its underscore.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Jwe {
    /// Base64url-encoded protected header. Covered as AAD exactly as
    /// transmitted.
    pub protected: String,

    /// Who can unwrap the content encryption key.
    pub recipients: Vec<Recipient>,

    /// Base64url-encoded 96-bit initialization vector.
    pub iv: String,

    /// Base64url-encoded ciphertext.
    pub ciphertext: String,

    /// Base64url-encoded 128-bit authentication tag.
    pub tag: String,
}

/// One JWE recipient.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Recipient {
    /// Per-recipient header.
    pub header: RecipientHeader,

    /// The wrapped content encryption key, opaque to the hub: the key
    /// service unwraps it.
    pub encrypted_key: String,
}

/// Per-recipient JWE header.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RecipientHeader {
    /// ID of the recipient's key at the key service.
    pub kid: String,
}

impl Jwe {
    /// Encrypt `plaintext` under a 32-byte content encryption key for a
    /// single recipient.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Internal`] if the key has the wrong length or
    /// encryption fails.
    pub fn encrypt(
        plaintext: &[u8], cek: &[u8], kid: &str, encrypted_key: &str,
    ) -> Result<Self, Error> {
        if cek.len() != 32 {
            return Err(Error::Internal(
                "content encryption key must be 32 bytes".to_string(),
            ));
        }
        let protected = Base64UrlUnpadded::encode_string(PROTECTED);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(cek));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let payload = aes_gcm::aead::Payload { msg: plaintext, aad: protected.as_bytes() };
        let sealed = cipher
            .encrypt(&nonce, payload)
            .map_err(|_| Error::Internal("failed to encrypt document".to_string()))?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(Self {
            protected,
            recipients: vec![Recipient {
                header: RecipientHeader { kid: kid.to_string() },
                encrypted_key: encrypted_key.to_string(),
            }],
            iv: Base64UrlUnpadded::encode_string(nonce.as_slice()),
            ciphertext: Base64UrlUnpadded::encode_string(ciphertext),
            tag: Base64UrlUnpadded::encode_string(tag),
        })
    }

    /// Decrypt the content with an unwrapped content encryption key.
    ///
    /// The AAD is the protected header exactly as transmitted, so any
    /// tampering with it fails authentication.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Internal`] if any field does not decode or
    /// authentication fails. Messages never include key material or
    /// plaintext.
    pub fn decrypt(&self, cek: &[u8]) -> Result<Vec<u8>, Error> {
        if cek.len() != 32 {
            return Err(Error::Internal(
                "content encryption key must be 32 bytes".to_string(),
            ));
        }
        let iv = Base64UrlUnpadded::decode_vec(&self.iv)
            .map_err(|_| Error::Internal("failed to decode document iv".to_string()))?;
        if iv.len() != 12 {
            return Err(Error::Internal("document iv must be 96 bits".to_string()));
        }
        let ciphertext = Base64UrlUnpadded::decode_vec(&self.ciphertext)
            .map_err(|_| Error::Internal("failed to decode document ciphertext".to_string()))?;
        let tag = Base64UrlUnpadded::decode_vec(&self.tag)
            .map_err(|_| Error::Internal("failed to decode document tag".to_string()))?;

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(cek));
        let payload =
            aes_gcm::aead::Payload { msg: &sealed, aad: self.protected.as_bytes() };
        cipher
            .decrypt(Nonce::from_slice(&iv), payload)
            .map_err(|_| Error::Internal("failed to decrypt document".to_string()))
    }

    /// The first recipient: whose key the key service unwraps for.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Internal`] if the JWE names no recipients.
    pub fn recipient(&self) -> Result<&Recipient, Error> {
        self.recipients
            .first()
            .ok_or_else(|| Error::Internal("document names no recipients".to_string()))
    }
}
