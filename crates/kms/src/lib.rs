//! # Key Management
//!
//! An in-process key manager. Private keys live in a [`Keyring`] and are
//! addressed by an opaque key handle (KID) derived from the public key, so a
//! verification method resolved from a DID document maps to its local private
//! key without any registry. Verification is a pure function over supplied
//! public key material and never touches the keyring.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use dashmap::DashMap;
use ed25519_dalek::{Signer as _, SigningKey, Verifier as _};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Signature algorithms supported for verification.
///
/// Locally held keys are Ed25519, so the keyring only ever signs with
/// `EdDSA`. The ECDSA variants exist to verify signatures produced by
/// externally controlled keys.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum Algorithm {
    /// Edwards-curve digital signature (Ed25519).
    EdDSA,

    /// ECDSA using P-256 and SHA-256.
    ES256,

    /// ECDSA using P-384 and SHA-384.
    ES384,

    /// ECDSA using P-521 and SHA-512.
    ES512,
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EdDSA => write!(f, "EdDSA"),
            Self::ES256 => write!(f, "ES256"),
            Self::ES384 => write!(f, "ES384"),
            Self::ES512 => write!(f, "ES512"),
        }
    }
}

/// Errors returned by the key manager.
#[derive(Error, Debug)]
pub enum Error {
    /// No private key is held for the requested key handle.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Public or private key material could not be decoded.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// The signature does not verify against the supplied public key.
    #[error("signature verification failed")]
    VerificationFailed,
}

/// Derive the opaque key handle for a public key.
///
/// The handle is the unpadded base64url encoding of the SHA-256 digest of the
/// raw public key bytes, so the same key material always yields the same
/// handle.
#[must_use]
pub fn derive_kid(public_key: &[u8]) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(public_key))
}

/// A newly generated key: its handle and public half.
#[derive(Clone, Debug)]
pub struct KeyRef {
    /// Opaque key handle addressing the private key in the keyring.
    pub kid: String,

    /// Raw public key bytes.
    pub verifying_key: Vec<u8>,
}

/// Thread-safe store of Ed25519 signing keys, addressed by KID.
///
/// Clones share the underlying key store, so a key generated through one
/// handle is visible to every other.
#[derive(Clone, Debug, Default)]
pub struct Keyring {
    keys: Arc<DashMap<String, String>>,
}

impl Keyring {
    /// Create an empty keyring.
    #[must_use]
    pub fn new() -> Self {
        Self { keys: Arc::new(DashMap::new()) }
    }

    /// Generate a new Ed25519 keypair and store it under its derived handle.
    #[must_use]
    pub fn generate(&self) -> KeyRef {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key().as_bytes().to_vec();
        let kid = derive_kid(&verifying_key);
        let secret = Base64UrlUnpadded::encode_string(signing_key.as_bytes());
        self.keys.insert(kid.clone(), secret);
        KeyRef { kid, verifying_key }
    }

    /// Sign a message with the private key addressed by `kid`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::KeyNotFound`] if no key is held for the handle, or
    /// [`Error::InvalidKey`] if the stored secret cannot be decoded.
    pub fn sign(&self, kid: &str, msg: &[u8]) -> Result<Vec<u8>, Error> {
        let signing_key = self.signing_key(kid)?;
        Ok(signing_key.sign(msg).to_bytes().to_vec())
    }

    /// Return the raw public key bytes for the key addressed by `kid`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::KeyNotFound`] if no key is held for the handle, or
    /// [`Error::InvalidKey`] if the stored secret cannot be decoded.
    pub fn verifying_key(&self, kid: &str) -> Result<Vec<u8>, Error> {
        let signing_key = self.signing_key(kid)?;
        Ok(signing_key.verifying_key().as_bytes().to_vec())
    }

    /// Whether a private key is held for the handle.
    #[must_use]
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    fn signing_key(&self, kid: &str) -> Result<SigningKey, Error> {
        let Some(secret) = self.keys.get(kid).map(|entry| entry.clone()) else {
            return Err(Error::KeyNotFound(kid.to_string()));
        };
        let key_bytes = Base64UrlUnpadded::decode_vec(&secret)
            .map_err(|e| Error::InvalidKey(format!("stored secret for {kid}: {e}")))?;
        let secret_key: ed25519_dalek::SecretKey = key_bytes
            .try_into()
            .map_err(|_| Error::InvalidKey(format!("stored secret for {kid} has wrong length")))?;
        Ok(SigningKey::from_bytes(&secret_key))
    }
}

/// Verify a signature against raw public key material.
///
/// Key encodings: 32 raw bytes for Ed25519, SEC1-encoded points for the ECDSA
/// curves. Signatures are fixed-size (`r || s` for ECDSA).
///
/// # Errors
///
/// Fails with [`Error::InvalidKey`] if the public key cannot be decoded for
/// the algorithm, or [`Error::VerificationFailed`] if the signature is
/// malformed or does not verify.
pub fn verify(
    algorithm: Algorithm, public_key: &[u8], msg: &[u8], signature: &[u8],
) -> Result<(), Error> {
    match algorithm {
        Algorithm::EdDSA => {
            let key_bytes: &[u8; 32] = public_key
                .try_into()
                .map_err(|_| Error::InvalidKey("Ed25519 key must be 32 bytes".into()))?;
            let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(key_bytes)
                .map_err(|e| Error::InvalidKey(format!("Ed25519 key: {e}")))?;
            let signature = ed25519_dalek::Signature::from_slice(signature)
                .map_err(|_| Error::VerificationFailed)?;
            verifying_key.verify(msg, &signature).map_err(|_| Error::VerificationFailed)
        }
        Algorithm::ES256 => {
            let verifying_key = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|e| Error::InvalidKey(format!("P-256 key: {e}")))?;
            let signature =
                p256::ecdsa::Signature::from_slice(signature).map_err(|_| Error::VerificationFailed)?;
            verifying_key.verify(msg, &signature).map_err(|_| Error::VerificationFailed)
        }
        Algorithm::ES384 => {
            let verifying_key = p384::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|e| Error::InvalidKey(format!("P-384 key: {e}")))?;
            let signature =
                p384::ecdsa::Signature::from_slice(signature).map_err(|_| Error::VerificationFailed)?;
            verifying_key.verify(msg, &signature).map_err(|_| Error::VerificationFailed)
        }
        Algorithm::ES512 => {
            let verifying_key = p521::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|e| Error::InvalidKey(format!("P-521 key: {e}")))?;
            let signature =
                p521::ecdsa::Signature::from_slice(signature).map_err(|_| Error::VerificationFailed)?;
            verifying_key.verify(msg, &signature).map_err(|_| Error::VerificationFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use p256::ecdsa::signature::Signer as _;

    use super::*;

    #[test]
    fn kid_is_stable() {
        let keyring = Keyring::new();
        let key = keyring.generate();
        assert_eq!(key.kid, derive_kid(&key.verifying_key));
        assert!(keyring.contains(&key.kid));
    }

    #[test]
    fn sign_and_verify() {
        let keyring = Keyring::new();
        let key = keyring.generate();
        let signature = keyring.sign(&key.kid, b"hello").expect("should sign");
        verify(Algorithm::EdDSA, &key.verifying_key, b"hello", &signature)
            .expect("should verify");
    }

    #[test]
    fn tampered_signature_fails() {
        let keyring = Keyring::new();
        let key = keyring.generate();
        let mut signature = keyring.sign(&key.kid, b"hello").expect("should sign");
        signature[0] ^= 0x01;
        let err = verify(Algorithm::EdDSA, &key.verifying_key, b"hello", &signature)
            .expect_err("should fail");
        assert!(matches!(err, Error::VerificationFailed));
    }

    #[test]
    fn unknown_kid() {
        let keyring = Keyring::new();
        let err = keyring.sign("nope", b"hello").expect_err("should fail");
        assert!(matches!(err, Error::KeyNotFound(_)));
    }

    #[test]
    fn clones_share_keys() {
        let keyring = Keyring::new();
        let clone = keyring.clone();
        let key = keyring.generate();
        assert!(clone.contains(&key.kid));
        clone.sign(&key.kid, b"hello").expect("should sign via clone");
    }

    #[test]
    fn es256_verify() {
        let signing_key = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let public_key =
            signing_key.verifying_key().to_encoded_point(false).as_bytes().to_vec();
        let signature: p256::ecdsa::Signature = signing_key.sign(b"hello");
        verify(Algorithm::ES256, &public_key, b"hello", signature.to_bytes().as_slice())
            .expect("should verify");
        let err = verify(Algorithm::ES256, &public_key, b"other", signature.to_bytes().as_slice())
            .expect_err("should fail");
        assert!(matches!(err, Error::VerificationFailed));
    }

    #[test]
    fn garbage_key_material() {
        let err = verify(Algorithm::ES256, b"not a key", b"msg", &[0u8; 64])
            .expect_err("should fail");
        assert!(matches!(err, Error::InvalidKey(_)));
    }
}
