//! # Signature Binding
//!
//! Binds DID resolution, key-type mapping and the key manager into a single
//! sign/verify operation keyed by a DID URL. The URL is dereferenced to a
//! verification method enabled for capability delegation, the method's
//! declared type/curve selects the signature algorithm, and the key manager
//! performs the signature math. Resolution happens per call; nothing here
//! caches documents or verdicts.

use confida_did::{KeyPurpose, ResolverSet, VerificationMethod};
use confida_kms::{Algorithm, Keyring};

use crate::error::Error;

/// Sign and verify by DID URL.
#[derive(Clone)]
pub struct SignatureBinding {
    resolvers: ResolverSet,
    keyring: Keyring,
}

impl SignatureBinding {
    /// Bind a resolver set to a keyring.
    #[must_use]
    pub const fn new(resolvers: ResolverSet, keyring: Keyring) -> Self {
        Self { resolvers, keyring }
    }

    /// Sign `data` with the key identified by `did_url`.
    ///
    /// The private key is addressed in the keyring by the handle derived
    /// from the verification method's public key, so the caller never
    /// handles key material.
    ///
    /// # Errors
    ///
    /// Fails if the URL cannot be dereferenced to a verification method
    /// enabled for capability delegation, if the method's type/curve has no
    /// supported algorithm, or with [`Error::SigningFailed`] if the keyring
    /// does not hold the key.
    pub async fn sign(&self, did_url: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
        let method = self.dereference(did_url).await?;
        method.algorithm()?;
        let public_key = method.public_key_bytes()?;
        let kid = confida_kms::derive_kid(&public_key);
        self.keyring.sign(&kid, data).map_err(|e| Error::SigningFailed(e.to_string()))
    }

    /// Verify `signature` over `data` against the key identified by
    /// `did_url`.
    ///
    /// # Errors
    ///
    /// Fails if the URL cannot be dereferenced, with
    /// [`Error::UnsupportedKeyType`] if the method's key cannot be used, or
    /// [`Error::InvalidSignature`] if the signature does not verify.
    pub async fn verify(
        &self, did_url: &str, data: &[u8], signature: &[u8],
    ) -> Result<(), Error> {
        let method = self.dereference(did_url).await?;
        let algorithm = method.algorithm()?;
        let public_key = method.public_key_bytes()?;
        confida_kms::verify(algorithm, &public_key, data, signature).map_err(|e| match e {
            confida_kms::Error::InvalidKey(msg) => Error::UnsupportedKeyType(msg),
            _ => Error::InvalidSignature,
        })
    }

    /// The signature algorithm of the verification method identified by
    /// `did_url`.
    ///
    /// # Errors
    ///
    /// Fails if the URL cannot be dereferenced or the method's type/curve
    /// has no supported algorithm.
    pub async fn algorithm(&self, did_url: &str) -> Result<Algorithm, Error> {
        let method = self.dereference(did_url).await?;
        Ok(method.algorithm()?)
    }

    async fn dereference(&self, did_url: &str) -> Result<VerificationMethod, Error> {
        Ok(self.resolvers.dereference(did_url, &KeyPurpose::CapabilityDelegation).await?)
    }
}
