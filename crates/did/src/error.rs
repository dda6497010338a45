//! # DID Errors

use thiserror::Error;

/// Errors arising from DID URL parsing, resolution and verification method
/// dereferencing.
#[derive(Error, Debug)]
pub enum Error {
    /// The DID URL does not have the expected form, or is missing a fragment
    /// where one is required.
    #[error("invalid DID URL: {0}")]
    InvalidDidUrl(String),

    /// No registered resolver accepts the DID's method.
    #[error("DID method not supported: {0}")]
    MethodNotSupported(String),

    /// The DID could not be resolved to a document.
    #[error("unable to resolve DID: {0}")]
    InvalidDid(String),

    /// The requested resource is not present in the resolved document.
    #[error("not found: {0}")]
    NotFound(String),

    /// The verification method's type or curve has no supported signature
    /// algorithm.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// Public key material could not be decoded.
    #[error("invalid public key: {0}")]
    InvalidKey(String),
}
