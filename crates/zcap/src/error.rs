//! # Capability Errors

use thiserror::Error;

/// Errors arising from capability minting, chain verification and the wire
/// encoding.
///
/// Verification failures are deliberately specific so callers can log the
/// real cause, even where their outward response collapses them into a
/// single "not authorized".
#[derive(Error, Debug)]
pub enum Error {
    /// A DID URL does not have the expected form.
    #[error("malformed DID URL: {0}")]
    MalformedDidUrl(String),

    /// No resolver is registered for the DID's method.
    #[error("unsupported DID method: {0}")]
    UnsupportedDidMethod(String),

    /// The DID URL does not dereference to a verification method enabled for
    /// capability delegation.
    #[error("no such verification method: {0}")]
    NoSuchVerificationMethod(String),

    /// The verification method's type or curve has no supported signature
    /// algorithm, or its key material cannot be decoded.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// The underlying signing operation failed.
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// A capability under construction or verification is structurally
    /// incomplete.
    #[error("invalid capability: {0}")]
    InvalidCapability(String),

    /// A proof does not verify against its verification method.
    #[error("invalid signature")]
    InvalidSignature,

    /// An expiry caveat is violated at the evaluation instant.
    #[error("capability expired")]
    CapabilityExpired,

    /// The required action is not among the capability's allowed actions.
    #[error("action not permitted: {0}")]
    ActionNotPermitted(String),

    /// The delegation chain is discontinuous, or an ancestor cannot be
    /// fetched.
    #[error("broken capability chain: {0}")]
    BrokenCapabilityChain(String),

    /// The compressed wire form cannot be decoded into a capability.
    #[error("malformed capability encoding: {0}")]
    MalformedEncoding(String),
}

impl From<confida_did::Error> for Error {
    fn from(err: confida_did::Error) -> Self {
        use confida_did::Error as Did;
        match err {
            Did::InvalidDidUrl(e) => Self::MalformedDidUrl(e),
            Did::MethodNotSupported(e) => Self::UnsupportedDidMethod(e),
            Did::InvalidDid(e) | Did::NotFound(e) => Self::NoSuchVerificationMethod(e),
            Did::UnsupportedKeyType(e) | Did::InvalidKey(e) => Self::UnsupportedKeyType(e),
        }
    }
}
