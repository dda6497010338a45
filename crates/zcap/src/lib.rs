//! # Authorization Capabilities
//!
//! Capability (ZCAP) tokens: signed, delegable grants authorizing a named
//! invoker to perform specific actions against a specific target. A
//! capability carries its whole ancestry, so a verifier holding only the
//! root can check a delegation it has never seen before.
//!
//! The crate covers the token lifecycle end to end: minting and delegation
//! with [`CapabilityBuilder`], transitive chain verification with
//! [`verify_capability`], the compressed wire encoding
//! ([`compress`]/[`decompress`]) and signed HTTP invocation ([`httpsig`]).

mod binding;
mod capability;
mod error;
pub mod httpsig;
mod verify;
mod wire;

pub use self::binding::SignatureBinding;
pub use self::capability::{
    Capability, CapabilityBuilder, Caveat, Proof, Target, SECURITY_CONTEXT,
};
pub use self::error::Error;
pub use self::verify::verify_capability;
pub use self::wire::{compress, decompress};
