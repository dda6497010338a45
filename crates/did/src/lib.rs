//! # Decentralized Identifiers
//!
//! DID URLs, documents and verification methods, and the pluggable
//! resolution used to dereference a DID URL to the public key that signed or
//! will sign something. The `key` method ships in this crate; further
//! methods are registered by the caller through [`ResolverSet`].

mod core;
mod document;
mod error;
pub mod key;
mod resolve;
mod url;
mod verification;

pub use confida_kms::Algorithm;

pub use self::core::Kind;
pub use self::document::{Document, DID_CONTEXT};
pub use self::error::Error;
pub use self::key::KeyResolver;
pub use self::resolve::{MethodResolver, ResolverSet};
pub use self::url::Url;
pub use self::verification::{KeyFormat, KeyPurpose, PublicKeyJwk, VerificationMethod};
