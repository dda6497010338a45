//! # Confida Hub
//!
//! A confidential compare/extract service built on authorization
//! capabilities. Parties register queries over encrypted documents held in
//! external vaults; the hub resolves each query at evaluation time by
//! fetching the encrypted document with a delegated storage capability,
//! unwrapping its content key with a delegated key capability, decrypting
//! and selecting the named fragment. It answers equality comparisons or
//! extractions without the asking party ever holding the plaintext or a
//! standing credential.
//!
//! The [`adapter`] module bridges vault-level coordinates into the hub's
//! query model and issues short-lived delegated capabilities to third
//! parties. Capability minting, verification and transport live in
//! `confida-zcap`; DID resolution in `confida-did`; signing keys in
//! `confida-kms`.

pub mod adapter;
mod client;
mod error;
mod hub;
mod identity;
mod jwe;
mod model;
mod store;
mod web;

pub use self::client::{
    DocMeta, EdvClient, HttpEdvClient, HttpHubClient, HttpKmsClient, HttpVaultClient, HubClient,
    KmsClient, VaultClient,
};
pub use self::error::{Error, ErrorBody};
pub use self::hub::{Hub, HubConfig};
pub use self::identity::ServiceIdentity;
pub use self::jwe::{EncryptedDocument, Jwe, Recipient, RecipientHeader, StructuredDocument};
pub use self::model::{
    Authorization, AuthorizationRequest, ComparisonResult, CreateProfileRequest, CreatedQuery,
    DocQuery, Extraction, Operator, Profile, Query, RefQuery, StoredQuery, UpstreamAuth,
    UpstreamAuthorization,
};
pub use self::store::{MemProvider, Store, StoreProvider};
pub use self::web::{adapter_router, hub_router};
