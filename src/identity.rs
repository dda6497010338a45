//! # Service Identity
//!
//! The hub's own signing identity: an Ed25519 key for signing delegated
//! capabilities and another for signing capability invocations, each
//! addressed as a `did:key` URL. The identity is created once, persisted in
//! the `config` store, and handed explicitly to the components that sign;
//! there is no ambient "current identity". Private keys stay in the keyring,
//! so a persisted identity is only usable while the keyring still holds
//! them.

use std::str::FromStr;
use std::sync::Arc;

use confida_did::key::{did_from_verifying_key, did_key_url};
use confida_did::Url;
use confida_kms::Keyring;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::store::Store;

/// Storage key of the identity in the `config` store.
const IDENTITY_KEY: &str = "identity";

/// The hub's signing identity.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIdentity {
    /// The service's DID.
    pub did: String,

    /// DID URL of the key that signs delegated capabilities.
    pub delegation_key: String,

    /// DID URL of the key that signs capability invocations.
    pub invocation_key: String,
}

impl ServiceIdentity {
    /// Load the persisted identity, or create and persist a new one.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Internal`] if the store cannot be read or
    /// written, if the persisted identity does not decode, or if the keyring
    /// no longer holds the persisted keys.
    pub async fn load_or_create(
        config: &Arc<dyn Store>, keyring: &Keyring,
    ) -> Result<Self, Error> {
        let stored = config
            .get(IDENTITY_KEY)
            .await
            .map_err(|e| Error::Internal(format!("failed to load identity: {e}")))?;

        if let Some(bytes) = stored {
            let identity: Self = serde_json::from_slice(&bytes)
                .map_err(|e| Error::Internal(format!("failed to load identity: {e}")))?;
            for key in [&identity.delegation_key, &identity.invocation_key] {
                let kid = keyring_handle(key)?;
                if !keyring.contains(&kid) {
                    return Err(Error::Internal(format!(
                        "failed to load identity: keyring does not hold {key}"
                    )));
                }
            }
            return Ok(identity);
        }

        let delegation = keyring.generate();
        let invocation = keyring.generate();
        let identity = Self {
            did: did_from_verifying_key(&delegation.verifying_key)
                .map_err(|e| Error::Internal(format!("failed to load identity: {e}")))?,
            delegation_key: did_key_url(&delegation.verifying_key)
                .map_err(|e| Error::Internal(format!("failed to load identity: {e}")))?,
            invocation_key: did_key_url(&invocation.verifying_key)
                .map_err(|e| Error::Internal(format!("failed to load identity: {e}")))?,
        };
        let bytes = serde_json::to_vec(&identity)
            .map_err(|e| Error::Internal(format!("failed to load identity: {e}")))?;
        config
            .put(IDENTITY_KEY, bytes)
            .await
            .map_err(|e| Error::Internal(format!("failed to load identity: {e}")))?;
        Ok(identity)
    }
}

/// The keyring handle of the key a `did:key` URL names.
fn keyring_handle(did_url: &str) -> Result<String, Error> {
    let parsed = Url::from_str(did_url)
        .map_err(|e| Error::Internal(format!("failed to load identity: {e}")))?;
    let document = confida_did::key::resolve(&parsed.did())
        .map_err(|e| Error::Internal(format!("failed to load identity: {e}")))?;
    let method = document.method_by_id(&parsed.resource_id()).ok_or_else(|| {
        Error::Internal(format!("failed to load identity: no method for {did_url}"))
    })?;
    let public_key = method
        .public_key_bytes()
        .map_err(|e| Error::Internal(format!("failed to load identity: {e}")))?;
    Ok(confida_kms::derive_kid(&public_key))
}

#[cfg(test)]
mod tests {
    use crate::store::{MemProvider, StoreProvider as _};

    use super::*;

    #[tokio::test]
    async fn create_then_load() {
        let provider = MemProvider::new();
        let config = provider.open_store("config").await.unwrap();
        let keyring = Keyring::new();

        let created = ServiceIdentity::load_or_create(&config, &keyring).await.unwrap();
        assert!(created.did.starts_with("did:key:z6Mk"));
        assert!(created.delegation_key.starts_with(&created.did));
        assert_ne!(created.delegation_key, created.invocation_key);

        let loaded = ServiceIdentity::load_or_create(&config, &keyring).await.unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn persisted_identity_without_keys() {
        let provider = MemProvider::new();
        let config = provider.open_store("config").await.unwrap();

        let keyring = Keyring::new();
        ServiceIdentity::load_or_create(&config, &keyring).await.unwrap();

        // Same store, fresh keyring: the identity exists but is unusable.
        let fresh = Keyring::new();
        let err = ServiceIdentity::load_or_create(&config, &fresh)
            .await
            .expect_err("should fail");
        assert!(matches!(err, Error::Internal(_)));
        assert!(err.to_string().starts_with("failed to load identity"));
    }
}
