//! # DID Resolution
//!
//! Resolution is pluggable: one resolver per DID method, tried by method
//! match. Resolution is performed per call; nothing here caches documents.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::document::Document;
use crate::error::Error;
use crate::url::Url;
use crate::verification::{KeyPurpose, VerificationMethod};

/// A resolver for a single DID method.
#[async_trait]
pub trait MethodResolver: Send + Sync {
    /// The method name this resolver accepts, e.g. `key`.
    fn method(&self) -> &str;

    /// Resolve a DID to its document.
    async fn resolve(&self, did: &str) -> anyhow::Result<Document>;
}

/// An ordered set of method resolvers.
#[derive(Clone, Default)]
pub struct ResolverSet {
    resolvers: Vec<Arc<dyn MethodResolver>>,
}

impl ResolverSet {
    /// Create an empty resolver set.
    #[must_use]
    pub fn new() -> Self {
        Self { resolvers: Vec::new() }
    }

    /// Register a resolver. Resolvers are tried in registration order.
    #[must_use]
    pub fn register(mut self, resolver: impl MethodResolver + 'static) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    /// Resolve a DID to its document using the matching method resolver.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MethodNotSupported`] if no registered resolver
    /// accepts the DID's method, or [`Error::InvalidDid`] if resolution
    /// itself fails.
    pub async fn resolve(&self, did: &str) -> Result<Document, Error> {
        let url = Url::from_str(did)?;
        let Some(resolver) = self.resolvers.iter().find(|r| r.method() == url.method) else {
            return Err(Error::MethodNotSupported(url.method));
        };
        resolver
            .resolve(&url.did())
            .await
            .map_err(|e| Error::InvalidDid(format!("{}: {e}", url.did())))
    }

    /// Dereference a DID URL to a verification method enabled for a purpose.
    ///
    /// The URL must carry a fragment naming the method. The method is located
    /// among the entries of the purpose's verification relationship, whether
    /// embedded or referenced into `verificationMethod`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidDidUrl`] if the URL has no fragment,
    /// [`Error::MethodNotSupported`] or [`Error::InvalidDid`] per
    /// [`Self::resolve`], or [`Error::NotFound`] if no enabled verification
    /// method matches.
    pub async fn dereference(
        &self, did_url: &str, purpose: &KeyPurpose,
    ) -> Result<VerificationMethod, Error> {
        let url = Url::from_str(did_url)?;
        if url.fragment.is_none() {
            return Err(Error::InvalidDidUrl(format!("{did_url} has no fragment")));
        }

        let document = self.resolve(&url.did()).await?;
        let Some(entries) = document.relationship(purpose) else {
            return Err(Error::NotFound(format!(
                "document {} declares no {purpose:?} methods",
                url.did()
            )));
        };

        let target = url.resource_id();
        for entry in entries {
            let vm = match entry.as_reference() {
                Some(reference) => {
                    let Some(vm) = document.method_by_id(reference) else {
                        continue;
                    };
                    vm
                }
                None => match entry.as_object() {
                    Some(vm) => vm,
                    None => continue,
                },
            };
            if vm.id == target || vm.id == did_url {
                return Ok(vm.clone());
            }
        }

        Err(Error::NotFound(format!("verification method {did_url} not found in document")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Kind;
    use crate::verification::KeyFormat;

    struct StaticResolver {
        document: Document,
    }

    #[async_trait]
    impl MethodResolver for StaticResolver {
        fn method(&self) -> &str {
            "example"
        }

        async fn resolve(&self, did: &str) -> anyhow::Result<Document> {
            if did == self.document.id {
                Ok(self.document.clone())
            } else {
                Err(anyhow::anyhow!("no document for {did}"))
            }
        }
    }

    fn document() -> Document {
        let vm = VerificationMethod {
            id: "did:example:abc#key1".to_string(),
            controller: "did:example:abc".to_string(),
            key: KeyFormat::Multikey {
                public_key_multibase: "z6MkmM42vxfqZQsv4ehtTjFFxQ4sQKS2w6WR7emozFAn5cxu"
                    .to_string(),
            },
        };
        Document {
            id: "did:example:abc".to_string(),
            verification_method: Some(vec![vm]),
            capability_delegation: Some(vec![Kind::String("did:example:abc#key1".to_string())]),
            ..Document::default()
        }
    }

    #[tokio::test]
    async fn dereference_by_reference() {
        let resolvers = ResolverSet::new().register(StaticResolver { document: document() });
        let vm = resolvers
            .dereference("did:example:abc#key1", &KeyPurpose::CapabilityDelegation)
            .await
            .expect("should dereference");
        assert_eq!(vm.id, "did:example:abc#key1");
    }

    #[tokio::test]
    async fn unknown_method() {
        let resolvers = ResolverSet::new().register(StaticResolver { document: document() });
        let err = resolvers
            .dereference("did:other:abc#key1", &KeyPurpose::CapabilityDelegation)
            .await
            .expect_err("should fail");
        assert!(matches!(err, Error::MethodNotSupported(_)));
    }

    #[tokio::test]
    async fn missing_fragment() {
        let resolvers = ResolverSet::new().register(StaticResolver { document: document() });
        let err = resolvers
            .dereference("did:example:abc", &KeyPurpose::CapabilityDelegation)
            .await
            .expect_err("should fail");
        assert!(matches!(err, Error::InvalidDidUrl(_)));
    }

    #[tokio::test]
    async fn wrong_purpose() {
        let resolvers = ResolverSet::new().register(StaticResolver { document: document() });
        let err = resolvers
            .dereference("did:example:abc#key1", &KeyPurpose::Authentication)
            .await
            .expect_err("should fail");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_method() {
        let resolvers = ResolverSet::new().register(StaticResolver { document: document() });
        let err = resolvers
            .dereference("did:example:abc#other", &KeyPurpose::CapabilityDelegation)
            .await
            .expect_err("should fail");
        assert!(matches!(err, Error::NotFound(_)));
    }
}
