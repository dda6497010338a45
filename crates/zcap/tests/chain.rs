//! Delegation chain scenarios: a service roots authority for an
//! organization, the organization delegates to a third party, and a verifier
//! holding only the ancestors checks what the third party presents.

use std::collections::HashMap;
use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use confida_did::key::did_key_url;
use confida_did::{KeyResolver, ResolverSet};
use confida_kms::Keyring;
use confida_zcap::{
    compress, decompress, verify_capability, Capability, CapabilityBuilder, Caveat, Error,
    Proof, SignatureBinding,
};

struct Realm {
    binding: SignatureBinding,
    service_key: String,
    org_key: String,
    party_key: String,
}

impl Realm {
    fn new() -> Self {
        let keyring = Keyring::new();
        let service_key = did_key_url(&keyring.generate().verifying_key).unwrap();
        let org_key = did_key_url(&keyring.generate().verifying_key).unwrap();
        let party_key = did_key_url(&keyring.generate().verifying_key).unwrap();
        let resolvers = ResolverSet::new().register(KeyResolver);
        Self { binding: SignatureBinding::new(resolvers, keyring), service_key, org_key, party_key }
    }

    /// Root capability: the service entitles the organization to its
    /// profile.
    async fn root(&self) -> Capability {
        CapabilityBuilder::new()
            .invoker(&self.org_key)
            .controller("did:example:service")
            .invocation_target("urn:uuid:profile-1", "urn:example:profile")
            .allowed_action("read")
            .allowed_action("reference")
            .verification_method(&self.service_key)
            .sign(&self.binding)
            .await
            .expect("should sign root")
    }

    /// The organization delegates a query reference to the third party.
    async fn delegate(&self, parent: &Capability, caveats: Vec<Caveat>) -> Capability {
        let mut builder = CapabilityBuilder::new()
            .parent(parent)
            .invoker(&self.party_key)
            .invocation_target(
                "https://hub.example.com/hubstore/profiles/p1/queries/q1",
                "urn:example:query",
            )
            .allowed_action("reference")
            .verification_method(&self.org_key);
        for caveat in caveats {
            builder = builder.caveat(caveat);
        }
        builder.sign(&self.binding).await.expect("should sign delegation")
    }
}

fn fetch_from(
    ancestors: &[Capability],
) -> impl Fn(String) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<Option<Capability>>>>>
{
    let store: Arc<HashMap<String, Capability>> = Arc::new(
        ancestors.iter().map(|c| (c.id.clone(), c.clone())).collect(),
    );
    move |id: String| {
        let store = Arc::clone(&store);
        Box::pin(async move { Ok(store.get(&id).cloned()) })
    }
}

#[tokio::test]
async fn delegated_capability_verifies() {
    let realm = Realm::new();
    let root = realm.root().await;
    let child = realm.delegate(&root, Vec::new()).await;

    verify_capability(&child, Utc::now(), "reference", &realm.binding, fetch_from(&[root]))
        .await
        .expect("chain should verify");
}

#[tokio::test]
async fn root_verifies_standalone() {
    let realm = Realm::new();
    let root = realm.root().await;

    verify_capability(&root, Utc::now(), "read", &realm.binding, fetch_from(&[]))
        .await
        .expect("root should verify");
}

#[tokio::test]
async fn only_the_presented_capability_needs_the_action() {
    let realm = Realm::new();
    // Root allows only "read"; the delegation allows "reference".
    let root = CapabilityBuilder::new()
        .invoker(&realm.org_key)
        .invocation_target("urn:uuid:profile-1", "urn:example:profile")
        .allowed_action("read")
        .verification_method(&realm.service_key)
        .sign(&realm.binding)
        .await
        .unwrap();
    let child = realm.delegate(&root, Vec::new()).await;

    verify_capability(&child, Utc::now(), "reference", &realm.binding, fetch_from(&[root]))
        .await
        .expect("action is checked on the presented capability only");
}

#[tokio::test]
async fn disallowed_action() {
    let realm = Realm::new();
    let root = realm.root().await;
    let child = realm.delegate(&root, Vec::new()).await;

    let err = verify_capability(
        &child,
        Utc::now(),
        "write",
        &realm.binding,
        fetch_from(&[root]),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err, Error::ActionNotPermitted(_)));
}

#[tokio::test]
async fn expired_delegation() {
    let realm = Realm::new();
    let root = realm.root().await;
    let child = realm.delegate(&root, vec![Caveat::Expiry { duration: 0 }]).await;

    let err = verify_capability(
        &child,
        Utc::now(),
        "reference",
        &realm.binding,
        fetch_from(&[root]),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err, Error::CapabilityExpired));
}

#[tokio::test]
async fn live_delegation_within_caveat() {
    let realm = Realm::new();
    let root = realm.root().await;
    let child = realm.delegate(&root, vec![Caveat::Expiry { duration: 600 }]).await;

    verify_capability(&child, Utc::now(), "reference", &realm.binding, fetch_from(&[root]))
        .await
        .expect("should verify inside the caveat window");
}

#[tokio::test]
async fn expired_ancestor_fails_the_chain() {
    let realm = Realm::new();
    let root = CapabilityBuilder::new()
        .invoker(&realm.org_key)
        .invocation_target("urn:uuid:profile-1", "urn:example:profile")
        .allowed_action("reference")
        .caveat(Caveat::Expiry { duration: 0 })
        .verification_method(&realm.service_key)
        .sign(&realm.binding)
        .await
        .unwrap();
    let child = realm.delegate(&root, Vec::new()).await;

    let err = verify_capability(
        &child,
        Utc::now(),
        "reference",
        &realm.binding,
        fetch_from(&[root]),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err, Error::CapabilityExpired));
}

#[tokio::test]
async fn tampered_document_fails_signature() {
    let realm = Realm::new();
    let root = realm.root().await;
    let mut child = realm.delegate(&root, Vec::new()).await;
    child.invoker = "did:example:mallory".to_string();

    let err = verify_capability(
        &child,
        Utc::now(),
        "reference",
        &realm.binding,
        fetch_from(&[root]),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err, Error::InvalidSignature));
}

#[tokio::test]
async fn corrupted_signature_byte_fails_as_invalid() {
    let realm = Realm::new();
    let root = realm.root().await;
    let mut child = realm.delegate(&root, Vec::new()).await;

    let proof = child.proof.as_mut().expect("should be signed");
    let mut signature =
        Base64UrlUnpadded::decode_vec(&proof.proof_value).expect("should decode signature");
    signature[0] ^= 0x01;
    proof.proof_value = Base64UrlUnpadded::encode_string(&signature);

    // Still well formed on the wire; only verification rejects it.
    let presented =
        decompress(&compress(&child).expect("should compress")).expect("should decode");
    let err = verify_capability(
        &presented,
        Utc::now(),
        "reference",
        &realm.binding,
        fetch_from(&[root]),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err, Error::InvalidSignature));
}

#[tokio::test]
async fn missing_ancestor() {
    let realm = Realm::new();
    let root = realm.root().await;
    let child = realm.delegate(&root, Vec::new()).await;

    let err = verify_capability(
        &child,
        Utc::now(),
        "reference",
        &realm.binding,
        fetch_from(&[]),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err, Error::BrokenCapabilityChain(_)));
}

#[tokio::test]
async fn delegation_by_a_stranger() {
    let realm = Realm::new();
    let root = realm.root().await;
    // A valid signature by the wrong delegator: the party signs a delegation
    // only the org (the root's invoker) may make.
    let forged = sign_raw(
        Capability { invoker: "did:example:mallory".to_string(), ..child_shape(&root) },
        &realm.binding,
        &realm.party_key,
    )
    .await;

    let err = verify_capability(
        &forged,
        Utc::now(),
        "reference",
        &realm.binding,
        fetch_from(&[root]),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err, Error::BrokenCapabilityChain(_)));
}

#[tokio::test]
async fn inconsistent_parent_link() {
    let realm = Realm::new();
    let root = realm.root().await;
    // Valid proof over a document whose chain does not end with its parent.
    let forged = sign_raw(
        Capability {
            parent: Some(root.id.clone()),
            capability_chain: vec!["urn:uuid:someone-else".to_string()],
            ..child_shape(&root)
        },
        &realm.binding,
        &realm.org_key,
    )
    .await;

    let err = verify_capability(
        &forged,
        Utc::now(),
        "reference",
        &realm.binding,
        fetch_from(&[root]),
    )
    .await
    .expect_err("should fail");
    assert!(matches!(err, Error::BrokenCapabilityChain(_)));
}

#[tokio::test]
async fn survives_the_wire() {
    let realm = Realm::new();
    let root = realm.root().await;
    let child = realm.delegate(&root, vec![Caveat::Expiry { duration: 600 }]).await;

    let token = compress(&child).expect("should compress");
    let presented = decompress(&token).expect("should decompress");
    assert_eq!(presented, child);

    verify_capability(
        &presented,
        Utc::now(),
        "reference",
        &realm.binding,
        fetch_from(&[root]),
    )
    .await
    .expect("decoded capability should verify");
}

/// A child document shell matching what [`Realm::delegate`] builds.
fn child_shape(root: &Capability) -> Capability {
    Capability {
        context: confida_zcap::SECURITY_CONTEXT.to_string(),
        id: "urn:uuid:forged-1".to_string(),
        invoker: "did:example:party".to_string(),
        controller: None,
        parent: Some(root.id.clone()),
        invocation_target: confida_zcap::Target {
            id: "https://hub.example.com/hubstore/profiles/p1/queries/q1".to_string(),
            type_: "urn:example:query".to_string(),
        },
        allowed_actions: vec!["reference".to_string()],
        caveats: Vec::new(),
        capability_chain: vec![root.id.clone()],
        issued_at: Utc::now(),
        proof: None,
    }
}

/// Sign an arbitrary capability document with the given key.
async fn sign_raw(
    mut capability: Capability, binding: &SignatureBinding, key_url: &str,
) -> Capability {
    capability.proof = Some(Proof {
        type_: "Ed25519Signature2020".to_string(),
        created: capability.issued_at,
        verification_method: key_url.to_string(),
        proof_purpose: "capabilityDelegation".to_string(),
        proof_value: String::new(),
    });
    let bytes = capability.signing_bytes().expect("should canonicalize");
    let signature = binding.sign(key_url, &bytes).await.expect("should sign");
    if let Some(proof) = capability.proof.as_mut() {
        proof.proof_value = Base64UrlUnpadded::encode_string(&signature);
    }
    capability
}
