//! # Capability Documents
//!
//! A capability is a JSON document delegating narrow rights from a
//! controller to an invoker: a target to act on, the actions allowed,
//! caveats restricting when it is honoured, and the chain of ancestor
//! capability IDs back to a root authority. The document is signed over its
//! JCS canonical form, so key order and whitespace never affect a proof.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::binding::SignatureBinding;
use crate::error::Error;

/// JSON-LD context carried by every capability document.
pub const SECURITY_CONTEXT: &str = "https://w3id.org/security/v2";

/// Proof type emitted for locally signed capabilities.
const PROOF_TYPE: &str = "Ed25519Signature2020";

/// Proof purpose for delegated capabilities.
const PROOF_PURPOSE: &str = "capabilityDelegation";

/// An authorization capability.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Capability {
    /// JSON-LD context.
    #[serde(rename = "@context")]
    pub context: String,

    /// Unique ID of the capability, a URN.
    pub id: String,

    /// DID (or DID URL) of the party entitled to invoke the capability.
    pub invoker: String,

    /// DID of the authority that issued the capability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    /// ID of the parent capability this one was delegated from. Absent on a
    /// root capability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,

    /// The resource the capability authorizes action on.
    pub invocation_target: Target,

    /// Actions the invoker may perform against the target.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub allowed_actions: Vec<String>,

    /// Restrictions on honouring the capability.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub caveats: Vec<Caveat>,

    /// IDs of ancestor capabilities, root first. Empty on a root capability.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub capability_chain: Vec<String>,

    /// When the capability was issued. Caveat durations count from here.
    pub issued_at: DateTime<Utc>,

    /// Proof binding the document to the delegator's key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl Capability {
    /// Whether this capability is a root: no parent and no ancestry.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none() && self.capability_chain.is_empty()
    }

    /// The canonical signing input: the JCS form of the document with the
    /// proof's `proofValue` removed. Proof metadata itself is covered by the
    /// signature.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidCapability`] if the document cannot be
    /// serialized or canonicalized.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut document =
            serde_json::to_value(self).map_err(|e| Error::InvalidCapability(e.to_string()))?;
        if let Some(proof) =
            document.get_mut("proof").and_then(serde_json::Value::as_object_mut)
        {
            proof.remove("proofValue");
        }
        serde_json_canonicalizer::to_string(&document)
            .map(String::into_bytes)
            .map_err(|e| Error::InvalidCapability(e.to_string()))
    }
}

/// The resource a capability authorizes action on.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Target {
    /// Identifier of the resource, e.g. a registered query's location.
    pub id: String,

    /// The kind of resource.
    #[serde(rename = "type")]
    pub type_: String,
}

/// A machine-checked restriction on honouring a capability.
///
/// The set of kinds is closed at any moment but open to extension: a
/// presented capability carrying an unrecognized kind fails at decode time
/// rather than being silently honoured.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Caveat {
    /// The capability is honoured only before `issuedAt + duration`.
    #[serde(rename = "expiry")]
    Expiry {
        /// Lifetime in seconds, counted from the capability's issue time.
        duration: u64,
    },
}

/// A linked-data proof over a capability document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    /// Signature suite, e.g. `Ed25519Signature2020`.
    #[serde(rename = "type")]
    pub type_: String,

    /// When the proof was created.
    pub created: DateTime<Utc>,

    /// DID URL of the verification method the proof verifies against.
    pub verification_method: String,

    /// What the proof is for. Always `capabilityDelegation` here.
    pub proof_purpose: String,

    /// The signature, base64url without padding.
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub proof_value: String,
}

/// Builds and signs capabilities.
///
/// A root capability is built without a parent; a delegated one extends a
/// parent, inheriting its ancestry with the parent's own ID appended.
#[derive(Debug, Default)]
pub struct CapabilityBuilder {
    invoker: String,
    controller: Option<String>,
    parent: Option<String>,
    target: Option<Target>,
    allowed_actions: Vec<String>,
    caveats: Vec<Caveat>,
    capability_chain: Vec<String>,
    verification_method: Option<String>,
}

impl CapabilityBuilder {
    /// Start a new capability.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The party entitled to invoke the capability.
    #[must_use]
    pub fn invoker(mut self, invoker: impl Into<String>) -> Self {
        self.invoker = invoker.into();
        self
    }

    /// The authority issuing the capability.
    #[must_use]
    pub fn controller(mut self, controller: impl Into<String>) -> Self {
        self.controller = Some(controller.into());
        self
    }

    /// Delegate from a parent capability.
    ///
    /// Sets the parent link and extends the parent's ancestry with the
    /// parent itself, keeping the chain root-first.
    #[must_use]
    pub fn parent(mut self, parent: &Capability) -> Self {
        self.parent = Some(parent.id.clone());
        let mut chain = parent.capability_chain.clone();
        chain.push(parent.id.clone());
        self.capability_chain = chain;
        self
    }

    /// The resource the capability authorizes action on.
    #[must_use]
    pub fn invocation_target(mut self, id: impl Into<String>, type_: impl Into<String>) -> Self {
        self.target = Some(Target { id: id.into(), type_: type_.into() });
        self
    }

    /// Permit an action against the target.
    #[must_use]
    pub fn allowed_action(mut self, action: impl Into<String>) -> Self {
        self.allowed_actions.push(action.into());
        self
    }

    /// Attach a caveat.
    #[must_use]
    pub fn caveat(mut self, caveat: Caveat) -> Self {
        self.caveats.push(caveat);
        self
    }

    /// DID URL of the key that will sign the capability.
    #[must_use]
    pub fn verification_method(mut self, did_url: impl Into<String>) -> Self {
        self.verification_method = Some(did_url.into());
        self
    }

    /// Assemble the capability and sign it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidCapability`] if the invoker, target or
    /// verification method is missing, or with the binding's error if the
    /// signing key cannot be dereferenced or used.
    pub async fn sign(self, binding: &SignatureBinding) -> Result<Capability, Error> {
        if self.invoker.is_empty() {
            return Err(Error::InvalidCapability("invoker is required".to_string()));
        }
        let Some(target) = self.target else {
            return Err(Error::InvalidCapability("invocation target is required".to_string()));
        };
        let Some(verification_method) = self.verification_method else {
            return Err(Error::InvalidCapability("verification method is required".to_string()));
        };

        let issued_at = Utc::now();
        let mut capability = Capability {
            context: SECURITY_CONTEXT.to_string(),
            id: Uuid::new_v4().urn().to_string(),
            invoker: self.invoker,
            controller: self.controller,
            parent: self.parent,
            invocation_target: target,
            allowed_actions: self.allowed_actions,
            caveats: self.caveats,
            capability_chain: self.capability_chain,
            issued_at,
            proof: Some(Proof {
                type_: PROOF_TYPE.to_string(),
                created: issued_at,
                verification_method: verification_method.clone(),
                proof_purpose: PROOF_PURPOSE.to_string(),
                proof_value: String::new(),
            }),
        };

        let signing_bytes = capability.signing_bytes()?;
        let signature = binding.sign(&verification_method, &signing_bytes).await?;
        if let Some(proof) = capability.proof.as_mut() {
            proof.proof_value = Base64UrlUnpadded::encode_string(&signature);
        }
        Ok(capability)
    }
}
