//! # DID Document
//!
//! A DID Document is a JSON-LD document that contains information related to
//! a DID: its verification methods and the relationships they are authorized
//! for.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::Kind;
use crate::verification::{KeyPurpose, VerificationMethod};

/// The default JSON-LD context for DID documents.
pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";

/// DID document. Carries only the properties this system consumes; unknown
/// properties in a resolved document are ignored.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// The JSON-LD context of the DID document.
    #[serde(rename = "@context")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<Kind<Value>>>,

    /// The DID of the document's subject.
    pub id: String,

    /// The DID of the entity authorized to make changes to the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    /// Verification methods declared by the document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<Vec<VerificationMethod>>,

    /// Methods usable to authenticate as the DID subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Vec<Kind<VerificationMethod>>>,

    /// Methods usable to assert claims on behalf of the DID subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_method: Option<Vec<Kind<VerificationMethod>>>,

    /// Methods usable to invoke capabilities as the DID subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_invocation: Option<Vec<Kind<VerificationMethod>>>,

    /// Methods usable to delegate capabilities on behalf of the DID subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_delegation: Option<Vec<Kind<VerificationMethod>>>,
}

impl Document {
    /// The verification relationship entries for a purpose, if declared.
    #[must_use]
    pub const fn relationship(
        &self, purpose: &KeyPurpose,
    ) -> Option<&Vec<Kind<VerificationMethod>>> {
        match purpose {
            KeyPurpose::Authentication => self.authentication.as_ref(),
            KeyPurpose::AssertionMethod => self.assertion_method.as_ref(),
            KeyPurpose::CapabilityInvocation => self.capability_invocation.as_ref(),
            KeyPurpose::CapabilityDelegation => self.capability_delegation.as_ref(),
        }
    }

    /// Look up a declared verification method by its full ID.
    #[must_use]
    pub fn method_by_id(&self, id: &str) -> Option<&VerificationMethod> {
        self.verification_method.as_ref()?.iter().find(|vm| vm.id == id)
    }
}
