//! # Chain Verification
//!
//! Verifies a presented capability against its declared ancestry and the
//! current request context. Verification is transitive and stateless per
//! call: every proof in the chain is re-checked and caveats are evaluated
//! against a wall clock passed in explicitly, so a cached verdict can never
//! mask an expired or tampered delegation. Revoking a delegation is a matter
//! of no longer serving the ancestor from the fetch callback.

use std::future::Future;
use std::str::FromStr;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeDelta, Utc};
use confida_did::Url;

use crate::binding::SignatureBinding;
use crate::capability::{Capability, Caveat};
use crate::error::Error;

/// Verify a capability and its delegation chain.
///
/// The required action is checked against the presented (outermost)
/// capability only; ancestors need not individually list it. Every
/// capability from the presented one back to the root is then checked: its
/// proof must verify against its verification method, no caveat may be
/// violated at `now`, its `parent` link must equal the last entry of its
/// chain, and each ancestor's invoker must control the key that signed the
/// capability delegated from it.
///
/// Ancestors are fetched by ID through `fetch`. The walk holds no lock
/// across the callback and terminates at a capability with no parent.
///
/// # Errors
///
/// Fails with [`Error::ActionNotPermitted`] if the action is not allowed,
/// [`Error::InvalidSignature`] if any proof does not verify,
/// [`Error::CapabilityExpired`] if any caveat is violated, or
/// [`Error::BrokenCapabilityChain`] if the ancestry is inconsistent or an
/// ancestor cannot be fetched.
pub async fn verify_capability<F, Fut>(
    capability: &Capability, now: DateTime<Utc>, required_action: &str,
    binding: &SignatureBinding, fetch: F,
) -> Result<(), Error>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<Capability>>>,
{
    if !capability.allowed_actions.iter().any(|action| action == required_action) {
        return Err(Error::ActionNotPermitted(required_action.to_string()));
    }

    let mut current = capability.clone();
    loop {
        let signer = verify_proof(&current, binding).await?;
        check_caveats(&current, now)?;

        let Some(parent_id) = current.parent.clone() else {
            if !current.capability_chain.is_empty() {
                return Err(Error::BrokenCapabilityChain(format!(
                    "{} has no parent but declares ancestors",
                    current.id
                )));
            }
            return Ok(());
        };

        if current.capability_chain.last() != Some(&parent_id) {
            return Err(Error::BrokenCapabilityChain(format!(
                "parent of {} is not the last chain entry",
                current.id
            )));
        }

        let parent = match fetch(parent_id.clone()).await {
            Ok(Some(parent)) => parent,
            Ok(None) => {
                return Err(Error::BrokenCapabilityChain(format!(
                    "ancestor {parent_id} is unavailable"
                )));
            }
            Err(e) => {
                return Err(Error::BrokenCapabilityChain(format!(
                    "ancestor {parent_id}: {e}"
                )));
            }
        };
        if parent.id != parent_id {
            return Err(Error::BrokenCapabilityChain(format!(
                "fetched ancestor has id {}, expected {parent_id}",
                parent.id
            )));
        }
        if did_part(&parent.invoker) != did_part(&signer) {
            return Err(Error::BrokenCapabilityChain(format!(
                "{} was not signed by the invoker of {parent_id}",
                current.id
            )));
        }
        let prefix = &current.capability_chain[..current.capability_chain.len() - 1];
        if parent.capability_chain != prefix {
            return Err(Error::BrokenCapabilityChain(format!(
                "ancestry of {parent_id} does not match the presented chain"
            )));
        }

        // The chain shrinks by one entry per step, so the walk terminates.
        current = parent;
    }
}

/// Verify the capability's proof, returning the signing verification
/// method's DID URL.
async fn verify_proof(
    capability: &Capability, binding: &SignatureBinding,
) -> Result<String, Error> {
    let Some(proof) = &capability.proof else {
        return Err(Error::InvalidCapability(format!("{} has no proof", capability.id)));
    };
    let signature = Base64UrlUnpadded::decode_vec(&proof.proof_value)
        .map_err(|_| Error::InvalidSignature)?;
    let signing_bytes = capability.signing_bytes()?;
    binding.verify(&proof.verification_method, &signing_bytes, &signature).await?;
    Ok(proof.verification_method.clone())
}

fn check_caveats(capability: &Capability, now: DateTime<Utc>) -> Result<(), Error> {
    for caveat in &capability.caveats {
        match caveat {
            Caveat::Expiry { duration } => {
                // A duration beyond the representable range never expires.
                let expiry = i64::try_from(*duration)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|lifetime| capability.issued_at.checked_add_signed(lifetime));
                if let Some(expiry) = expiry {
                    if now >= expiry {
                        return Err(Error::CapabilityExpired);
                    }
                }
            }
        }
    }
    Ok(())
}

/// The DID part of a DID URL, or the string itself when it is not one.
fn did_part(s: &str) -> String {
    Url::from_str(s).map_or_else(|_| s.to_string(), |url| url.did())
}

#[cfg(test)]
mod tests {
    use crate::capability::{Target, SECURITY_CONTEXT};

    use super::*;

    fn capability(duration: Option<u64>) -> Capability {
        Capability {
            context: SECURITY_CONTEXT.to_string(),
            id: "urn:uuid:c1".to_string(),
            invoker: "did:example:alice".to_string(),
            controller: None,
            parent: None,
            invocation_target: Target {
                id: "urn:uuid:p1".to_string(),
                type_: "urn:example:profile".to_string(),
            },
            allowed_actions: vec!["read".to_string()],
            caveats: duration.map_or_else(Vec::new, |d| vec![Caveat::Expiry { duration: d }]),
            capability_chain: Vec::new(),
            issued_at: "2026-01-02T03:04:05Z".parse().unwrap(),
            proof: None,
        }
    }

    #[test]
    fn expiry_is_exclusive_of_the_deadline() {
        let capability = capability(Some(300));
        let issued = capability.issued_at;

        assert!(check_caveats(&capability, issued).is_ok());
        assert!(check_caveats(&capability, issued + TimeDelta::seconds(299)).is_ok());
        let err = check_caveats(&capability, issued + TimeDelta::seconds(300))
            .expect_err("should expire");
        assert!(matches!(err, Error::CapabilityExpired));
    }

    #[test]
    fn zero_duration_is_immediately_expired() {
        let capability = capability(Some(0));
        let err =
            check_caveats(&capability, capability.issued_at).expect_err("should expire");
        assert!(matches!(err, Error::CapabilityExpired));
    }

    #[test]
    fn unrepresentable_duration_never_expires() {
        let capability = capability(Some(u64::MAX));
        let far = capability.issued_at + TimeDelta::days(365 * 1000);
        assert!(check_caveats(&capability, far).is_ok());
    }

    #[test]
    fn no_caveats_no_expiry() {
        let capability = capability(None);
        let far = capability.issued_at + TimeDelta::days(365 * 1000);
        assert!(check_caveats(&capability, far).is_ok());
    }

    #[test]
    fn did_part_strips_fragment() {
        assert_eq!(did_part("did:key:z6Mk#z6Mk"), "did:key:z6Mk");
        assert_eq!(did_part("did:example:abc"), "did:example:abc");
        assert_eq!(did_part("not-a-did"), "not-a-did");
    }
}
