//! Destructure DID URLs into strongly typed components.
//!
//! A DID URL is of the form `did:<method>:<method-specific-id>[#<fragment>]`.
//! The method-specific ID may itself contain colons; everything between the
//! second colon and the fragment separator belongs to it.

use std::fmt::Display;
use std::str::FromStr;

use crate::error::Error;

/// Structure of a DID URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Url {
    /// DID method.
    ///
    /// The specification calls for lowercase letters and digits. Which
    /// methods can actually be resolved depends on the resolvers registered
    /// with the [`crate::ResolverSet`].
    pub method: String,

    /// Method-specific ID.
    ///
    /// This may include any information that is needed by a DID method to
    /// address a specific DID document.
    pub id: String,

    /// Fragment.
    ///
    /// If present, the fragment identifies a specific resource within the
    /// DID document. Typically a verification method.
    pub fragment: Option<String>,
}

impl Display for Url {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "did:{}:{}", self.method, self.id)?;
        if let Some(fragment) = &self.fragment {
            write!(f, "#{fragment}")?;
        }
        Ok(())
    }
}

impl FromStr for Url {
    type Err = Error;

    /// Parse a string if possible into a strongly typed DID URL struct.
    ///
    /// Expecting a format: `did:<method>:<method-specific-id>[#<fragment>]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string does not have the expected form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, fragment) = match s.split_once('#') {
            Some((base, fragment)) => {
                if fragment.is_empty() {
                    return Err(Error::InvalidDidUrl(format!("{s} has an empty fragment")));
                }
                (base, Some(fragment.to_string()))
            }
            None => (s, None),
        };

        let parts = base.splitn(3, ':').collect::<Vec<_>>();
        if parts.len() < 3 {
            return Err(Error::InvalidDidUrl(s.to_string()));
        }
        if parts[0] != "did" {
            return Err(Error::InvalidDidUrl(format!("{s} does not start with 'did'")));
        }
        let method = parts[1];
        if method.is_empty()
            || !method.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(Error::InvalidDidUrl(format!("invalid method name in {s}")));
        }
        if parts[2].is_empty() {
            return Err(Error::InvalidDidUrl(format!("missing method-specific id: {s}")));
        }

        Ok(Self {
            method: method.to_string(),
            id: parts[2].to_string(),
            fragment,
        })
    }
}

impl Url {
    /// Get the internal resource identifier from the DID URL.
    ///
    /// This is in the form of `did:<method>:<method-specific-id>#<fragment>`
    /// and is used to dereference a verification method that is internal to
    /// the DID document.
    ///
    /// Note this is unreliable as an ID if there is no fragment on the URL.
    #[must_use]
    pub fn resource_id(&self) -> String {
        let mut id = format!("did:{}:{}", self.method, self.id);
        if let Some(ref fragment) = self.fragment {
            id.push_str(&format!("#{fragment}"));
        }
        id
    }

    /// Get the DID part of the URL.
    ///
    /// This is in the form of `did:<method>:<method-specific-id>`.
    #[must_use]
    pub fn did(&self) -> String {
        format!("did:{}:{}", self.method, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_url() {
        let url = Url::from_str("did:key:123456789abcdefghi#key-1").unwrap();
        assert_eq!(url.method, "key");
        assert_eq!(url.id, "123456789abcdefghi");
        assert_eq!(url.fragment, Some("key-1".to_string()));
        assert_eq!(url.resource_id(), "did:key:123456789abcdefghi#key-1");
        assert_eq!(url.to_string(), "did:key:123456789abcdefghi#key-1");
    }

    #[test]
    fn no_fragment() {
        let url = Url::from_str("did:example:abc").unwrap();
        assert_eq!(url.method, "example");
        assert_eq!(url.id, "abc");
        assert_eq!(url.fragment, None);
        assert_eq!(url.did(), "did:example:abc");
        assert_eq!(url.resource_id(), "did:example:abc");
    }

    #[test]
    fn id_with_colons() {
        let url = Url::from_str("did:web:example.com:alice#owner").unwrap();
        assert_eq!(url.method, "web");
        assert_eq!(url.id, "example.com:alice");
        assert_eq!(url.fragment, Some("owner".to_string()));
    }

    #[test]
    fn invalid_urls() {
        assert!(Url::from_str("nodid:key:abc").is_err());
        assert!(Url::from_str("did:key").is_err());
        assert!(Url::from_str("did:KEY:abc").is_err());
        assert!(Url::from_str("did:key:").is_err());
        assert!(Url::from_str("did:key:abc#").is_err());
    }
}
