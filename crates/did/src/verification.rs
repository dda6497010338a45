//! # Verification Methods
//!
//! A verification method is a public key, with a declared type/curve,
//! authorized for specific relationships in a DID document. This module also
//! maps a method's declared type/curve to the concrete signature algorithm
//! used to check proofs made with it.

use base64ct::{Base64UrlUnpadded, Encoding};
use confida_kms::Algorithm;
use multibase::Base;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Multicodec prefix for an Ed25519 public key.
const ED25519_CODEC: [u8; 2] = [0xed, 0x01];

/// A public key expressed as a JWK.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct PublicKeyJwk {
    /// Key type. `OKP` for Ed25519, `EC` for the NIST curves.
    pub kty: String,

    /// Curve name. One of `Ed25519`, `P-256`, `P-384`, `P-521`.
    pub crv: String,

    /// The x-coordinate (or raw key for `OKP`), base64url-encoded.
    pub x: String,

    /// The y-coordinate for `EC` keys, base64url-encoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

impl PublicKeyJwk {
    /// Build an Ed25519 JWK from raw public key bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not 32 bytes.
    pub fn from_bytes(key: &[u8]) -> Result<Self, Error> {
        if key.len() != 32 {
            return Err(Error::InvalidKey("Ed25519 key must be 32 bytes".into()));
        }
        Ok(Self {
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            x: Base64UrlUnpadded::encode_string(key),
            y: None,
        })
    }

    /// Encode the key as a multibase string (Ed25519 only).
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not an Ed25519 `OKP` key or the
    /// x-coordinate cannot be decoded.
    pub fn to_multibase(&self) -> Result<String, Error> {
        if self.kty != "OKP" || self.crv != "Ed25519" {
            return Err(Error::UnsupportedKeyType(format!("{}/{}", self.kty, self.crv)));
        }
        let key = Base64UrlUnpadded::decode_vec(&self.x)
            .map_err(|e| Error::InvalidKey(format!("x-coordinate: {e}")))?;
        let mut codec = ED25519_CODEC.to_vec();
        codec.extend_from_slice(&key);
        Ok(multibase::encode(Base::Base58Btc, codec))
    }

    /// Decode a multibase-encoded Ed25519 key into a JWK.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not multibase, or the decoded bytes
    /// do not carry the Ed25519 multicodec prefix.
    pub fn from_multibase(multibase: &str) -> Result<Self, Error> {
        let key = decode_multikey(multibase)?;
        Self::from_bytes(&key)
    }
}

/// Decode an Ed25519 multikey into raw public key bytes.
fn decode_multikey(multibase: &str) -> Result<Vec<u8>, Error> {
    let (_, decoded) = multibase::decode(multibase)
        .map_err(|e| Error::InvalidKey(format!("multibase: {e}")))?;
    let Some(key) = decoded.strip_prefix(&ED25519_CODEC[..]) else {
        return Err(Error::UnsupportedKeyType("not an Ed25519 multikey".into()));
    };
    Ok(key.to_vec())
}

/// The format of the public key material.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all_fields = "camelCase")]
#[serde(tag = "type")]
pub enum KeyFormat {
    /// The key is encoded as a Multibase string.
    #[serde(alias = "Ed25519VerificationKey2020")]
    Multikey {
        /// The public key encoded as a Multibase.
        public_key_multibase: String,
    },

    /// The key is encoded as a JWK.
    #[serde(rename = "JsonWebKey2020", alias = "JsonWebKey")]
    JsonWebKey {
        /// The public key encoded as a JWK.
        public_key_jwk: PublicKeyJwk,
    },
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self::Multikey {
            public_key_multibase: String::new(),
        }
    }
}

impl From<PublicKeyJwk> for KeyFormat {
    fn from(jwk: PublicKeyJwk) -> Self {
        Self::JsonWebKey { public_key_jwk: jwk }
    }
}

impl From<String> for KeyFormat {
    fn from(multibase: String) -> Self {
        Self::Multikey {
            public_key_multibase: multibase,
        }
    }
}

/// A DID document verification method.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// A DID URL that identifies the verification method.
    pub id: String,

    /// The DID of the controller of the verification method.
    pub controller: String,

    /// The format of the public key material.
    #[serde(flatten)]
    pub key: KeyFormat,
}

impl VerificationMethod {
    /// Infer the DID from the key ID.
    #[must_use]
    pub fn did(&self) -> String {
        self.id.split('#').next().unwrap_or_default().to_string()
    }

    /// Map the declared type/curve to a concrete signature algorithm.
    ///
    /// Supported: Ed25519 keys (multikey or `OKP/Ed25519` JWK) map to
    /// `EdDSA`; `EC` JWKs on P-256, P-384 and P-521 map to the corresponding
    /// ECDSA variant.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnsupportedKeyType`] for any other type/curve
    /// pair.
    pub fn algorithm(&self) -> Result<Algorithm, Error> {
        match &self.key {
            KeyFormat::Multikey { public_key_multibase } => {
                decode_multikey(public_key_multibase)?;
                Ok(Algorithm::EdDSA)
            }
            KeyFormat::JsonWebKey { public_key_jwk } => {
                match (public_key_jwk.kty.as_str(), public_key_jwk.crv.as_str()) {
                    ("OKP", "Ed25519") => Ok(Algorithm::EdDSA),
                    ("EC", "P-256") => Ok(Algorithm::ES256),
                    ("EC", "P-384") => Ok(Algorithm::ES384),
                    ("EC", "P-521") => Ok(Algorithm::ES512),
                    (kty, crv) => Err(Error::UnsupportedKeyType(format!("{kty}/{crv}"))),
                }
            }
        }
    }

    /// Decode the raw public key bytes from either key format.
    ///
    /// Ed25519 keys yield 32 raw bytes; `EC` keys yield an uncompressed SEC1
    /// point (`0x04 || x || y`).
    ///
    /// # Errors
    ///
    /// Returns an error if the key material cannot be decoded, or an `EC` key
    /// is missing its y-coordinate.
    pub fn public_key_bytes(&self) -> Result<Vec<u8>, Error> {
        match &self.key {
            KeyFormat::Multikey { public_key_multibase } => decode_multikey(public_key_multibase),
            KeyFormat::JsonWebKey { public_key_jwk } => {
                let x = Base64UrlUnpadded::decode_vec(&public_key_jwk.x)
                    .map_err(|e| Error::InvalidKey(format!("x-coordinate: {e}")))?;
                if public_key_jwk.kty == "OKP" {
                    return Ok(x);
                }
                let Some(y) = &public_key_jwk.y else {
                    return Err(Error::InvalidKey("EC key is missing y-coordinate".into()));
                };
                let y = Base64UrlUnpadded::decode_vec(y)
                    .map_err(|e| Error::InvalidKey(format!("y-coordinate: {e}")))?;
                let mut sec1 = vec![0x04];
                sec1.extend_from_slice(&x);
                sec1.extend_from_slice(&y);
                Ok(sec1)
            }
        }
    }
}

/// The purpose key material will be used for.
#[derive(Clone, Debug, Deserialize, Hash, PartialEq, Serialize, Eq)]
pub enum KeyPurpose {
    /// The document's `authentication` field.
    Authentication,

    /// The document's `assertion_method` field.
    AssertionMethod,

    /// The document's `capability_invocation` field.
    CapabilityInvocation,

    /// The document's `capability_delegation` field.
    CapabilityDelegation,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTIKEY: &str = "z6MkmM42vxfqZQsv4ehtTjFFxQ4sQKS2w6WR7emozFAn5cxu";

    #[test]
    fn multibase_round_trip() {
        let jwk = PublicKeyJwk::from_multibase(MULTIKEY).unwrap();
        assert_eq!(jwk.kty, "OKP");
        assert_eq!(jwk.crv, "Ed25519");
        assert_eq!(jwk.x, "Zmq-CJA17UpFeVmJ-nIKDuDEhUnoRSNIXFbxyBtCh6Y");
        assert_eq!(jwk.to_multibase().unwrap(), MULTIKEY);
    }

    #[test]
    fn multikey_serde_shape() {
        let vm = VerificationMethod {
            id: format!("did:key:{MULTIKEY}#{MULTIKEY}"),
            controller: format!("did:key:{MULTIKEY}"),
            key: KeyFormat::Multikey {
                public_key_multibase: MULTIKEY.to_string(),
            },
        };
        let ser = serde_json::to_value(&vm).unwrap();
        let json = serde_json::json!({
            "id": format!("did:key:{MULTIKEY}#{MULTIKEY}"),
            "controller": format!("did:key:{MULTIKEY}"),
            "type": "Multikey",
            "publicKeyMultibase": MULTIKEY,
        });
        assert_eq!(ser, json);
    }

    #[test]
    fn legacy_type_alias() {
        let json = serde_json::json!({
            "id": "did:example:abc#key1",
            "controller": "did:example:abc",
            "type": "Ed25519VerificationKey2020",
            "publicKeyMultibase": MULTIKEY,
        });
        let vm: VerificationMethod = serde_json::from_value(json).unwrap();
        assert_eq!(vm.algorithm().unwrap(), Algorithm::EdDSA);
    }

    #[test]
    fn algorithm_mapping() {
        let multikey = VerificationMethod {
            key: KeyFormat::Multikey {
                public_key_multibase: MULTIKEY.to_string(),
            },
            ..VerificationMethod::default()
        };
        assert_eq!(multikey.algorithm().unwrap(), Algorithm::EdDSA);

        let x = Base64UrlUnpadded::encode_string(&[1u8; 32]);
        let y = Base64UrlUnpadded::encode_string(&[2u8; 32]);
        let p256 = VerificationMethod {
            key: KeyFormat::JsonWebKey {
                public_key_jwk: PublicKeyJwk {
                    kty: "EC".to_string(),
                    crv: "P-256".to_string(),
                    x: x.clone(),
                    y: Some(y),
                },
            },
            ..VerificationMethod::default()
        };
        assert_eq!(p256.algorithm().unwrap(), Algorithm::ES256);

        let unsupported = VerificationMethod {
            key: KeyFormat::JsonWebKey {
                public_key_jwk: PublicKeyJwk {
                    kty: "EC".to_string(),
                    crv: "secp256k1".to_string(),
                    x,
                    y: None,
                },
            },
            ..VerificationMethod::default()
        };
        let err = unsupported.algorithm().expect_err("should fail");
        assert!(matches!(err, Error::UnsupportedKeyType(_)));
    }

    #[test]
    fn ec_public_key_is_sec1() {
        let vm = VerificationMethod {
            key: KeyFormat::JsonWebKey {
                public_key_jwk: PublicKeyJwk {
                    kty: "EC".to_string(),
                    crv: "P-256".to_string(),
                    x: Base64UrlUnpadded::encode_string(&[1u8; 32]),
                    y: Some(Base64UrlUnpadded::encode_string(&[2u8; 32])),
                },
            },
            ..VerificationMethod::default()
        };
        let bytes = vm.public_key_bytes().unwrap();
        assert_eq!(bytes.len(), 65);
        assert_eq!(bytes[0], 0x04);
        assert_eq!(bytes[1], 0x01);
        assert_eq!(bytes[33], 0x02);
    }
}
