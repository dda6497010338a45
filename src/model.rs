//! # Wire Model
//!
//! Request, response and persisted entity shapes for the hub protocol.
//! Polymorphic shapes (queries and operators) are tagged unions on an
//! explicit `type` discriminant, decoded through probing helpers so a
//! malformed body and an unknown kind map to different errors: the first is
//! a bad request, the second is unimplemented.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Request to create a profile.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CreateProfileRequest {
    /// DID (or DID URL) of the party controlling the profile.
    #[serde(default)]
    pub controller: String,
}

/// A hub tenant: owns queries and a root capability over itself.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Profile {
    /// Opaque profile ID, a URN.
    pub id: String,

    /// DID (or DID URL) of the controlling party.
    pub controller: String,

    /// The profile's root capability, compressed wire form.
    pub zcap: String,
}

/// Where an upstream collaborator lives and the capability to present to it.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct UpstreamAuthorization {
    /// Base URL of the collaborator.
    #[serde(rename = "baseURL")]
    pub base_url: String,

    /// Delegated capability, compressed wire form.
    pub zcap: String,
}

/// The two upstream authorizations needed to read one encrypted document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct UpstreamAuth {
    /// Storage service authorization.
    pub edv: UpstreamAuthorization,

    /// Key service authorization.
    pub kms: UpstreamAuthorization,
}

/// A query naming an encrypted document directly.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocQuery {
    /// Storage-side vault holding the document.
    #[serde(rename = "vaultID")]
    pub vault_id: String,

    /// Document ID within the vault.
    #[serde(rename = "docID")]
    pub doc_id: String,

    /// Path expression into the decrypted content. Absent or empty selects
    /// the whole content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Credentials for the storage and key services.
    pub upstream_auth: UpstreamAuth,
}

/// A query referencing a previously registered query by its opaque handle.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct RefQuery {
    /// The registered query's handle: the suffix of its location.
    #[serde(rename = "ref")]
    pub reference: String,
}

/// A query, dispatched on its `type` discriminant.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Query {
    /// Names a document directly, credentials included.
    DocQuery(DocQuery),

    /// References a registered query.
    RefQuery(RefQuery),
}

impl Query {
    /// Decode a query from a JSON value.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::BadRequest`] if the value is not an object with a
    /// string `type` or its shape does not validate, and
    /// [`Error::NotImplemented`] for an unrecognized discriminant.
    pub fn decode(value: &Value) -> Result<Self, Error> {
        match kind_of(value)? {
            "DocQuery" | "RefQuery" => serde_json::from_value(value.clone())
                .map_err(|_| Error::BadRequest("bad request".to_string())),
            _ => Err(Error::NotImplemented("unsupported query type".to_string())),
        }
    }
}

/// A registered query as persisted in the `queries` store.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct StoredQuery {
    /// The query's handle.
    pub id: String,

    /// Owning profile.
    #[serde(rename = "profileID")]
    pub profile_id: String,

    /// The registered spec.
    pub spec: Query,
}

/// A comparison operator over query args.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum Operator {
    /// True iff every resolved fragment is deeply equal.
    EqOp {
        /// The queries to resolve and compare.
        args: Vec<Query>,
    },
}

impl Operator {
    /// Decode an operator from a JSON value, probing args element-wise so an
    /// unknown query kind inside `args` surfaces as unimplemented rather
    /// than malformed.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::BadRequest`] for malformed shapes and
    /// [`Error::NotImplemented`] for an unknown operator or query kind.
    pub fn decode(value: &Value) -> Result<Self, Error> {
        match kind_of(value)? {
            "EqOp" => {
                let Some(args) = value.get("args").and_then(Value::as_array) else {
                    return Err(Error::BadRequest("bad request".to_string()));
                };
                let args = args.iter().map(Query::decode).collect::<Result<Vec<_>, _>>()?;
                Ok(Self::EqOp { args })
            }
            _ => Err(Error::NotImplemented("unsupported operator type".to_string())),
        }
    }
}

/// Result of a comparison.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ComparisonResult {
    /// The operator's outcome over all resolved fragments.
    pub result: bool,
}

/// One extracted document.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Extraction {
    /// The decrypted content fragment the query resolved to.
    pub document: Value,
}

/// A registered query's coordinates, as returned to the creator.
#[derive(Clone, Debug)]
pub struct CreatedQuery {
    /// The query's handle.
    pub id: String,

    /// Absolute location of the query resource.
    pub location: String,
}

/// Request to create an authorization on the hub's reserved surface.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    /// Who the authorization is for.
    #[serde(default)]
    pub requesting_party: String,

    /// What the authorization covers. Echoed, not interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Value>,
}

/// A created authorization on the hub's reserved surface.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    /// Opaque authorization ID, a URN.
    pub id: String,

    /// Who the authorization is for.
    pub requesting_party: String,

    /// What the authorization covers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Value>,
}

/// The `type` discriminant of a JSON value.
pub(crate) fn kind_of(value: &Value) -> Result<&str, Error> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::BadRequest("bad request".to_string()))
}
