//! # Delegation Adapter
//!
//! Bridges parties that hold vault-level coordinates to the hub's
//! query-level protocol. The adapter owns a hub profile of its own:
//! authorization requests register a query under that profile and hand the
//! requesting party a child capability delegated from the profile's root,
//! scoped to the one query location. Comparison requests rewrite each arg
//! before the hub evaluates it: vault coordinates are resolved to real
//! storage coordinates, and presented tokens are verified and collapsed to
//! query references.
//!
//! The document attribute path is fixed inside the registered query at
//! authorization time. The child capability only names the query location,
//! so a token holder cannot steer the comparison to a different field.

use std::sync::Arc;

use chrono::Utc;
use confida_did::key::{did_from_verifying_key, did_key_url};
use confida_did::ResolverSet;
use confida_kms::Keyring;
use confida_zcap::{
    compress, decompress, verify_capability, Capability, CapabilityBuilder, Caveat,
    SignatureBinding,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::client::{DocMeta, HubClient, VaultClient};
use crate::error::Error;
use crate::model::{
    kind_of, ComparisonResult, DocQuery, Operator, Profile, Query, RefQuery, UpstreamAuth,
    UpstreamAuthorization,
};

/// Target type of a delegated query capability.
const QUERY_TARGET_TYPE: &str = "urn:confida:query";

/// An authorization request: grant `requesting_party` the right to
/// reference one field of one vault document.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    /// DID of the party the authorization is issued to.
    pub requesting_party: String,

    /// What the authorization covers.
    pub scope: Scope,
}

/// The document, field and upstream credentials an authorization covers.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    /// Vault holding the document.
    #[serde(rename = "vaultID")]
    pub vault_id: String,

    /// The document within the vault.
    #[serde(rename = "docID")]
    pub doc_id: String,

    /// Path of the document attribute being authorized. Absent means the
    /// whole content.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub doc_attr_path: Option<String>,

    /// Upstream capabilities the caller delegates for reading the document.
    pub auth_tokens: AuthTokens,

    /// Restrictions to attach to the issued capability, typically an expiry.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub caveats: Vec<Caveat>,
}

/// Compressed upstream capabilities for the storage and key services.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AuthTokens {
    /// Capability for the storage service.
    pub edv: String,

    /// Capability for the key service.
    pub kms: String,
}

/// An issued authorization.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    /// The party the token was issued to.
    pub requesting_party: String,

    /// The compressed child capability.
    pub auth_token: String,
}

/// A comparison arg naming a vault document by its vault coordinates.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultDocQuery {
    /// Vault holding the document.
    #[serde(rename = "vaultID")]
    pub vault_id: String,

    /// The document within the vault.
    #[serde(rename = "docID")]
    pub doc_id: String,

    /// Path of the document attribute to compare.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub doc_attr_path: Option<String>,

    /// Upstream capabilities for reading the document.
    pub auth_tokens: AuthTokens,
}

/// A comparison arg presenting an authorization token issued earlier.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedQuery {
    /// The compressed capability handed out by [`Adapter::handle_authorization`].
    pub auth_token: String,
}

/// A comparison arg, dispatched on its `type` discriminant.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ComparisonQuery {
    /// Vault coordinates plus the caller's own upstream tokens.
    DocQuery(VaultDocQuery),

    /// A token delegated by this adapter.
    AuthorizedQuery(AuthorizedQuery),
}

impl ComparisonQuery {
    /// Decode a comparison arg from a JSON value.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::BadRequest`] if the value is not an object with a
    /// string `type` or its shape does not validate, and
    /// [`Error::NotImplemented`] for an unrecognized discriminant.
    pub fn decode(value: &Value) -> Result<Self, Error> {
        match kind_of(value)? {
            "DocQuery" | "AuthorizedQuery" => serde_json::from_value(value.clone())
                .map_err(|_| Error::BadRequest("bad request".to_string())),
            _ => Err(Error::NotImplemented("unsupported query type".to_string())),
        }
    }
}

/// A comparison operator over comparison args.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ComparisonOp {
    /// True iff every arg resolves to the same fragment.
    EqOp {
        /// The args to rewrite and compare.
        args: Vec<ComparisonQuery>,
    },
}

impl ComparisonOp {
    /// Decode an operator from a JSON value, probing args element-wise.
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
                let args =
                    args.iter().map(ComparisonQuery::decode).collect::<Result<Vec<_>, _>>()?;
                Ok(Self::EqOp { args })
            }
            _ => Err(Error::NotImplemented("unsupported operator type".to_string())),
        }
    }
}

/// Adapter construction parameters.
pub struct AdapterConfig {
    /// The hub the adapter registers queries with.
    pub hub: Arc<dyn HubClient>,

    /// Vault service resolving document metadata.
    pub vault: Arc<dyn VaultClient>,

    /// Keyring receiving the adapter's delegation key.
    pub keyring: Keyring,

    /// DID resolvers used to sign and verify capabilities.
    pub resolvers: ResolverSet,
}

/// The delegation adapter.
pub struct Adapter {
    binding: SignatureBinding,
    hub: Arc<dyn HubClient>,
    vault: Arc<dyn VaultClient>,
    delegation_key: String,
    profile: Profile,
    root: Capability,
}

impl Adapter {
    /// Generate the adapter's identity and bootstrap its hub profile.
    ///
    /// The profile's root capability is decompressed and retained: every
    /// authorization delegates from it and every presented token must chain
    /// back to it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Internal`] if the identity cannot be built or the
    /// profile's capability does not parse, or with the hub's own error if
    /// profile creation fails.
    pub async fn new(config: AdapterConfig) -> Result<Self, Error> {
        let key = config.keyring.generate();
        let controller = did_from_verifying_key(&key.verifying_key)
            .map_err(|e| Error::Internal(format!("failed to build adapter identity: {e}")))?;
        let delegation_key = did_key_url(&key.verifying_key)
            .map_err(|e| Error::Internal(format!("failed to build adapter identity: {e}")))?;

        let profile = config.hub.create_profile(&controller).await?;
        let root = decompress(&profile.zcap)
            .map_err(|e| Error::Internal(format!("failed to parse profile zcap: {e}")))?;

        Ok(Self {
            binding: SignatureBinding::new(config.resolvers, config.keyring),
            hub: config.hub,
            vault: config.vault,
            delegation_key,
            profile,
            root,
        })
    }

    /// The adapter's hub profile.
    #[must_use]
    pub const fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Issue an authorization for one field of one vault document.
    ///
    /// Resolves the document's real storage coordinates, registers a query
    /// holding them (path included) under the adapter's profile, and
    /// delegates a child capability naming the requesting party as invoker
    /// and the query location as target.
    ///
    /// # Errors
    ///
    /// Fails with the vault's or hub's error, or [`Error::Internal`] if the
    /// child capability cannot be minted.
    #[instrument(level = "debug", skip(self, request))]
    pub async fn handle_authorization(
        &self, request: AuthorizationRequest,
    ) -> Result<Authorization, Error> {
        let scope = request.scope;
        let meta = self.vault.doc_metadata(&scope.vault_id, &scope.doc_id).await?;
        let spec = rewritten_query(&meta, scope.doc_attr_path, &scope.auth_tokens)?;
        let location = self.hub.create_query(&self.profile.id, &spec).await?;

        let mut builder = CapabilityBuilder::new()
            .parent(&self.root)
            .invoker(&request.requesting_party)
            .invocation_target(&location, QUERY_TARGET_TYPE)
            .allowed_action("reference")
            .verification_method(&self.delegation_key);
        for caveat in scope.caveats {
            builder = builder.caveat(caveat);
        }
        let child = builder
            .sign(&self.binding)
            .await
            .map_err(|e| Error::Internal(format!("failed to derive child zcap: {e}")))?;
        let auth_token = compress(&child)
            .map_err(|e| Error::Internal(format!("failed to compress zcap: {e}")))?;

        Ok(Authorization { requesting_party: request.requesting_party, auth_token })
    }

    /// Rewrite a comparison request into hub terms and relay the result.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::BadRequest`] for malformed bodies,
    /// [`Error::NotImplemented`] for unknown kinds, [`Error::Unauthorized`]
    /// for a presented token that does not verify, or the rewrite's
    /// vault/hub error.
    #[instrument(level = "debug", skip(self, body))]
    pub async fn handle_comparison(&self, body: &Value) -> Result<ComparisonResult, Error> {
        let Some(op) = body.get("op") else {
            return Err(Error::BadRequest("bad request".to_string()));
        };
        let ComparisonOp::EqOp { args } = ComparisonOp::decode(op)?;

        let mut rewritten = Vec::with_capacity(args.len());
        for arg in args {
            rewritten.push(self.rewrite(arg).await?);
        }
        self.hub.compare(&Operator::EqOp { args: rewritten }).await
    }

    /// Rewrite one comparison arg into the hub's query model.
    async fn rewrite(&self, arg: ComparisonQuery) -> Result<Query, Error> {
        match arg {
            ComparisonQuery::DocQuery(spec) => {
                let meta = self.vault.doc_metadata(&spec.vault_id, &spec.doc_id).await?;
                Ok(Query::DocQuery(rewritten_query(
                    &meta,
                    spec.doc_attr_path,
                    &spec.auth_tokens,
                )?))
            }
            ComparisonQuery::AuthorizedQuery(authorized) => {
                Ok(Query::RefQuery(self.reference_query(&authorized.auth_token).await?))
            }
        }
    }

    /// Recover the registered query a presented token references.
    ///
    /// The token must decompress to a capability that verifies against the
    /// adapter's own root for the `reference` action. The specific
    /// verification failure is logged, never returned.
    async fn reference_query(&self, token: &str) -> Result<RefQuery, Error> {
        let capability = decompress(token)
            .map_err(|e| Error::BadRequest(format!("malformed authorization token: {e}")))?;

        let root = self.root.clone();
        let fetch = move |id: String| {
            let root = root.clone();
            async move {
                if id == root.id {
                    Ok(Some(root))
                } else {
                    Ok(None)
                }
            }
        };
        if let Err(e) =
            verify_capability(&capability, Utc::now(), "reference", &self.binding, fetch).await
        {
            tracing::error!("presented capability failed verification: {e}");
            return Err(Error::Unauthorized);
        }

        let Some((_, reference)) = capability.invocation_target.id.split_once("/queries/")
        else {
            return Err(Error::BadRequest(
                "authorization token does not reference a query".to_string(),
            ));
        };
        Ok(RefQuery { reference: reference.to_string() })
    }
}

/// Resolve a document's real storage and key coordinates from its vault
/// metadata and attach the caller's upstream tokens.
///
/// The metadata URI has the shape
/// `https://host/<collection>/{vaultID}/documents/{docID}`: the vault and
/// document IDs are taken from the tail, and the storage base is the origin
/// plus the leading collection segment. The key service base is the origin
/// of the key URI.
fn rewritten_query(
    meta: &DocMeta, path: Option<String>, tokens: &AuthTokens,
) -> Result<DocQuery, Error> {
    let uri = url::Url::parse(&meta.uri)
        .map_err(|e| Error::Internal(format!("failed to parse doc uri: {e}")))?;
    let key_uri = url::Url::parse(&meta.enc_key_uri)
        .map_err(|e| Error::Internal(format!("failed to parse enc key uri: {e}")))?;

    let segments: Vec<&str> = uri.path_segments().map_or_else(Vec::new, Iterator::collect);
    if segments.len() < 4 {
        return Err(Error::Internal(format!("unexpected doc uri shape: {}", meta.uri)));
    }

    Ok(DocQuery {
        vault_id: segments[segments.len() - 3].to_string(),
        doc_id: segments[segments.len() - 1].to_string(),
        path,
        upstream_auth: UpstreamAuth {
            edv: UpstreamAuthorization {
                base_url: format!("{}/{}", uri.origin().ascii_serialization(), segments[0]),
                zcap: tokens.edv.clone(),
            },
            kms: UpstreamAuthorization {
                base_url: key_uri.origin().ascii_serialization(),
                zcap: tokens.kms.clone(),
            },
        },
    })
}
