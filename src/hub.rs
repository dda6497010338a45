//! # Protocol Engine
//!
//! The hub's state machine: profile lifecycle, query registration,
//! comparison evaluation and extraction. Requests are independent: the
//! only shared state is the persisted entities, and a comparison's args
//! resolve sequentially in input order with the first failure aborting the
//! whole operation, so partial results never leak.

use std::sync::Arc;

use confida_did::ResolverSet;
use confida_kms::Keyring;
use confida_zcap::{compress, CapabilityBuilder, SignatureBinding};
use serde_json::Value;
use serde_json_path::JsonPath;
use tracing::instrument;
use uuid::Uuid;

use crate::client::{EdvClient, KmsClient};
use crate::error::Error;
use crate::identity::ServiceIdentity;
use crate::jwe::StructuredDocument;
use crate::model::{
    Authorization, AuthorizationRequest, ComparisonResult, CreateProfileRequest, CreatedQuery,
    DocQuery, Extraction, Operator, Profile, Query, StoredQuery,
};
use crate::store::{Store, StoreProvider};

const PROFILE_STORE: &str = "profile";
const ZCAP_STORE: &str = "zcap";
const QUERIES_STORE: &str = "queries";
const CONFIG_STORE: &str = "config";

/// Target type of a profile's root capability.
const PROFILE_TARGET_TYPE: &str = "urn:confida:profile";

/// Hub construction parameters.
pub struct HubConfig {
    /// Provider of the hub's logical stores.
    pub store_provider: Arc<dyn StoreProvider>,

    /// Storage service client.
    pub edv: Arc<dyn EdvClient>,

    /// Key service client.
    pub kms: Arc<dyn KmsClient>,

    /// Keyring holding (or receiving) the service's signing keys.
    pub keyring: Keyring,

    /// DID resolvers used to sign and verify capabilities.
    pub resolvers: ResolverSet,

    /// External base URL, used to build query locations.
    pub base_url: String,
}

/// The confidential compare/extract engine.
pub struct Hub {
    identity: ServiceIdentity,
    binding: SignatureBinding,
    profiles: Arc<dyn Store>,
    zcaps: Arc<dyn Store>,
    queries: Arc<dyn Store>,
    edv: Arc<dyn EdvClient>,
    kms: Arc<dyn KmsClient>,
    base_url: String,
}

impl Hub {
    /// Open the stores, load or create the service identity, and assemble
    /// the engine.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Internal`] if a store cannot be opened or the
    /// identity cannot be loaded or created.
    pub async fn new(config: HubConfig) -> Result<Self, Error> {
        let profiles = open(&config.store_provider, PROFILE_STORE).await?;
        let zcaps = open(&config.store_provider, ZCAP_STORE).await?;
        let queries = open(&config.store_provider, QUERIES_STORE).await?;
        let config_store = open(&config.store_provider, CONFIG_STORE).await?;

        let identity = ServiceIdentity::load_or_create(&config_store, &config.keyring).await?;
        let binding = SignatureBinding::new(config.resolvers, config.keyring);

        Ok(Self {
            identity,
            binding,
            profiles,
            zcaps,
            queries,
            edv: config.edv,
            kms: config.kms,
            base_url: config.base_url,
        })
    }

    /// The identity the hub signs capabilities with.
    #[must_use]
    pub const fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    /// Create a profile and its self-issued root capability.
    ///
    /// The root names the controller as invoker and the profile itself as
    /// target; everything later delegated under the profile chains back to
    /// it.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::BadRequest`] if the controller is missing, or
    /// [`Error::Internal`] if minting or persisting fails.
    #[instrument(level = "debug", skip(self, request))]
    pub async fn create_profile(&self, request: CreateProfileRequest) -> Result<Profile, Error> {
        if request.controller.is_empty() {
            return Err(Error::BadRequest("missing controller".to_string()));
        }

        let profile_id = Uuid::new_v4().urn().to_string();
        let capability = CapabilityBuilder::new()
            .invoker(&request.controller)
            .controller(&self.identity.did)
            .invocation_target(&profile_id, PROFILE_TARGET_TYPE)
            .allowed_action("read")
            .allowed_action("reference")
            .verification_method(&self.identity.delegation_key)
            .sign(&self.binding)
            .await
            .map_err(|e| Error::Internal(format!("failed to create zcap: {e}")))?;
        let compressed = compress(&capability)
            .map_err(|e| Error::Internal(format!("failed to create zcap: {e}")))?;

        let profile =
            Profile { id: profile_id, controller: request.controller, zcap: compressed };
        let profile_bytes = serde_json::to_vec(&profile)
            .map_err(|e| Error::Internal(format!("failed to store profile: {e}")))?;
        self.profiles
            .put(&profile.id, profile_bytes)
            .await
            .map_err(|e| Error::Internal(format!("failed to store profile: {e}")))?;

        let capability_bytes = serde_json::to_vec(&capability)
            .map_err(|e| Error::Internal(format!("failed to store zcap: {e}")))?;
        self.zcaps
            .put(&capability.id, capability_bytes)
            .await
            .map_err(|e| Error::Internal(format!("failed to store zcap: {e}")))?;

        Ok(profile)
    }

    /// Register a query under a profile.
    ///
    /// Only a `DocQuery` may be registered directly; a `RefQuery` exists
    /// only as the handle minted here and presented later.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::BadRequest`] for malformed bodies or a `RefQuery`
    /// registration, [`Error::NotImplemented`] for unknown spec kinds, or
    /// [`Error::Internal`] if persisting fails.
    #[instrument(level = "debug", skip(self, body))]
    pub async fn create_query(&self, profile_id: &str, body: &Value) -> Result<CreatedQuery, Error> {
        let spec = Query::decode(body)?;
        if matches!(spec, Query::RefQuery(_)) {
            return Err(Error::BadRequest("query type not allowed".to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let stored = StoredQuery { id: id.clone(), profile_id: profile_id.to_string(), spec };
        let bytes = serde_json::to_vec(&stored)
            .map_err(|e| Error::Internal(format!("failed to store query: {e}")))?;
        self.queries
            .put(&id, bytes)
            .await
            .map_err(|e| Error::Internal(format!("failed to store query: {e}")))?;

        let location =
            format!("{}/hubstore/profiles/{profile_id}/queries/{id}", self.base_url);
        Ok(CreatedQuery { id, location })
    }

    /// Evaluate a comparison.
    ///
    /// Args resolve sequentially in input order; the first failure aborts
    /// the comparison. `EqOp` is true iff all resolved fragments are deeply
    /// equal; with fewer than two args it is vacuously true.
    ///
    /// # Errors
    ///
    /// Fails with the decode error of a malformed or unsupported operator,
    /// or the resolution error of the first failing arg.
    #[instrument(level = "debug", skip(self, body))]
    pub async fn compare(&self, body: &Value) -> Result<ComparisonResult, Error> {
        let Some(op) = body.get("op") else {
            return Err(Error::BadRequest("bad request".to_string()));
        };
        let Operator::EqOp { args } = Operator::decode(op)?;

        let mut fragments = Vec::with_capacity(args.len());
        for query in &args {
            fragments.push(self.resolve(query).await?);
        }
        let result = fragments.windows(2).all(|pair| pair[0] == pair[1]);
        Ok(ComparisonResult { result })
    }

    /// Extract the decrypted content of every query, in input order.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::BadRequest`] if the body is not a non-empty
    /// array, or the first failing query's error.
    #[instrument(level = "debug", skip(self, body))]
    pub async fn extract(&self, body: &Value) -> Result<Vec<Extraction>, Error> {
        let Some(items) = body.as_array() else {
            return Err(Error::BadRequest("bad request".to_string()));
        };
        if items.is_empty() {
            return Err(Error::BadRequest("bad request".to_string()));
        }

        let mut extractions = Vec::with_capacity(items.len());
        for item in items {
            let query = Query::decode(item)?;
            extractions.push(Extraction { document: self.resolve(&query).await? });
        }
        Ok(extractions)
    }

    /// Create an authorization.
    ///
    /// Reserved surface: the profile is validated and the request echoed
    /// back under a generated ID. Third-party authorization is served by the
    /// delegation adapter.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotFound`] if the profile does not exist, or
    /// [`Error::Internal`] if the store cannot be read.
    #[instrument(level = "debug", skip(self, request))]
    pub async fn create_authorization(
        &self, profile_id: &str, request: AuthorizationRequest,
    ) -> Result<Authorization, Error> {
        let stored = self
            .profiles
            .get(profile_id)
            .await
            .map_err(|e| Error::Internal(format!("failed to read profile: {e}")))?;
        if stored.is_none() {
            return Err(Error::NotFound(format!("no such profile: {profile_id}")));
        }
        Ok(Authorization {
            id: Uuid::new_v4().urn().to_string(),
            requesting_party: request.requesting_party,
            scope: request.scope,
        })
    }

    /// Resolve a query to the decrypted content fragment it names.
    async fn resolve(&self, query: &Query) -> Result<Value, Error> {
        let spec = match query {
            Query::DocQuery(spec) => spec.clone(),
            Query::RefQuery(reference) => self.registered_spec(&reference.reference).await?,
        };

        let document = self
            .edv
            .read_document(
                &spec.upstream_auth.edv.base_url,
                &spec.upstream_auth.edv.zcap,
                &spec.vault_id,
                &spec.doc_id,
            )
            .await?;
        let recipient = document.jwe.recipient()?;
        let cek = self
            .kms
            .unwrap(
                &spec.upstream_auth.kms.base_url,
                &spec.upstream_auth.kms.zcap,
                &recipient.header.kid,
                &recipient.encrypted_key,
            )
            .await?;
        let plaintext = document.jwe.decrypt(&cek)?;
        let structured: StructuredDocument = serde_json::from_slice(&plaintext)
            .map_err(|_| Error::Internal("document payload is not structured".to_string()))?;

        match spec.path.as_deref() {
            Some(path) if !path.is_empty() => select_fragment(&structured.content, path),
            _ => Ok(structured.content),
        }
    }

    /// The `DocQuery` a handle refers to.
    async fn registered_spec(&self, reference: &str) -> Result<DocQuery, Error> {
        let bytes = self
            .queries
            .get(reference)
            .await
            .map_err(|e| Error::Internal(format!("failed to read query: {e}")))?;
        let Some(bytes) = bytes else {
            return Err(Error::BadRequest("no such query".to_string()));
        };
        let stored: StoredQuery = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Internal(format!("failed to read query: {e}")))?;
        match stored.spec {
            Query::DocQuery(spec) => Ok(spec),
            Query::RefQuery(_) => {
                Err(Error::Internal("registered query is not a doc query".to_string()))
            }
        }
    }
}

/// Select exactly one node from a document by path expression.
fn select_fragment(content: &Value, path: &str) -> Result<Value, Error> {
    let parsed = JsonPath::parse(path)
        .map_err(|e| Error::Internal(format!("invalid document path: {e}")))?;
    parsed.query(content).exactly_one().map(Clone::clone).map_err(|_| {
        Error::Internal(format!("document path {path} does not select exactly one node"))
    })
}

async fn open(provider: &Arc<dyn StoreProvider>, name: &str) -> Result<Arc<dyn Store>, Error> {
    provider
        .open_store(name)
        .await
        .map_err(|e| Error::Internal(format!("failed to open store {name}: {e}")))
}
