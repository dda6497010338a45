//! Shared fixtures: faked upstream collaborators (storage, key service,
//! vault) backed by in-process maps, and a hub wired to them.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use confida_did::key::KeyResolver;
use confida_did::ResolverSet;
use confida_hub::adapter::{Adapter, AdapterConfig};
use confida_hub::{
    ComparisonResult, CreateProfileRequest, DocMeta, DocQuery, EdvClient, EncryptedDocument,
    Error, Hub, HubClient, HubConfig, Jwe, KmsClient, MemProvider, Operator, Profile, Query,
    StructuredDocument, UpstreamAuth, UpstreamAuthorization, VaultClient,
};
use confida_kms::Keyring;
use dashmap::DashMap;
use rand::RngCore;
use serde_json::Value;

pub const EDV_BASE: &str = "https://edv.example.com/encrypted-data-vaults";
pub const KMS_BASE: &str = "https://kms.example.com";
pub const HUB_BASE: &str = "https://hub.example.com";

/// One storage read as seen by the faked storage service.
#[derive(Clone, Debug)]
pub struct ReadRecord {
    pub base: String,
    pub zcap: String,
    pub vault_id: String,
    pub doc_id: String,
}

/// Faked storage, key and vault services sharing one document table.
///
/// `put_document` encrypts the structured content under a fresh content
/// key, wires up the wrapped-key handle the key service will honour, and
/// publishes vault metadata pointing back at the faked coordinates.
#[derive(Default)]
pub struct FakeUpstream {
    documents: DashMap<(String, String), EncryptedDocument>,
    keys: DashMap<String, Vec<u8>>,
    metadata: DashMap<(String, String), DocMeta>,
    reads: Mutex<Vec<ReadRecord>>,
    fail_reads: AtomicBool,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_document(&self, vault_id: &str, doc_id: &str, content: Value) {
        let mut cek = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut cek);
        let kid = format!("cek-{vault_id}-{doc_id}");
        let encrypted_key = format!("wrapped-{kid}");

        let structured =
            StructuredDocument { id: doc_id.to_string(), meta: None, content };
        let plaintext = serde_json::to_vec(&structured).expect("should serialize document");
        let jwe =
            Jwe::encrypt(&plaintext, &cek, &kid, &encrypted_key).expect("should encrypt");

        self.keys.insert(kid, cek.to_vec());
        self.documents.insert(
            (vault_id.to_string(), doc_id.to_string()),
            EncryptedDocument { id: doc_id.to_string(), sequence: 0, jwe },
        );
        self.metadata.insert(
            (vault_id.to_string(), doc_id.to_string()),
            DocMeta {
                uri: format!("{EDV_BASE}/{vault_id}/documents/{doc_id}"),
                enc_key_uri: format!("{KMS_BASE}/kms/keystores/555/keys/1"),
            },
        );
    }

    /// Every storage read observed so far.
    pub fn reads(&self) -> Vec<ReadRecord> {
        self.reads.lock().expect("should lock read log").clone()
    }

    /// Make every subsequent storage read fail.
    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl EdvClient for FakeUpstream {
    async fn read_document(
        &self, base: &str, zcap: &str, vault_id: &str, doc_id: &str,
    ) -> Result<EncryptedDocument, Error> {
        self.reads.lock().expect("should lock read log").push(ReadRecord {
            base: base.to_string(),
            zcap: zcap.to_string(),
            vault_id: vault_id.to_string(),
            doc_id: doc_id.to_string(),
        });
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Internal("storage service offline".to_string()));
        }
        self.documents
            .get(&(vault_id.to_string(), doc_id.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::Internal(format!("no document {vault_id}/{doc_id}")))
    }
}

#[async_trait]
impl KmsClient for FakeUpstream {
    async fn unwrap(
        &self, _base: &str, _zcap: &str, kid: &str, _encrypted_key: &str,
    ) -> Result<Vec<u8>, Error> {
        self.keys
            .get(kid)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::Internal(format!("no key {kid}")))
    }
}

#[async_trait]
impl VaultClient for FakeUpstream {
    async fn doc_metadata(&self, vault_id: &str, doc_id: &str) -> Result<DocMeta, Error> {
        self.metadata
            .get(&(vault_id.to_string(), doc_id.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::Internal(format!("no metadata for {vault_id}/{doc_id}")))
    }
}

/// The hub driven in process, bypassing HTTP.
pub struct LocalHub(pub Arc<Hub>);

#[async_trait]
impl HubClient for LocalHub {
    async fn create_profile(&self, controller: &str) -> Result<Profile, Error> {
        self.0
            .create_profile(CreateProfileRequest { controller: controller.to_string() })
            .await
    }

    async fn create_query(&self, profile_id: &str, query: &DocQuery) -> Result<String, Error> {
        let value = serde_json::to_value(Query::DocQuery(query.clone()))
            .expect("should serialize query");
        Ok(self.0.create_query(profile_id, &value).await?.location)
    }

    async fn compare(&self, op: &Operator) -> Result<ComparisonResult, Error> {
        let body = serde_json::json!({ "op": op });
        self.0.compare(&body).await
    }
}

pub struct TestBed {
    pub hub: Arc<Hub>,
    pub upstream: Arc<FakeUpstream>,
    pub keyring: Keyring,
}

pub async fn test_bed() -> TestBed {
    let upstream = Arc::new(FakeUpstream::new());
    let keyring = Keyring::new();
    let hub = Hub::new(HubConfig {
        store_provider: Arc::new(MemProvider::new()),
        edv: upstream.clone(),
        kms: upstream.clone(),
        keyring: keyring.clone(),
        resolvers: ResolverSet::new().register(KeyResolver),
        base_url: HUB_BASE.to_string(),
    })
    .await
    .expect("hub should start");
    TestBed { hub: Arc::new(hub), upstream, keyring }
}

/// A hub plus an adapter bootstrapped against it.
pub async fn adapter_bed() -> (TestBed, Adapter) {
    let bed = test_bed().await;
    let adapter = Adapter::new(AdapterConfig {
        hub: Arc::new(LocalHub(bed.hub.clone())),
        vault: bed.upstream.clone(),
        keyring: bed.keyring.clone(),
        resolvers: ResolverSet::new().register(KeyResolver),
    })
    .await
    .expect("adapter should start");
    (bed, adapter)
}

/// A direct query against the faked upstream coordinates.
pub fn doc_query(vault_id: &str, doc_id: &str, path: Option<&str>) -> DocQuery {
    DocQuery {
        vault_id: vault_id.to_string(),
        doc_id: doc_id.to_string(),
        path: path.map(ToString::to_string),
        upstream_auth: UpstreamAuth {
            edv: UpstreamAuthorization {
                base_url: EDV_BASE.to_string(),
                zcap: "edv-token".to_string(),
            },
            kms: UpstreamAuthorization {
                base_url: KMS_BASE.to_string(),
                zcap: "kms-token".to_string(),
            },
        },
    }
}
