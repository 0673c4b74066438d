//! A scripted [`ContentNetwork`] that records what it is asked to do.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sone_core::config::SubscriptionConfig;
use sone_core::testutil::RecordingEvents;
use sone_core::{
    ContentId, ContentNetwork, EditionCallback, FetchError, FetchResult, InsertBlock,
    InsertCallback, InsertError, KeyPair, KeyType, ManifestEntry, Transfer, UpdatableKey,
};

use crate::NetworkInterface;

pub(crate) fn interface(network: Arc<MockNetwork>) -> NetworkInterface {
    interface_with(
        network,
        Arc::new(RecordingEvents::new()),
        SubscriptionConfig::default(),
    )
}

pub(crate) fn interface_with(
    network: Arc<MockNetwork>,
    events: Arc<RecordingEvents>,
    config: SubscriptionConfig,
) -> NetworkInterface {
    NetworkInterface::new(network, events, config)
}

#[derive(Clone)]
pub(crate) struct Subscription {
    pub key: UpdatableKey,
    pub callback: Arc<dyn EditionCallback>,
    pub background: bool,
}

#[derive(Default)]
pub(crate) struct MockNetwork {
    responses: Mutex<HashMap<ContentId, Result<FetchResult, FetchError>>>,
    fetched: Mutex<Vec<ContentId>>,
    key_pairs: AtomicUsize,
    insert_failure: Mutex<Option<InsertError>>,
    complete_on_insert: AtomicBool,
    inserts: Mutex<Vec<(InsertBlock, Arc<dyn InsertCallback>)>>,
    cancellations: Arc<AtomicUsize>,
    manifest_failure: Mutex<Option<InsertError>>,
    manifests: Mutex<Vec<(ContentId, BTreeMap<String, ManifestEntry>, String)>>,
    subscriptions: Mutex<Vec<Subscription>>,
    unsubscriptions: Mutex<Vec<UpdatableKey>>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, id: ContentId, response: Result<FetchResult, FetchError>) {
        self.responses.lock().unwrap().insert(id, response);
    }

    pub fn fetched(&self) -> Vec<ContentId> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn fail_inserts(&self, error: InsertError) {
        *self.insert_failure.lock().unwrap() = Some(error);
    }

    /// Makes inserts report their id and success before `insert` returns.
    pub fn complete_on_insert(&self) {
        self.complete_on_insert.store(true, Ordering::SeqCst);
    }

    pub fn inserts(&self) -> Vec<InsertBlock> {
        let inserts = self.inserts.lock().unwrap();
        inserts.iter().map(|(block, _)| block.clone()).collect()
    }

    pub fn insert_callback(&self, index: usize) -> Arc<dyn InsertCallback> {
        self.inserts.lock().unwrap()[index].1.clone()
    }

    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }

    pub fn fail_manifests(&self, error: InsertError) {
        *self.manifest_failure.lock().unwrap() = Some(error);
    }

    pub fn manifests(&self) -> Vec<(ContentId, BTreeMap<String, ManifestEntry>, String)> {
        self.manifests.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn unsubscriptions(&self) -> Vec<UpdatableKey> {
        self.unsubscriptions.lock().unwrap().clone()
    }
}

struct MockTransfer {
    cancellations: Arc<AtomicUsize>,
}

impl Transfer for MockTransfer {
    fn cancel(&self) {
        self.cancellations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentNetwork for MockNetwork {
    async fn fetch(&self, id: &ContentId) -> Result<FetchResult, FetchError> {
        self.fetched.lock().unwrap().push(id.clone());
        self.responses
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or(Err(FetchError::DataNotFound))
    }

    fn insert(
        &self,
        block: InsertBlock,
        callback: Arc<dyn InsertCallback>,
    ) -> Result<Box<dyn Transfer>, InsertError> {
        if let Some(error) = self.insert_failure.lock().unwrap().clone() {
            return Err(error);
        }
        let target = block.target.clone();
        self.inserts
            .lock()
            .unwrap()
            .push((block, callback.clone()));
        if self.complete_on_insert.load(Ordering::SeqCst) {
            callback.on_generated_id(target.with_key_type(KeyType::Chk));
            callback.on_success();
        }
        Ok(Box::new(MockTransfer {
            cancellations: self.cancellations.clone(),
        }))
    }

    async fn insert_manifest(
        &self,
        insert_id: &ContentId,
        entries: BTreeMap<String, ManifestEntry>,
        default_file: &str,
    ) -> Result<ContentId, InsertError> {
        if let Some(error) = self.manifest_failure.lock().unwrap().clone() {
            return Err(error);
        }
        self.manifests
            .lock()
            .unwrap()
            .push((insert_id.clone(), entries, default_file.to_owned()));
        Ok(ContentId::new(KeyType::Ssk, "manifest").with_doc_name("site"))
    }

    fn generate_key_pair(&self) -> KeyPair {
        let n = self.key_pairs.fetch_add(1, Ordering::SeqCst) + 1;
        KeyPair {
            insert_id: ContentId::new(KeyType::Ssk, format!("insert-{n}")),
            request_id: ContentId::new(KeyType::Ssk, format!("request-{n}")),
        }
    }

    fn subscribe(
        &self,
        key: &UpdatableKey,
        callback: Arc<dyn EditionCallback>,
        run_background_fetch: bool,
    ) {
        self.subscriptions.lock().unwrap().push(Subscription {
            key: key.clone(),
            callback,
            background: run_background_fetch,
        });
    }

    fn unsubscribe(&self, key: &UpdatableKey, _callback: &Arc<dyn EditionCallback>) {
        self.unsubscriptions.lock().unwrap().push(key.clone());
    }
}
