//! An in-memory [`ContentNetwork`].
//!
//! Everything lives in `DashMap`s for as long as the network does:
//!
//! - content and redirects, addressed by [`ContentId`]
//! - the request key of every insert key this network generated
//! - the latest published edition and the subscribers of every updatable
//!   key family
//!
//! Inserts complete on a Tokio task and can be cancelled until they do.
//! Inserting into an updatable key (or calling
//! [`MemoryNetwork::publish_edition`]) notifies every subscriber of the key
//! on the inserting task.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use ed25519_dalek::SigningKey;
use rand::RngCore;
use sone_core::{
    ContentId, ContentNetwork, EditionCallback, FetchError, FetchResult, FoundEdition,
    InsertBlock, InsertCallback, InsertError, KeyPair, KeyType, ManifestEntry, Transfer,
    UpdatableKey,
};
use tokio::runtime::Handle;
use tracing::debug;

/// Extra field of insert keys.
const INSERT_EXTRA: &str = "AQECAAE";
/// Extra field of request keys.
const REQUEST_EXTRA: &str = "AQACAAE";

#[derive(Clone, Debug)]
enum Stored {
    Data(FetchResult),
    Redirect(ContentId),
}

#[derive(Default)]
struct State {
    content: DashMap<ContentId, Stored>,
    failures: DashMap<ContentId, FetchError>,
    /// Request key of every generated insert key.
    request_keys: DashMap<String, String>,
    /// Latest published edition, by key family.
    editions: DashMap<UpdatableKey, i64>,
    subscribers: DashMap<UpdatableKey, Vec<Arc<dyn EditionCallback>>>,
}

impl State {
    /// Stores `result` at `id` and announces it if `id` is updatable.
    fn store(&self, id: ContentId, result: FetchResult) {
        let key = UpdatableKey::try_from(id.clone()).ok();
        self.content.insert(id, Stored::Data(result));
        if let Some(key) = key {
            self.announce(key);
        }
    }

    fn announce(&self, key: UpdatableKey) {
        let family = key.family();
        let edition = key.edition();
        let new_slot = {
            let mut latest = self.editions.entry(family.clone()).or_insert(i64::MIN);
            let new_slot = edition > *latest;
            if new_slot {
                *latest = edition;
            }
            new_slot
        };

        let callbacks = self
            .subscribers
            .get(&family)
            .map(|subscribers| subscribers.value().clone())
            .unwrap_or_default();
        debug!(
            "edition {edition} of {family} found, notifying {} subscribers",
            callbacks.len()
        );
        for callback in callbacks {
            callback.on_found_edition(FoundEdition {
                key: key.clone(),
                edition,
                new_known_good: true,
                new_slot,
            });
        }
    }

    fn latest_edition(&self, family: &UpdatableKey) -> Option<i64> {
        self.editions.get(family).map(|latest| *latest)
    }

    /// The identifier `target` can be requested from once inserted.
    fn request_id(
        &self,
        target: &ContentId,
        content_hash: blake3::Hash,
    ) -> Result<ContentId, InsertError> {
        match target.key_type() {
            KeyType::Chk => Ok(rekey(
                target,
                URL_SAFE_NO_PAD.encode(content_hash.as_bytes()),
            )),
            KeyType::Ksk => Ok(target.clone()),
            KeyType::Ssk | KeyType::Usk => self
                .request_keys
                .get(target.key())
                .map(|request_key| rekey(target, request_key.value().clone()))
                .ok_or_else(|| {
                    InsertError::InvalidTarget(format!("{target} is not an insert key"))
                }),
        }
    }
}

/// `id` with its key replaced by `key`.
fn rekey(id: &ContentId, key: String) -> ContentId {
    let mut rekeyed = ContentId::new(id.key_type(), key).with_meta(id.meta().iter().cloned());
    if let Some(doc_name) = id.doc_name() {
        rekeyed = rekeyed.with_doc_name(doc_name);
    }
    if let Some(edition) = id.edition() {
        rekeyed = rekeyed.with_edition(edition);
    }
    rekeyed
}

/// A content network that lives in memory.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<State>,
    insert_delay: Option<Duration>,
}

impl MemoryNetwork {
    /// Creates a new, empty `MemoryNetwork`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every insert wait for `delay` before it completes.
    pub fn with_insert_delay(mut self, delay: Duration) -> Self {
        self.insert_delay = Some(delay);
        self
    }

    pub fn put(&self, id: ContentId, result: FetchResult) {
        self.state.content.insert(id, Stored::Data(result));
    }

    /// Makes fetches of `from` fail with a permanent redirect to `to`.
    pub fn redirect(&self, from: ContentId, to: ContentId) {
        self.state.content.insert(from, Stored::Redirect(to));
    }

    /// Makes fetches of `id` fail with `error`.
    pub fn fail(&self, id: ContentId, error: FetchError) {
        self.state.failures.insert(id, error);
    }

    /// Stores `result` as edition `key` and notifies the key's subscribers
    /// on the calling thread.
    pub fn publish_edition(&self, key: &UpdatableKey, result: FetchResult) {
        self.state.store(key.id().clone(), result);
    }

    /// The highest edition published for the family of `key`.
    pub fn latest_edition(&self, key: &UpdatableKey) -> Option<i64> {
        self.state.latest_edition(&key.family())
    }

    pub fn subscriber_count(&self, key: &UpdatableKey) -> usize {
        self.state
            .subscribers
            .get(&key.family())
            .map_or(0, |subscribers| subscribers.len())
    }

    /// A newer edition of `id`, if `id` is updatable and one was published.
    fn newer_edition(&self, id: &ContentId) -> Option<ContentId> {
        let key = UpdatableKey::try_from(id.clone()).ok()?;
        let latest = self.state.latest_edition(&key.family())?;
        (latest > key.edition()).then(|| key.at_edition(latest).into_id())
    }
}

impl std::fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("content", &self.state.content.len())
            .field("subscribed_keys", &self.state.subscribers.len())
            .field("insert_delay", &self.insert_delay)
            .finish()
    }
}

struct MemoryTransfer {
    cancelled: Arc<AtomicBool>,
}

impl Transfer for MemoryTransfer {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentNetwork for MemoryNetwork {
    async fn fetch(&self, id: &ContentId) -> Result<FetchResult, FetchError> {
        if let Some(error) = self.state.failures.get(id) {
            return Err(error.value().clone());
        }
        let stored = self.state.content.get(id).map(|stored| stored.value().clone());
        match stored {
            Some(Stored::Data(result)) => Ok(result),
            Some(Stored::Redirect(to)) => Err(FetchError::PermanentRedirect(to)),
            None => match self.newer_edition(id) {
                Some(newer) => Err(FetchError::PermanentRedirect(newer)),
                None => Err(FetchError::DataNotFound),
            },
        }
    }

    fn insert(
        &self,
        block: InsertBlock,
        callback: Arc<dyn InsertCallback>,
    ) -> Result<Box<dyn Transfer>, InsertError> {
        let id = self
            .state
            .request_id(&block.target, blake3::hash(&block.data))?;
        let runtime = Handle::try_current().map_err(|err| InsertError::Other(err.to_string()))?;
        debug!("inserting {} at {:?}", block.target, block.priority);

        let cancelled = Arc::new(AtomicBool::new(false));
        let transfer = MemoryTransfer {
            cancelled: cancelled.clone(),
        };
        let state = self.state.clone();
        let delay = self.insert_delay;
        runtime.spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if cancelled.load(Ordering::SeqCst) {
                callback.on_failure(InsertError::Cancelled);
                return;
            }
            if id.key_type() != KeyType::Chk && state.content.contains_key(&id) {
                callback.on_failure(InsertError::Collision(id));
                return;
            }
            callback.on_generated_id(id.clone());
            state.store(
                id,
                FetchResult {
                    content_type: block.content_type,
                    data: block.data,
                },
            );
            callback.on_success();
        });
        Ok(Box::new(transfer))
    }

    async fn insert_manifest(
        &self,
        insert_id: &ContentId,
        entries: BTreeMap<String, ManifestEntry>,
        default_file: &str,
    ) -> Result<ContentId, InsertError> {
        if insert_id.key_type() != KeyType::Chk && insert_id.doc_name().is_none() {
            return Err(InsertError::InvalidTarget(format!(
                "{insert_id} has no document name"
            )));
        }
        let default = entries.get(default_file).cloned().ok_or_else(|| {
            InsertError::InvalidTarget(format!("{default_file} is not part of the directory"))
        })?;

        let mut hasher = blake3::Hasher::new();
        for (name, entry) in &entries {
            hasher.update(name.as_bytes());
            hasher.update(&entry.data);
        }
        let directory = self.state.request_id(insert_id, hasher.finalize())?;
        if let Some(delay) = self.insert_delay {
            tokio::time::sleep(delay).await;
        }

        for (name, entry) in entries {
            self.state.content.insert(
                directory.clone().with_meta([name]),
                Stored::Data(FetchResult {
                    content_type: entry.content_type,
                    data: entry.data,
                }),
            );
        }
        self.state.store(
            directory.clone(),
            FetchResult {
                content_type: default.content_type,
                data: default.data,
            },
        );
        debug!("inserted directory {directory}");
        Ok(directory)
    }

    /// Generates a signed subspace key pair from a random secret.
    ///
    /// - signing key = BLAKE3 derive_key("sone/ssk/ed25519", secret)
    /// - crypto key = BLAKE3 derive_key("sone/ssk/crypto", secret)
    /// - the insert key carries the signing key, the request key the BLAKE3
    ///   hash of its public key; both share the crypto key
    fn generate_key_pair(&self) -> KeyPair {
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        let signing_key = SigningKey::from_bytes(&blake3::derive_key("sone/ssk/ed25519", &secret));
        let crypto_key = URL_SAFE_NO_PAD.encode(blake3::derive_key("sone/ssk/crypto", &secret));
        let routing_key = blake3::hash(signing_key.verifying_key().as_bytes());

        let insert_key = format!(
            "{},{crypto_key},{INSERT_EXTRA}",
            URL_SAFE_NO_PAD.encode(signing_key.to_bytes())
        );
        let request_key = format!(
            "{},{crypto_key},{REQUEST_EXTRA}",
            URL_SAFE_NO_PAD.encode(routing_key.as_bytes())
        );
        self.state
            .request_keys
            .insert(insert_key.clone(), request_key.clone());

        KeyPair {
            insert_id: ContentId::new(KeyType::Ssk, insert_key),
            request_id: ContentId::new(KeyType::Ssk, request_key),
        }
    }

    fn subscribe(
        &self,
        key: &UpdatableKey,
        callback: Arc<dyn EditionCallback>,
        run_background_fetch: bool,
    ) {
        let family = key.family();
        self.state
            .subscribers
            .entry(family.clone())
            .or_default()
            .push(callback.clone());

        if !run_background_fetch {
            return;
        }
        let Some(latest) = self.state.latest_edition(&family) else {
            return;
        };
        if latest <= key.edition() {
            return;
        }
        let found = FoundEdition {
            key: key.at_edition(latest),
            edition: latest,
            new_known_good: true,
            new_slot: true,
        };
        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move { callback.on_found_edition(found) });
            }
            Err(_) => debug!("no runtime for the background check of {key}"),
        }
    }

    fn unsubscribe(&self, key: &UpdatableKey, callback: &Arc<dyn EditionCallback>) {
        let family = key.family();
        if let Some(mut subscribers) = self.state.subscribers.get_mut(&family) {
            subscribers.retain(|subscriber| !Arc::ptr_eq(subscriber, callback));
        }
        self.state
            .subscribers
            .remove_if(&family, |_, subscribers| subscribers.is_empty());
    }
}
