//! The content network capability.
//!
//! [`ContentNetwork`] is everything the Sone core needs from the underlying
//! storage network: fetching, inserting, key generation and edition
//! subscriptions. Inserts and subscriptions report back through callbacks
//! that the network invokes on threads or tasks it owns.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{ContentId, Priority, UpdatableKey};

/// Payload and declared content type of a successful fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchResult {
    pub content_type: String,
    pub data: Bytes,
}

impl FetchResult {
    pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// A fetch result together with the identifier it was actually fetched
/// from, which differs from the requested one after redirects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fetched {
    id: ContentId,
    result: FetchResult,
}

impl Fetched {
    pub fn new(id: ContentId, result: FetchResult) -> Self {
        Self { id, result }
    }

    pub fn id(&self) -> &ContentId {
        &self.id
    }

    pub fn result(&self) -> &FetchResult {
        &self.result
    }

    pub fn into_parts(self) -> (ContentId, FetchResult) {
        (self.id, self.result)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("permanently redirected to {0}")]
    PermanentRedirect(ContentId),
    #[error("data not found")]
    DataNotFound,
    #[error("route not found")]
    RouteNotFound,
    #[error("fetch cancelled")]
    Cancelled,
    #[error("fetch failed: {0}")]
    Other(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InsertError {
    #[error("cancelled by user")]
    Cancelled,
    #[error("insert collided with existing data at {0}")]
    Collision(ContentId),
    #[error("route not found")]
    RouteNotFound,
    #[error("invalid insert target: {0}")]
    InvalidTarget(String),
    #[error("insert failed: {0}")]
    Other(String),
}

impl InsertError {
    /// Returns true if the insert ended because somebody cancelled it.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, InsertError::Cancelled)
    }
}

/// A freshly generated pair of identifiers for one subspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPair {
    /// Private identifier used to insert into the subspace.
    pub insert_id: ContentId,
    /// Public identifier used to request from the subspace.
    pub request_id: ContentId,
}

/// A single-file insert request.
#[derive(Clone, Debug)]
pub struct InsertBlock {
    pub data: Bytes,
    pub content_type: String,
    pub target: ContentId,
    pub priority: Priority,
}

/// One named file of a directory insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestEntry {
    pub data: Bytes,
    pub content_type: String,
}

impl ManifestEntry {
    pub fn new(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// Receives the progress of one running insert.
///
/// Exactly one of [`on_success`](Self::on_success) and
/// [`on_failure`](Self::on_failure) is called per insert.
pub trait InsertCallback: Send + Sync {
    /// The final identifier of the inserted data is known. May be called
    /// before the insert completes, and more than once.
    fn on_generated_id(&self, id: ContentId);

    fn on_success(&self);

    fn on_failure(&self, error: InsertError);

    fn on_fetchable(&self) {}

    fn on_major_progress(&self) {}

    fn on_generated_metadata(&self, _metadata: Bytes) {}
}

/// Handle to a running insert.
pub trait Transfer: Send + Sync {
    /// Requests cancellation. The network reports the outcome through the
    /// insert's callback.
    fn cancel(&self);
}

/// A new edition of a subscribed key was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FoundEdition {
    pub key: UpdatableKey,
    pub edition: i64,
    /// The edition was actually fetched, not just announced.
    pub new_known_good: bool,
    /// The edition is higher than every edition seen before.
    pub new_slot: bool,
}

/// Receives new editions of a subscribed [`UpdatableKey`].
pub trait EditionCallback: Send + Sync {
    fn on_found_edition(&self, found: FoundEdition);

    /// Priority used while merely polling for new editions.
    fn polling_priority_normal(&self) -> Priority;

    /// Priority used while an edition that was found is being resolved.
    fn polling_priority_progress(&self) -> Priority;
}

/// Interface to the content network.
///
/// Subscriptions only accept [`UpdatableKey`]s; validating identifiers is
/// the caller's job, so an invalid key never reaches the network.
#[async_trait]
pub trait ContentNetwork: Send + Sync {
    /// Fetches the content at `id`.
    ///
    /// A superseded identifier fails with [`FetchError::PermanentRedirect`]
    /// carrying its replacement.
    async fn fetch(&self, id: &ContentId) -> Result<FetchResult, FetchError>;

    /// Starts inserting `block`. Returns once the transfer is running; the
    /// rest of the insert is reported to `callback`.
    fn insert(
        &self,
        block: InsertBlock,
        callback: Arc<dyn InsertCallback>,
    ) -> Result<Box<dyn Transfer>, InsertError>;

    /// Inserts a directory of `entries` under `insert_id` and returns the
    /// identifier it can be requested from.
    async fn insert_manifest(
        &self,
        insert_id: &ContentId,
        entries: BTreeMap<String, ManifestEntry>,
        default_file: &str,
    ) -> Result<ContentId, InsertError>;

    fn generate_key_pair(&self) -> KeyPair;

    /// Starts watching `key` for new editions. With `run_background_fetch`
    /// the network immediately checks for newer editions instead of waiting
    /// for its next polling round.
    fn subscribe(
        &self,
        key: &UpdatableKey,
        callback: Arc<dyn EditionCallback>,
        run_background_fetch: bool,
    );

    /// Stops delivering editions of `key` to `callback`.
    fn unsubscribe(&self, key: &UpdatableKey, callback: &Arc<dyn EditionCallback>);
}

#[async_trait]
impl<T: ContentNetwork + ?Sized> ContentNetwork for Arc<T> {
    async fn fetch(&self, id: &ContentId) -> Result<FetchResult, FetchError> {
        (**self).fetch(id).await
    }

    fn insert(
        &self,
        block: InsertBlock,
        callback: Arc<dyn InsertCallback>,
    ) -> Result<Box<dyn Transfer>, InsertError> {
        (**self).insert(block, callback)
    }

    async fn insert_manifest(
        &self,
        insert_id: &ContentId,
        entries: BTreeMap<String, ManifestEntry>,
        default_file: &str,
    ) -> Result<ContentId, InsertError> {
        (**self).insert_manifest(insert_id, entries, default_file).await
    }

    fn generate_key_pair(&self) -> KeyPair {
        (**self).generate_key_pair()
    }

    fn subscribe(
        &self,
        key: &UpdatableKey,
        callback: Arc<dyn EditionCallback>,
        run_background_fetch: bool,
    ) {
        (**self).subscribe(key, callback, run_background_fetch)
    }

    fn unsubscribe(&self, key: &UpdatableKey, callback: &Arc<dyn EditionCallback>) {
        (**self).unsubscribe(key, callback)
    }
}
