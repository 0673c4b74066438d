//! Test utilities for the capability traits.
//!
//! - [`RecordingEvents`]: an [`EventSink`] that keeps every posted event
//! - [`RecordingGraph`]: an in-memory [`IdentityGraph`] that records every
//!   call and can be told to fail
//! - [`NetworkTests`]: a test suite that can be run against any
//!   [`ContentNetwork`] implementation to verify the contract
//!
//! # Usage
//!
//! In your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! sone_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! In your test file:
//!
//! ```ignore
//! use sone_core::testutil::NetworkTests;
//!
//! #[tokio::test]
//! async fn test_my_network() {
//!     let network = MyNetwork::new();
//!     NetworkTests::new(&network).run_all().await.unwrap();
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tokio::sync::{mpsc, watch};

use crate::{
    ContentId, ContentNetwork, CoreEvent, EventSink, FetchError, GraphError, Identity,
    IdentityGraph, InsertBlock, InsertCallback, InsertError, KeyType, ManifestEntry, OwnIdentity,
    Priority,
};

/// An [`EventSink`] that keeps every event in posting order.
#[derive(Debug)]
pub struct RecordingEvents {
    events: watch::Sender<Vec<CoreEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        let (events, _) = watch::channel(Vec::new());
        Self { events }
    }

    pub fn events(&self) -> Vec<CoreEvent> {
        self.events.borrow().to_vec()
    }

    /// Waits until at least `count` events were posted and returns all of
    /// them.
    pub async fn wait_for(&self, count: usize) -> Vec<CoreEvent> {
        let mut rx = self.events.subscribe();
        match rx.wait_for(|events| events.len() >= count).await {
            Ok(events) => events.to_vec(),
            Err(_) => self.events(),
        }
    }
}

impl Default for RecordingEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for RecordingEvents {
    fn post(&self, event: CoreEvent) {
        self.events.send_modify(|events| events.push(event));
    }
}

/// A call received by [`RecordingGraph`], with identities reduced to their
/// ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphCall {
    AddContext {
        owner: String,
        context: String,
    },
    RemoveContext {
        owner: String,
        context: String,
    },
    SetProperty {
        owner: String,
        name: String,
        value: String,
    },
    RemoveProperty {
        owner: String,
        name: String,
    },
    SetTrust {
        truster: String,
        trustee: String,
        score: i32,
        comment: String,
    },
    RemoveTrust {
        truster: String,
        trustee: String,
    },
}

/// An [`IdentityGraph`] that only records what it was asked to do.
///
/// Every call is recorded, including calls that fail. An optional delay
/// keeps calls in flight long enough to observe how many run at once.
#[derive(Debug, Default)]
pub struct RecordingGraph {
    calls: Mutex<Vec<GraphCall>>,
    failure: Mutex<Option<GraphError>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call take `delay` before it completes.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes every following call fail with `error`.
    pub fn fail_with(&self, error: GraphError) {
        *lock(&self.failure) = Some(error);
    }

    pub fn succeed(&self) {
        *lock(&self.failure) = None;
    }

    pub fn calls(&self) -> Vec<GraphCall> {
        lock(&self.calls).clone()
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn record(&self, call: GraphCall) -> Result<(), GraphError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        lock(&self.calls).push(call);
        match lock(&self.failure).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl IdentityGraph for RecordingGraph {
    async fn add_context(&self, owner: &OwnIdentity, context: &str) -> Result<(), GraphError> {
        self.record(GraphCall::AddContext {
            owner: owner.id().to_owned(),
            context: context.to_owned(),
        })
        .await
    }

    async fn remove_context(&self, owner: &OwnIdentity, context: &str) -> Result<(), GraphError> {
        self.record(GraphCall::RemoveContext {
            owner: owner.id().to_owned(),
            context: context.to_owned(),
        })
        .await
    }

    async fn set_property(
        &self,
        owner: &OwnIdentity,
        name: &str,
        value: &str,
    ) -> Result<(), GraphError> {
        self.record(GraphCall::SetProperty {
            owner: owner.id().to_owned(),
            name: name.to_owned(),
            value: value.to_owned(),
        })
        .await
    }

    async fn remove_property(&self, owner: &OwnIdentity, name: &str) -> Result<(), GraphError> {
        self.record(GraphCall::RemoveProperty {
            owner: owner.id().to_owned(),
            name: name.to_owned(),
        })
        .await
    }

    async fn set_trust(
        &self,
        truster: &OwnIdentity,
        trustee: &Identity,
        score: i32,
        comment: &str,
    ) -> Result<(), GraphError> {
        self.record(GraphCall::SetTrust {
            truster: truster.id().to_owned(),
            trustee: trustee.id().to_owned(),
            score,
            comment: comment.to_owned(),
        })
        .await
    }

    async fn remove_trust(
        &self,
        truster: &OwnIdentity,
        trustee: &Identity,
    ) -> Result<(), GraphError> {
        self.record(GraphCall::RemoveTrust {
            truster: truster.id().to_owned(),
            trustee: trustee.id().to_owned(),
        })
        .await
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Test suite for [`ContentNetwork`] implementations.
///
/// Subscriptions are not covered: publishing an edition is not part of the
/// trait, so every implementation tests those with its own helpers.
pub struct NetworkTests<'a, N> {
    network: &'a N,
    /// Prefix for test names to avoid conflicts
    prefix: String,
}

impl<'a, N: ContentNetwork> NetworkTests<'a, N> {
    pub fn new(network: &'a N) -> Self {
        let prefix = format!("_test_{}", rand::rng().random::<u32>());
        Self { network, prefix }
    }

    /// Run all tests.
    pub async fn run_all(&self) -> anyhow::Result<()> {
        self.test_key_pairs();
        self.test_missing_content().await;
        self.test_insert_then_fetch().await?;
        self.test_manifest().await?;
        Ok(())
    }

    /// Test that every generated key pair is fresh and split.
    pub fn test_key_pairs(&self) {
        let first = self.network.generate_key_pair();
        let second = self.network.generate_key_pair();

        assert_ne!(
            first.insert_id, first.request_id,
            "insert and request identifiers should differ"
        );
        assert_ne!(first, second, "key pairs should never repeat");
    }

    /// Test that unknown content is reported as not found.
    pub async fn test_missing_content(&self) {
        let id = ContentId::new(KeyType::Ksk, format!("{}-missing", self.prefix));
        let result = self.network.fetch(&id).await;
        assert_eq!(result, Err(FetchError::DataNotFound));
    }

    /// Test that an inserted block can be fetched from its generated id.
    pub async fn test_insert_then_fetch(&self) -> anyhow::Result<()> {
        let target = self
            .network
            .generate_key_pair()
            .insert_id
            .with_doc_name(format!("{}-insert.txt", self.prefix));
        let data = Bytes::from_static(b"inserted by the contract suite");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _transfer = self.network.insert(
            InsertBlock {
                data: data.clone(),
                content_type: "text/plain".to_owned(),
                target,
                priority: Priority::Interactive,
            },
            Arc::new(ChannelCallback { tx }),
        )?;

        let mut generated = None;
        loop {
            match rx.recv().await {
                Some(Progress::GeneratedId(id)) => generated = Some(id),
                Some(Progress::Succeeded) => break,
                Some(Progress::Failed(error)) => return Err(error.into()),
                None => anyhow::bail!("insert finished without a terminal callback"),
            }
        }
        let id = generated
            .ok_or_else(|| anyhow::anyhow!("insert succeeded without a generated identifier"))?;

        let fetched = self.network.fetch(&id).await?;
        assert_eq!(fetched.data, data, "fetched data should match inserted data");
        assert_eq!(fetched.content_type, "text/plain");

        Ok(())
    }

    /// Test that manifest entries and the default file can be fetched.
    pub async fn test_manifest(&self) -> anyhow::Result<()> {
        let insert_id = self
            .network
            .generate_key_pair()
            .insert_id
            .with_doc_name(format!("{}-site", self.prefix));
        let mut entries = BTreeMap::new();
        entries.insert(
            "index.html".to_owned(),
            ManifestEntry::new("text/html", Bytes::from_static(b"<p>index</p>")),
        );
        entries.insert(
            "style.css".to_owned(),
            ManifestEntry::new("text/css", Bytes::from_static(b"p {}")),
        );

        let directory = self
            .network
            .insert_manifest(&insert_id, entries, "index.html")
            .await?;
        assert_ne!(directory, insert_id, "manifest should be requested by its public id");

        let style = self
            .network
            .fetch(&directory.clone().with_meta(["style.css"]))
            .await?;
        assert_eq!(style.data, Bytes::from_static(b"p {}"));
        assert_eq!(style.content_type, "text/css");

        let default = self.network.fetch(&directory).await?;
        assert_eq!(default.data, Bytes::from_static(b"<p>index</p>"));

        Ok(())
    }
}

enum Progress {
    GeneratedId(ContentId),
    Succeeded,
    Failed(InsertError),
}

struct ChannelCallback {
    tx: mpsc::UnboundedSender<Progress>,
}

impl InsertCallback for ChannelCallback {
    fn on_generated_id(&self, id: ContentId) {
        let _ = self.tx.send(Progress::GeneratedId(id));
    }

    fn on_success(&self) {
        let _ = self.tx.send(Progress::Succeeded);
    }

    fn on_failure(&self, error: InsertError) {
        let _ = self.tx.send(Progress::Failed(error));
    }
}
