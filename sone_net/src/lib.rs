//! Network interaction of the Sone core.
//!
//! [`NetworkInterface`] sits between the rest of the application and a
//! [`ContentNetwork`]:
//!
//! - fetching with transparent redirect resolution (`fetch_uri`)
//! - key pair generation
//! - image inserts that report their lifecycle as [`CoreEvent`]s and can be
//!   cancelled through an [`InsertToken`], plus directory inserts
//! - edition watches for Sones and for arbitrary updatable keys
//!
//! Network callbacks arrive on threads the network owns. Work that must not
//! run on those threads is spawned on the Tokio runtime that was current
//! when the interface was created.
//!
//! [`CoreEvent`]: sone_core::CoreEvent

use std::sync::Arc;

use dashmap::DashMap;
use sone_core::config::SubscriptionConfig;
use sone_core::{ContentId, ContentNetwork, EventSink};
use tokio::runtime::Handle;

mod fetch;
mod insert;
mod subscriptions;

#[cfg(test)]
mod mock;

pub use insert::InsertToken;
pub use subscriptions::UpdateCallback;

use subscriptions::Watch;

/// Fetches, inserts and edition watches on top of a [`ContentNetwork`].
pub struct NetworkInterface {
    network: Arc<dyn ContentNetwork>,
    events: Arc<dyn EventSink>,
    config: SubscriptionConfig,
    runtime: Handle,
    /// Watches keyed by Sone id.
    sone_watches: DashMap<String, Watch>,
    /// Watches keyed by the identifier they were registered with.
    key_watches: DashMap<ContentId, Watch>,
}

impl NetworkInterface {
    /// Creates an interface on top of `network` that posts insert events to
    /// `events`.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime; use
    /// [`with_runtime`](Self::with_runtime) there.
    pub fn new(
        network: Arc<dyn ContentNetwork>,
        events: Arc<dyn EventSink>,
        config: SubscriptionConfig,
    ) -> Self {
        Self::with_runtime(network, events, config, Handle::current())
    }

    pub fn with_runtime(
        network: Arc<dyn ContentNetwork>,
        events: Arc<dyn EventSink>,
        config: SubscriptionConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            network,
            events,
            config,
            runtime,
            sone_watches: DashMap::new(),
            key_watches: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SubscriptionConfig {
        &self.config
    }
}

impl std::fmt::Debug for NetworkInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkInterface")
            .field("config", &self.config)
            .field("sone_watches", &self.sone_watches.len())
            .field("key_watches", &self.key_watches.len())
            .finish()
    }
}
