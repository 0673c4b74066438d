//! Core Sone types and capability traits.
//!
//! This crate defines what every other Sone crate shares: how content in the
//! network is addressed, which services the core talks to, and the entities
//! that flow between them.
//!
//! ## Addressing
//!
//! - Content identifiers (`id::ContentId`) and the validated updatable
//!   subset (`id::UpdatableKey`)
//! - Urgency tiers used when polling for new editions (`Priority`)
//!
//! ## Capability traits
//!
//! The core never talks to a concrete network or identity service. It only
//! depends on these contracts:
//!
//! - `network::ContentNetwork` with its callbacks (`InsertCallback`,
//!   `EditionCallback`) and the cancellable `Transfer` handle
//! - `graph::IdentityGraph` for mutations of the trust/identity graph
//! - `events::EventSink` for insert lifecycle notifications
//! - `data::SoneDownloader` for re-fetching a Sone after a new edition
//!
//! ## Entities
//!
//! `Sone`, `Image` and `TemporaryImage` in `data`, and `Identity`,
//! `OwnIdentity` and `Trust` in `identity`.

pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod graph;
pub mod id;
pub mod identity;
pub mod network;
pub mod priority;

// Recording fakes (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

// --- Core Public Surface ---

pub use config::{DispatchPolicy, SoneConfig};
pub use data::{Image, Sone, SoneDownloader, TemporaryImage};
pub use error::{SoneError, SoneResult};
pub use events::{CoreEvent, EventBus, EventSink};
pub use graph::{GraphError, IdentityGraph};
pub use id::{ContentId, ContentIdError, KeyType, UpdatableKey};
pub use identity::{Identity, OwnIdentity, Trust};
pub use network::{
    ContentNetwork, EditionCallback, FetchError, FetchResult, Fetched, FoundEdition,
    InsertBlock, InsertCallback, InsertError, KeyPair, ManifestEntry, Transfer,
};
pub use priority::Priority;
