//! Local mirror of identities from the identity graph.
//!
//! The identity graph is the source of truth. These types keep a local copy
//! of what the core has successfully written to it, so they use interior
//! mutability and are shared as `Arc<Identity>` / `Arc<OwnIdentity>`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::ContentId;

/// A directed trust record as seen from the trustee.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Trust {
    /// Score explicitly assigned by the truster.
    pub explicit: Option<i32>,
    /// Score derived by the identity graph.
    pub implicit: Option<i32>,
    /// Distance between truster and trustee in the graph.
    pub distance: Option<u32>,
}

impl Trust {
    pub fn new(explicit: Option<i32>, implicit: Option<i32>, distance: Option<u32>) -> Self {
        Self {
            explicit,
            implicit,
            distance,
        }
    }
}

#[derive(Debug, Default)]
struct IdentityState {
    contexts: BTreeSet<String>,
    properties: BTreeMap<String, String>,
    /// Incoming trust, keyed by truster id.
    trust: HashMap<String, Trust>,
}

/// An identity of the identity graph. Equality and hashing use the id only.
#[derive(Debug)]
pub struct Identity {
    id: String,
    nickname: Option<String>,
    request_id: ContentId,
    state: RwLock<IdentityState>,
}

impl Identity {
    pub fn new(id: impl Into<String>, nickname: Option<String>, request_id: ContentId) -> Self {
        Self {
            id: id.into(),
            nickname,
            request_id,
            state: RwLock::new(IdentityState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    pub fn request_id(&self) -> &ContentId {
        &self.request_id
    }

    pub fn contexts(&self) -> BTreeSet<String> {
        self.read().contexts.clone()
    }

    pub fn has_context(&self, context: &str) -> bool {
        self.read().contexts.contains(context)
    }

    pub fn add_context(&self, context: impl Into<String>) {
        self.write().contexts.insert(context.into());
    }

    pub fn remove_context(&self, context: &str) {
        self.write().contexts.remove(context);
    }

    pub fn properties(&self) -> BTreeMap<String, String> {
        self.read().properties.clone()
    }

    pub fn property(&self, name: &str) -> Option<String> {
        self.read().properties.get(name).cloned()
    }

    pub fn set_property(&self, name: impl Into<String>, value: impl Into<String>) {
        self.write().properties.insert(name.into(), value.into());
    }

    pub fn remove_property(&self, name: &str) {
        self.write().properties.remove(name);
    }

    /// Trust assigned to this identity by `truster`.
    pub fn trust(&self, truster: &Identity) -> Option<Trust> {
        self.read().trust.get(truster.id()).copied()
    }

    pub fn set_trust(&self, truster: &Identity, trust: Trust) {
        self.write().trust.insert(truster.id().to_owned(), trust);
    }

    pub fn remove_trust(&self, truster: &Identity) {
        self.write().trust.remove(truster.id());
    }

    fn read(&self) -> RwLockReadGuard<'_, IdentityState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IdentityState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.nickname {
            Some(nickname) => write!(f, "{}({nickname})", self.id),
            None => f.write_str(&self.id),
        }
    }
}

/// An identity this node can insert for.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct OwnIdentity {
    identity: Identity,
    insert_id: ContentId,
}

impl OwnIdentity {
    pub fn new(identity: Identity, insert_id: ContentId) -> Self {
        Self {
            identity,
            insert_id,
        }
    }

    pub fn insert_id(&self) -> &ContentId {
        &self.insert_id
    }
}

impl Deref for OwnIdentity {
    type Target = Identity;

    fn deref(&self) -> &Identity {
        &self.identity
    }
}

impl fmt::Display for OwnIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.identity.fmt(f)
    }
}
