//! Edition watches.
//!
//! Sone watches are keyed by Sone id and re-fetch the Sone whenever an
//! edition newer than its latest known edition shows up. Key watches are
//! keyed by the identifier they were registered with and hand every found
//! edition to a caller supplied [`UpdateCallback`].
//!
//! There is at most one watch per key. Registering again replaces the
//! watch and releases the network subscription of the replaced one. The
//! network is subscribed and unsubscribed while the key's map entry is
//! locked, so callbacks that register or unregister watches from inside
//! `subscribe` would deadlock.

use std::hash::Hash;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sone_core::{
    ContentId, EditionCallback, FoundEdition, Priority, Sone, SoneDownloader, UpdatableKey,
};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::NetworkInterface;

/// Receives the editions found for a key registered with
/// [`NetworkInterface::register_usk`].
pub trait UpdateCallback: Send + Sync {
    /// `new_known_good` is true if the edition was actually fetched,
    /// `new_slot` if it is higher than every edition seen before.
    fn edition_found(&self, id: &ContentId, edition: i64, new_known_good: bool, new_slot: bool);
}

impl<F> UpdateCallback for F
where
    F: Fn(&ContentId, i64, bool, bool) + Send + Sync,
{
    fn edition_found(&self, id: &ContentId, edition: i64, new_known_good: bool, new_slot: bool) {
        self(id, edition, new_known_good, new_slot)
    }
}

pub(crate) struct Watch {
    key: UpdatableKey,
    callback: Arc<dyn EditionCallback>,
}

/// Advances a Sone's latest edition and re-fetches it.
struct NewEditionFound {
    sone: Arc<Sone>,
    downloader: Arc<dyn SoneDownloader>,
    runtime: Handle,
}

impl EditionCallback for NewEditionFound {
    fn on_found_edition(&self, found: FoundEdition) {
        debug!("found edition {} of {}", found.edition, self.sone);
        if !self.sone.advance_latest_edition(found.edition) {
            return;
        }
        let sone = self.sone.clone();
        let downloader = self.downloader.clone();
        self.runtime.spawn(async move {
            downloader.fetch_sone(&sone).await;
        });
    }

    fn polling_priority_normal(&self) -> Priority {
        Priority::Interactive
    }

    fn polling_priority_progress(&self) -> Priority {
        Priority::Interactive
    }
}

struct KeyWatch {
    callback: Arc<dyn UpdateCallback>,
}

impl EditionCallback for KeyWatch {
    fn on_found_edition(&self, found: FoundEdition) {
        self.callback.edition_found(
            found.key.id(),
            found.edition,
            found.new_known_good,
            found.new_slot,
        );
    }

    fn polling_priority_normal(&self) -> Priority {
        Priority::Prefetch
    }

    fn polling_priority_progress(&self) -> Priority {
        Priority::Interactive
    }
}

impl NetworkInterface {
    /// Watches `sone` for new editions and hands it to `downloader` after
    /// every edition that advances it.
    ///
    /// Sones updated within the configured recency window get an immediate
    /// background check. A Sone without an updatable request identifier is
    /// not watched.
    pub fn register_sone(&self, sone: Arc<Sone>, downloader: Arc<dyn SoneDownloader>) {
        let key = match sone.watch_key() {
            Ok(key) => key,
            Err(err) => {
                warn!("not watching {sone}: {err}");
                return;
            }
        };
        let recently_updated = Utc::now() - sone.time() < self.config.recent_update_window();
        debug!("watching {sone} at {key}, background check: {recently_updated}");

        let watch = Watch {
            key,
            callback: Arc::new(NewEditionFound {
                sone: sone.clone(),
                downloader,
                runtime: self.runtime.clone(),
            }),
        };
        self.install(&self.sone_watches, sone.id().to_owned(), watch, recently_updated);
    }

    /// Stops watching `sone`. Does nothing if it is not watched.
    pub fn unregister_sone(&self, sone: &Sone) {
        self.release(&self.sone_watches, sone.id());
    }

    /// Watches `id` for new editions and hands them to `callback`.
    ///
    /// The network is asked to look for newer editions right away. An
    /// identifier that is not an updatable key is not watched.
    pub fn register_usk(&self, id: &ContentId, callback: Arc<dyn UpdateCallback>) {
        let key = match UpdatableKey::try_from(id.clone()) {
            Ok(key) => key,
            Err(err) => {
                warn!("not watching {id}: {err}");
                return;
            }
        };
        let watch = Watch {
            key,
            callback: Arc::new(KeyWatch { callback }),
        };
        self.install(&self.key_watches, id.clone(), watch, true);
    }

    /// Stops watching `id`.
    pub fn unregister_usk(&self, id: &ContentId) {
        if !self.release(&self.key_watches, id) {
            info!("no watch registered for {id}");
        }
    }

    pub fn is_watching_sone(&self, sone_id: &str) -> bool {
        self.sone_watches.contains_key(sone_id)
    }

    pub fn is_watching_usk(&self, id: &ContentId) -> bool {
        self.key_watches.contains_key(id)
    }

    fn install<K: Eq + Hash>(
        &self,
        watches: &DashMap<K, Watch>,
        key: K,
        watch: Watch,
        run_background_fetch: bool,
    ) {
        match watches.entry(key) {
            Entry::Occupied(mut entry) => {
                let replaced = entry.get();
                self.network.unsubscribe(&replaced.key, &replaced.callback);
                self.network
                    .subscribe(&watch.key, watch.callback.clone(), run_background_fetch);
                entry.insert(watch);
            }
            Entry::Vacant(entry) => {
                self.network
                    .subscribe(&watch.key, watch.callback.clone(), run_background_fetch);
                entry.insert(watch);
            }
        }
    }

    /// Returns false if there was no watch for `key`.
    fn release<K, Q>(&self, watches: &DashMap<K, Watch>, key: &Q) -> bool
    where
        K: Eq + Hash + std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        watches
            .remove_if(key, |_, watch| {
                self.network.unsubscribe(&watch.key, &watch.callback);
                true
            })
            .is_some()
    }
}
