//! Sone entities as far as the core needs them.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{ContentId, ContentIdError, UpdatableKey};

/// A Sone: a profile published as an updatable key.
///
/// Everything but the latest known edition is fixed at construction. The
/// latest edition only ever moves forward and can be advanced concurrently
/// from network callbacks.
#[derive(Debug)]
pub struct Sone {
    id: String,
    request_id: ContentId,
    time: DateTime<Utc>,
    latest_edition: AtomicI64,
}

impl Sone {
    pub fn new(id: impl Into<String>, request_id: ContentId) -> Self {
        Self {
            id: id.into(),
            request_id,
            time: DateTime::<Utc>::UNIX_EPOCH,
            latest_edition: AtomicI64::new(0),
        }
    }

    /// Sets the time of the last update of this Sone.
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    pub fn with_latest_edition(self, edition: i64) -> Self {
        self.latest_edition.store(edition, Ordering::SeqCst);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn request_id(&self) -> &ContentId {
        &self.request_id
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    pub fn latest_edition(&self) -> i64 {
        self.latest_edition.load(Ordering::SeqCst)
    }

    /// Raises the latest edition to `edition`.
    ///
    /// Returns true if `edition` was strictly greater than the latest known
    /// edition. Of several concurrent calls with the same edition, exactly
    /// one returns true.
    pub fn advance_latest_edition(&self, edition: i64) -> bool {
        self.latest_edition.fetch_max(edition, Ordering::SeqCst) < edition
    }

    /// The key to watch for new editions of this Sone: its request
    /// identifier at the latest known edition.
    pub fn watch_key(&self) -> Result<UpdatableKey, ContentIdError> {
        self.request_id
            .clone()
            .with_edition(self.latest_edition())
            .try_into()
    }
}

impl fmt::Display for Sone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sone[{}]", self.id)
    }
}

/// An image belonging to a Sone.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Image {
    pub id: String,
    pub sone_id: Option<String>,
}

impl Image {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sone_id: None,
        }
    }

    pub fn with_sone(mut self, sone_id: impl Into<String>) -> Self {
        self.sone_id = Some(sone_id.into());
        self
    }
}

/// Image data that has been uploaded but not inserted yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemporaryImage {
    pub id: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl TemporaryImage {
    pub fn new(id: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// The part of the MIME type after the last `/`, e.g. `png` for
    /// `image/png`.
    pub fn mime_subtype(&self) -> &str {
        self.mime_type
            .rsplit_once('/')
            .map_or(self.mime_type.as_str(), |(_, subtype)| subtype)
    }
}

/// Downloads and stores a Sone after a new edition was found.
#[async_trait]
pub trait SoneDownloader: Send + Sync {
    async fn fetch_sone(&self, sone: &Sone);
}
