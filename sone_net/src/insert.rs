//! Image and directory inserts.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sone_core::{
    ContentId, CoreEvent, EventSink, Image, InsertBlock, InsertCallback, InsertError,
    ManifestEntry, Priority, SoneError, SoneResult, TemporaryImage, Transfer,
};
use tracing::debug;

use crate::NetworkInterface;

impl NetworkInterface {
    /// Starts inserting `temporary` as the data of `image`.
    ///
    /// The data goes to a fresh random key with `<image id>.<MIME subtype>`
    /// as document name. Once the insert is running, `ImageInsertStarted` is
    /// posted and the returned token reports the rest of the lifecycle.
    pub fn insert_image(
        &self,
        temporary: &TemporaryImage,
        image: &Image,
    ) -> SoneResult<Arc<InsertToken>> {
        let file_name = format!("{}.{}", image.id, temporary.mime_subtype());
        let target = self.network.generate_key_pair().insert_id.with_doc_name(file_name);
        let block = InsertBlock {
            data: temporary.data.clone(),
            content_type: temporary.mime_type.clone(),
            target,
            priority: Priority::Interactive,
        };

        let token = Arc::new(InsertToken::new(image.clone(), self.events.clone()));
        let transfer = self
            .network
            .insert(block, token.clone())
            .map_err(SoneError::ImageInsert)?;
        token.bind(transfer);
        Ok(token)
    }

    /// Inserts `entries` as a directory under `insert_id`. Requesting the
    /// returned identifier itself yields `default_file`.
    pub async fn insert_directory(
        &self,
        insert_id: &ContentId,
        entries: BTreeMap<String, ManifestEntry>,
        default_file: &str,
    ) -> SoneResult<ContentId> {
        let id = self
            .network
            .insert_manifest(insert_id, entries, default_file)
            .await?;
        debug!("inserted directory {insert_id} as {id}");
        Ok(id)
    }
}

enum Outcome {
    Finished,
    Failed(InsertError),
    Aborted,
}

#[derive(Default)]
struct TokenState {
    transfer: Option<Arc<dyn Transfer>>,
    started: bool,
    settled: bool,
    resulting_id: Option<ContentId>,
    /// Outcome reported by the network before the transfer was bound.
    held: Option<Outcome>,
}

/// Handle of one running image insert.
///
/// Posts `ImageInsertStarted` once the transfer runs and then exactly one
/// of `ImageInsertFinished`, `ImageInsertFailed` and `ImageInsertAborted`.
/// Events are posted while the token's state is locked, so event sinks must
/// not call back into the token.
pub struct InsertToken {
    image: Image,
    events: Arc<dyn EventSink>,
    state: Mutex<TokenState>,
}

impl InsertToken {
    fn new(image: Image, events: Arc<dyn EventSink>) -> Self {
        Self {
            image,
            events,
            state: Mutex::new(TokenState::default()),
        }
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    /// The identifier the image can be requested from, once the network
    /// has generated it.
    pub fn resulting_id(&self) -> Option<ContentId> {
        self.lock().resulting_id.clone()
    }

    /// Returns true once a terminal event has been decided.
    pub fn is_settled(&self) -> bool {
        self.lock().settled
    }

    /// Cancels the insert.
    ///
    /// Posts `ImageInsertAborted` unless the insert already finished,
    /// failed or was aborted.
    pub fn cancel(&self) {
        let transfer = self.lock().transfer.clone();
        if let Some(transfer) = transfer {
            transfer.cancel();
        }
        self.settle(Outcome::Aborted);
    }

    fn bind(&self, transfer: Box<dyn Transfer>) {
        let mut state = self.lock();
        state.transfer = Some(Arc::from(transfer));
        state.started = true;
        self.events.post(CoreEvent::ImageInsertStarted {
            image: self.image.clone(),
        });
        if let Some(outcome) = state.held.take() {
            self.post(&state, outcome);
        }
    }

    fn settle(&self, outcome: Outcome) {
        let mut state = self.lock();
        if state.settled {
            return;
        }
        state.settled = true;
        if state.started {
            self.post(&state, outcome);
        } else {
            state.held = Some(outcome);
        }
    }

    fn post(&self, state: &TokenState, outcome: Outcome) {
        let image = self.image.clone();
        let event = match outcome {
            Outcome::Finished => CoreEvent::ImageInsertFinished {
                image,
                id: state.resulting_id.clone(),
            },
            Outcome::Failed(error) => CoreEvent::ImageInsertFailed { image, error },
            Outcome::Aborted => CoreEvent::ImageInsertAborted { image },
        };
        self.events.post(event);
    }

    fn lock(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InsertCallback for InsertToken {
    fn on_generated_id(&self, id: ContentId) {
        debug!("insert of image {} generated {id}", self.image.id);
        self.lock().resulting_id = Some(id);
    }

    fn on_success(&self) {
        self.settle(Outcome::Finished);
    }

    fn on_failure(&self, error: InsertError) {
        if error.is_cancellation() {
            self.settle(Outcome::Aborted);
        } else {
            debug!("insert of image {} failed: {error}", self.image.id);
            self.settle(Outcome::Failed(error));
        }
    }
}

impl fmt::Debug for InsertToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("InsertToken")
            .field("image", &self.image)
            .field("started", &state.started)
            .field("settled", &state.settled)
            .field("resulting_id", &state.resulting_id)
            .finish()
    }
}
