//! Queued mutations of the identity graph.
//!
//! Every mutation is an [`UpdateJob`] carrying a [`Completion`] that
//! callers can wait on, from async code or from a plain thread. The
//! [`TrustUpdater`] queues jobs, folds duplicates into the pending job or
//! lets a newer trust value replace an older one, and runs the queue
//! according to its [`DispatchPolicy`](sone_core::DispatchPolicy).
//!
//! ```ignore
//! let updater = TrustUpdater::new(graph, &config.updater);
//! updater.start();
//! let job = updater.set_trust(own.clone(), other.clone(), Some(75), "Set from Sone");
//! assert!(job.wait_for_completion().await);
//! ```

mod completion;
mod job;
mod jobs;
mod updater;

pub use completion::Completion;
pub use job::{Coalesce, JobKey, UpdateJob};
pub use jobs::{AddContextJob, RemoveContextJob, SetPropertyJob, SetTrustJob};
pub use updater::TrustUpdater;
