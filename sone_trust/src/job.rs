use std::fmt;

use async_trait::async_trait;
use sone_core::GraphError;
use tracing::{debug, warn};

use crate::Completion;

/// Identifies the work a job does.
///
/// Two jobs with equal keys do the same work; how the updater treats the
/// second one is up to its [`Coalesce`] rule. Trust jobs are keyed by
/// truster and trustee only, so a newer score for the same pair has the
/// same key as the older one.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum JobKey {
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
        /// `None` removes the property.
        value: Option<String>,
    },
    SetTrust {
        truster: String,
        trustee: String,
    },
}

/// What to do with a job whose key equals that of a pending job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coalesce {
    /// Drop the new job; callers wait on the pending one.
    KeepPending,
    /// Remove the pending job, finish it unsuccessfully and queue the new
    /// one.
    Supersede,
}

/// A mutation of the identity graph.
///
/// [`run`](Self::run) performs the mutation once and records the outcome
/// in the job's [`Completion`]. Graph errors are logged and only turn into
/// an unsuccessful outcome.
#[async_trait]
pub trait UpdateJob: fmt::Display + Send + Sync {
    fn key(&self) -> JobKey;

    fn completion(&self) -> &Completion;

    /// Performs the mutation and, if the graph accepted it, applies it to
    /// the local identities.
    async fn perform(&self) -> Result<(), GraphError>;

    fn coalesce(&self) -> Coalesce {
        Coalesce::KeepPending
    }

    async fn run(&self) -> bool {
        let success = match self.perform().await {
            Ok(()) => {
                debug!("{self} succeeded");
                true
            }
            Err(err) => {
                warn!("{self} failed: {err}");
                false
            }
        };
        self.completion().finish(success);
        success
    }

    async fn wait_for_completion(&self) -> bool {
        self.completion().wait().await
    }

    fn wait_for_completion_blocking(&self) -> bool {
        self.completion().wait_blocking()
    }
}
