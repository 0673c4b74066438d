//! Scheduling of identity graph updates.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sone_core::config::UpdaterConfig;
use sone_core::{DispatchPolicy, Identity, IdentityGraph, OwnIdentity};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{AddContextJob, Coalesce, RemoveContextJob, SetPropertyJob, SetTrustJob, UpdateJob};

struct Inner {
    queue: Mutex<VecDeque<Arc<dyn UpdateJob>>>,
    notify: Notify,
    cancel: CancellationToken,
}

impl Inner {
    fn queue(&self) -> MutexGuard<'_, VecDeque<Arc<dyn UpdateJob>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pop(&self) -> Option<Arc<dyn UpdateJob>> {
        let mut queue = self.queue();
        let job = queue.pop_front();
        if job.is_some() && !queue.is_empty() {
            // hand the rest to another idle worker
            self.notify.notify_one();
        }
        job
    }
}

/// Queues identity graph updates and runs them in the background.
///
/// Submitting a job whose [`JobKey`](crate::JobKey) equals that of a
/// pending job is resolved by the new job's [`Coalesce`] rule. How queued
/// jobs are executed is decided by the configured [`DispatchPolicy`].
pub struct TrustUpdater {
    graph: Arc<dyn IdentityGraph>,
    dispatch: DispatchPolicy,
    inner: Arc<Inner>,
    started: AtomicBool,
}

impl TrustUpdater {
    /// Creates a stopped updater. Jobs can be submitted right away and run
    /// once [`start`](Self::start) was called.
    pub fn new(graph: Arc<dyn IdentityGraph>, config: &UpdaterConfig) -> Self {
        Self {
            graph,
            dispatch: config.dispatch,
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                cancel: CancellationToken::new(),
            }),
            started: AtomicBool::new(false),
        }
    }

    /// Spawns the workers. Calling it again has no effect.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let (workers, spawn_jobs) = match self.dispatch {
            DispatchPolicy::Sequential => (1, false),
            DispatchPolicy::TaskPerJob => (1, true),
            DispatchPolicy::WorkerPool { workers } => (workers.max(1), false),
        };
        info!("starting trust updater with {workers} workers ({:?})", self.dispatch);
        for _ in 0..workers {
            tokio::spawn(work(self.inner.clone(), spawn_jobs));
        }
    }

    /// Stops the workers and finishes every queued job unsuccessfully.
    ///
    /// Jobs that are already running complete normally. Jobs submitted
    /// afterwards are finished unsuccessfully right away.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
        let pending: Vec<_> = self.inner.queue().drain(..).collect();
        if !pending.is_empty() {
            info!("stopping trust updater, dropping {} jobs", pending.len());
        }
        for job in pending {
            job.completion().finish(false);
        }
    }

    /// Number of queued jobs that have not started.
    pub fn pending(&self) -> usize {
        self.inner.queue().len()
    }

    /// Queues `job` and returns the job whose completion tells the outcome
    /// of the requested work: `job` itself, or the pending job it was
    /// coalesced with.
    pub fn submit(&self, job: Arc<dyn UpdateJob>) -> Arc<dyn UpdateJob> {
        let mut queue = self.inner.queue();
        // checked under the queue lock so `stop` either drains the job or
        // it is rejected here
        if self.inner.cancel.is_cancelled() {
            drop(queue);
            warn!("trust updater is stopped, not running {job}");
            job.completion().finish(false);
            return job;
        }

        let key = job.key();
        if let Some(position) = queue.iter().position(|pending| pending.key() == key) {
            match job.coalesce() {
                Coalesce::KeepPending => {
                    debug!("{job} is already pending");
                    return queue[position].clone();
                }
                Coalesce::Supersede => {
                    if let Some(superseded) = queue.remove(position) {
                        debug!("{job} supersedes {superseded}");
                        superseded.completion().finish(false);
                    }
                }
            }
        }
        queue.push_back(job.clone());
        drop(queue);

        self.inner.notify.notify_one();
        job
    }

    /// Adds `context` to `owner` and waits for the outcome.
    pub async fn add_context_wait(
        &self,
        owner: Arc<OwnIdentity>,
        context: impl Into<String>,
    ) -> bool {
        let job = self.submit(Arc::new(AddContextJob::new(
            self.graph.clone(),
            owner,
            context,
        )));
        job.wait_for_completion().await
    }

    pub fn remove_context(
        &self,
        owner: Arc<OwnIdentity>,
        context: impl Into<String>,
    ) -> Arc<dyn UpdateJob> {
        self.submit(Arc::new(RemoveContextJob::new(
            self.graph.clone(),
            owner,
            context,
        )))
    }

    pub fn set_property(
        &self,
        owner: Arc<OwnIdentity>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Arc<dyn UpdateJob> {
        self.submit(Arc::new(SetPropertyJob::new(
            self.graph.clone(),
            owner,
            name,
            Some(value.into()),
        )))
    }

    pub fn remove_property(
        &self,
        owner: Arc<OwnIdentity>,
        name: impl Into<String>,
    ) -> Arc<dyn UpdateJob> {
        self.submit(Arc::new(SetPropertyJob::new(
            self.graph.clone(),
            owner,
            name,
            None,
        )))
    }

    /// Sets the trust of `truster` in `trustee`, or removes it if `score`
    /// is `None`.
    ///
    /// Replaces a pending trust update for the same pair. The replaced job
    /// finishes with `false` even though the pair's trust is still written,
    /// with the newer score.
    pub fn set_trust(
        &self,
        truster: Arc<OwnIdentity>,
        trustee: Arc<Identity>,
        score: Option<i32>,
        comment: impl Into<String>,
    ) -> Arc<dyn UpdateJob> {
        self.submit(Arc::new(SetTrustJob::new(
            self.graph.clone(),
            truster,
            trustee,
            score,
            comment,
        )))
    }
}

impl Drop for TrustUpdater {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn work(inner: Arc<Inner>, spawn_jobs: bool) {
    loop {
        if inner.cancel.is_cancelled() {
            break;
        }
        let job = match inner.pop() {
            Some(job) => job,
            None => {
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    _ = inner.notify.notified() => {}
                }
                continue;
            }
        };
        debug!("running {job}");
        if spawn_jobs {
            tokio::spawn(async move {
                job.run().await;
            });
        } else {
            job.run().await;
        }
    }
    debug!("trust updater worker stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sone_core::testutil::{GraphCall, RecordingGraph};
    use sone_core::{ContentId, GraphError, Trust};

    use super::*;

    fn own(id: &str) -> Arc<OwnIdentity> {
        Arc::new(OwnIdentity::new(
            Identity::new(id, None, ContentId::parse(&format!("USK@{id}/WebOfTrust/0")).unwrap()),
            ContentId::parse(&format!("USK@{id}-insert/WebOfTrust/0")).unwrap(),
        ))
    }

    fn identity(id: &str) -> Arc<Identity> {
        Arc::new(Identity::new(
            id,
            None,
            ContentId::parse(&format!("USK@{id}/WebOfTrust/0")).unwrap(),
        ))
    }

    fn updater(graph: &Arc<RecordingGraph>, dispatch: DispatchPolicy) -> TrustUpdater {
        TrustUpdater::new(graph.clone(), &UpdaterConfig { dispatch })
    }

    #[tokio::test]
    async fn add_context_wait_reports_outcome() {
        let graph = Arc::new(RecordingGraph::new());
        let updater = updater(&graph, DispatchPolicy::Sequential);
        updater.start();
        let owner = own("owner");

        assert!(updater.add_context_wait(owner.clone(), "Sone").await);
        assert!(owner.has_context("Sone"));

        graph.fail_with(GraphError::Unavailable("offline".to_owned()));
        assert!(!updater.add_context_wait(owner.clone(), "Other").await);
        assert!(!owner.has_context("Other"));
    }

    #[tokio::test]
    async fn sequential_updater_runs_jobs_in_order() {
        let graph = Arc::new(RecordingGraph::new());
        let updater = updater(&graph, DispatchPolicy::Sequential);
        let owner = own("owner");

        updater.set_property(owner.clone(), "Sone.Edition", "1");
        updater.remove_context(owner.clone(), "Old");
        let last = updater.remove_property(owner.clone(), "Sone.Stale");
        updater.start();

        assert!(last.wait_for_completion().await);
        assert_eq!(
            graph.calls(),
            vec![
                GraphCall::SetProperty {
                    owner: "owner".to_owned(),
                    name: "Sone.Edition".to_owned(),
                    value: "1".to_owned(),
                },
                GraphCall::RemoveContext {
                    owner: "owner".to_owned(),
                    context: "Old".to_owned(),
                },
                GraphCall::RemoveProperty {
                    owner: "owner".to_owned(),
                    name: "Sone.Stale".to_owned(),
                },
            ]
        );
        assert_eq!(owner.property("Sone.Edition").as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn equal_pending_job_is_kept() {
        let graph = Arc::new(RecordingGraph::new());
        let updater = updater(&graph, DispatchPolicy::Sequential);
        let owner = own("owner");

        let first = updater.remove_context(owner.clone(), "Sone");
        let second = updater.remove_context(owner.clone(), "Sone");
        let other = updater.remove_context(owner.clone(), "Other");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(updater.pending(), 2);

        updater.start();
        assert!(second.wait_for_completion().await);
        assert!(other.wait_for_completion().await);
        assert_eq!(graph.calls().len(), 2);
    }

    #[tokio::test]
    async fn newer_trust_supersedes_pending_trust() {
        let graph = Arc::new(RecordingGraph::new());
        let updater = updater(&graph, DispatchPolicy::Sequential);
        let truster = own("truster");
        let trustee = identity("trustee");

        let first = updater.set_trust(truster.clone(), trustee.clone(), Some(10), "first");
        let second = updater.set_trust(truster.clone(), trustee.clone(), Some(20), "second");

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.completion().outcome(), Some(false));
        assert_eq!(updater.pending(), 1);

        updater.start();
        assert!(second.wait_for_completion().await);
        assert_eq!(
            graph.calls(),
            vec![GraphCall::SetTrust {
                truster: "truster".to_owned(),
                trustee: "trustee".to_owned(),
                score: 20,
                comment: "second".to_owned(),
            }]
        );
        assert_eq!(
            trustee.trust(&truster),
            Some(Trust::new(Some(20), None, Some(0)))
        );
    }

    #[tokio::test]
    async fn task_per_job_runs_jobs_concurrently() {
        let graph = Arc::new(RecordingGraph::new().with_delay(Duration::from_millis(50)));
        let updater = updater(&graph, DispatchPolicy::TaskPerJob);
        let owner = own("owner");

        let jobs: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|context| updater.remove_context(owner.clone(), context))
            .collect();
        updater.start();

        for job in jobs {
            assert!(job.wait_for_completion().await);
        }
        assert_eq!(graph.max_in_flight(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_pool_bounds_concurrency() {
        let graph = Arc::new(RecordingGraph::new().with_delay(Duration::from_millis(30)));
        let updater = updater(&graph, DispatchPolicy::WorkerPool { workers: 3 });
        let owner = own("owner");

        let jobs: Vec<_> = (0..6)
            .map(|n| updater.set_property(owner.clone(), format!("key{n}"), "value"))
            .collect();
        updater.start();

        for job in jobs {
            assert!(job.wait_for_completion().await);
        }
        assert_eq!(graph.calls().len(), 6);
        assert_eq!(graph.max_in_flight(), 3);
    }

    #[tokio::test]
    async fn sequential_updater_runs_one_job_at_a_time() {
        let graph = Arc::new(RecordingGraph::new().with_delay(Duration::from_millis(10)));
        let updater = updater(&graph, DispatchPolicy::Sequential);
        let owner = own("owner");

        let jobs: Vec<_> = (0..4)
            .map(|n| updater.set_property(owner.clone(), format!("key{n}"), "value"))
            .collect();
        updater.start();

        for job in jobs {
            assert!(job.wait_for_completion().await);
        }
        assert_eq!(graph.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn stop_fails_pending_jobs() {
        let graph = Arc::new(RecordingGraph::new());
        let updater = updater(&graph, DispatchPolicy::Sequential);
        let owner = own("owner");

        let pending = updater.remove_context(owner.clone(), "Sone");
        updater.stop();

        assert!(!pending.wait_for_completion().await);
        assert_eq!(updater.pending(), 0);

        let late = updater.remove_context(owner.clone(), "Late");
        assert!(!late.wait_for_completion().await);
        assert!(graph.calls().is_empty());
    }

    #[test]
    fn submit_racing_stop_never_strands_a_job() {
        let graph = Arc::new(RecordingGraph::new());
        let owner = own("owner");

        for round in 0..20 {
            let updater = updater(&graph, DispatchPolicy::Sequential);
            let guard = updater.inner.queue();
            let job = std::thread::scope(|scope| {
                let submitter = scope.spawn(|| {
                    updater.remove_context(owner.clone(), format!("context{round}"))
                });
                // let the submitter block on the queue, then stop underneath it
                std::thread::sleep(Duration::from_millis(5));
                let mut guard = guard;
                updater.inner.cancel.cancel();
                guard.drain(..).for_each(|job| {
                    job.completion().finish(false);
                });
                drop(guard);
                submitter.join().unwrap()
            });

            assert_eq!(job.completion().outcome(), Some(false));
            assert_eq!(updater.pending(), 0);
        }
        assert!(graph.calls().is_empty());
    }

    #[tokio::test]
    async fn jobs_submitted_while_running_are_picked_up() {
        let graph = Arc::new(RecordingGraph::new());
        let updater = updater(&graph, DispatchPolicy::Sequential);
        updater.start();
        let owner = own("owner");

        for n in 0..3 {
            let job = updater.remove_context(owner.clone(), format!("context{n}"));
            assert!(job.wait_for_completion().await);
        }
        assert_eq!(graph.calls().len(), 3);
    }
}
