use tokio::sync::watch;

/// One-shot outcome of a job.
///
/// The first [`finish`](Self::finish) wins. Any number of tasks and threads
/// can wait for it and all of them see the same outcome.
#[derive(Debug)]
pub struct Completion {
    outcome: watch::Sender<Option<bool>>,
}

impl Completion {
    pub fn new() -> Self {
        let (outcome, _) = watch::channel(None);
        Self { outcome }
    }

    /// Records `success` and wakes all waiters.
    ///
    /// Returns false if an outcome was already recorded; that outcome is
    /// kept.
    pub fn finish(&self, success: bool) -> bool {
        self.outcome.send_if_modified(|outcome| {
            if outcome.is_some() {
                return false;
            }
            *outcome = Some(success);
            true
        })
    }

    pub fn outcome(&self) -> Option<bool> {
        *self.outcome.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome().is_some()
    }

    /// Waits until an outcome is recorded and returns it.
    pub async fn wait(&self) -> bool {
        let mut rx = self.outcome.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => *outcome == Some(true),
            // unreachable while `self` keeps the sender alive
            Err(_) => false,
        }
    }

    /// Blocks the current thread until an outcome is recorded.
    ///
    /// Must not be called from a thread that drives the task recording the
    /// outcome.
    pub fn wait_blocking(&self) -> bool {
        futures::executor::block_on(self.wait())
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}
