//! Deadline-driven expiration of quotations.
//!
//! A single background task owns a min-heap of deadlines. It sleeps until the
//! earliest one, fires the expiry callback for everything due, and is woken
//! early whenever a new deadline is scheduled. Expiring an already expired or
//! unknown quotation is the callback's concern and must be a no-op there.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::runtime::TokioSpawner;
use crate::util::QuotationId;

struct Deadline {
    at: Instant,
    quotation_id: QuotationId,
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.quotation_id == other.quotation_id
    }
}

impl Eq for Deadline {}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap, earliest deadline must be on top.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.quotation_id.cmp(&self.quotation_id))
    }
}

#[derive(Default)]
struct SweeperState {
    deadlines: Mutex<BinaryHeap<Deadline>>,
    wake: Notify,
}

impl SweeperState {
    /// Pop everything due at `now`; returns the due ids and the next deadline.
    fn take_due(&self, now: Instant) -> (Vec<QuotationId>, Option<Instant>) {
        let mut heap = self.deadlines.lock();
        let mut due = Vec::new();
        while heap.peek().is_some_and(|d| d.at <= now) {
            if let Some(deadline) = heap.pop() {
                due.push(deadline.quotation_id);
            }
        }
        (due, heap.peek().map(|d| d.at))
    }
}

/// Handle to the background expiration task. Dropping it stops the task.
pub struct ExpirationSweeper {
    state: Arc<SweeperState>,
    shutdown: CancellationToken,
}

impl ExpirationSweeper {
    /// Spawn the sweeper loop; `on_expire` runs on the runtime for every due id.
    pub fn start<F>(spawner: &TokioSpawner, on_expire: F) -> Self
    where
        F: Fn(QuotationId) + Send + Sync + 'static,
    {
        let state = Arc::new(SweeperState::default());
        let shutdown = CancellationToken::new();
        spawner.spawn(run(Arc::clone(&state), shutdown.clone(), on_expire));
        Self { state, shutdown }
    }

    /// Expire `quotation_id` at `at`.
    pub fn schedule(&self, quotation_id: QuotationId, at: Instant) {
        self.state.deadlines.lock().push(Deadline { at, quotation_id });
        // notify_one stores a permit when the loop is busy, so no wakeup is lost.
        self.state.wake.notify_one();
    }

    /// Deadlines not yet fired.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.deadlines.lock().len()
    }

    /// Stop the background task. Pending deadlines are dropped.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for ExpirationSweeper {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run<F>(state: Arc<SweeperState>, shutdown: CancellationToken, on_expire: F)
where
    F: Fn(QuotationId) + Send + Sync + 'static,
{
    debug!("expiration sweeper started");
    loop {
        let (due, next) = state.take_due(Instant::now());
        if !due.is_empty() {
            for quotation_id in due {
                debug!(quotation_id = %quotation_id, "quotation deadline reached");
                on_expire(quotation_id);
            }
            continue;
        }

        let sleep = async {
            match next {
                Some(at) => sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            () = state.wake.notified() => {}
            () = sleep => {}
        }
    }
    info!(pending = state.deadlines.lock().len(), "expiration sweeper stopped");
}
