//! In-flight refresh coordination.
//!
//! One [`RefreshGate`] per client. The first request to hit a 401 is
//! admitted as the leader and performs the network refresh; requests that
//! hit a 401 while it runs are queued and receive its outcome.

use std::collections::VecDeque;

use parking_lot::Mutex;
use responder_auth::AuthError;
use tokio::sync::oneshot;

/// Outcome handed to every waiter of a refresh attempt.
pub type RefreshOutcome = std::result::Result<(), AuthError>;

// ─────────────────────────────────────────────────────────────────────────────
// WaitQueue
// ─────────────────────────────────────────────────────────────────────────────

/// FIFO queue of requests waiting on a refresh.
#[derive(Debug, Default)]
pub struct WaitQueue {
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a waiter and return its receiving end.
    pub fn push(&mut self) -> Waiter {
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(tx);
        Waiter { rx }
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Resolve every waiter with `outcome`, oldest first, and empty the queue.
    ///
    /// Returns how many waiters were resolved.
    pub fn drain(&mut self, outcome: &RefreshOutcome) -> usize {
        let mut resolved = 0;
        while let Some(tx) = self.waiters.pop_front() {
            // A waiter whose request was dropped no longer listens.
            let _ = tx.send(outcome.clone());
            resolved += 1;
        }
        resolved
    }
}

/// Receiving end of a queued request.
#[derive(Debug)]
pub struct Waiter {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl Waiter {
    /// Wait for the refresh this waiter was queued behind.
    pub async fn wait(self) -> RefreshOutcome {
        self.rx.await.unwrap_or_else(|_| Err(abandoned()))
    }
}

fn abandoned() -> AuthError {
    AuthError::Network("Token refresh was abandoned".to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// RefreshGate
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct GateState {
    refreshing: bool,
    queue: WaitQueue,
}

/// Mutual-exclusion gate for reactive refreshes.
///
/// The check of `refreshing`, its set, and enqueueing a waiter all happen
/// under one lock, as do the drain and the reset. A waiter is therefore
/// always drained by the attempt it was queued behind.
#[derive(Debug, Default)]
pub struct RefreshGate {
    state: Mutex<GateState>,
}

/// Result of [`RefreshGate::admit`].
#[derive(Debug)]
pub enum Admission<'a> {
    /// No refresh was running; the caller must perform it and settle the lease.
    Leader(RefreshLease<'a>),
    /// A refresh is running; wait for its outcome.
    Follower(Waiter),
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    /// Number of requests currently queued.
    pub fn waiting(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Become the refresh leader, or queue behind the running refresh.
    pub fn admit(&self) -> Admission<'_> {
        let mut state = self.state.lock();
        if state.refreshing {
            Admission::Follower(state.queue.push())
        } else {
            state.refreshing = true;
            Admission::Leader(RefreshLease {
                gate: self,
                published: None,
                released: false,
            })
        }
    }

    fn settle(&self, outcome: RefreshOutcome) -> usize {
        let mut state = self.state.lock();
        let resolved = state.queue.drain(&outcome);
        state.refreshing = false;
        resolved
    }
}

/// Held by the refresh leader.
///
/// Dropping an unreleased lease (e.g. the leader's future was cancelled)
/// resolves every waiter with the published outcome, or with an abandoned
/// error if nothing was published, and reopens the gate.
#[derive(Debug)]
pub struct RefreshLease<'a> {
    gate: &'a RefreshGate,
    published: Option<RefreshOutcome>,
    released: bool,
}

impl RefreshLease<'_> {
    /// Publish the refresh outcome to all waiters and reopen the gate.
    pub fn settle(mut self, outcome: RefreshOutcome) -> usize {
        self.released = true;
        self.gate.settle(outcome)
    }

    /// Resolve the waiters queued so far with `outcome` but keep the gate
    /// closed. Requests that arrive before [`release`](Self::release) queue
    /// as usual and receive the same outcome.
    pub fn publish(&mut self, outcome: RefreshOutcome) -> usize {
        let resolved = self.gate.state.lock().queue.drain(&outcome);
        self.published = Some(outcome);
        resolved
    }

    /// Reopen the gate after [`publish`](Self::publish).
    pub fn release(mut self) -> usize {
        let outcome = self.published.take().unwrap_or_else(|| Err(abandoned()));
        self.released = true;
        self.gate.settle(outcome)
    }
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        if !self.released {
            let outcome = self.published.take().unwrap_or_else(|| Err(abandoned()));
            self.gate.settle(outcome);
        }
    }
}
