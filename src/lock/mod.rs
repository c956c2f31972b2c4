//! Advisory resource lock.
//!
//! Cooperative mutual exclusion over one shared logical resource (the team's
//! shared planning document). Enforcement depends on callers honouring the
//! protocol: [`AdvisoryLock::release`] never verifies who is asking, so
//! handlers gate it behind [`crate::gateway::Authorizer`] before forcing a
//! release on someone else's behalf.
//!
//! Waiting is two explicit steps: a non-blocking probe that reports the lock
//! state and, only when the probe queued the caller, an awaitable
//! [`ReleaseWaiter`] that resolves once the identity has been dequeued after a
//! release. On resume the caller attempts [`AdvisoryLock::acquire`] again.

use crate::UserId;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Result of a non-blocking [`AdvisoryLock::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now owns the lock.
    Acquired,
    /// The caller already owned the lock; nothing changed.
    AlreadyOwner,
    /// Someone else owns the lock; the probe did not block.
    LockedBy(UserId),
}

/// Result of [`AdvisoryLock::release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Owner cleared; at most one waiter was woken.
    Released,
    /// The lock was already free; no-op.
    AlreadyReleased,
}

/// Result of the [`AdvisoryLock::wait_for_release`] probe.
#[derive(Debug)]
pub enum WaitOutcome {
    /// The lock is free; attempt `acquire` immediately instead of waiting.
    AlreadyReleased,
    /// The caller holds the lock; it must not queue behind itself.
    AlreadyOwner,
    /// The caller is already in the waiter queue.
    AlreadyQueued,
    /// The caller was queued; await the ticket to be woken on release.
    Queued(ReleaseWaiter),
}

struct Waiter {
    user: UserId,
    wake: oneshot::Sender<()>,
}

#[derive(Default)]
struct LockState {
    owner: Option<UserId>,
    waiters: Vec<Waiter>,
}

/// Single-owner advisory lock with a FIFO-ish waiter queue.
///
/// One instance guards one resource; construct it at the composition root and
/// hand it to handlers by reference.
#[derive(Default)]
pub struct AdvisoryLock {
    state: Arc<Mutex<LockState>>,
}

impl AdvisoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking acquire probe.
    pub fn acquire(&self, user: UserId) -> AcquireOutcome {
        let mut state = self.state.lock();
        match state.owner {
            Some(owner) if owner == user => AcquireOutcome::AlreadyOwner,
            Some(owner) => AcquireOutcome::LockedBy(owner),
            None => {
                state.owner = Some(user);
                // A waiter that acquires directly must not linger in the queue.
                state.waiters.retain(|w| w.user != user);
                debug!(user_id = user, "resource lock acquired");
                AcquireOutcome::Acquired
            }
        }
    }

    /// Release the lock and wake at most one queued waiter.
    ///
    /// Deliberately does not check the caller: the lock is advisory, and the
    /// owner-or-admin decision belongs to the handler.
    pub fn release(&self) -> ReleaseOutcome {
        let mut state = self.state.lock();
        if state.owner.is_none() {
            return ReleaseOutcome::AlreadyReleased;
        }
        state.owner = None;
        // Wake the first waiter whose ticket is still held; abandoned tickets
        // are skipped without consuming the wake.
        while !state.waiters.is_empty() {
            let waiter = state.waiters.remove(0);
            if waiter.wake.send(()).is_ok() {
                debug!(user_id = waiter.user, "resource waiter woken");
                break;
            }
        }
        debug!("resource lock released");
        ReleaseOutcome::Released
    }

    /// Probe for release, queueing the caller when the lock is held by
    /// someone else. See the module docs for the two-step protocol.
    pub fn wait_for_release(&self, user: UserId) -> WaitOutcome {
        let mut state = self.state.lock();
        if state.owner.is_none() {
            return WaitOutcome::AlreadyReleased;
        }
        if state.waiters.iter().any(|w| w.user == user) {
            return WaitOutcome::AlreadyQueued;
        }
        if state.owner == Some(user) {
            return WaitOutcome::AlreadyOwner;
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.push(Waiter { user, wake: tx });
        debug!(user_id = user, "queued as resource waiter");
        WaitOutcome::Queued(ReleaseWaiter {
            user,
            rx: Some(rx),
            state: Arc::clone(&self.state),
            done: false,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    /// Current owner, if any.
    pub fn owner(&self) -> Option<UserId> {
        self.state.lock().owner
    }

    /// Whether `user` is queued waiting for release.
    pub fn contains(&self, user: UserId) -> bool {
        self.state.lock().waiters.iter().any(|w| w.user == user)
    }

    pub fn waiters_is_empty(&self) -> bool {
        self.state.lock().waiters.is_empty()
    }

    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

impl std::fmt::Debug for AdvisoryLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AdvisoryLock")
            .field("owner", &state.owner)
            .field("waiters", &state.waiters.iter().map(|w| w.user).collect::<Vec<_>>())
            .finish()
    }
}

/// Ticket held by a queued waiter.
///
/// Resolves once the identity has been dequeued after the lock became free.
/// Dropping the ticket without awaiting it withdraws the queue entry.
pub struct ReleaseWaiter {
    user: UserId,
    rx: Option<oneshot::Receiver<()>>,
    state: Arc<Mutex<LockState>>,
    done: bool,
}

impl ReleaseWaiter {
    /// Suspend until this identity has been dequeued. The caller should then
    /// attempt [`AdvisoryLock::acquire`].
    pub async fn released(mut self) {
        if let Some(rx) = self.rx.take() {
            // Ok: release() dequeued and woke us. Err: the entry was removed
            // some other way (direct acquire); either way we are out of the
            // queue.
            let _ = rx.await;
        }
        self.done = true;
    }
}

impl Drop for ReleaseWaiter {
    fn drop(&mut self) {
        if !self.done {
            self.state.lock().waiters.retain(|w| w.user != self.user);
        }
    }
}

impl std::fmt::Debug for ReleaseWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseWaiter")
            .field("user", &self.user)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    fn queued(outcome: WaitOutcome) -> ReleaseWaiter {
        match outcome {
            WaitOutcome::Queued(waiter) => waiter,
            other => panic!("expected Queued, got {:?}", other),
        }
    }

    #[test]
    fn test_mutual_exclusion() {
        let lock = AdvisoryLock::new();
        assert_eq!(lock.acquire(1), AcquireOutcome::Acquired);
        assert_eq!(lock.acquire(2), AcquireOutcome::LockedBy(1));
        assert_eq!(lock.owner(), Some(1));

        assert_eq!(lock.release(), ReleaseOutcome::Released);
        assert_eq!(lock.acquire(2), AcquireOutcome::Acquired);
        assert_eq!(lock.owner(), Some(2));
    }

    #[test]
    fn test_reacquire_by_owner_is_idempotent() {
        let lock = AdvisoryLock::new();
        lock.acquire(1);
        assert_eq!(lock.acquire(1), AcquireOutcome::AlreadyOwner);
        assert!(lock.waiters_is_empty());
        assert_eq!(lock.owner(), Some(1));
    }

    #[test]
    fn test_release_on_free_lock_is_noop() {
        let lock = AdvisoryLock::new();
        assert_eq!(lock.release(), ReleaseOutcome::AlreadyReleased);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_wait_on_free_lock_does_not_queue() {
        let lock = AdvisoryLock::new();
        assert!(matches!(
            lock.wait_for_release(5),
            WaitOutcome::AlreadyReleased
        ));
        assert!(!lock.contains(5));
    }

    #[test]
    fn test_owner_cannot_queue_behind_itself() {
        let lock = AdvisoryLock::new();
        lock.acquire(1);
        assert!(matches!(lock.wait_for_release(1), WaitOutcome::AlreadyOwner));
        assert!(lock.waiters_is_empty());
    }

    #[test]
    fn test_double_wait_reports_already_queued() {
        let lock = AdvisoryLock::new();
        lock.acquire(1);
        let _ticket = queued(lock.wait_for_release(2));
        assert_eq!(lock.waiter_count(), 1);

        assert!(matches!(
            lock.wait_for_release(2),
            WaitOutcome::AlreadyQueued
        ));
        assert_eq!(lock.waiter_count(), 1);
    }

    #[test]
    fn test_release_wakes_exactly_one_waiter() {
        let lock = AdvisoryLock::new();
        lock.acquire(1);
        let first = queued(lock.wait_for_release(2));
        let second = queued(lock.wait_for_release(3));

        let mut first_wait = task::spawn(first.released());
        let mut second_wait = task::spawn(second.released());
        assert_pending!(first_wait.poll());
        assert_pending!(second_wait.poll());

        assert_eq!(lock.release(), ReleaseOutcome::Released);

        // Front of the queue resumes, already dequeued; the other stays put.
        assert_ready!(first_wait.poll());
        assert_pending!(second_wait.poll());
        assert!(!lock.contains(2));
        assert!(lock.contains(3));
        assert_eq!(lock.acquire(2), AcquireOutcome::Acquired);
    }

    #[test]
    fn test_waiters_drain_to_empty() {
        let lock = AdvisoryLock::new();
        lock.acquire(100);
        let users = [2, 3, 4];
        let mut waits: Vec<_> = users
            .iter()
            .map(|&u| task::spawn(queued(lock.wait_for_release(u)).released()))
            .collect();
        assert_eq!(lock.waiter_count(), 3);

        for &user in &users {
            assert_eq!(lock.release(), ReleaseOutcome::Released);
            let mut wait = waits.remove(0);
            assert_ready!(wait.poll());
            assert_eq!(lock.acquire(user), AcquireOutcome::Acquired);
        }

        assert!(lock.waiters_is_empty());
        assert_eq!(lock.release(), ReleaseOutcome::Released);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_dropped_ticket_withdraws_queue_entry() {
        let lock = AdvisoryLock::new();
        lock.acquire(1);
        let ticket = queued(lock.wait_for_release(2));
        let survivor = queued(lock.wait_for_release(3));
        drop(ticket);
        assert!(!lock.contains(2));
        assert_eq!(lock.waiter_count(), 1);

        // The withdrawn waiter does not consume the wake.
        let mut wait = task::spawn(survivor.released());
        assert_pending!(wait.poll());
        lock.release();
        assert_ready!(wait.poll());
        assert!(lock.waiters_is_empty());
    }

    #[test]
    fn test_direct_acquire_leaves_the_queue() {
        let lock = AdvisoryLock::new();
        lock.acquire(1);
        let front = queued(lock.wait_for_release(2));
        let straggler = queued(lock.wait_for_release(3));

        let mut front_wait = task::spawn(front.released());
        lock.release();
        assert_ready!(front_wait.poll());
        // The lock is free and user 3 is still queued; acquiring directly
        // must pull them out of the queue so the owner never sits in it.
        assert_eq!(lock.acquire(3), AcquireOutcome::Acquired);
        assert!(!lock.contains(3));
        assert!(lock.waiters_is_empty());

        let mut straggler_wait = task::spawn(straggler.released());
        assert_ready!(straggler_wait.poll());
        assert_eq!(lock.acquire(3), AcquireOutcome::AlreadyOwner);
    }
}
