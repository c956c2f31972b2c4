//! Poll lifecycle controller.
//!
//! Drives the weekly attendance poll through its protocol: create and pin,
//! auto-close on a timer or on admin action, acknowledge the unpin, then
//! reset. One controller owns one lifecycle slot; run one controller per
//! chat if concurrent polls are ever needed. All collaborators are injected,
//! so tests construct fresh, isolated instances.
//!
//! Two one-shot signals split the tail of the lifecycle: `close` gates
//! stopping the poll and persisting its final status, `unpin` gates the
//! terminal reset. [`PollLifecycleController::await_close`] suspends on each
//! in turn and only then returns the controller to the vacant state.

use crate::gateway::{GatewayError, PollGateway};
use crate::poll::signal::Signal;
use crate::poll::types::{AttendanceOption, PollPhase, PollRecord, PollStatus};
use crate::state::{ScopeKey, ScopedStateStore};
use crate::storage::{PollStore, StoreError};
use crate::tasks::DelayedTaskRegistry;
use crate::{ChatId, MessageId, PollId, UserId};
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Errors surfaced by poll lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// A lifecycle is already in flight. Report "a poll is already in
    /// progress" to the user; never retry automatically.
    #[error("a poll is already in progress")]
    AlreadyActive,

    /// A poll was already persisted for this date.
    #[error("a poll already exists for {0}")]
    AlreadyCreated(NaiveDate),

    /// No lifecycle is in flight.
    #[error("no poll is active")]
    NotActive,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of [`PollLifecycleController::record_answer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// The answer was upserted.
    Recorded,
    /// The answer was silently dropped (late, stale, retracted, or malformed).
    Dropped,
}

/// Snapshot of the poll currently in flight.
#[derive(Debug, Clone)]
pub struct ActivePoll {
    pub poll_id: PollId,
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub date: NaiveDate,
    pub options: Vec<AttendanceOption>,
    pub phase: PollPhase,
}

enum Slot {
    Vacant,
    /// Occupied by a `start` call that has not finished yet.
    Reserved,
    Active(ActivePoll),
}

/// Controller for the weekly attendance poll lifecycle.
pub struct PollLifecycleController {
    bot_id: UserId,
    store: Arc<dyn PollStore>,
    gateway: Arc<dyn PollGateway>,
    contexts: Arc<ScopedStateStore>,
    tasks: Arc<DelayedTaskRegistry>,
    slot: Mutex<Slot>,
    close: Arc<Signal>,
    unpin: Arc<Signal>,
}

impl PollLifecycleController {
    pub fn new(
        bot_id: UserId,
        store: Arc<dyn PollStore>,
        gateway: Arc<dyn PollGateway>,
        contexts: Arc<ScopedStateStore>,
        tasks: Arc<DelayedTaskRegistry>,
    ) -> Self {
        Self {
            bot_id,
            store,
            gateway,
            contexts,
            tasks,
            slot: Mutex::new(Slot::Vacant),
            close: Arc::new(Signal::new()),
            unpin: Arc::new(Signal::new()),
        }
    }

    /// Create, persist, and pin a new poll, then arm the auto-close timer.
    ///
    /// Fails with [`PollError::AlreadyActive`] when a lifecycle is already in
    /// flight; the slot is checked and occupied atomically. Every failure
    /// path before the poll goes live vacates the slot again.
    pub async fn start(
        &self,
        chat_id: ChatId,
        date: NaiveDate,
        question: String,
        options: Vec<AttendanceOption>,
        close_delay: Duration,
    ) -> Result<PollId, PollError> {
        {
            let mut slot = self.slot.lock();
            if !matches!(*slot, Slot::Vacant) {
                return Err(PollError::AlreadyActive);
            }
            *slot = Slot::Reserved;
        }

        let result = self
            .start_inner(chat_id, date, question, options, close_delay)
            .await;
        if result.is_err() {
            let mut slot = self.slot.lock();
            if matches!(*slot, Slot::Reserved) {
                *slot = Slot::Vacant;
            }
        }
        result
    }

    async fn start_inner(
        &self,
        chat_id: ChatId,
        date: NaiveDate,
        question: String,
        options: Vec<AttendanceOption>,
        close_delay: Duration,
    ) -> Result<PollId, PollError> {
        if self.store.poll_exists_on(date).await? {
            debug!(%date, "poll already persisted for this date");
            return Err(PollError::AlreadyCreated(date));
        }

        let labels: Vec<String> = options.iter().map(|o| o.label().to_string()).collect();
        let sent = self.gateway.send_poll(chat_id, &question, &labels).await?;

        let record = PollRecord {
            id: sent.poll_id,
            question,
            date,
            status: PollStatus::Started,
        };
        if let Err(e) = self.store.create_poll(record).await {
            error!(poll_id = sent.poll_id, error = %e, "failed to persist poll; lifecycle not started");
            return Err(e.into());
        }

        let context = self.contexts.context(&ScopeKey::bot_in_chat(self.bot_id, chat_id));
        context.update(HashMap::from([
            ("poll_id".to_string(), json!(sent.poll_id)),
            ("message_id".to_string(), json!(sent.message_id)),
            ("chat_id".to_string(), json!(chat_id)),
        ]));

        *self.slot.lock() = Slot::Active(ActivePoll {
            poll_id: sent.poll_id,
            message_id: sent.message_id,
            chat_id,
            date,
            options,
            phase: PollPhase::Started,
        });
        info!(poll_id = sent.poll_id, %date, "poll started");

        // The transport confirms the pin synchronously; the service-message
        // handler acknowledges it again later, which is then a no-op.
        if self.gateway.pin_message(chat_id, sent.message_id).await? {
            self.on_pin_acknowledged();
        }

        let close = Arc::clone(&self.close);
        self.tasks.schedule("poll-auto-close", close_delay, move || async move {
            if close.raise() {
                info!("poll auto-close timer fired");
            }
        });

        Ok(sent.poll_id)
    }

    /// Acknowledge that the poll message was pinned. Returns whether the
    /// phase advanced; any call outside `Started` is a no-op.
    pub fn on_pin_acknowledged(&self) -> bool {
        let mut slot = self.slot.lock();
        if let Slot::Active(poll) = &mut *slot {
            if poll.phase == PollPhase::Started {
                poll.phase = PollPhase::StartedAndPinned;
                debug!(poll_id = poll.poll_id, "poll pinned");
                return true;
            }
        }
        false
    }

    /// Raise the close signal. Fired by the auto-close timer or an explicit
    /// admin action; repeat calls are no-ops.
    pub fn signal_close(&self) {
        if self.close.raise() {
            info!("poll close signalled");
        }
    }

    /// Raise the unpin signal. Fired by the handler that observes the unpin
    /// acknowledgment; repeat calls are no-ops.
    pub fn signal_unpin(&self) {
        if self.unpin.raise() {
            info!("poll unpin signalled");
        }
    }

    pub fn is_close_signalled(&self) -> bool {
        self.close.is_raised()
    }

    /// Drive the tail of the lifecycle.
    ///
    /// Suspends until the close signal, stops the poll at the transport and
    /// persists its final status, then suspends until the unpin signal and
    /// performs the terminal reset: both signals lowered together, scoped
    /// context discarded, slot vacated.
    pub async fn await_close(&self) -> Result<(), PollError> {
        let (poll_id, chat_id, message_id) = match &*self.slot.lock() {
            Slot::Active(p) => (p.poll_id, p.chat_id, p.message_id),
            _ => return Err(PollError::NotActive),
        };

        self.close.raised().await;
        self.gateway.stop_poll(chat_id, message_id).await?;
        info!(poll_id, "poll stopped");

        // The poll is already stopped at the transport; a persistence failure
        // here must not wedge the slot.
        if let Err(e) = self.store.update_status(poll_id, PollStatus::Completed).await {
            error!(poll_id, error = %e, "failed to persist completed poll status");
        }
        if let Slot::Active(poll) = &mut *self.slot.lock() {
            poll.phase = PollPhase::Completed;
        }

        self.unpin.raised().await;

        self.close.reset();
        self.unpin.reset();
        let scope = ScopeKey::bot_in_chat(self.bot_id, chat_id);
        self.contexts.context(&scope).clear();
        self.contexts.remove(&scope);
        *self.slot.lock() = Slot::Vacant;
        info!(poll_id, "poll lifecycle complete");
        Ok(())
    }

    /// Unpin the poll message once the close signal fires, then raise the
    /// unpin signal. Run by the handler that observed the pin.
    pub async fn unpin_after_close(&self) -> Result<(), PollError> {
        let (poll_id, chat_id, message_id) = match &*self.slot.lock() {
            Slot::Active(p) => (p.poll_id, p.chat_id, p.message_id),
            _ => return Err(PollError::NotActive),
        };

        self.close.raised().await;
        self.gateway.unpin_message(chat_id, message_id).await?;
        info!(poll_id, "poll unpinned");
        self.signal_unpin();
        Ok(())
    }

    /// Record a user's answer to the active poll.
    ///
    /// Answers are upserted by `(user, poll)`. Late answers (after the close
    /// signal), answers to a poll other than the active one, retracted votes
    /// (empty `option_ids`), and out-of-range options are silently dropped.
    pub async fn record_answer(
        &self,
        user_id: UserId,
        poll_id: PollId,
        option_ids: &[usize],
    ) -> Result<AnswerOutcome, PollError> {
        if self.close.is_raised() {
            debug!(user_id, poll_id, "answer after close signal dropped");
            return Ok(AnswerOutcome::Dropped);
        }

        let option = {
            let slot = self.slot.lock();
            let poll = match &*slot {
                Slot::Active(p) => p,
                _ => {
                    debug!(user_id, poll_id, "no active poll; answer dropped");
                    return Ok(AnswerOutcome::Dropped);
                }
            };
            if !matches!(poll.phase, PollPhase::Started | PollPhase::StartedAndPinned) {
                debug!(user_id, poll_id, phase = ?poll.phase, "poll not open; answer dropped");
                return Ok(AnswerOutcome::Dropped);
            }
            if poll_id != poll.poll_id {
                debug!(user_id, poll_id, active = poll.poll_id, "answer to stale poll dropped");
                return Ok(AnswerOutcome::Dropped);
            }
            let Some(&first) = option_ids.first() else {
                debug!(user_id, poll_id, "vote retraction dropped");
                return Ok(AnswerOutcome::Dropped);
            };
            match poll.options.get(first) {
                Some(option) => *option,
                None => {
                    debug!(user_id, poll_id, option = first, "unknown option dropped");
                    return Ok(AnswerOutcome::Dropped);
                }
            }
        };

        if let Err(e) = self.store.upsert_answer(user_id, poll_id, option).await {
            error!(user_id, poll_id, error = %e, "failed to persist answer");
            return Err(e.into());
        }
        debug!(user_id, poll_id, option = option.label(), "answer recorded");
        Ok(AnswerOutcome::Recorded)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> PollPhase {
        match &*self.slot.lock() {
            Slot::Vacant | Slot::Reserved => PollPhase::NotStarted,
            Slot::Active(poll) => poll.phase,
        }
    }

    /// Snapshot of the active poll, if one is in flight.
    pub fn active_poll(&self) -> Option<ActivePoll> {
        match &*self.slot.lock() {
            Slot::Active(poll) => Some(poll.clone()),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PollLifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollLifecycleController")
            .field("phase", &self.phase())
            .field("close_signalled", &self.close.is_raised())
            .field("unpin_signalled", &self.unpin.is_raised())
            .finish()
    }
}
