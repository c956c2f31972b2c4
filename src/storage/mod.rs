//! Poll persistence seam.
//!
//! The real database lives outside this crate; the controller only needs the
//! handful of operations below. [`MemoryPollStore`] is the in-process
//! implementation used by tests and single-instance deployments.

use crate::poll::{AttendanceOption, PollRecord, PollStatus};
use crate::{PollId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the persistence layer
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Poll {0} already exists")]
    DuplicatePoll(PollId),

    #[error("Poll {0} is not registered")]
    UnknownPoll(PollId),

    #[error("Storage error: {0}")]
    Other(String),
}

/// One recorded attendance answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRow {
    pub user_id: UserId,
    pub answer: AttendanceOption,
    pub answered_at: DateTime<Utc>,
}

/// Persistence operations the poll lifecycle depends on.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Persist a freshly created poll.
    async fn create_poll(&self, record: PollRecord) -> StoreResult<()>;

    /// Update the status of a persisted poll.
    async fn update_status(&self, poll_id: PollId, status: PollStatus) -> StoreResult<()>;

    /// Record an answer, replacing any earlier answer by the same user to the
    /// same poll. Idempotent on repeated identical keys.
    async fn upsert_answer(
        &self,
        user_id: UserId,
        poll_id: PollId,
        answer: AttendanceOption,
    ) -> StoreResult<()>;

    /// Whether a poll was already created for `date`.
    async fn poll_exists_on(&self, date: NaiveDate) -> StoreResult<bool>;

    /// Answers for a poll, ordered by user. Feed for the attendance report;
    /// rendering stays external.
    async fn answers_for(&self, poll_id: PollId) -> StoreResult<Vec<AnswerRow>>;
}

/// In-memory poll store.
#[derive(Debug, Default)]
pub struct MemoryPollStore {
    polls: RwLock<HashMap<PollId, PollRecord>>,
    answers: RwLock<HashMap<PollId, BTreeMap<UserId, AnswerRow>>>,
}

impl MemoryPollStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored record for a poll, if any.
    pub fn poll(&self, poll_id: PollId) -> Option<PollRecord> {
        self.polls.read().get(&poll_id).cloned()
    }

    /// Number of answers recorded for a poll.
    pub fn answer_count(&self, poll_id: PollId) -> usize {
        self.answers
            .read()
            .get(&poll_id)
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn create_poll(&self, record: PollRecord) -> StoreResult<()> {
        let mut polls = self.polls.write();
        if polls.contains_key(&record.id) {
            return Err(StoreError::DuplicatePoll(record.id));
        }
        polls.insert(record.id, record);
        Ok(())
    }

    async fn update_status(&self, poll_id: PollId, status: PollStatus) -> StoreResult<()> {
        let mut polls = self.polls.write();
        let record = polls
            .get_mut(&poll_id)
            .ok_or(StoreError::UnknownPoll(poll_id))?;
        record.status = status;
        Ok(())
    }

    async fn upsert_answer(
        &self,
        user_id: UserId,
        poll_id: PollId,
        answer: AttendanceOption,
    ) -> StoreResult<()> {
        if !self.polls.read().contains_key(&poll_id) {
            return Err(StoreError::UnknownPoll(poll_id));
        }
        let mut answers = self.answers.write();
        answers.entry(poll_id).or_default().insert(
            user_id,
            AnswerRow {
                user_id,
                answer,
                answered_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn poll_exists_on(&self, date: NaiveDate) -> StoreResult<bool> {
        Ok(self.polls.read().values().any(|p| p.date == date))
    }

    async fn answers_for(&self, poll_id: PollId) -> StoreResult<Vec<AnswerRow>> {
        Ok(self
            .answers
            .read()
            .get(&poll_id)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default())
    }
}
