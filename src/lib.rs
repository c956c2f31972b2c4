//! rollcall core library
//!
//! Concurrency-coordination core for a workplace-attendance chat assistant:
//! the weekly poll lifecycle, an advisory lock over a shared logical resource,
//! a scoped per-handler state store, and a delayed-task registry. Transport,
//! persistence, and authorization stay behind the seams in [`gateway`] and
//! [`storage`]; handler code composes the pieces and owns the policy.

pub mod config;
pub mod gateway;
pub mod lock;
pub mod logging;
pub mod poll;
pub mod state;
pub mod storage;
pub mod tasks;

/// Identifier of a chat participant, minted by the messaging transport.
pub type UserId = i64;

/// Identifier of a chat the assistant participates in.
pub type ChatId = i64;

/// Identifier of a message inside a chat.
pub type MessageId = i64;

/// Identifier of a poll, assigned by the transport when the poll is sent.
pub type PollId = i64;
