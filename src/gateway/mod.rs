//! Transport and authorization seams.
//!
//! The messaging transport (poll send/pin/stop/unpin) and the authorization
//! decision live outside this crate; handlers and the poll controller consume
//! them through these traits.

use crate::{ChatId, MessageId, PollId, UserId};
use async_trait::async_trait;
use tracing::warn;

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur at the messaging transport
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Operation forbidden: {0}")]
    Forbidden(String),

    #[error("Rate limited: retry after {0}s")]
    RateLimited(u64),

    #[error("Not connected")]
    NotConnected,

    #[error("Gateway error: {0}")]
    Other(String),
}

/// Identifiers assigned by the transport when a poll message is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentPoll {
    pub poll_id: PollId,
    pub message_id: MessageId,
}

/// Messaging-transport operations the poll lifecycle depends on.
///
/// Errors from these methods are never handled inside the controller; they
/// propagate to the calling handler, which owns retry and report policy.
#[async_trait]
pub trait PollGateway: Send + Sync {
    /// Post a poll to a chat; returns the transport-assigned identifiers.
    async fn send_poll(
        &self,
        chat_id: ChatId,
        question: &str,
        options: &[String],
    ) -> GatewayResult<SentPoll>;

    /// Pin a message; `true` when the transport confirms the pin.
    async fn pin_message(&self, chat_id: ChatId, message_id: MessageId) -> GatewayResult<bool>;

    /// Stop accepting votes on a posted poll.
    async fn stop_poll(&self, chat_id: ChatId, message_id: MessageId) -> GatewayResult<()>;

    /// Unpin a previously pinned message.
    async fn unpin_message(&self, chat_id: ChatId, message_id: MessageId) -> GatewayResult<()>;

    /// Send a plain text message.
    async fn send_message(&self, chat_id: ChatId, text: &str) -> GatewayResult<MessageId>;
}

/// Best-effort notification: delivery failures are logged, not surfaced.
pub async fn notify(gateway: &dyn PollGateway, chat_id: ChatId, text: &str) {
    if let Err(e) = gateway.send_message(chat_id, text).await {
        warn!(chat_id, error = %e, "failed to send message");
    }
}

/// Authorization decision consumed by handlers before privileged operations
/// (releasing a lock held by someone else, force-closing a poll). The
/// primitives themselves never check their caller.
pub trait Authorizer: Send + Sync {
    fn is_owner_or_admin(&self, chat_id: ChatId, user_id: UserId) -> bool;
}
