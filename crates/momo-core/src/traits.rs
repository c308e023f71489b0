//! Collaborator seams implemented outside the core.

use async_trait::async_trait;

use crate::error::{MomoError, Result};
use crate::types::UserId;

/// Tri-state result of handing a message to the messaging collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Recipient can never be reached again (e.g. the bot was blocked).
    PermanentFailure(String),
    /// Worth trying again at the next occurrence.
    TransientFailure(String),
}

impl DeliveryOutcome {
    /// Collapse into a `Result` for callers that only care whether it worked.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Delivered => Ok(()),
            Self::PermanentFailure(reason) => Err(MomoError::DeliveryPermanent(reason)),
            Self::TransientFailure(reason) => Err(MomoError::DeliveryTransient(reason)),
        }
    }
}

/// Outbound messaging collaborator (Telegram, console, test doubles).
///
/// Implementations must bound every call with their own timeout.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Channel name for logs.
    fn name(&self) -> &str;

    /// Deliver `text` to `user`.
    async fn send(&self, user: &UserId, text: &str) -> DeliveryOutcome;
}
