pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::types::{ChatId, MessageId};

/// Remote messaging operations the reconciler drives. Every call is a
/// network round-trip and may fail; failures come back as `Err` so the
/// caller's "ignore it" and "fall back" paths are explicit branches.
#[async_trait]
pub trait MessagingSink: Send + Sync {
    async fn send(&self, chat: ChatId, text: &str) -> Result<MessageId>;
    async fn edit(&self, chat: ChatId, id: MessageId, text: &str) -> Result<()>;
    async fn delete(&self, chat: ChatId, id: MessageId) -> Result<()>;
}
