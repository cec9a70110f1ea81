use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::payloads::{EditMessageTextSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId, ParseMode};
use tracing::{info, warn};

use crate::app::AppState;
use crate::platform::MessagingSink;
use crate::reconciler::Trigger;

/// Telegram-backed messaging sink. Sends are silent (no notification) so
/// every-minute updates do not ping channel subscribers.
pub struct TelegramSink {
    bot: Bot,
}

impl TelegramSink {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessagingSink for TelegramSink {
    async fn send(&self, chat: ChatId, text: &str) -> Result<MessageId> {
        let message = self
            .bot
            .send_message(chat, text)
            .parse_mode(ParseMode::Html)
            .disable_notification(true)
            .await?;
        Ok(message.id)
    }

    async fn edit(&self, chat: ChatId, id: MessageId, text: &str) -> Result<()> {
        self.bot
            .edit_message_text(chat, id, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn delete(&self, chat: ChatId, id: MessageId) -> Result<()> {
        self.bot.delete_message(chat, id).await?;
        Ok(())
    }
}

/// Watch the channel feed and dispatch posts into the reconcile cycle.
/// Telegram delivers the bot's own sends here too; telling those apart from
/// admin posts is the reconciler's job, this layer only drops other chats.
pub async fn run(bot: Bot, state: Arc<AppState>) -> Result<()> {
    info!("Starting channel watcher...");

    let channel = state.channel();

    let handler = Update::filter_channel_post()
        .filter_map(move |msg: Message| {
            if msg.chat.id == channel {
                Some(msg)
            } else {
                None
            }
        })
        .endpoint(handle_channel_post);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd.id);
        })
        .error_handler(LoggingErrorHandler::with_custom_text("channel watcher"))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_channel_post(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let text = msg.text().unwrap_or_default().to_string();

    info!("Channel post observed in {}", msg.chat.id);
    state.run_cycle(Trigger::ForeignPost { text }).await;

    Ok(())
}
