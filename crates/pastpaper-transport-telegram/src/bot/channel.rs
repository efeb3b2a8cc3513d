//! Telegram implementation of the delivery channel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pastpaper_core::channel::{ConversationId, DeliveryChannel, DocumentAttachment, MessageRef};
use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::{InputFile, MessageId, ReactionType, ReplyParameters};
use tracing::warn;

/// Sends session output through the Bot API.
#[derive(Clone)]
pub struct TelegramDeliveryChannel {
    bot: Bot,
}

impl TelegramDeliveryChannel {
    /// Wrap a bot handle.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn sent_ref(destination: ConversationId, msg: &Message) -> MessageRef {
    MessageRef {
        conversation: destination,
        message_id: msg.id.0,
    }
}

fn reply_to(quoted: MessageRef) -> ReplyParameters {
    ReplyParameters::new(MessageId(quoted.message_id)).allow_sending_without_reply()
}

#[async_trait]
impl DeliveryChannel for TelegramDeliveryChannel {
    async fn send_text(
        &self,
        destination: ConversationId,
        text: &str,
        quoted: Option<MessageRef>,
    ) -> Result<MessageRef> {
        let mut req = self.bot.send_message(ChatId(destination.0), text);
        if let Some(quoted) = quoted {
            req = req.reply_parameters(reply_to(quoted));
        }
        let sent = req.await.context("send_message failed")?;
        Ok(sent_ref(destination, &sent))
    }

    async fn send_reaction(
        &self,
        destination: ConversationId,
        emoji: &str,
        message: MessageRef,
    ) -> Result<()> {
        // Telegram only accepts its own reaction set; a rejected emoji is not
        // worth failing the session over.
        let res = self
            .bot
            .set_message_reaction(ChatId(destination.0), MessageId(message.message_id))
            .reaction(vec![ReactionType::Emoji {
                emoji: emoji.to_string(),
            }])
            .await;
        if let Err(e) = res {
            warn!(
                chat = destination.0,
                message = message.message_id,
                emoji,
                "Failed to set reaction: {e}"
            );
        }
        Ok(())
    }

    async fn send_document(
        &self,
        destination: ConversationId,
        document: &DocumentAttachment,
        quoted: Option<MessageRef>,
    ) -> Result<MessageRef> {
        let url = Url::parse(&document.source_url)
            .with_context(|| format!("invalid document URL: {}", document.source_url))?;
        let file = InputFile::url(url).file_name(document.file_name.clone());

        let mut req = self
            .bot
            .send_document(ChatId(destination.0), file)
            .caption(document.caption.clone());
        if let Some(quoted) = quoted {
            req = req.reply_parameters(reply_to(quoted));
        }
        let sent = req.await.context("send_document failed")?;
        Ok(sent_ref(destination, &sent))
    }
}
