//! Delivery channel capability
//!
//! The chat transport is consumed through this trait only, so the selection
//! flow stays transport-agnostic (Telegram, Discord, tests).

use anyhow::Result;
use async_trait::async_trait;

/// Conversation (chat) identifier on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationId(pub i64);

/// Sender (user) identifier on the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderId(pub i64);

/// Reference to a message, used for quoting and reactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    /// Conversation the message belongs to
    pub conversation: ConversationId,
    /// Transport message id within the conversation
    pub message_id: i32,
}

/// A message received from a user while a session waits for a choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingReply {
    /// Conversation the reply arrived in
    pub conversation: ConversationId,
    /// Author of the reply
    pub sender: SenderId,
    /// Text content, if the message had any
    pub text: Option<String>,
    /// The reply message itself
    pub message: MessageRef,
}

/// A document to be sent by reference to its source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentAttachment {
    /// Where the transport should fetch the file from
    pub source_url: String,
    /// File name presented to the user
    pub file_name: String,
    /// MIME type of the file
    pub mime_type: String,
    /// Caption shown under the document
    pub caption: String,
}

/// Outbound chat capabilities used by the selection flow.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Send a text message, optionally quoting `quoted`.
    async fn send_text(
        &self,
        destination: ConversationId,
        text: &str,
        quoted: Option<MessageRef>,
    ) -> Result<MessageRef>;

    /// React to `message` with `emoji`.
    async fn send_reaction(
        &self,
        destination: ConversationId,
        emoji: &str,
        message: MessageRef,
    ) -> Result<()>;

    /// Send a document attachment, optionally quoting `quoted`.
    async fn send_document(
        &self,
        destination: ConversationId,
        document: &DocumentAttachment,
        quoted: Option<MessageRef>,
    ) -> Result<MessageRef>;
}
