use pastpaper_core::channel::{ConversationId, IncomingReply, MessageRef, SenderId};
use pastpaper_core::{prompts, Invocation, SelectionController};
use teloxide::prelude::*;
use teloxide::utils::command::{BotCommands, ParseError};
use tracing::{debug, error, info, warn};

// Helper function to get user name from Message
pub(crate) fn get_user_name(msg: &Message) -> String {
    if let Some(ref user) = msg.from {
        if let Some(ref username) = user.username {
            return username.clone();
        }
        if !user.first_name.is_empty() {
            return user.first_name.clone();
        }
    }
    "Unknown".to_string()
}

/// Safe extraction of user ID from a message.
/// Returns 0 if the user information is missing.
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Keeps the whole argument (possibly empty) as the subject query.
#[allow(clippy::unnecessary_wraps)]
fn parse_subject(input: String) -> Result<(String,), ParseError> {
    Ok((input.trim().to_string(),))
}

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Show the welcome message
    #[command(description = "Start the bot.")]
    Start,
    /// Show the command list
    #[command(description = "Show this help.")]
    Help,
    /// Search past papers for a subject
    #[command(
        description = "Search past papers, e.g. /pastpaper O/L Science",
        aliases = ["paper", "pp"],
        parse_with = parse_subject
    )]
    Pastpaper(String),
}

/// Sender a session is correlated by.
///
/// Posts made on behalf of a chat (linked channels, anonymous admins) carry
/// a placeholder `from` user shared by every such post, so the sending chat
/// wins when present. `None` when the message carries neither.
fn session_sender(user_id: Option<i64>, sender_chat_id: Option<i64>) -> Option<SenderId> {
    sender_chat_id.or(user_id).map(SenderId)
}

fn message_sender(msg: &Message) -> Option<SenderId> {
    session_sender(
        msg.from.as_ref().map(|u| u.id.0.cast_signed()),
        msg.sender_chat.as_ref().map(|c| c.id.0),
    )
}

fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        conversation: ConversationId(msg.chat.id.0),
        message_id: msg.id.0,
    }
}

/// Build the session invocation for a search command.
///
/// Returns `None` if the sender cannot be identified; such messages would
/// all share one reply key.
#[must_use]
pub fn invocation(msg: &Message, query: String) -> Option<Invocation> {
    Some(Invocation {
        conversation: ConversationId(msg.chat.id.0),
        sender: message_sender(msg)?,
        message: message_ref(msg),
        query,
    })
}

/// Convert a plain message into a candidate choice reply.
///
/// Returns `None` for anything that looks like a command; those are never
/// consumed as choices. Messages without an identifiable sender are
/// dropped too.
#[must_use]
pub fn incoming_reply(msg: &Message) -> Option<IncomingReply> {
    if msg.text().is_some_and(|t| t.trim_start().starts_with('/')) {
        return None;
    }
    Some(IncomingReply {
        conversation: ConversationId(msg.chat.id.0),
        sender: message_sender(msg)?,
        text: msg.text().map(ToString::to_string),
        message: message_ref(msg),
    })
}

/// Start/help handler
///
/// # Errors
///
/// Returns an error if the message cannot be sent.
pub async fn help(bot: Bot, msg: Message) -> Result<(), teloxide::RequestError> {
    let user_id = get_user_id_safe(&msg);
    info!("User {user_id} ({}) asked for help.", get_user_name(&msg));

    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

/// Search command handler.
///
/// The session runs on its own task: teloxide handles updates of one chat
/// sequentially, so awaiting it here would hold back the replies it waits for.
pub fn pastpaper(bot: Bot, msg: Message, query: String, controller: SelectionController) {
    let Some(invocation) = invocation(&msg, query) else {
        warn!("Ignoring search without an identifiable sender in chat {}", msg.chat.id);
        return;
    };
    info!(
        "User {} ({}) searched past papers: {:?}",
        invocation.sender.0,
        get_user_name(&msg),
        invocation.query
    );

    tokio::spawn(async move {
        let chat_id = msg.chat.id;
        if let Err(e) = controller.run(invocation).await {
            error!("Past paper session error: {e:#}");
            if let Err(e) = bot.send_message(chat_id, prompts::GENERIC_FAILURE).await {
                error!("Failed to send failure notice to {chat_id}: {e}");
            }
        }
    });
}

/// Route a non-command message to the session waiting on its sender.
pub async fn reply(msg: Message, controller: SelectionController) {
    let Some(reply) = incoming_reply(&msg) else {
        return;
    };
    let sender = reply.sender.0;
    if !controller.replies().dispatch(reply).await {
        debug!("Message from {sender} matched no waiting session");
    }
}

#[cfg(test)]
mod tests {
    use super::{session_sender, Command};
    use pastpaper_core::channel::SenderId;
    use teloxide::utils::command::BotCommands;

    #[test]
    fn test_command_with_subject() {
        let cmd = Command::parse("/pastpaper O/L Science", "pastpaperbot");
        assert!(matches!(cmd, Ok(Command::Pastpaper(ref s)) if s == "O/L Science"));
    }

    #[test]
    fn test_command_aliases() {
        for text in ["/paper A/L ICT", "/pp A/L ICT"] {
            let cmd = Command::parse(text, "pastpaperbot");
            assert!(matches!(cmd, Ok(Command::Pastpaper(ref s)) if s == "A/L ICT"));
        }
    }

    #[test]
    fn test_command_without_subject() {
        let cmd = Command::parse("/pastpaper", "pastpaperbot");
        assert!(matches!(cmd, Ok(Command::Pastpaper(ref s)) if s.is_empty()));
    }

    #[test]
    fn test_command_addressed_to_bot() {
        let cmd = Command::parse("/pp@pastpaperbot Maths", "pastpaperbot");
        assert!(matches!(cmd, Ok(Command::Pastpaper(ref s)) if s == "Maths"));
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert!(Command::parse("2", "pastpaperbot").is_err());
        assert!(matches!(
            Command::parse("/help", "pastpaperbot"),
            Ok(Command::Help)
        ));
    }

    #[test]
    fn test_plain_user_is_the_sender() {
        assert_eq!(session_sender(Some(42), None), Some(SenderId(42)));
    }

    #[test]
    fn test_post_on_behalf_of_chat_uses_sender_chat() {
        // 1087968824 is the shared anonymous-admin placeholder user
        assert_eq!(
            session_sender(Some(1_087_968_824), Some(-1_001_234)),
            Some(SenderId(-1_001_234))
        );
        assert_eq!(
            session_sender(None, Some(-1_001_234)),
            Some(SenderId(-1_001_234))
        );
    }

    #[test]
    fn test_unidentified_sender_gets_no_session() {
        assert_eq!(session_sender(None, None), None);
    }
}
