//! Selection controller
//!
//! Drives one search interaction: query → result prompt → numeric reply →
//! file prompt → numeric reply → document delivery. The two reply waits
//! are the only suspension points; each is correlated to the invoking
//! conversation and sender and bounded by the reply timeout.
//!
//! Scrape failures never escape: they are logged and reported to the user
//! as empty results. Delivery channel errors are returned to the caller.

use crate::catalog::PastPaperCatalog;
use crate::channel::{
    ConversationId, DeliveryChannel, DocumentAttachment, IncomingReply, MessageRef, SenderId,
};
use crate::config::ScraperSettings;
use crate::extract::{FileCandidate, SearchResult};
use crate::prompts;
use crate::replies::{ReplyKey, ReplyRouter, ReplyWaitError};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Position of a session in the selection flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    /// No query received yet
    Idle,
    /// Command received, subject query being checked
    AwaitingSubjectQuery,
    /// Search page requested
    SearchDispatched,
    /// Result prompt shown, waiting for a number
    AwaitingResultChoice,
    /// Result page requested
    FilesDispatched,
    /// File prompt shown, waiting for a number
    AwaitingFileChoice,
    /// Document being sent
    Delivering,
    /// Document sent
    Done,
    /// Session ended early
    Aborted,
}

impl SelectionState {
    /// Whether the flow may move from `self` to `next`.
    ///
    /// Every non-terminal state after `Idle` may abort.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        use SelectionState::{
            Aborted, AwaitingFileChoice, AwaitingResultChoice, AwaitingSubjectQuery, Delivering,
            Done, FilesDispatched, Idle, SearchDispatched,
        };
        matches!(
            (self, next),
            (Idle, AwaitingSubjectQuery)
                | (AwaitingSubjectQuery, SearchDispatched)
                | (SearchDispatched, AwaitingResultChoice)
                | (AwaitingResultChoice, FilesDispatched)
                | (FilesDispatched, AwaitingFileChoice)
                | (AwaitingFileChoice, Delivering)
                | (Delivering, Done)
                | (
                    AwaitingSubjectQuery
                        | SearchDispatched
                        | AwaitingResultChoice
                        | FilesDispatched
                        | AwaitingFileChoice
                        | Delivering,
                    Aborted
                )
        )
    }

    /// Whether the session has ended.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Empty query; the usage hint was sent
    UsageShown,
    /// The search produced no results
    NoResults,
    /// The first reply was not a valid choice
    InvalidResultChoice,
    /// The chosen page had no file links
    NoFiles,
    /// The second reply was not a valid choice
    InvalidFileChoice,
    /// No reply arrived in time while in `state`
    Expired(SelectionState),
    /// A newer session from the same sender took over while in `state`
    Superseded(SelectionState),
    /// The document was delivered
    Delivered {
        /// Result the file belongs to
        subject: SearchResult,
        /// Delivered file
        file: FileCandidate,
    },
}

/// One command invocation carrying a subject query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Conversation the command was sent in
    pub conversation: ConversationId,
    /// User who sent the command
    pub sender: SenderId,
    /// The command message
    pub message: MessageRef,
    /// Free-text subject query
    pub query: String,
}

/// Orchestrates search sessions over a catalog and a delivery channel.
#[derive(Clone)]
pub struct SelectionController {
    catalog: PastPaperCatalog,
    channel: Arc<dyn DeliveryChannel>,
    replies: Arc<ReplyRouter>,
    max_listed_items: usize,
    reply_timeout: Duration,
    source_label: String,
}

/// Per-session context shared by the transition steps.
struct Session {
    id: Uuid,
    key: ReplyKey,
    state: SelectionState,
}

impl Session {
    fn advance(&mut self, next: SelectionState) {
        if !self.state.can_advance_to(next) {
            warn!(session = %self.id, from = ?self.state, to = ?next, "Unexpected session transition");
        }
        debug!(session = %self.id, from = ?self.state, to = ?next, "Session transition");
        self.state = next;
    }
}

/// One numbered prompt and how to react to an unusable answer.
struct Stage {
    state: SelectionState,
    prompt: String,
    quoted: MessageRef,
    invalid_text: &'static str,
    invalid_outcome: SessionOutcome,
}

enum Choice<T> {
    Picked(T, IncomingReply),
    Ended(SessionOutcome),
}

impl SelectionController {
    /// Create a controller.
    #[must_use]
    pub fn new(
        catalog: PastPaperCatalog,
        channel: Arc<dyn DeliveryChannel>,
        replies: Arc<ReplyRouter>,
        settings: &ScraperSettings,
    ) -> Self {
        Self {
            catalog,
            channel,
            replies,
            max_listed_items: settings.max_listed_items,
            reply_timeout: settings.reply_timeout(),
            source_label: settings.source_label.clone(),
        }
    }

    /// Reply router incoming messages must be dispatched to.
    #[must_use]
    pub fn replies(&self) -> &Arc<ReplyRouter> {
        &self.replies
    }

    /// Run one session to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the delivery channel fails. The session's claim
    /// and reply slot are released however it ends.
    pub async fn run(&self, invocation: Invocation) -> Result<SessionOutcome> {
        let mut session = Session {
            id: Uuid::new_v4(),
            key: ReplyKey {
                conversation: invocation.conversation,
                sender: invocation.sender,
            },
            state: SelectionState::Idle,
        };

        info!(
            session = %session.id,
            conversation = invocation.conversation.0,
            query = %invocation.query,
            "Past paper session started"
        );

        let result = self.drive(&mut session, &invocation).await;
        if result.is_err() && !session.state.is_terminal() {
            session.advance(SelectionState::Aborted);
        }
        self.replies.release(session.key, session.id).await;

        match &result {
            Ok(outcome) => info!(session = %session.id, ?outcome, "Past paper session finished"),
            Err(e) => warn!(session = %session.id, error = %e, "Past paper session failed"),
        }
        result
    }

    async fn drive(&self, session: &mut Session, invocation: &Invocation) -> Result<SessionOutcome> {
        let to = invocation.conversation;
        let query = invocation.query.trim();
        session.advance(SelectionState::AwaitingSubjectQuery);

        if query.is_empty() {
            self.channel
                .send_text(to, prompts::USAGE_HINT, Some(invocation.message))
                .await?;
            session.advance(SelectionState::Aborted);
            return Ok(SessionOutcome::UsageShown);
        }

        // From here on this session is the sender's current search
        self.replies.claim(session.key, session.id).await;

        self.channel
            .send_reaction(to, prompts::REACT_QUERY, invocation.message)
            .await?;

        session.advance(SelectionState::SearchDispatched);
        let results = self.search_or_empty(session, query).await;
        if results.is_empty() {
            self.channel
                .send_text(to, prompts::NO_RESULTS, Some(invocation.message))
                .await?;
            session.advance(SelectionState::Aborted);
            return Ok(SessionOutcome::NoResults);
        }

        let stage = Stage {
            state: SelectionState::AwaitingResultChoice,
            prompt: prompts::render_results_prompt(&results, self.max_listed_items),
            quoted: invocation.message,
            invalid_text: prompts::INVALID_SELECTION,
            invalid_outcome: SessionOutcome::InvalidResultChoice,
        };
        let (selected, reply) = match self.await_choice(session, stage, &results).await? {
            Choice::Picked(selected, reply) => (selected.clone(), reply),
            Choice::Ended(outcome) => return Ok(outcome),
        };

        self.channel
            .send_reaction(to, prompts::REACT_RESULT_CHOICE, reply.message)
            .await?;

        session.advance(SelectionState::FilesDispatched);
        let files = self.files_or_empty(session, &selected).await;
        if files.is_empty() {
            self.channel
                .send_text(to, prompts::NO_FILES, Some(reply.message))
                .await?;
            session.advance(SelectionState::Aborted);
            return Ok(SessionOutcome::NoFiles);
        }

        let stage = Stage {
            state: SelectionState::AwaitingFileChoice,
            prompt: prompts::render_files_prompt(&selected, &files, self.max_listed_items),
            quoted: reply.message,
            invalid_text: prompts::INVALID_FILE_SELECTION,
            invalid_outcome: SessionOutcome::InvalidFileChoice,
        };
        let (file, reply) = match self.await_choice(session, stage, &files).await? {
            Choice::Picked(file, reply) => (file.clone(), reply),
            Choice::Ended(outcome) => return Ok(outcome),
        };

        session.advance(SelectionState::Delivering);
        self.deliver(to, &selected, &file, reply.message).await?;
        session.advance(SelectionState::Done);

        Ok(SessionOutcome::Delivered {
            subject: selected,
            file,
        })
    }

    async fn search_or_empty(&self, session: &Session, query: &str) -> Vec<SearchResult> {
        self.catalog.search(query).await.unwrap_or_else(|e| {
            warn!(session = %session.id, error = %e, "Search page fetch failed");
            Vec::new()
        })
    }

    async fn files_or_empty(&self, session: &Session, selected: &SearchResult) -> Vec<FileCandidate> {
        self.catalog.files(&selected.url).await.unwrap_or_else(|e| {
            warn!(session = %session.id, url = %selected.url, error = %e, "Result page fetch failed");
            Vec::new()
        })
    }

    /// Send the stage prompt, wait for one reply and resolve it against the
    /// first `max_listed_items` entries of `items`.
    ///
    /// The slot is armed before the prompt goes out so a fast reply is not
    /// lost.
    async fn await_choice<'a, T>(
        &self,
        session: &mut Session,
        stage: Stage,
        items: &'a [T],
    ) -> Result<Choice<&'a T>> {
        let to = session.key.conversation;
        let listed = &items[..prompts::listed_count(items.len(), self.max_listed_items)];

        let Ok(pending) = self.replies.register(session.key, session.id).await else {
            info!(session = %session.id, state = ?stage.state, "Newer session owns the sender");
            session.advance(SelectionState::Aborted);
            return Ok(Choice::Ended(SessionOutcome::Superseded(stage.state)));
        };
        self.channel
            .send_text(to, &stage.prompt, Some(stage.quoted))
            .await?;
        session.advance(stage.state);

        let reply = match self.replies.wait(pending, self.reply_timeout).await {
            Ok(reply) => reply,
            Err(ReplyWaitError::Expired) => {
                info!(session = %session.id, state = ?stage.state, "Reply wait expired");
                self.channel
                    .send_text(to, prompts::SESSION_EXPIRED, Some(stage.quoted))
                    .await?;
                session.advance(SelectionState::Aborted);
                return Ok(Choice::Ended(SessionOutcome::Expired(stage.state)));
            }
            Err(ReplyWaitError::Superseded) => {
                session.advance(SelectionState::Aborted);
                return Ok(Choice::Ended(SessionOutcome::Superseded(stage.state)));
            }
        };

        let Some(index) = prompts::parse_choice(reply.text.as_deref(), listed.len()) else {
            debug!(session = %session.id, text = ?reply.text, "Rejected choice");
            self.channel
                .send_text(to, stage.invalid_text, Some(reply.message))
                .await?;
            session.advance(SelectionState::Aborted);
            return Ok(Choice::Ended(stage.invalid_outcome));
        };

        Ok(Choice::Picked(&listed[index], reply))
    }

    async fn deliver(
        &self,
        to: ConversationId,
        subject: &SearchResult,
        file: &FileCandidate,
        reply: MessageRef,
    ) -> Result<()> {
        self.channel
            .send_reaction(to, prompts::REACT_DOWNLOADING, reply)
            .await?;

        let document = DocumentAttachment {
            source_url: file.link.clone(),
            file_name: prompts::document_file_name(file),
            mime_type: prompts::DOCUMENT_MIME_TYPE.to_string(),
            caption: prompts::render_caption(file, subject, &self.source_label),
        };
        self.channel.send_document(to, &document, Some(reply)).await?;

        self.channel
            .send_reaction(to, prompts::REACT_DONE, reply)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::SelectionState::{self, *};

    #[test]
    fn test_happy_path_passes_through_subject_check() {
        let path = [
            Idle,
            AwaitingSubjectQuery,
            SearchDispatched,
            AwaitingResultChoice,
            FilesDispatched,
            AwaitingFileChoice,
            Delivering,
            Done,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
        assert!(!Idle.can_advance_to(SearchDispatched));
    }

    #[test]
    fn test_only_live_states_abort() {
        let live: [SelectionState; 6] = [
            AwaitingSubjectQuery,
            SearchDispatched,
            AwaitingResultChoice,
            FilesDispatched,
            AwaitingFileChoice,
            Delivering,
        ];
        for state in live {
            assert!(state.can_advance_to(Aborted), "{state:?}");
            assert!(!state.is_terminal());
        }
        assert!(!Done.can_advance_to(Aborted));
        assert!(!Aborted.can_advance_to(Aborted));
        assert!(Done.is_terminal() && Aborted.is_terminal());
    }
}
