//! Popup-side orchestration of one page question.
//!
//! `ask` is the whole flow the popup triggers: fetch page metadata,
//! selection, and body over the typed call layer, assemble the prompt,
//! record the pending user message, put the question to the answer service,
//! and record the outcome. Chat history ends up with the user's question and
//! the bot's answer (or the user's question marked failed), whatever
//! happens.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use tabwise_rpc::{CallError, Client};

use crate::api::{AnswerApi, ApiError};
use crate::content::PageDetails;
use crate::prompts;
use crate::protocol::{FetchPageContent, FetchPageDetails, FetchPageSelection};
use crate::storage::{
    ChatMessage, ChatMessageCreate, ChatMessageUpdate, ChatStore, ChatThread, ChatThreadCreate,
    MessageSender, MessageState, StoreError,
};

/// Tracing target for ask-flow orchestration.
pub(crate) const ASSISTANT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::assistant");

/// Failure of one ask flow, by stage.
#[derive(Debug, Error)]
pub enum AskError {
    /// Fetching page state over the call layer failed.
    #[error("failed to fetch page state: {0}")]
    Call(#[from] CallError),

    /// The answer service rejected or failed the question.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Chat history could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The popup-side assistant: page fetches, prompt assembly, answer calls,
/// and chat persistence behind one `ask`.
pub struct Assistant {
    client: Client,
    api: Arc<dyn AnswerApi>,
    chats: ChatStore,
}

impl Assistant {
    /// Wires an assistant from its three collaborators.
    #[must_use]
    pub fn new(client: Client, api: Arc<dyn AnswerApi>, chats: ChatStore) -> Self {
        Self { client, api, chats }
    }

    /// Asks one question about the current page.
    ///
    /// Returns the bot's recorded answer message. The user's question is
    /// recorded before the answer service is consulted; on failure it is
    /// marked failed and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns an [`AskError`] naming the stage that failed.
    pub fn ask(&self, question: &str) -> Result<ChatMessage, AskError> {
        let details = self.client.call::<FetchPageDetails>(&())?;
        let selection = self.client.call::<FetchPageSelection>(&())?;
        let content = self.client.call::<FetchPageContent>(&())?;

        debug!(
            target: ASSISTANT_TARGET,
            url = %details.url,
            selection_bytes = selection.len(),
            content_bytes = content.len(),
            "page state fetched"
        );

        let thread = self.thread_for(&details)?;
        let user_message = self.chats.create_message(ChatMessageCreate {
            thread_id: thread.id.clone(),
            text: question.to_owned(),
            state: MessageState::Pending,
            sender: MessageSender::User,
        })?;

        let request = prompts::assemble(question, &details, &selection, &content);
        match self.api.ask(&request) {
            Ok(answer) => {
                self.chats.update_message(ChatMessageUpdate {
                    id: user_message.id,
                    state: Some(MessageState::Success),
                    ..ChatMessageUpdate::default()
                })?;
                let bot_message = self.chats.create_message(ChatMessageCreate {
                    thread_id: thread.id,
                    text: answer,
                    state: MessageState::Success,
                    sender: MessageSender::Bot,
                })?;
                Ok(bot_message)
            }
            Err(error) => {
                warn!(target: ASSISTANT_TARGET, %error, "answer service failed");
                self.chats.update_message(ChatMessageUpdate {
                    id: user_message.id,
                    state: Some(MessageState::Error),
                    ..ChatMessageUpdate::default()
                })?;
                Err(error.into())
            }
        }
    }

    /// Reuses the page's existing thread or starts one.
    ///
    /// Threads are keyed by page address: asking twice about one page
    /// continues its conversation.
    fn thread_for(&self, details: &PageDetails) -> Result<ChatThread, StoreError> {
        if let Some(existing) = self
            .chats
            .threads()?
            .into_iter()
            .find(|thread| thread.url == details.url)
        {
            return Ok(existing);
        }
        let title = if details.title.is_empty() {
            details.url.clone()
        } else {
            details.title.clone()
        };
        self.chats.create_thread(ChatThreadCreate {
            title,
            url: details.url.clone(),
            icon: details.icon.clone(),
        })
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("Assistant").finish_non_exhaustive()
    }
}
