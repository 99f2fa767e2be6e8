use log::{ debug, error, info, warn };
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::{ Arc, Mutex };
use thiserror::Error;
use tokio::sync::mpsc::{ self, UnboundedReceiver };

use crate::config::SettingsStore;
use crate::config::prompt::PromptConfig;
use crate::history::{ format_conversation_text, HistoryError, HistoryStore };
use crate::host::{ CardInfo, NoteStore, StoreError };
use crate::llm::LlmError;
use crate::llm::chat::ChatClient;
use crate::models::{ Conversation, Role };
use crate::session::requests;
use crate::session::{ SessionEvent, StreamingSession };
use crate::workflow::{ GenerationWorkflow, SourceCard };

pub const SUMMARY_SEPARATOR: &str = "=== AI Chat Summary ===";

/// Minimum logged messages before a conversation can be summarized or turned into cards.
pub const MIN_MESSAGES_FOR_TASKS: usize = 2;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("a response is still being received")]
    TurnInProgress,
    #[error("not enough conversation yet, chat a bit first")]
    NotEnoughConversation,
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Everything a controller or workflow talks to. Built once by the agent.
#[derive(Clone)]
pub struct ChatServices {
    pub client: Arc<dyn ChatClient>,
    pub history: Arc<dyn HistoryStore>,
    pub notes: Arc<dyn NoteStore>,
    pub settings: Arc<SettingsStore>,
    pub prompts: Arc<PromptConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveMode {
    Replace,
    Append,
}

/// Holds the controller's busy flag for one turn. Dropping it clears the
/// flag, so a send cancelled mid-setup or a forwarder that dies leaves the
/// controller idle.
struct BusyGuard {
    flag: Option<Arc<AtomicBool>>,
}

impl BusyGuard {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag: Some(Arc::clone(flag)) })
    }

    /// Clears the flag once. Later calls are no-ops, so a turn that has
    /// already been released never clears a flag claimed by the next one.
    fn release(&mut self) {
        if let Some(flag) = self.flag.take() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Chat bound to one card. At most one turn is in flight at a time; the
/// summary and refinement sessions run independently of it.
pub struct ChatSessionController {
    services: ChatServices,
    card: CardInfo,
    card_content: String,
    busy: Arc<AtomicBool>,
    last_error: Arc<Mutex<Option<String>>>,
}

impl ChatSessionController {
    pub fn new(services: ChatServices, card: CardInfo) -> Self {
        let card_content = card.readable_content();
        Self {
            services,
            card,
            card_content,
            busy: Arc::new(AtomicBool::new(false)),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn card(&self) -> &CardInfo {
        &self.card
    }

    pub fn card_id(&self) -> i64 {
        self.card.card_id
    }

    pub fn card_content(&self) -> &str {
        &self.card_content
    }

    pub fn state(&self) -> TurnState {
        if self.busy.load(Ordering::SeqCst) { TurnState::AwaitingResponse } else { TurnState::Idle }
    }

    /// Message of the most recent failed turn, if any.
    pub fn last_error(&self) -> Option<String> {
        match self.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Logs the user message, then streams the reply. The assistant message
    /// is logged before `Done` is delivered; a failed turn logs nothing more.
    pub async fn send_turn(&self, text: &str) -> Result<UnboundedReceiver<SessionEvent>, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let mut busy = BusyGuard::claim(&self.busy).ok_or(ChatError::TurnInProgress)?;
        let session = self.turn_session(text).await?;
        info!("Card {}: turn started in session {}", self.card.card_id, session.id());

        let mut upstream = session.start();
        let (tx, rx) = mpsc::unbounded_channel();
        let history = Arc::clone(&self.services.history);
        let last_error = Arc::clone(&self.last_error);
        let card_id = self.card.card_id;

        tokio::spawn(async move {
            while let Some(event) = upstream.recv().await {
                match &event {
                    SessionEvent::Chunk(_) => {}
                    SessionEvent::Done(text) => {
                        if let Err(e) = history.add_message(card_id, Role::Assistant, text).await {
                            error!("Card {}: could not log assistant reply: {}", card_id, e);
                        }
                    }
                    SessionEvent::Error(msg) => {
                        warn!("Card {}: turn failed: {}", card_id, msg);
                        if let Ok(mut guard) = last_error.lock() {
                            *guard = Some(msg.clone());
                        }
                    }
                }
                let terminal = event.is_terminal();
                if terminal {
                    busy.release();
                }
                if tx.send(event).is_err() {
                    debug!("Card {}: display closed, dropping event", card_id);
                }
                if terminal {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn turn_session(&self, text: &str) -> Result<StreamingSession, ChatError> {
        let history = &self.services.history;
        history.add_message(self.card.card_id, Role::User, text).await?;
        let conversation = history.get_conversation(self.card.card_id).await?;

        let settings = self.services.settings.get();
        let request = requests::chat_turn_request(
            &settings,
            &self.services.prompts,
            &self.card_content,
            &conversation
        );
        Ok(
            StreamingSession::new(Arc::clone(&self.services.client), request).with_timeout(
                settings.request_timeout()
            )
        )
    }

    pub async fn history(&self) -> Result<Conversation, ChatError> {
        Ok(self.services.history.get_conversation(self.card.card_id).await?)
    }

    pub async fn clear_history(&self) -> Result<(), ChatError> {
        self.services.history.clear(self.card.card_id).await?;
        info!("Cleared chat history for card {}", self.card.card_id);
        Ok(())
    }

    /// The logged conversation as summary/generation input. Requires at
    /// least [`MIN_MESSAGES_FOR_TASKS`] messages.
    pub async fn conversation_text(&self) -> Result<String, ChatError> {
        let conversation = self.history().await?;
        if conversation.len() < MIN_MESSAGES_FOR_TASKS {
            return Err(ChatError::NotEnoughConversation);
        }
        Ok(format_conversation_text(&self.card_content, &conversation))
    }

    /// Streams a study-notes summary of the conversation. History is read, not written.
    pub async fn summarize(&self) -> Result<UnboundedReceiver<SessionEvent>, ChatError> {
        let conversation_text = self.conversation_text().await?;
        let settings = self.services.settings.get();
        let request = requests::summary_request(
            &settings,
            &self.services.prompts,
            &conversation_text
        );
        let session = StreamingSession::new(Arc::clone(&self.services.client), request).with_timeout(
            settings.request_timeout()
        );
        Ok(session.start())
    }

    /// A fresh generation dialog seeded with this card's conversation.
    pub async fn generation_workflow(&self) -> Result<GenerationWorkflow, ChatError> {
        let conversation_text = self.conversation_text().await?;
        let source = SourceCard {
            card_id: self.card.card_id,
            deck_id: self.card.deck_id,
            tags: self.card.tags.clone(),
            conversation_text,
        };
        Ok(GenerationWorkflow::new(self.services.clone(), source))
    }

    /// Writes `summary` into `field` of the card's note and flushes the store.
    /// In append mode a non-empty field keeps its text, followed by a separator.
    pub async fn save_summary(&self, field: &str, summary: &str, mode: SaveMode) -> Result<(), ChatError> {
        let notes = &self.services.notes;
        let note_id = self.card.note_id;
        let fields = notes.note_fields(note_id).await?;
        let existing = fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| StoreError::FieldNotFound { note_id, field: field.to_string() })?;

        let value = match mode {
            SaveMode::Append if !existing.trim().is_empty() =>
                format!("{}\n\n{}\n{}", existing, SUMMARY_SEPARATOR, summary),
            _ => summary.to_string(),
        };
        notes.set_note_field(note_id, field, &value).await?;
        notes.save().await?;
        info!("Saved summary to field '{}' of note {}", field, note_id);
        Ok(())
    }
}
