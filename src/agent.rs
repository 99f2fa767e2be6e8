use log::info;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::cli::Args;
use crate::config::SettingsStore;
use crate::config::prompt;
use crate::controller::{ ChatError, ChatServices, ChatSessionController };
use crate::history::initialize_history_store;
use crate::host::NoteStore;
use crate::llm::chat::new_client as new_chat_client;

/// Owns the shared services and the chat for the card currently on screen.
pub struct ChatAgent {
    services: ChatServices,
    current: Mutex<Option<Arc<ChatSessionController>>>,
}

impl ChatAgent {
    pub async fn new(
        args: &Args,
        notes: Arc<dyn NoteStore>
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let settings = Arc::new(SettingsStore::load(&args.settings_path));
        let prompts = prompt::load_prompts_or_default(args.prompts_path.as_deref())?;
        let history = initialize_history_store(args)?;

        let snapshot = settings.get();
        snapshot.validate()?;
        let client = new_chat_client(&snapshot.llm_config(&args.api_key))?;
        info!(
            "Chat client configured: Model={}, URL={}, Timeout={}s",
            snapshot.openai_model,
            client.endpoint(),
            snapshot.request_timeout_secs
        );

        Ok(Self::with_services(ChatServices { client, history, notes, settings, prompts }))
    }

    pub fn with_services(services: ChatServices) -> Self {
        Self { services, current: Mutex::new(None) }
    }

    pub fn services(&self) -> &ChatServices {
        &self.services
    }

    /// The chat for `card_id`, reusing the open one when it is for the same card.
    pub async fn open_chat(&self, card_id: i64) -> Result<Arc<ChatSessionController>, ChatError> {
        let mut current = self.current.lock().await;
        if let Some(controller) = current.as_ref() {
            if controller.card_id() == card_id {
                return Ok(Arc::clone(controller));
            }
        }
        let card = self.services.notes.card(card_id).await?;
        let controller = Arc::new(ChatSessionController::new(self.services.clone(), card));
        info!("Opened chat for card {}", card_id);
        *current = Some(Arc::clone(&controller));
        Ok(controller)
    }

    /// Host notification that `card_id` is now displayed. A chat bound to a
    /// different card is closed; replies still in flight for it are discarded.
    pub async fn on_card_shown(&self, card_id: i64) {
        let mut current = self.current.lock().await;
        let stale = current.as_ref().map_or(false, |c| c.card_id() != card_id);
        if stale {
            info!("Card changed to {}, closing previous chat", card_id);
            *current = None;
        }
    }

    pub async fn current_chat(&self) -> Option<Arc<ChatSessionController>> {
        self.current.lock().await.clone()
    }
}
