//! Turning a conversation into new notes: configure, generate, preview and
//! edit, then commit the selected cards.

pub mod notetype;

use log::{ debug, error, info, warn };
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::controller::ChatServices;
use crate::host::StoreError;
use crate::llm::LlmError;
use crate::models::{ CardField, CardFormat, Flashcard };
use crate::parser;
use crate::session::requests;
use crate::session::{ SessionEvent, StreamingSession };

pub const MIN_CARDS: u32 = 1;
pub const MAX_CARDS: u32 = 20;
pub const SUMMARY_FALLBACK: &str = "Error generating conversation summary";
pub const PARSE_FAILURE: &str = "could not parse any flashcards";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("not allowed while {0:?}")]
    InvalidPhase(WorkflowPhase),
    #[error("card count must be between 1 and 20, got {0}")]
    InvalidCardCount(u32),
    #[error("no card at index {0}")]
    IndexOutOfRange(usize),
    #[error("{field:?} does not exist on a {format} card")]
    FormatMismatch {
        field: CardField,
        format: CardFormat,
    },
    #[error("could not parse any flashcards")]
    NoFlashcards,
    #[error("no flashcards selected")]
    NothingSelected,
    #[error("refinement instruction is empty")]
    EmptyInstruction,
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowPhase {
    Configuring,
    Generating,
    Previewing,
    Committing,
    Done,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    pub format: CardFormat,
    pub count: u32,
    pub instructions: String,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self { format: CardFormat::Basic, count: 5, instructions: String::new() }
    }
}

/// The card whose conversation is being turned into new notes.
#[derive(Debug, Clone)]
pub struct SourceCard {
    pub card_id: i64,
    pub deck_id: i64,
    pub tags: Vec<String>,
    pub conversation_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreviewCard {
    pub card: Flashcard,
    pub selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub created: usize,
    pub failed: usize,
    pub note_ids: Vec<i64>,
}

pub struct GenerationWorkflow {
    services: ChatServices,
    source: SourceCard,
    phase: WorkflowPhase,
    options: GenerationOptions,
    draft: Vec<Flashcard>,
    cards: Vec<PreviewCard>,
}

impl GenerationWorkflow {
    pub fn new(services: ChatServices, source: SourceCard) -> Self {
        Self {
            services,
            source,
            phase: WorkflowPhase::Configuring,
            options: GenerationOptions::default(),
            draft: Vec::new(),
            cards: Vec::new(),
        }
    }

    pub fn phase(&self) -> &WorkflowPhase {
        &self.phase
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn source(&self) -> &SourceCard {
        &self.source
    }

    fn expect_phase(&self, expected: WorkflowPhase) -> Result<(), WorkflowError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(WorkflowError::InvalidPhase(self.phase.clone()))
        }
    }

    pub fn configure(&mut self, options: GenerationOptions) -> Result<(), WorkflowError> {
        self.expect_phase(WorkflowPhase::Configuring)?;
        if !(MIN_CARDS..=MAX_CARDS).contains(&options.count) {
            return Err(WorkflowError::InvalidCardCount(options.count));
        }
        self.options = options;
        Ok(())
    }

    fn begin_generation(&mut self) -> Result<StreamingSession, WorkflowError> {
        self.expect_phase(WorkflowPhase::Configuring)?;
        let settings = self.services.settings.get();
        let request = requests::generation_request(
            &settings,
            &self.services.prompts,
            self.options.count,
            self.options.format,
            &self.options.instructions,
            &self.source.conversation_text
        );
        self.draft.clear();
        self.cards.clear();
        self.phase = WorkflowPhase::Generating;
        info!(
            "Generating {} {} cards from card {}",
            self.options.count,
            self.options.format,
            self.source.card_id
        );
        Ok(
            StreamingSession::new(Arc::clone(&self.services.client), request).with_timeout(
                settings.request_timeout()
            )
        )
    }

    /// Starts generation; feed the returned events to [`Self::handle_event`].
    pub fn generate(&mut self) -> Result<UnboundedReceiver<SessionEvent>, WorkflowError> {
        Ok(self.begin_generation()?.start())
    }

    /// Applies one generation event. Chunks only refresh [`Self::draft`];
    /// the record set is taken from the final text alone.
    pub fn handle_event(&mut self, event: SessionEvent) {
        if self.phase != WorkflowPhase::Generating {
            debug!("Ignoring generation event while {:?}", self.phase);
            return;
        }
        match event {
            SessionEvent::Chunk(text) => {
                self.draft = parser::parse(&text, self.options.format);
            }
            SessionEvent::Done(text) => {
                let _ = self.finish_generation(&text);
            }
            SessionEvent::Error(msg) => {
                warn!("Flashcard generation failed: {}", msg);
                self.phase = WorkflowPhase::Failed(msg);
            }
        }
    }

    /// Runs generation to the end in place, reporting each advisory parse to
    /// `on_progress`. Returns the number of cards available for preview.
    pub async fn run_generation<F>(&mut self, mut on_progress: F) -> Result<usize, WorkflowError>
        where F: FnMut(&[Flashcard]) + Send
    {
        let session = self.begin_generation()?;
        let format = self.options.format;
        let mut draft = Vec::new();
        let result = session.execute(|text| {
            draft = parser::parse(text, format);
            on_progress(&draft);
        }).await;
        self.draft = draft;

        match result {
            Ok(text) => self.finish_generation(&text),
            Err(e) => {
                warn!("Flashcard generation failed: {}", e);
                self.phase = WorkflowPhase::Failed(e.to_string());
                Err(e.into())
            }
        }
    }

    fn finish_generation(&mut self, text: &str) -> Result<usize, WorkflowError> {
        let cards = parser::parse(text, self.options.format);
        if cards.is_empty() {
            warn!("Generated text held no {} flashcards", self.options.format);
            self.phase = WorkflowPhase::Failed(PARSE_FAILURE.to_string());
            return Err(WorkflowError::NoFlashcards);
        }
        self.cards = cards
            .into_iter()
            .map(|card| PreviewCard { card, selected: false })
            .collect();
        self.phase = WorkflowPhase::Previewing;
        info!("Parsed {} flashcards for preview", self.cards.len());
        Ok(self.cards.len())
    }

    /// Best-effort parse of the text streamed so far. Display only.
    pub fn draft(&self) -> &[Flashcard] {
        &self.draft
    }

    pub fn cards(&self) -> &[PreviewCard] {
        &self.cards
    }

    fn preview_card(&mut self, index: usize) -> Result<&mut PreviewCard, WorkflowError> {
        self.expect_phase(WorkflowPhase::Previewing)?;
        self.cards.get_mut(index).ok_or(WorkflowError::IndexOutOfRange(index))
    }

    /// Flips the selection of one card and returns its new state.
    pub fn toggle(&mut self, index: usize) -> Result<bool, WorkflowError> {
        let card = self.preview_card(index)?;
        card.selected = !card.selected;
        Ok(card.selected)
    }

    pub fn set_selected(&mut self, index: usize, selected: bool) -> Result<(), WorkflowError> {
        self.preview_card(index)?.selected = selected;
        Ok(())
    }

    pub fn select_all(&mut self, selected: bool) -> Result<(), WorkflowError> {
        self.expect_phase(WorkflowPhase::Previewing)?;
        for card in &mut self.cards {
            card.selected = selected;
        }
        Ok(())
    }

    pub fn selected_count(&self) -> usize {
        self.cards
            .iter()
            .filter(|c| c.selected)
            .count()
    }

    pub fn edit_field(&mut self, index: usize, field: CardField, text: &str) -> Result<(), WorkflowError> {
        let preview = self.preview_card(index)?;
        if preview.card.set_field(field, text) {
            Ok(())
        } else {
            Err(WorkflowError::FormatMismatch { field, format: preview.card.format() })
        }
    }

    /// A session that rewrites card `index` as it currently reads.
    pub fn refinement_session(
        &self,
        index: usize,
        instruction: &str
    ) -> Result<StreamingSession, WorkflowError> {
        self.expect_phase(WorkflowPhase::Previewing)?;
        let preview = self.cards.get(index).ok_or(WorkflowError::IndexOutOfRange(index))?;
        if instruction.trim().is_empty() {
            return Err(WorkflowError::EmptyInstruction);
        }
        let settings = self.services.settings.get();
        let request = requests::refinement_request(
            &settings,
            &self.services.prompts,
            &preview.card,
            instruction
        );
        Ok(
            StreamingSession::new(Arc::clone(&self.services.client), request).with_timeout(
                settings.request_timeout()
            )
        )
    }

    /// Replaces card `index` with the single card parsed from `text`.
    /// The selection flag is kept.
    pub fn apply_refinement(&mut self, index: usize, text: &str) -> Result<&Flashcard, WorkflowError> {
        let format = self.options.format;
        let preview = self.preview_card(index)?;
        let refined = parser::parse_single(text, format).ok_or(WorkflowError::NoFlashcards)?;
        preview.card = refined;
        Ok(&preview.card)
    }

    pub async fn refine(&mut self, index: usize, instruction: &str) -> Result<Flashcard, WorkflowError> {
        let session = self.refinement_session(index, instruction)?;
        let text = session.execute(|_| {}).await?;
        Ok(self.apply_refinement(index, &text)?.clone())
    }

    async fn conversation_summary(&self) -> String {
        let settings = self.services.settings.get();
        let request = requests::summary_request(
            &settings,
            &self.services.prompts,
            &self.source.conversation_text
        );
        let session = StreamingSession::new(Arc::clone(&self.services.client), request)
            .single_response()
            .with_timeout(settings.single_response_timeout());
        match session.execute(|_| {}).await {
            Ok(summary) => summary,
            Err(e) => {
                error!("Error generating conversation summary: {}", e);
                SUMMARY_FALLBACK.to_string()
            }
        }
    }

    /// Creates one note per selected card, with the text as currently edited.
    /// A note that fails to be created is logged and skipped.
    pub async fn commit(&mut self) -> Result<CommitReport, WorkflowError> {
        self.expect_phase(WorkflowPhase::Previewing)?;
        let selected: Vec<Flashcard> = self.cards
            .iter()
            .filter(|c| c.selected)
            .map(|c| c.card.clone())
            .collect();
        if selected.is_empty() {
            return Err(WorkflowError::NothingSelected);
        }

        self.phase = WorkflowPhase::Committing;
        let notes = Arc::clone(&self.services.notes);
        let format = self.options.format;
        let note_type = match notetype::ensure_note_type(notes.as_ref(), format).await {
            Ok(note_type) => note_type,
            Err(e) => {
                error!("Could not set up note type for {} cards: {}", format, e);
                self.phase = WorkflowPhase::Previewing;
                return Err(e.into());
            }
        };

        let summary = self.conversation_summary().await;
        let mut report = CommitReport::default();
        for (index, card) in selected.iter().enumerate() {
            let fields = card.note_fields(&summary);
            match
                notes.add_note_with_type(
                    &note_type.name,
                    self.source.deck_id,
                    &fields,
                    &self.source.tags
                ).await
            {
                Ok(note_id) => {
                    report.created += 1;
                    report.note_ids.push(note_id);
                }
                Err(e) => {
                    error!("Error creating flashcard {}: {}", index + 1, e);
                    report.failed += 1;
                }
            }
        }

        if report.created > 0 {
            if let Err(e) = notes.save().await {
                error!("Created {} notes but saving failed: {}", report.created, e);
            }
        }
        info!(
            "Committed {} of {} selected flashcards to deck {}",
            report.created,
            selected.len(),
            self.source.deck_id
        );
        self.phase = WorkflowPhase::Done;
        Ok(report)
    }

    /// Back to `Configuring` for another round, keeping the options.
    pub fn reset(&mut self) -> Result<(), WorkflowError> {
        match self.phase {
            WorkflowPhase::Generating | WorkflowPhase::Committing => {
                Err(WorkflowError::InvalidPhase(self.phase.clone()))
            }
            _ => {
                self.phase = WorkflowPhase::Configuring;
                self.draft.clear();
                self.cards.clear();
                Ok(())
            }
        }
    }
}
