//! Boundary to the application that owns cards, notes and decks.

mod memory;

pub use self::memory::MemoryNoteStore;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{ Deserialize, Serialize };
use thiserror::Error;

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("card {0} not found")]
    CardNotFound(i64),
    #[error("note {0} not found")]
    NoteNotFound(i64),
    #[error("note type '{0}' not found")]
    NoteTypeNotFound(String),
    #[error("field '{field}' not found on note {note_id}")]
    FieldNotFound {
        note_id: i64,
        field: String,
    },
    #[error("store operation failed: {0}")]
    Failed(String),
}

/// The card currently under review, as the host reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardInfo {
    pub card_id: i64,
    pub note_id: i64,
    pub deck_id: i64,
    pub question_html: String,
    pub answer_html: String,
    pub tags: Vec<String>,
}

impl CardInfo {
    /// Question and answer with markup removed, in the form injected into prompts.
    pub fn readable_content(&self) -> String {
        let question = strip_html(&self.question_html);
        let answer = strip_html(&self.answer_html);
        let mut content = format!("Question: {}\n", question);
        if !answer.is_empty() && answer != question {
            content.push_str(&format!("Answer: {}", answer));
        }
        content.trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Standard,
    Cloze,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardTemplate {
    pub name: String,
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteType {
    pub name: String,
    pub kind: NoteKind,
    pub fields: Vec<String>,
    pub templates: Vec<CardTemplate>,
}

/// Card/note operations the host application provides.
#[async_trait]
pub trait NoteStore: Send + Sync {
    async fn card(&self, card_id: i64) -> Result<CardInfo, StoreError>;

    /// `(name, value)` pairs in field order.
    async fn note_fields(&self, note_id: i64) -> Result<Vec<(String, String)>, StoreError>;

    async fn set_note_field(&self, note_id: i64, field: &str, value: &str) -> Result<(), StoreError>;

    async fn note_type(&self, name: &str) -> Result<Option<NoteType>, StoreError>;

    async fn add_note_type(&self, note_type: &NoteType) -> Result<(), StoreError>;

    async fn update_templates(&self, name: &str, templates: &[CardTemplate]) -> Result<(), StoreError>;

    /// Creates a note of `note_type` in `deck_id`; `fields` are assigned by position.
    async fn add_note_with_type(
        &self,
        note_type: &str,
        deck_id: i64,
        fields: &[String],
        tags: &[String]
    ) -> Result<i64, StoreError>;

    async fn save(&self) -> Result<(), StoreError>;
}

/// Removes tags and decodes the handful of entities card HTML commonly carries.
pub fn strip_html(text: &str) -> String {
    HTML_TAG.replace_all(text, "")
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
