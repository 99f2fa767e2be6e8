use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{ AtomicI64, AtomicUsize, Ordering };
use tokio::sync::RwLock;

use super::{ CardInfo, CardTemplate, NoteStore, NoteType, StoreError };

#[derive(Debug, Clone, PartialEq)]
pub struct StoredNote {
    pub note_id: i64,
    pub note_type: String,
    pub deck_id: i64,
    pub fields: Vec<(String, String)>,
    pub tags: Vec<String>,
}

/// In-process host used by the terminal front-end and tests.
pub struct MemoryNoteStore {
    cards: RwLock<HashMap<i64, CardInfo>>,
    notes: RwLock<HashMap<i64, StoredNote>>,
    note_types: RwLock<HashMap<String, NoteType>>,
    next_note_id: AtomicI64,
    saves: AtomicUsize,
}

impl Default for MemoryNoteStore {
    fn default() -> Self {
        Self {
            cards: RwLock::new(HashMap::new()),
            notes: RwLock::new(HashMap::new()),
            note_types: RwLock::new(HashMap::new()),
            next_note_id: AtomicI64::new(1_000),
            saves: AtomicUsize::new(0),
        }
    }
}

impl MemoryNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a reviewable card backed by a two-field `Front`/`Back` note.
    pub async fn insert_card(&self, card: CardInfo) {
        let note = StoredNote {
            note_id: card.note_id,
            note_type: "Basic".to_string(),
            deck_id: card.deck_id,
            fields: vec![
                ("Front".to_string(), card.question_html.clone()),
                ("Back".to_string(), card.answer_html.clone())
            ],
            tags: card.tags.clone(),
        };
        self.notes.write().await.insert(card.note_id, note);
        self.cards.write().await.insert(card.card_id, card);
    }

    pub async fn note(&self, note_id: i64) -> Option<StoredNote> {
        self.notes.read().await.get(&note_id).cloned()
    }

    /// Notes created through [`NoteStore::add_note_with_type`], oldest first.
    pub async fn created_notes(&self) -> Vec<StoredNote> {
        let mut notes: Vec<StoredNote> = self.notes
            .read().await
            .values()
            .filter(|n| n.note_id >= 1_000)
            .cloned()
            .collect();
        notes.sort_by_key(|n| n.note_id);
        notes
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NoteStore for MemoryNoteStore {
    async fn card(&self, card_id: i64) -> Result<CardInfo, StoreError> {
        self.cards.read().await.get(&card_id).cloned().ok_or(StoreError::CardNotFound(card_id))
    }

    async fn note_fields(&self, note_id: i64) -> Result<Vec<(String, String)>, StoreError> {
        self.notes
            .read().await
            .get(&note_id)
            .map(|n| n.fields.clone())
            .ok_or(StoreError::NoteNotFound(note_id))
    }

    async fn set_note_field(&self, note_id: i64, field: &str, value: &str) -> Result<(), StoreError> {
        let mut notes = self.notes.write().await;
        let note = notes.get_mut(&note_id).ok_or(StoreError::NoteNotFound(note_id))?;
        let slot = note.fields
            .iter_mut()
            .find(|(name, _)| name == field)
            .ok_or_else(|| StoreError::FieldNotFound { note_id, field: field.to_string() })?;
        slot.1 = value.to_string();
        Ok(())
    }

    async fn note_type(&self, name: &str) -> Result<Option<NoteType>, StoreError> {
        Ok(self.note_types.read().await.get(name).cloned())
    }

    async fn add_note_type(&self, note_type: &NoteType) -> Result<(), StoreError> {
        let mut types = self.note_types.write().await;
        if types.contains_key(&note_type.name) {
            return Err(StoreError::Failed(format!("note type '{}' already exists", note_type.name)));
        }
        types.insert(note_type.name.clone(), note_type.clone());
        Ok(())
    }

    async fn update_templates(&self, name: &str, templates: &[CardTemplate]) -> Result<(), StoreError> {
        let mut types = self.note_types.write().await;
        let note_type = types
            .get_mut(name)
            .ok_or_else(|| StoreError::NoteTypeNotFound(name.to_string()))?;
        note_type.templates = templates.to_vec();
        Ok(())
    }

    async fn add_note_with_type(
        &self,
        note_type: &str,
        deck_id: i64,
        fields: &[String],
        tags: &[String]
    ) -> Result<i64, StoreError> {
        let field_names = self.note_types
            .read().await
            .get(note_type)
            .map(|t| t.fields.clone())
            .ok_or_else(|| StoreError::NoteTypeNotFound(note_type.to_string()))?;
        if fields.len() != field_names.len() {
            return Err(
                StoreError::Failed(
                    format!(
                        "note type '{}' has {} fields, got {}",
                        note_type,
                        field_names.len(),
                        fields.len()
                    )
                )
            );
        }

        let note_id = self.next_note_id.fetch_add(1, Ordering::SeqCst);
        let note = StoredNote {
            note_id,
            note_type: note_type.to_string(),
            deck_id,
            fields: field_names.into_iter().zip(fields.iter().cloned()).collect(),
            tags: tags.to_vec(),
        };
        debug!("Created note {} of type '{}' in deck {}", note_id, note_type, deck_id);
        self.notes.write().await.insert(note_id, note);
        Ok(note_id)
    }

    async fn save(&self) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
