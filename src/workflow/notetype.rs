//! Note types the generated cards are stored under.

use log::info;

use crate::host::{ CardTemplate, NoteKind, NoteStore, NoteType, StoreError };
use crate::models::CardFormat;

pub const BASIC_NOTE_TYPE: &str = "AI Chat Basic";
pub const CLOZE_NOTE_TYPE: &str = "AI Chat Cloze";
pub const SUMMARY_FIELD: &str = "AI Conversation Summary";

pub fn note_type_name(format: CardFormat) -> &'static str {
    match format {
        CardFormat::Basic => BASIC_NOTE_TYPE,
        CardFormat::Cloze => CLOZE_NOTE_TYPE,
    }
}

/// Answer-side block that shows the summary only when the field is filled,
/// collapsed behind a toggle.
fn summary_block() -> String {
    format!(
        concat!(
            "{{{{#{field}}}}}\n",
            "<details class=\"ai-summary\">\n",
            "  <summary>💬 AI Chat Summary</summary>\n",
            "  <div dir=\"auto\" class=\"ai-summary-text\">{{{{{field}}}}}</div>\n",
            "</details>\n",
            "{{{{/{field}}}}}"
        ),
        field = SUMMARY_FIELD
    )
}

pub fn templates(format: CardFormat) -> Vec<CardTemplate> {
    match format {
        CardFormat::Basic =>
            vec![CardTemplate {
                name: "Card 1".to_string(),
                front: "{{Front}}".to_string(),
                back: format!("{{{{FrontSide}}}}<hr id=\"answer\">{{{{Back}}}}\n\n{}", summary_block()),
            }],
        CardFormat::Cloze =>
            vec![CardTemplate {
                name: "Cloze".to_string(),
                front: "{{cloze:Text}}".to_string(),
                back: format!("{{{{cloze:Text}}}}<br>{{{{Extra}}}}\n\n{}", summary_block()),
            }],
    }
}

pub fn note_type_for(format: CardFormat) -> NoteType {
    let (kind, fields) = match format {
        CardFormat::Basic => (NoteKind::Standard, ["Front", "Back", SUMMARY_FIELD]),
        CardFormat::Cloze => (NoteKind::Cloze, ["Text", "Extra", SUMMARY_FIELD]),
    };
    NoteType {
        name: note_type_name(format).to_string(),
        kind,
        fields: fields.iter().map(|f| f.to_string()).collect(),
        templates: templates(format),
    }
}

/// Looks the note type up by name; an existing one only gets its templates
/// rewritten, a missing one is created.
pub async fn ensure_note_type(store: &dyn NoteStore, format: CardFormat) -> Result<NoteType, StoreError> {
    let name = note_type_name(format);
    match store.note_type(name).await? {
        Some(mut existing) => {
            let templates = templates(format);
            store.update_templates(name, &templates).await?;
            existing.templates = templates;
            Ok(existing)
        }
        None => {
            let note_type = note_type_for(format);
            store.add_note_type(&note_type).await?;
            info!("Created note type '{}'", name);
            Ok(note_type)
        }
    }
}
