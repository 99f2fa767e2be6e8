use once_cell::sync::Lazy;
use regex::{ Captures, Regex };
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use log::info;

use crate::models::{ CardFormat, Flashcard };

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Prompt file IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Prompt JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Prompt templates. Placeholders are written as `{name}` and substituted
/// verbatim. Every template has a built-in default; a prompts file only needs
/// to list the ones it overrides.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PromptConfig {
    /// `{instructions}`, `{card_content}`
    pub chat_system: String,
    pub summary_system: String,
    /// `{conversation}`
    pub summary_request: String,
    pub generation_system: String,
    /// `{count}`, `{format_instructions}`, `{instructions}`, `{conversation}`
    pub generation_request: String,
    pub generation_default_instructions: String,
    pub generation_basic_format: String,
    pub generation_cloze_format: String,
    pub refinement_system: String,
    /// `{instruction}`, `{card}`, `{format_instructions}`
    pub refinement_request: String,
    pub refinement_basic_format: String,
    pub refinement_cloze_format: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            chat_system: "{instructions} The current flashcard content is: {card_content}.".to_string(),
            summary_system: "You are a helpful study assistant. Create clear, organized study notes from conversations using markdown formatting.".to_string(),
            summary_request: SUMMARY_REQUEST.to_string(),
            generation_system: "You are a helpful study assistant. Create clear, educational flashcards based on conversation content using the specified format.".to_string(),
            generation_request: GENERATION_REQUEST.to_string(),
            generation_default_instructions: "Create clear, concise flashcards that test understanding of key concepts discussed.".to_string(),
            generation_basic_format: GENERATION_BASIC_FORMAT.to_string(),
            generation_cloze_format: GENERATION_CLOZE_FORMAT.to_string(),
            refinement_system: "You are a helpful study assistant. Refine flashcards based on user instructions while maintaining educational quality.".to_string(),
            refinement_request: REFINEMENT_REQUEST.to_string(),
            refinement_basic_format: REFINEMENT_BASIC_FORMAT.to_string(),
            refinement_cloze_format: REFINEMENT_CLOZE_FORMAT.to_string(),
        }
    }
}

const SUMMARY_REQUEST: &str = r#"You are summarizing a chat conversation between a user and an AI assistant about study material.

IMPORTANT: Ignore the flashcard content at the beginning. Focus ONLY on the back-and-forth conversation between "You:" and "AI:" messages.

Write a single "Conversation Summary" section that captures the explanations and information that came up during the chat, mostly what the AI explained in answer to the user's questions.

Do NOT include:
- "Key Questions Asked" sections
- "Explanations Provided by AI" headers
- "Clarifications Made" sections
- Information from the original flashcard unless it was specifically discussed

Organize the content clearly with markdown formatting.

{conversation}

Conversation Summary:"#;

const GENERATION_REQUEST: &str = r#"Based on this conversation between a user and AI assistant, generate exactly {count} high-quality flashcards focusing on what the user learned during the discussion.

IMPORTANT: Focus ONLY on new information, explanations, or insights from the conversation. Do not create cards about the original flashcard content unless it was specifically discussed or expanded upon.

{format_instructions}

Additional Instructions: {instructions}

{conversation}

Generate exactly {count} flashcards:"#;

const GENERATION_BASIC_FORMAT: &str = r#"Create BASIC flashcards with STRICT Front/Back format. Do NOT use cloze deletion {{c1::}} syntax.

Example format:
Front: What is the primary use of Acyclovir?
Back: Acyclovir is primarily used to treat herpes simplex and varicella-zoster virus infections.

Each card MUST have exactly "Front:" and "Back:" labels, and cards MUST be separated by a blank line."#;

const GENERATION_CLOZE_FORMAT: &str = r#"Create CLOZE DELETION cards using {{c1::text}} format. These must be STATEMENTS, not questions.

Example format:
{{c1::Acyclovir}} is primarily used to treat {{c2::herpes simplex virus}} and {{c3::varicella-zoster virus}} infections.

Do NOT use "Question:" or "Answer:" labels. Write each cloze statement directly and separate cards with a blank line."#;

const REFINEMENT_REQUEST: &str = r#"Please refine this flashcard based on the following instruction: {instruction}

{card}

{format_instructions}

Refined card:"#;

const REFINEMENT_BASIC_FORMAT: &str = r#"Output the refined card in Front:/Back: format only. Do NOT use {{c1::}} cloze syntax.
IMPORTANT: It must have "Front:" and "Back:" labels.
Example:
Front: What is acyclovir used for?
Back: Treatment of herpes simplex and varicella-zoster virus infections."#;

const REFINEMENT_CLOZE_FORMAT: &str = r#"Output the refined card as a cloze deletion using {{c1::text}} syntax.
IMPORTANT: Use a statement, NOT question-answer.
Example: {{c1::Acyclovir}} is used for {{c2::herpes virus}} treatment."#;

pub fn load_prompts(path: &Path) -> Result<Arc<PromptConfig>, PromptError> {
    let file_content = fs::read_to_string(path)?;
    let config: PromptConfig = serde_json::from_str(&file_content)?;
    info!("Loaded prompt overrides from {}", path.display());
    Ok(Arc::new(config))
}

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// Fills `{name}` placeholders of `template` in one pass. Inserted values are
/// never rescanned, so user text that looks like a placeholder stays as typed.
/// Unknown names are left alone.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER.replace_all(template, |caps: &Captures| {
        let name = &caps[1];
        values
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
            .unwrap_or_else(|| caps[0].to_string())
    }).into_owned()
}

/// Loads `path` when given, otherwise the built-in templates.
pub fn load_prompts_or_default(path: Option<&Path>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(path) => load_prompts(path),
        None => Ok(Arc::new(PromptConfig::default())),
    }
}

pub fn get_chat_system_prompt(config: &PromptConfig, instructions: &str, card_content: &str) -> String {
    fill(&config.chat_system, &[("instructions", instructions), ("card_content", card_content)])
}

pub fn get_summary_prompt(config: &PromptConfig, conversation: &str) -> String {
    fill(&config.summary_request, &[("conversation", conversation)])
}

pub fn get_generation_prompt(
    config: &PromptConfig,
    count: u32,
    format: CardFormat,
    instructions: &str,
    conversation: &str
) -> String {
    let format_instructions = match format {
        CardFormat::Basic => &config.generation_basic_format,
        CardFormat::Cloze => &config.generation_cloze_format,
    };
    let instructions = if instructions.trim().is_empty() {
        config.generation_default_instructions.as_str()
    } else {
        instructions.trim()
    };
    let count = count.to_string();
    fill(
        &config.generation_request,
        &[
            ("count", count.as_str()),
            ("format_instructions", format_instructions),
            ("instructions", instructions),
            ("conversation", conversation),
        ]
    )
}

pub fn get_refinement_prompt(config: &PromptConfig, card: &Flashcard, instruction: &str) -> String {
    let format_instructions = match card.format() {
        CardFormat::Basic => &config.refinement_basic_format,
        CardFormat::Cloze => &config.refinement_cloze_format,
    };
    let card = card.describe();
    fill(
        &config.refinement_request,
        &[
            ("format_instructions", format_instructions),
            ("instruction", instruction.trim()),
            ("card", card.as_str()),
        ]
    )
}
