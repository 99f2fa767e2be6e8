//! Request bodies for the chat turn and the three single-prompt tasks.
//! Only the chat turn carries conversation history as separate messages.

use crate::config::Settings;
use crate::config::prompt::{
    self,
    PromptConfig,
};
use crate::llm::chat::{ ChatRequest, RequestMessage };
use crate::models::{ CardFormat, Conversation, Flashcard, Role };

pub const SUMMARY_TEMPERATURE: f32 = 0.3;
pub const GENERATION_TEMPERATURE: f32 = 0.4;
pub const REFINEMENT_TEMPERATURE: f32 = 0.3;

pub fn chat_turn_request(
    settings: &Settings,
    prompts: &PromptConfig,
    card_content: &str,
    conversation: &Conversation
) -> ChatRequest {
    let system = prompt::get_chat_system_prompt(prompts, &settings.ai_instructions, card_content);
    let mut messages = Vec::with_capacity(conversation.len() + 1);
    messages.push(RequestMessage::system(system));
    for msg in &conversation.messages {
        messages.push(match msg.role {
            Role::User => RequestMessage::user(msg.content.clone()),
            Role::Assistant => RequestMessage::assistant(msg.content.clone()),
        });
    }
    ChatRequest {
        model: settings.openai_model.clone(),
        messages,
        max_tokens: settings.max_tokens,
        temperature: settings.temperature,
        stream: None,
    }
}

pub fn summary_request(
    settings: &Settings,
    prompts: &PromptConfig,
    conversation_text: &str
) -> ChatRequest {
    task_request(
        settings,
        &prompts.summary_system,
        prompt::get_summary_prompt(prompts, conversation_text),
        settings.summary_max_tokens,
        SUMMARY_TEMPERATURE
    )
}

pub fn generation_request(
    settings: &Settings,
    prompts: &PromptConfig,
    count: u32,
    format: CardFormat,
    instructions: &str,
    conversation_text: &str
) -> ChatRequest {
    let user = prompt::get_generation_prompt(prompts, count, format, instructions, conversation_text);
    task_request(
        settings,
        &prompts.generation_system,
        user,
        settings.generation_max_tokens,
        GENERATION_TEMPERATURE
    )
}

pub fn refinement_request(
    settings: &Settings,
    prompts: &PromptConfig,
    card: &Flashcard,
    instruction: &str
) -> ChatRequest {
    task_request(
        settings,
        &prompts.refinement_system,
        prompt::get_refinement_prompt(prompts, card, instruction),
        settings.max_tokens,
        REFINEMENT_TEMPERATURE
    )
}

fn task_request(
    settings: &Settings,
    system: &str,
    user: String,
    max_tokens: u32,
    temperature: f32
) -> ChatRequest {
    ChatRequest {
        model: settings.openai_model.clone(),
        messages: vec![RequestMessage::system(system), RequestMessage::user(user)],
        max_tokens,
        temperature,
        stream: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;

    fn conversation() -> Conversation {
        Conversation {
            card_id: 3,
            messages: vec![
                ChatMessage { role: Role::User, content: "What is ATP?".into(), timestamp: 1 },
                ChatMessage { role: Role::Assistant, content: "Energy currency.".into(), timestamp: 2 },
                ChatMessage { role: Role::User, content: "And ADP?".into(), timestamp: 3 }
            ],
        }
    }

    #[test]
    fn chat_turn_carries_history_in_order() {
        let mut settings = Settings::default();
        settings.temperature = 1.1;
        let req = chat_turn_request(&settings, &PromptConfig::default(), "Question: ATP", &conversation());

        let roles: Vec<&str> = req.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert!(req.messages[0].content.contains("Question: ATP"));
        assert!(req.messages[0].content.starts_with(&settings.ai_instructions));
        assert_eq!(req.messages[3].content, "And ADP?");
        assert_eq!(req.temperature, 1.1);
        assert_eq!(req.max_tokens, settings.max_tokens);
    }

    #[test]
    fn tasks_use_fixed_temperatures() {
        let mut settings = Settings::default();
        settings.temperature = 1.9;
        let prompts = PromptConfig::default();

        let summary = summary_request(&settings, &prompts, "You: a");
        assert_eq!(summary.temperature, SUMMARY_TEMPERATURE);
        assert_eq!(summary.max_tokens, settings.summary_max_tokens);
        assert_eq!(summary.messages.len(), 2);

        let generation = generation_request(&settings, &prompts, 5, CardFormat::Cloze, "", "You: a");
        assert_eq!(generation.temperature, GENERATION_TEMPERATURE);
        assert_eq!(generation.max_tokens, settings.generation_max_tokens);
        assert!(generation.messages[1].content.contains("exactly 5"));

        let refinement = refinement_request(&settings, &prompts, &Flashcard::cloze("{{c1::x}}"), "simpler");
        assert_eq!(refinement.temperature, REFINEMENT_TEMPERATURE);
        assert!(refinement.messages[1].content.contains("{{c1::x}}"));
    }
}
