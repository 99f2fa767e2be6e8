pub mod agent;
pub mod cli;
pub mod config;
pub mod controller;
pub mod format;
pub mod history;
pub mod host;
pub mod llm;
pub mod models;
pub mod parser;
pub mod session;
pub mod workflow;

use agent::ChatAgent;
use cli::Args;
use controller::{ ChatSessionController, SaveMode };
use host::{ CardInfo, MemoryNoteStore };
use log::info;
use models::{ CardFormat, Flashcard, Role };
use session::SessionEvent;
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{ AsyncBufReadExt, BufReader, Lines, Stdin };
use tokio::sync::mpsc::UnboundedReceiver;
use workflow::{ GenerationOptions, WorkflowError };

const HELP: &str =
    "Commands: /summary, /save <field> [append], /cards <basic|cloze> [count] [instructions], /history, /clear, /quit";

type Input = Lines<BufReader<Stdin>>;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Settings Path: {}", args.settings_path.display());
    info!(
        "Prompts Path: {}",
        args.prompts_path.as_ref().map_or("built-in".to_string(), |p| p.display().to_string())
    );
    info!("History Store Type: {}", args.history_type);
    info!("History Store Host: {}", args.history_host);
    info!("Card: {} (deck {})", args.card_id, args.deck_id);
    info!("-------------------------");

    let notes = Arc::new(MemoryNoteStore::new());
    notes.insert_card(CardInfo {
        card_id: args.card_id,
        note_id: args.card_id,
        deck_id: args.deck_id,
        question_html: args.question.clone(),
        answer_html: args.answer.clone(),
        tags: args.tags.clone(),
    }).await;

    let agent = ChatAgent::new(&args, notes.clone()).await?;
    agent.on_card_shown(args.card_id).await;
    let chat = agent.open_chat(args.card_id).await?;

    println!("{}\n", chat.card_content());
    println!("{}", HELP);

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let mut last_summary: Option<String> = None;
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let line = match input.next_line().await? {
            Some(line) => line,
            None => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/history" => {
                let conversation = chat.history().await?;
                if conversation.is_empty() {
                    println!("(no messages yet)");
                }
                for msg in &conversation.messages {
                    let speaker = if msg.role == Role::User { "You" } else { "AI" };
                    println!("{}: {}\n", speaker, msg.content);
                }
            }
            "/clear" => {
                chat.clear_history().await?;
                println!("History cleared.");
            }
            "/summary" =>
                match chat.summarize().await {
                    Ok(events) => {
                        last_summary = print_stream(events, args.html).await;
                    }
                    Err(e) => println!("Error: {}", e),
                }
            "/save" => save_summary(&chat, rest, last_summary.as_deref()).await,
            "/cards" => generate_cards(&chat, rest, &mut input, notes.as_ref()).await?,
            _ if command.starts_with('/') => println!("Unknown command. {}", HELP),
            _ =>
                match chat.send_turn(line).await {
                    Ok(events) => {
                        print_stream(events, args.html).await;
                    }
                    Err(e) => println!("Error: {}", e),
                }
        }
    }

    info!("Chat for card {} closed", args.card_id);
    Ok(())
}

/// Prints a session as it arrives and returns the final text, if any.
async fn print_stream(mut events: UnboundedReceiver<SessionEvent>, html: bool) -> Option<String> {
    let mut printed = 0;
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Chunk(text) => {
                if !html {
                    if let Some(new_text) = text.get(printed..) {
                        print!("{}", new_text);
                        let _ = std::io::stdout().flush();
                    }
                    printed = text.len();
                }
            }
            SessionEvent::Done(text) => {
                if html {
                    println!("{}", format::render(&text));
                } else {
                    println!("\n");
                }
                return Some(text);
            }
            SessionEvent::Error(msg) => {
                println!("\nError: {}", msg);
                return None;
            }
        }
    }
    None
}

async fn save_summary(chat: &ChatSessionController, args: &str, summary: Option<&str>) {
    let Some(summary) = summary else {
        println!("Run /summary first.");
        return;
    };
    let mut parts = args.split_whitespace();
    let Some(field) = parts.next() else {
        println!("Usage: /save <field> [append]");
        return;
    };
    let mode = if parts.next() == Some("append") { SaveMode::Append } else { SaveMode::Replace };
    match chat.save_summary(field, summary, mode).await {
        Ok(()) => println!("Summary saved to '{}'.", field),
        Err(e) => println!("Error: {}", e),
    }
}

fn parse_card_options(args: &str) -> Result<GenerationOptions, String> {
    let mut parts = args.splitn(3, ' ');
    let mut options = GenerationOptions::default();
    if let Some(format) = parts.next().filter(|s| !s.is_empty()) {
        options.format = format.parse::<CardFormat>().map_err(|e| e.to_string())?;
    }
    if let Some(count) = parts.next() {
        options.count = count.parse().map_err(|_| format!("Invalid card count: '{}'", count))?;
    }
    options.instructions = parts.next().unwrap_or("").trim().to_string();
    Ok(options)
}

fn print_card(index: usize, card: &Flashcard) {
    match card {
        Flashcard::Basic { front, back } => println!("[{}] Front: {}\n    Back: {}", index + 1, front, back),
        Flashcard::Cloze { content } => println!("[{}] {}", index + 1, content),
    }
}

async fn generate_cards(
    chat: &ChatSessionController,
    args: &str,
    input: &mut Input,
    notes: &MemoryNoteStore
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let options = match parse_card_options(args) {
        Ok(options) => options,
        Err(e) => {
            println!("{}", e);
            return Ok(());
        }
    };
    let mut workflow = match chat.generation_workflow().await {
        Ok(workflow) => workflow,
        Err(e) => {
            println!("Error: {}", e);
            return Ok(());
        }
    };
    if let Err(e) = workflow.configure(options) {
        println!("Error: {}", e);
        return Ok(());
    }

    println!("Generating...");
    let result = workflow.run_generation(|draft| {
        print!("\r{} card(s) so far", draft.len());
        let _ = std::io::stdout().flush();
    }).await;
    println!();
    if let Err(e) = result {
        println!("Error: {}", e);
        return Ok(());
    }

    for (index, preview) in workflow.cards().iter().enumerate() {
        print_card(index, &preview.card);
    }
    println!("Numbers to keep (e.g. 1 3), 'all', or empty to cancel:");
    let answer = input.next_line().await?.unwrap_or_default();
    let answer = answer.trim();
    if answer.eq_ignore_ascii_case("all") {
        workflow.select_all(true)?;
    } else {
        for n in answer.split_whitespace().filter_map(|n| n.parse::<usize>().ok()) {
            if n == 0 || workflow.set_selected(n - 1, true).is_err() {
                println!("Skipping unknown card {}", n);
            }
        }
    }

    match workflow.commit().await {
        Ok(report) => {
            println!("Created {} flashcard(s), {} failed.", report.created, report.failed);
            for note_id in report.note_ids {
                if let Some(note) = notes.note(note_id).await {
                    info!("Note {} fields: {:?}", note_id, note.fields);
                }
            }
        }
        Err(WorkflowError::NothingSelected) => println!("Nothing created."),
        Err(e) => println!("Error: {}", e),
    }
    Ok(())
}
