use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Chat with an AI tutor about a flashcard", long_about = None)]
pub struct Args {
    // --- Configuration ---
    /// Settings document (created on first save)
    #[arg(long, env = "CARDCHAT_SETTINGS", default_value = "cardchat.json")]
    pub settings_path: PathBuf,

    /// Optional JSON file overriding prompt templates
    #[arg(long, env = "CARDCHAT_PROMPTS")]
    pub prompts_path: Option<PathBuf>,

    /// Bearer credential for the chat-completions endpoint
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    pub api_key: String,

    // --- History Store Args ---
    /// History chat store type (memory, redis)
    #[arg(long, env = "HISTORY_TYPE", default_value = "memory")]
    pub history_type: String,

    /// History chat store host endpoint (e.g., redis://127.0.0.1:6379)
    #[arg(long, env = "HISTORY_HOST", default_value = "redis://127.0.0.1:6379")]
    pub history_host: String,

    /// Prefix for Redis history keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "cardchat:history:")]
    pub history_redis_prefix: String,

    // --- Card under review ---
    /// Question side of the card to chat about
    #[arg(short, long)]
    pub question: String,

    /// Answer side of the card
    #[arg(short, long, default_value = "")]
    pub answer: String,

    /// Card id the chat log is stored under
    #[arg(long, default_value_t = 1)]
    pub card_id: i64,

    /// Deck the card and any generated notes belong to
    #[arg(long, default_value_t = 1)]
    pub deck_id: i64,

    /// Tags copied onto generated notes (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    // --- Output ---
    /// Print replies as rendered HTML instead of raw markdown
    #[arg(long)]
    pub html: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}
