use log::{ info, warn };
use serde::{ Deserialize, Serialize };
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fs;
use std::path::{ Path, PathBuf };
use std::sync::{ Arc, RwLock };
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::llm::{ LlmConfig, DEFAULT_CHAT_MODEL, DEFAULT_CHAT_URL };

/// Accepted chat reply length, in tokens.
pub const CHAT_MAX_TOKENS_RANGE: std::ops::RangeInclusive<u32> = 50..=2000;

pub const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful AI assistant helping a student study flashcards. Please provide helpful, concise responses related to the flashcard content.";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings file IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ButtonPosition {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Auto,
    Light,
    Dark,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeColors {
    pub bg_main: String,
    pub bg_secondary: String,
    pub bg_input: String,
    pub text_primary: String,
    pub text_secondary: String,
    pub border: String,
    pub ai_bubble_bg: String,
    pub ai_bubble_text: String,
    pub accent_color: String,
}

impl ThemeColors {
    pub fn light() -> Self {
        Self {
            bg_main: "#ffffff".into(),
            bg_secondary: "#f8f9fa".into(),
            bg_input: "#f8f9fa".into(),
            text_primary: "#333333".into(),
            text_secondary: "#666666".into(),
            border: "#e9ecef".into(),
            ai_bubble_bg: "#f1f3f4".into(),
            ai_bubble_text: "#333333".into(),
            accent_color: "#6c5ce7".into(),
        }
    }

    pub fn dark() -> Self {
        Self {
            bg_main: "#2b2b2b".into(),
            bg_secondary: "#383838".into(),
            bg_input: "#404040".into(),
            text_primary: "#ffffff".into(),
            text_secondary: "#cccccc".into(),
            border: "#555555".into(),
            ai_bubble_bg: "#404040".into(),
            ai_bubble_text: "#ffffff".into(),
            accent_color: "#9c88ff".into(),
        }
    }
}

/// User-adjustable parameters. Every field has a default, so a settings file
/// written by an older version loads with the new keys filled in. Keys this
/// version does not know are kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub openai_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub summary_max_tokens: u32,
    pub generation_max_tokens: u32,
    pub ai_instructions: String,
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub single_response_timeout_secs: u64,
    pub show_button: bool,
    pub button_position: ButtonPosition,
    pub hotkey: String,
    pub button_size: u32,
    pub button_opacity: f32,
    pub window_width: u32,
    pub window_height: u32,
    pub window_always_on_top: bool,
    pub auto_focus_input: bool,
    pub color_scheme: ColorScheme,
    pub custom_colors: ThemeColors,
    pub button_icon: String,
    pub custom_button_image_path: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, JsonValue>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_model: DEFAULT_CHAT_MODEL.to_string(),
            max_tokens: 300,
            temperature: 0.7,
            summary_max_tokens: 500,
            generation_max_tokens: 800,
            ai_instructions: DEFAULT_INSTRUCTIONS.to_string(),
            api_url: DEFAULT_CHAT_URL.to_string(),
            request_timeout_secs: 60,
            single_response_timeout_secs: 30,
            show_button: true,
            button_position: ButtonPosition { x: 50, y: 50 },
            hotkey: "Ctrl+Shift+A".to_string(),
            button_size: 50,
            button_opacity: 0.9,
            window_width: 400,
            window_height: 600,
            window_always_on_top: true,
            auto_focus_input: true,
            color_scheme: ColorScheme::Auto,
            custom_colors: ThemeColors::light(),
            button_icon: "🤖".to_string(),
            custom_button_image_path: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.hotkey.trim().is_empty() {
            return Err(SettingsError::Invalid("Please enter a hotkey.".to_string()));
        }
        if self.ai_instructions.trim().is_empty() {
            return Err(SettingsError::Invalid("Please enter AI instructions.".to_string()));
        }
        if self.openai_model.trim().is_empty() {
            return Err(SettingsError::Invalid("Please choose a model.".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(
                SettingsError::Invalid(
                    format!("Temperature must be between 0.0 and 2.0, got {}", self.temperature)
                )
            );
        }
        if !CHAT_MAX_TOKENS_RANGE.contains(&self.max_tokens) {
            return Err(
                SettingsError::Invalid(
                    format!("Max tokens must be between 50 and 2000, got {}", self.max_tokens)
                )
            );
        }
        if self.summary_max_tokens == 0 || self.generation_max_tokens == 0 {
            return Err(SettingsError::Invalid("Token limits must be greater than zero.".to_string()));
        }
        if !(0.1..=1.0).contains(&self.button_opacity) {
            return Err(
                SettingsError::Invalid(
                    format!("Button opacity must be between 0.1 and 1.0, got {}", self.button_opacity)
                )
            );
        }
        match Url::parse(&self.api_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            _ => {
                return Err(SettingsError::Invalid(format!("Invalid API URL: '{}'", self.api_url)));
            }
        }
        Ok(())
    }

    /// Palette to draw with, given whether the host is in dark mode.
    pub fn theme_colors(&self, host_dark_mode: bool) -> ThemeColors {
        match self.color_scheme {
            ColorScheme::Custom => self.custom_colors.clone(),
            ColorScheme::Light => ThemeColors::light(),
            ColorScheme::Dark => ThemeColors::dark(),
            ColorScheme::Auto if host_dark_mode => ThemeColors::dark(),
            ColorScheme::Auto => ThemeColors::light(),
        }
    }

    pub fn llm_config(&self, api_key: &str) -> LlmConfig {
        LlmConfig {
            api_key: api_key.to_string(),
            url: self.api_url.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn single_response_timeout(&self) -> Duration {
        Duration::from_secs(self.single_response_timeout_secs)
    }
}

/// The settings document on disk plus the snapshot currently in use.
/// Saves replace the whole document; the last writer wins.
pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Arc<Settings>>,
}

impl SettingsStore {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match read_settings(&path) {
            Ok(Some(settings)) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Ok(None) => {
                info!("No settings file at {}, using defaults", path.display());
                Settings::default()
            }
            Err(e) => {
                warn!("Error loading settings from {}: {}. Using defaults.", path.display(), e);
                Settings::default()
            }
        };
        Self { path, current: RwLock::new(Arc::new(settings)) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Arc<Settings> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Validates and persists `settings`. Nothing is written when validation fails.
    pub fn replace(&self, settings: Settings) -> Result<Arc<Settings>, SettingsError> {
        settings.validate()?;
        write_settings(&self.path, &settings)?;
        let settings = Arc::new(settings);
        match self.current.write() {
            Ok(mut guard) => {
                *guard = Arc::clone(&settings);
            }
            Err(poisoned) => {
                *poisoned.into_inner() = Arc::clone(&settings);
            }
        }
        Ok(settings)
    }

    /// Applies `edit` to a copy of the current settings and saves the result.
    pub fn update<F>(&self, edit: F) -> Result<Arc<Settings>, SettingsError>
        where F: FnOnce(&mut Settings)
    {
        let mut settings = (*self.get()).clone();
        edit(&mut settings);
        self.replace(settings)
    }
}

fn read_settings(path: &Path) -> Result<Option<Settings>, SettingsError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

fn write_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_string_pretty(settings)?)?;
    Ok(())
}
