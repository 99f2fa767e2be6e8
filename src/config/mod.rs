pub mod prompt;
pub mod settings;

pub use prompt::PromptConfig;
pub use settings::{ Settings, SettingsError, SettingsStore };
