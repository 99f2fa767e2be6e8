pub mod chat;
pub mod flashcard;

pub use chat::{ ChatMessage, Conversation, Role };
pub use flashcard::{ CardField, CardFormat, Flashcard };
