pub mod flashcard;

pub use flashcard::{ parse, parse_single, MISSING_BACK_PLACEHOLDER };
