use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CardFormat {
    Basic,
    Cloze,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseCardFormatError {
    message: String,
}

impl fmt::Display for ParseCardFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseCardFormatError {}

impl FromStr for CardFormat {
    type Err = ParseCardFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(CardFormat::Basic),
            "cloze" => Ok(CardFormat::Cloze),
            _ =>
                Err(ParseCardFormatError {
                    message: format!("Invalid card format: '{}'", s),
                }),
        }
    }
}

impl fmt::Display for CardFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardFormat::Basic => write!(f, "basic"),
            CardFormat::Cloze => write!(f, "cloze"),
        }
    }
}

/// A flashcard recovered from generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum Flashcard {
    Basic {
        front: String,
        back: String,
    },
    Cloze {
        content: String,
    },
}

/// Editable field of a [`Flashcard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardField {
    Front,
    Back,
    Content,
}

impl Flashcard {
    pub fn basic(front: impl Into<String>, back: impl Into<String>) -> Self {
        Flashcard::Basic { front: front.into(), back: back.into() }
    }

    pub fn cloze(content: impl Into<String>) -> Self {
        Flashcard::Cloze { content: content.into() }
    }

    pub fn format(&self) -> CardFormat {
        match self {
            Flashcard::Basic { .. } => CardFormat::Basic,
            Flashcard::Cloze { .. } => CardFormat::Cloze,
        }
    }

    /// Replaces one field in place. Returns false when the field does not
    /// exist for this card's format.
    pub fn set_field(&mut self, field: CardField, text: &str) -> bool {
        match (self, field) {
            (Flashcard::Basic { front, .. }, CardField::Front) => {
                *front = text.to_string();
                true
            }
            (Flashcard::Basic { back, .. }, CardField::Back) => {
                *back = text.to_string();
                true
            }
            (Flashcard::Cloze { content }, CardField::Content) => {
                *content = text.to_string();
                true
            }
            _ => false,
        }
    }

    /// Note fields in positional order: `front, back, summary` or
    /// `text, extra, summary`.
    pub fn note_fields(&self, summary: &str) -> Vec<String> {
        match self {
            Flashcard::Basic { front, back } =>
                vec![front.clone(), back.clone(), summary.to_string()],
            Flashcard::Cloze { content } =>
                vec![content.clone(), String::new(), summary.to_string()],
        }
    }

    /// The card as it is shown to the model when asking for a refinement.
    pub fn describe(&self) -> String {
        match self {
            Flashcard::Basic { front, back } =>
                format!("Current card:\nFront: {}\nBack: {}", front, back),
            Flashcard::Cloze { content } => format!("Current cloze card: {}", content),
        }
    }
}
