//! Line-oriented recovery of flashcards from generated text.
//!
//! The generation prompts ask the model for `Front:`/`Back:` labelled cards or
//! `{{cN::...}}` statements separated by blank lines. The scanners here accept
//! exactly that shape and nothing looser, so prompts and parser must change
//! together.

use crate::models::{ CardFormat, Flashcard };

const FRONT_LABEL: &str = "front:";
const BACK_LABEL: &str = "back:";
const CLOZE_MARKER: &str = "{{c";

/// Back text used when a refined basic card comes back without labels.
pub const MISSING_BACK_PLACEHOLDER: &str = "[Refined content - please add back]";

/// Parses every complete card in `text`. Never fails; unrecognisable input
/// yields an empty list.
pub fn parse(text: &str, format: CardFormat) -> Vec<Flashcard> {
    match format {
        CardFormat::Basic => parse_basic(text),
        CardFormat::Cloze => parse_cloze(text),
    }
}

/// Parses a single-card response, as returned by a refinement request.
pub fn parse_single(text: &str, format: CardFormat) -> Option<Flashcard> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(card) = parse(trimmed, format).into_iter().next() {
        return Some(card);
    }
    match format {
        CardFormat::Basic => {
            let (front, back) = scan_labels(trimmed);
            match (front.is_empty(), back.is_empty()) {
                (true, true) => Some(Flashcard::basic(trimmed, MISSING_BACK_PLACEHOLDER)),
                _ => Some(Flashcard::basic(front, back)),
            }
        }
        CardFormat::Cloze => Some(Flashcard::cloze(trimmed)),
    }
}

/// Strips `label` from the start of `line` if present, ignoring ASCII case.
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if head.eq_ignore_ascii_case(label) {
        Some(line[label.len()..].trim())
    } else {
        None
    }
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(line);
}

#[derive(PartialEq)]
enum Side {
    None,
    Front,
    Back,
}

struct BasicScanner {
    cards: Vec<Flashcard>,
    front: String,
    back: String,
    side: Side,
}

impl BasicScanner {
    fn new() -> Self {
        Self { cards: Vec::new(), front: String::new(), back: String::new(), side: Side::None }
    }

    fn flush(&mut self) {
        let front = self.front.trim();
        let back = self.back.trim();
        if !front.is_empty() && !back.is_empty() {
            self.cards.push(Flashcard::basic(front, back));
        }
        self.front.clear();
        self.back.clear();
        self.side = Side::None;
    }

    fn feed(&mut self, raw: &str) {
        let line = raw.trim();
        if let Some(rest) = strip_label(line, FRONT_LABEL) {
            self.flush();
            self.front.push_str(rest);
            self.side = Side::Front;
        } else if let Some(rest) = strip_label(line, BACK_LABEL) {
            self.back.clear();
            self.back.push_str(rest);
            self.side = Side::Back;
        } else if line.is_empty() {
            if !self.front.trim().is_empty() && !self.back.trim().is_empty() {
                self.flush();
            }
        } else {
            match self.side {
                Side::Front => push_line(&mut self.front, line),
                Side::Back => push_line(&mut self.back, line),
                Side::None => {}
            }
        }
    }
}

fn parse_basic(text: &str) -> Vec<Flashcard> {
    let mut scanner = BasicScanner::new();
    for line in text.lines() {
        scanner.feed(line);
    }
    scanner.flush();
    scanner.cards
}

/// First front/back pair in `text`, complete or not.
fn scan_labels(text: &str) -> (String, String) {
    let mut scanner = BasicScanner::new();
    for line in text.lines() {
        let line = line.trim();
        if strip_label(line, FRONT_LABEL).is_some() && !scanner.front.is_empty() {
            break;
        }
        scanner.feed(line);
    }
    (scanner.front.trim().to_string(), scanner.back.trim().to_string())
}

fn parse_cloze(text: &str) -> Vec<Flashcard> {
    let mut cards = Vec::new();
    let mut current = String::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.contains(CLOZE_MARKER) {
            if !current.is_empty() {
                cards.push(Flashcard::cloze(current.trim()));
            }
            current = line.to_string();
        } else if line.is_empty() {
            if !current.is_empty() {
                cards.push(Flashcard::cloze(current.trim()));
                current.clear();
            }
        } else if !current.is_empty() {
            push_line(&mut current, line);
        }
    }
    if !current.is_empty() {
        cards.push(Flashcard::cloze(current.trim()));
    }
    cards
}
