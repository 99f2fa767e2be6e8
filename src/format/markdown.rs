//! Markdown subset to rich-text (HTML) conversion for chat display.

use once_cell::sync::Lazy;
use regex::Regex;

static HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,3}) (.+)$").unwrap());
static NUMBERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.\s+(.+)$").unwrap());
static BULLET: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[•\-\*]\s+(.+)$").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.+?)\*").unwrap());
static CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());

const ENTRY_STYLE: &str = "margin: 4px 0;";
const CODE_STYLE: &str =
    "background-color: rgba(128,128,128,0.2); padding: 2px 4px; border-radius: 3px; font-family: monospace;";

fn heading_style(level: usize) -> &'static str {
    match level {
        1 => "font-size: 20px; font-weight: bold; margin: 20px 0 12px 0;",
        2 => "font-size: 18px; font-weight: bold; margin: 16px 0 10px 0;",
        _ => "font-size: 16px; font-weight: bold; margin: 12px 0 8px 0;",
    }
}

fn inline(text: &str) -> String {
    let text = BOLD.replace_all(text, "<b>$1</b>");
    let text = ITALIC.replace_all(&text, "<i>$1</i>");
    let code = format!("<code style=\"{}\">$1</code>", CODE_STYLE);
    CODE.replace_all(&text, code.as_str()).into_owned()
}

fn render_line(line: &str) -> String {
    if let Some(caps) = HEADER.captures(line) {
        let level = caps[1].len();
        return format!(
            "<h{level} style=\"{}\">{}</h{level}>",
            heading_style(level),
            inline(&caps[2]),
            level = level
        );
    }
    if let Some(caps) = NUMBERED.captures(line) {
        return format!(
            "<div style=\"{}\"><b>{}.</b> {}</div>",
            ENTRY_STYLE,
            &caps[1],
            inline(&caps[2])
        );
    }
    if let Some(caps) = BULLET.captures(line) {
        return format!("<div style=\"{}\">• {}</div>", ENTRY_STYLE, inline(&caps[1]));
    }
    inline(line)
}

/// Renders model output for display. Total over all input: anything that
/// is not recognised markup passes through unchanged, and every newline
/// becomes `<br>`.
///
/// Block rules (headers, numbered and bullet entries) are decided per line
/// before inline rules run on the line's text, so a bullet marker is never
/// mistaken for the opening of an italic span.
pub fn render(raw: &str) -> String {
    raw.split('\n').map(render_line).collect::<Vec<_>>().join("<br>")
}
