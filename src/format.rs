/// Deterministic rendering of ranking tables into reply text.
use unicode_width::UnicodeWidthStr;

use crate::metrics::{CountEntry, RatioEntry};
use crate::model::{MessageRecord, MAX_USERNAME_LEN};
use crate::timefmt::format_timestamp;
use crate::window::Period;

/// Transport message-size limit for a single text reply.
pub const MAX_REPLY_LEN: usize = 4096;

/// Substitute reply when a listing exceeds [`MAX_REPLY_LEN`].
pub const TOO_LONG_MESSAGE: &str = "Too much text to display. Lower the number of messages.";

/// Characters the transport's MarkdownV2 dialect reserves. `*` and backticks
/// stay unescaped: the reports use them as their own bold/pre markup.
const RESERVED: &[char] = &[
    '_', '[', ']', '(', ')', '~', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escape markup-reserved characters before handoff to the transport.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if RESERVED.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Degrade an over-long listing to a single explanatory message instead of
/// truncating it silently.
pub fn enforce_length(text: String) -> String {
    if text.chars().count() > MAX_REPLY_LEN {
        TOO_LONG_MESSAGE.to_string()
    } else {
        text
    }
}

/// Pad with spaces to the given display width (wide characters count double).
pub fn pad_display(text: &str, width: usize) -> String {
    let current = UnicodeWidthStr::width(text);
    let mut padded = text.to_string();
    for _ in current..width {
        padded.push(' ');
    }
    padded
}

/// Shortest decimal rendering of an already-rounded ratio (0.8, 1.25, ...).
pub fn format_ratio(ratio: f64) -> String {
    format!("{}", ratio)
}

/// Render a percentage delta with an explicit `+` for positive values.
pub fn format_delta(delta: f64) -> String {
    if delta > 0.0 {
        format!("+{}%", delta)
    } else {
        format!("{}%", delta)
    }
}

/// Shared reply headline: `<label> for <user> (<period>):`.
pub fn headline(label: &str, user: Option<&str>, period: Period) -> String {
    let mut text = label.to_string();
    if let Some(user) = user {
        text.push_str(&format!(" for {}", user));
    }
    text.push_str(&format!(" ({}):", period.label()));
    text
}

/// One listing row for a message: rank, author (unless the listing is already
/// scoped to one user), civil-time timestamp, text, concatenated reactions.
pub fn message_row(index: usize, message: &MessageRecord, with_username: bool) -> String {
    let mut row = format!("\n{}.", index + 1);
    if with_username {
        row.push_str(&format!(" {}", message.username));
    }
    row.push_str(&format!(" [{}]:", format_timestamp(message.timestamp)));
    row.push_str(&format!(
        " {} [{}]",
        message.text,
        message.reaction_emojis.join("")
    ));
    row
}

/// One column-aligned row of a ranked ratio listing.
pub fn ratio_row(index: usize, entry: &RatioEntry) -> String {
    format!(
        "\n{}{}{}",
        pad_display(&format!("{}.", index + 1), 4),
        pad_display(&format!("{}:", entry.username), MAX_USERNAME_LEN + 5),
        format_ratio(entry.ratio)
    )
}

/// Comma-joined `name: *score*` fragment for summary lines.
pub fn count_fragment(entries: &[CountEntry], top: usize) -> String {
    entries
        .iter()
        .take(top)
        .map(|entry| format!("{}: *{}*", entry.username, entry.count))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Comma-joined `name: *ratio*` fragment for summary lines.
pub fn ratio_fragment(entries: &[RatioEntry], top: usize) -> String {
    entries
        .iter()
        .take(top)
        .map(|entry| format!("{}: *{}*", entry.username, format_ratio(entry.ratio)))
        .collect::<Vec<_>>()
        .join(", ")
}
