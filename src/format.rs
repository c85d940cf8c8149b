use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};

const MESSAGE_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[hour repr:12 padding:zero]:[minute padding:zero] [period case:upper]");

const TITLE_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[month padding:none]/[day padding:none]/[year]");

pub const ELLIPSIS: &str = "...";

fn to_local(datetime: OffsetDateTime) -> OffsetDateTime {
    match UtcOffset::current_local_offset() {
        Ok(offset) => datetime.to_offset(offset),
        Err(_) => datetime,
    }
}

/// Short display time for a message bubble, e.g. `09:41 AM`.
pub fn format_timestamp(timestamp: OffsetDateTime) -> String {
    to_local(timestamp)
        .format(MESSAGE_TIME_FORMAT)
        .unwrap_or_default()
}

/// Placeholder title for a fresh session, e.g. `Chat 10/19/2026`.
pub fn default_chat_title(now: OffsetDateTime) -> String {
    match to_local(now).format(TITLE_DATE_FORMAT) {
        Ok(date) => format!("Chat {date}"),
        Err(_) => "Chat".to_string(),
    }
}

/// First `max` chars of `text`, counted in chars so multi-byte input never splits.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Cut `text` to `max` chars and mark the cut with an ellipsis.
pub fn preview(text: &str, max: usize) -> String {
    let cut = truncate_chars(text, max);
    if cut.len() < text.len() {
        format!("{cut}{ELLIPSIS}")
    } else {
        cut.to_string()
    }
}
