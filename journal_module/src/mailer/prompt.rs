use chrono::{Datelike, NaiveDate};
use rand::Rng;

use crate::store::{EntryStore, StoreError};

pub const FALLBACK_PROMPT_BODY: &str = "<p>Reply to this prompt to update your journal.</p>";

/// Builds the prompt body: an excerpt of one uniformly random past entry
/// with a relative-time lead-in, or the plain invitation when the journal is
/// still empty.
pub(super) fn prompt_body(entries: &EntryStore, today: NaiveDate) -> Result<String, StoreError> {
    let count = entries.count_entries()?;
    if count == 0 {
        return Ok(FALLBACK_PROMPT_BODY.to_string());
    }
    let offset = rand::thread_rng().gen_range(0..count);
    let Some((day, body)) = entries.entry_at_offset(offset)? else {
        return Ok(FALLBACK_PROMPT_BODY.to_string());
    };
    Ok(render_excerpt(day, &body, today))
}

fn render_excerpt(day: NaiveDate, body: &str, today: NaiveDate) -> String {
    format!(
        "<p>On {}, {}, you wrote:</p><blockquote>{}</blockquote>{}",
        day.format("%B %-d, %Y"),
        relative_delta(day, today),
        linebreaks(body),
        FALLBACK_PROMPT_BODY
    )
}

/// Human phrasing for how long ago `day` was relative to `today`:
/// "3 years, 2 months ago", "5 months ago", "12 days ago", "today".
fn relative_delta(day: NaiveDate, today: NaiveDate) -> String {
    if day >= today {
        return "today".to_string();
    }
    let months = month_span(day, today);
    if months == 0 {
        let days = (today - day).num_days();
        return format!("{} ago", pluralize(days, "day"));
    }
    let years = months / 12;
    let remainder = months % 12;
    match (years, remainder) {
        (0, m) => format!("{} ago", pluralize(m, "month")),
        (y, 0) => format!("{} ago", pluralize(y, "year")),
        (y, m) => format!("{}, {} ago", pluralize(y, "year"), pluralize(m, "month")),
    }
}

/// Whole calendar months from `from` to `to`, rounding down on partial
/// months.
fn month_span(from: NaiveDate, to: NaiveDate) -> i64 {
    let mut months =
        i64::from(to.year() - from.year()) * 12 + i64::from(to.month()) - i64::from(from.month());
    if to.day() < from.day() {
        months -= 1;
    }
    months.max(0)
}

fn pluralize(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

/// Converts stored plain text to presentation markup: double newlines
/// delimit `<p>` blocks, single newlines inside a paragraph become `<br>`.
fn linebreaks(text: &str) -> String {
    let mut blocks = Vec::new();
    for paragraph in text.trim().split("\n\n") {
        let lines: Vec<&str> = paragraph
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.is_empty() {
            continue;
        }
        blocks.push(format!("<p>{}</p>", lines.join("<br>")));
    }
    blocks.concat()
}
