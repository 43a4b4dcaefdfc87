use chrono::NaiveDate;
use thiserror::Error;

const MARKER: &str = "It's ";
const SUFFIX: &str = ". How are you?";
const DATE_FORMAT: &str = "%b. %e, %Y";

#[derive(Debug, Error)]
pub enum SubjectError {
    #[error("subject does not match the prompt format: {0:?}")]
    Format(String),
    #[error("subject date segment does not split into weekday and date: {0:?}")]
    MissingWeekday(String),
    #[error("could not parse date {fragment:?} from subject: {source}")]
    DateParse {
        fragment: String,
        source: chrono::ParseError,
    },
}

/// Extracts the calendar date from a prompt subject line.
///
/// An arbitrary prefix before the marker is permitted (reply markers like
/// `Re: ` survive mail clients); after that the subject must read
/// `It's <Weekday>, <Mon>. <Day>, <Year>. How are you?`. The weekday is not
/// validated against the date. Callers never guess a date on failure.
pub fn parse_subject_date(subject: &str) -> Result<NaiveDate, SubjectError> {
    let stripped = subject
        .strip_suffix(SUFFIX)
        .ok_or_else(|| SubjectError::Format(subject.to_string()))?;
    let start = stripped
        .find(MARKER)
        .ok_or_else(|| SubjectError::Format(subject.to_string()))?;
    let inner = &stripped[start + MARKER.len()..];

    let (_weekday, date_str) = inner
        .split_once(", ")
        .ok_or_else(|| SubjectError::MissingWeekday(inner.to_string()))?;

    NaiveDate::parse_from_str(date_str, DATE_FORMAT).map_err(|source| SubjectError::DateParse {
        fragment: date_str.to_string(),
        source,
    })
}

/// Builds the outbound prompt subject for `day`. [`parse_subject_date`]
/// round-trips every value this produces.
pub fn prompt_subject(day: NaiveDate) -> String {
    format!(
        "It's {}, {}. How are you?",
        day.format("%A"),
        day.format("%b. %-d, %Y")
    )
}
