//! Inbound mail extraction: envelope decoding, reply isolation, and the
//! prompt subject line format.

pub mod envelope;
pub mod reply;
pub mod subject;

pub use envelope::{decode_quoted_printable, extract_envelope, EmailEnvelope, ExtractError};
pub use reply::extract_reply;
pub use subject::{parse_subject_date, prompt_subject, SubjectError};

/// Pulls the bare address out of a `Display Name <addr@host>` recipient.
/// A value without an angle-bracket form is returned trimmed, as-is.
pub fn address_part(recipient: &str) -> &str {
    match (recipient.find('<'), recipient.rfind('>')) {
        (Some(start), Some(end)) if start < end => &recipient[start + 1..end],
        _ => recipient.trim(),
    }
}
