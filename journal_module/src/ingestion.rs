use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

use crate::mail::{
    address_part, extract_envelope, extract_reply, parse_subject_date, ExtractError, SubjectError,
};
use crate::store::{EntryStore, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("entry store rejected the write: {0}")]
    Store(#[from] StoreError),
}

/// What happened to one inbound message.
#[derive(Debug)]
pub enum IngestOutcome {
    Stored { day: NaiveDate },
    Discarded(DiscardReason),
}

/// Deliberate no-op classifications. None of these is an error to the
/// delivering mail provider; the webhook still answers 200.
#[derive(Debug)]
pub enum DiscardReason {
    MissingToAddress,
    ToAddressMismatch { found: String },
    SubjectFormat(SubjectError),
}

/// Turns one raw inbound message into a journal entry, or classifies why it
/// was dropped. There is no retry path: a malformed message is dropped, and
/// the sender is a person who will simply reply again.
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    required_to: String,
    entries: EntryStore,
}

impl IngestionPipeline {
    pub fn new(required_to: impl Into<String>, entries: EntryStore) -> Self {
        Self {
            required_to: required_to.into(),
            entries,
        }
    }

    pub fn process(
        &self,
        raw: &[u8],
        fallback_to: Option<&str>,
    ) -> Result<IngestOutcome, IngestError> {
        let envelope = match extract_envelope(raw, fallback_to) {
            Ok(envelope) => envelope,
            Err(ExtractError::MissingToAddress) => {
                warn!(
                    "dropping message with no To address (fallback={:?})",
                    fallback_to
                );
                return Ok(IngestOutcome::Discarded(DiscardReason::MissingToAddress));
            }
            Err(err) => return Err(err.into()),
        };

        let to_address = address_part(&envelope.to).to_string();
        if to_address != self.required_to {
            warn!(
                "dropping message addressed to {:?} (required {:?})",
                to_address, self.required_to
            );
            return Ok(IngestOutcome::Discarded(DiscardReason::ToAddressMismatch {
                found: to_address,
            }));
        }

        let day = match parse_subject_date(&envelope.subject) {
            Ok(day) => day,
            Err(err) => {
                warn!(
                    "dropping message with unusable subject {:?}: {}",
                    envelope.subject, err
                );
                return Ok(IngestOutcome::Discarded(DiscardReason::SubjectFormat(err)));
            }
        };

        let reply = extract_reply(&envelope.text_body, &to_address);
        self.entries.upsert_entry(day, &reply)?;
        info!("stored journal entry for {} ({} bytes)", day, reply.len());
        Ok(IngestOutcome::Stored { day })
    }
}
