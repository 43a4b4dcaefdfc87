use mailparse::body::Body;
use mailparse::{parse_mail, MailHeaderMap, ParsedMail};
use thiserror::Error;

/// Structured view of one inbound message: where it was addressed, what the
/// subject line said, and the decoded plain-text body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailEnvelope {
    pub to: String,
    pub subject: String,
    pub text_body: String,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] mailparse::MailParseError),
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("no text/plain part found")]
    NoPlainTextPart,
    #[error("quoted-printable decode failed at byte {offset}")]
    QuotedPrintableDecode { offset: usize },
    #[error("no To address in message headers or delivery envelope")]
    MissingToAddress,
}

/// Decodes one raw RFC-822 message into an [`EmailEnvelope`].
///
/// `fallback_to` covers deliveries where the routing address only exists in
/// the webhook envelope (an SNS `destination` list, say) and the message
/// itself carries no `To` header.
pub fn extract_envelope(
    raw: &[u8],
    fallback_to: Option<&str>,
) -> Result<EmailEnvelope, ExtractError> {
    let parsed = parse_mail(raw)?;

    let to = parsed
        .headers
        .get_first_value("To")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| {
            fallback_to
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
        .ok_or(ExtractError::MissingToAddress)?;

    let subject = parsed
        .headers
        .get_first_value("Subject")
        .unwrap_or_default();

    let text_body = extract_text_body(&parsed)?;

    Ok(EmailEnvelope {
        to,
        subject,
        text_body,
    })
}

fn extract_text_body(parsed: &ParsedMail<'_>) -> Result<String, ExtractError> {
    match parsed.ctype.mimetype.as_str() {
        "text/plain" => decoded_part_body(parsed),
        "multipart/alternative" => {
            // Clients disagree on part ordering; the last text/plain part wins.
            let mut body = None;
            for part in &parsed.subparts {
                if part.ctype.mimetype.as_str() == "text/plain" {
                    body = Some(decoded_part_body(part)?);
                }
            }
            body.ok_or(ExtractError::NoPlainTextPart)
        }
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

fn decoded_part_body(part: &ParsedMail<'_>) -> Result<String, ExtractError> {
    let encoding = part
        .headers
        .get_first_value("Content-Transfer-Encoding")
        .map(|value| value.trim().to_ascii_lowercase());

    let raw: Vec<u8> = match part.get_body_encoded() {
        Body::Base64(body) | Body::QuotedPrintable(body) => body.get_raw().to_vec(),
        Body::SevenBit(body) | Body::EightBit(body) => body.get_raw().to_vec(),
        Body::Binary(body) => body.get_raw().to_vec(),
    };

    if encoding.as_deref() == Some("quoted-printable") {
        let decoded = decode_quoted_printable(&raw)?;
        return Ok(String::from_utf8_lossy(&decoded).into_owned());
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

/// Strict quoted-printable decode: each `=XY` hex escape (either case)
/// becomes the byte it names, every other byte passes through unchanged. An
/// `=` that is not followed by two hex digits fails the decode.
pub fn decode_quoted_printable(input: &[u8]) -> Result<Vec<u8>, ExtractError> {
    let mut output = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        let byte = input[i];
        if byte != b'=' {
            output.push(byte);
            i += 1;
            continue;
        }
        let high = input.get(i + 1).copied().and_then(hex_value);
        let low = input.get(i + 2).copied().and_then(hex_value);
        match (high, low) {
            (Some(high), Some(low)) => {
                output.push(high << 4 | low);
                i += 3;
            }
            _ => return Err(ExtractError::QuotedPrintableDecode { offset: i }),
        }
    }
    Ok(output)
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_body_is_used_verbatim() {
        let raw = concat!(
            "To: journal@mail.example.com\r\n",
            "Subject: hello\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "Just the body.\r\n",
        );

        let envelope = extract_envelope(raw.as_bytes(), None).expect("extract");
        assert_eq!(envelope.to, "journal@mail.example.com");
        assert_eq!(envelope.subject, "hello");
        assert_eq!(envelope.text_body, "Just the body.\r\n");
    }

    #[test]
    fn multipart_alternative_selects_plain_text_over_html() {
        let raw = concat!(
            "To: journal@mail.example.com\r\n",
            "Subject: reply\r\n",
            "Content-Type: multipart/alternative; boundary=\"sep\"\r\n",
            "\r\n",
            "--sep\r\n",
            "Content-Type: text/plain; charset=\"UTF-8\"\r\n",
            "\r\n",
            "plain wins\r\n",
            "--sep\r\n",
            "Content-Type: text/html; charset=\"UTF-8\"\r\n",
            "\r\n",
            "<p>html loses</p>\r\n",
            "--sep--\r\n",
        );

        let envelope = extract_envelope(raw.as_bytes(), None).expect("extract");
        assert_eq!(envelope.text_body.trim_end(), "plain wins");
        assert!(!envelope.text_body.contains("html"));
    }

    #[test]
    fn multipart_alternative_last_plain_part_wins() {
        let raw = concat!(
            "To: journal@mail.example.com\r\n",
            "Content-Type: multipart/alternative; boundary=\"sep\"\r\n",
            "\r\n",
            "--sep\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "first\r\n",
            "--sep\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "second\r\n",
            "--sep--\r\n",
        );

        let envelope = extract_envelope(raw.as_bytes(), None).expect("extract");
        assert_eq!(envelope.text_body.trim_end(), "second");
    }

    #[test]
    fn multipart_without_plain_part_fails() {
        let raw = concat!(
            "To: journal@mail.example.com\r\n",
            "Content-Type: multipart/alternative; boundary=\"sep\"\r\n",
            "\r\n",
            "--sep\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<p>only html</p>\r\n",
            "--sep--\r\n",
        );

        let err = extract_envelope(raw.as_bytes(), None).expect_err("no plain part");
        assert!(matches!(err, ExtractError::NoPlainTextPart));
    }

    #[test]
    fn unsupported_top_level_content_type_fails() {
        let raw = concat!(
            "To: journal@mail.example.com\r\n",
            "Content-Type: multipart/mixed; boundary=\"sep\"\r\n",
            "\r\n",
            "--sep\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "body\r\n",
            "--sep--\r\n",
        );

        let err = extract_envelope(raw.as_bytes(), None).expect_err("unsupported");
        match err {
            ExtractError::UnsupportedContentType(mimetype) => {
                assert_eq!(mimetype, "multipart/mixed")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn quoted_printable_part_is_decoded() {
        let raw = concat!(
            "To: journal@mail.example.com\r\n",
            "Content-Type: multipart/alternative; boundary=\"sep\"\r\n",
            "\r\n",
            "--sep\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "Caf=C3=A9 time\r\n",
            "--sep--\r\n",
        );

        let envelope = extract_envelope(raw.as_bytes(), None).expect("extract");
        assert_eq!(envelope.text_body.trim_end(), "Caf\u{e9} time");
    }

    #[test]
    fn missing_to_uses_fallback_address() {
        let raw = concat!(
            "Subject: hello\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "body\r\n",
        );

        let envelope =
            extract_envelope(raw.as_bytes(), Some("journal@mail.example.com")).expect("extract");
        assert_eq!(envelope.to, "journal@mail.example.com");
    }

    #[test]
    fn missing_to_without_fallback_fails() {
        let raw = concat!(
            "Subject: hello\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "body\r\n",
        );

        let err = extract_envelope(raw.as_bytes(), None).expect_err("no to");
        assert!(matches!(err, ExtractError::MissingToAddress));

        let err = extract_envelope(raw.as_bytes(), Some("  ")).expect_err("blank fallback");
        assert!(matches!(err, ExtractError::MissingToAddress));
    }

    #[test]
    fn absent_subject_becomes_empty_string() {
        let raw = concat!(
            "To: journal@mail.example.com\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "body\r\n",
        );

        let envelope = extract_envelope(raw.as_bytes(), None).expect("extract");
        assert_eq!(envelope.subject, "");
    }

    #[test]
    fn quoted_printable_round_trips_every_byte_value() {
        let all_bytes: Vec<u8> = (0u8..=255).collect();
        let encoded: String = all_bytes
            .iter()
            .map(|byte| format!("={byte:02X}"))
            .collect();

        let decoded = decode_quoted_printable(encoded.as_bytes()).expect("decode");
        assert_eq!(decoded, all_bytes);
    }

    #[test]
    fn quoted_printable_accepts_lowercase_hex() {
        let decoded = decode_quoted_printable(b"=c3=a9").expect("decode");
        assert_eq!(decoded, vec![0xC3, 0xA9]);
    }

    #[test]
    fn quoted_printable_rejects_malformed_escapes() {
        let err = decode_quoted_printable(b"ok =G1 bad").expect_err("bad hex");
        assert!(matches!(
            err,
            ExtractError::QuotedPrintableDecode { offset: 3 }
        ));

        let err = decode_quoted_printable(b"truncated =").expect_err("truncated");
        assert!(matches!(
            err,
            ExtractError::QuotedPrintableDecode { offset: 10 }
        ));

        let err = decode_quoted_printable(b"short =A").expect_err("one digit");
        assert!(matches!(
            err,
            ExtractError::QuotedPrintableDecode { offset: 7 }
        ));
    }
}
