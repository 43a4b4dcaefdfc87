use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

/// Checks HTTP Basic credentials on a webhook delivery. The failure response
/// carries the challenge header the mail providers expect.
pub(super) fn require_basic_auth(
    headers: &HeaderMap,
    username: &str,
    password: &str,
) -> Result<(), Response> {
    if basic_auth_matches(headers, username, password) {
        Ok(())
    } else {
        Err((
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, "Basic realm=\"Restricted\"")],
            "Unauthorized",
        )
            .into_response())
    }
}

fn basic_auth_matches(headers: &HeaderMap, username: &str, password: &str) -> bool {
    let Some(value) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = BASE64_STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    match decoded.split_once(':') {
        Some((user, pass)) => user == username && pass == password,
        None => false,
    }
}
