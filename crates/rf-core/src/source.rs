//! Source URL decoding.
//!
//! Clients pass the remote media URL base64-encoded so it survives as a single
//! query parameter. Only the scheme prefix is checked here; anything else that
//! is wrong with the URL surfaces when the engine tries to open it.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;

use crate::{Error, Result};

const LENIENT: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_decode_padding_mode(DecodePaddingMode::Indifferent)
    .with_decode_allow_trailing_bits(true);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

/// Decode a base64-encoded source URL and require an `http` prefix.
///
/// Accepts the standard and URL-safe alphabets with or without padding. A
/// space is read back as `+`, which is what an unescaped `+` turns into after
/// form decoding of the query string.
pub fn decode_source_url(encoded: &str) -> Result<String> {
    let normalized: String = encoded
        .trim()
        .chars()
        .map(|c| if c == ' ' { '+' } else { c })
        .collect();

    if normalized.is_empty() {
        return Err(Error::bad_request("Missing url parameter"));
    }

    let engine = if normalized.contains(['-', '_']) {
        &URL_SAFE_LENIENT
    } else {
        &STANDARD_LENIENT
    };

    let bytes = engine
        .decode(normalized.as_bytes())
        .map_err(|e| Error::bad_request(format!("Invalid url encoding: {e}")))?;

    let url = String::from_utf8(bytes)
        .map_err(|_| Error::bad_request("Invalid url encoding: not UTF-8 text"))?;

    if !url.starts_with("http") {
        return Err(Error::bad_request("Invalid URL protocol"));
    }

    Ok(url)
}

/// Encode a URL the way clients are expected to (standard alphabet, padded).
pub fn encode_source_url(url: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(url.as_bytes())
}
