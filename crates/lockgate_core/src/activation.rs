//! Activation codes: the human-transcribable form of a machine fingerprint.
//!
//! A code is the first 10 bytes (80 bits) of a fingerprint digest, rendered
//! as 16 RFC4648 base32 symbols and grouped `XXXX-XXXX-XXXX-XXXX`.

use data_encoding::BASE32_NOPAD;

use crate::error::CodeError;

/// Number of digest bytes carried by an activation code.
pub const CODE_BYTES: usize = 10;
/// Number of base32 symbols in a code, separators excluded.
pub const CODE_SYMBOLS: usize = 16;

const GROUP_LEN: usize = 4;

/// Encode raw bytes as a grouped activation code.
///
/// Only the first 10 bytes are used; shorter input is zero-padded on the
/// right, so the result always has four groups of four symbols.
pub fn encode(bytes: &[u8]) -> String {
    let mut buf = [0u8; CODE_BYTES];
    let n = bytes.len().min(CODE_BYTES);
    buf[..n].copy_from_slice(&bytes[..n]);

    let symbols = BASE32_NOPAD.encode(&buf);
    group(&symbols)
}

/// Decode an activation code into the lowercase hex form of its 10 bytes.
///
/// Dashes and spaces are ignored and lowercase input is accepted.
pub fn decode(code: &str) -> Result<String, CodeError> {
    let symbols = strip(code);
    if symbols.len() != CODE_SYMBOLS {
        return Err(CodeError::InvalidFormat(symbols.len()));
    }
    let bytes = BASE32_NOPAD
        .decode(symbols.as_bytes())
        .map_err(|_| CodeError::InvalidEncoding)?;
    Ok(hex::encode(bytes))
}

/// Build a code from a hex digest (e.g. a full SHA-256 hex string).
pub fn from_hex(hex_digest: &str) -> Result<String, CodeError> {
    let bytes = hex::decode(hex_digest.trim()).map_err(|_| CodeError::InvalidEncoding)?;
    Ok(encode(&bytes))
}

/// Canonical grouped uppercase form of an accepted code.
pub fn normalize(code: &str) -> Result<String, CodeError> {
    let hex_form = decode(code)?;
    from_hex(&hex_form)
}

/// Whether `candidate` is an acceptable fingerprint input: either four
/// dash-joined groups of four base32 symbols, or 16 bare symbols.
pub fn is_valid_fingerprint_input(candidate: &str) -> bool {
    let upper = candidate.trim().to_ascii_uppercase();

    if upper.len() == CODE_SYMBOLS {
        return upper.bytes().all(is_base32_symbol);
    }

    let groups: Vec<&str> = upper.split('-').collect();
    groups.len() == CODE_SYMBOLS / GROUP_LEN
        && groups
            .iter()
            .all(|g| g.len() == GROUP_LEN && g.bytes().all(is_base32_symbol))
}

fn is_base32_symbol(b: u8) -> bool {
    b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b)
}

fn strip(code: &str) -> String {
    code.chars()
        .filter(|c| *c != '-' && *c != ' ')
        .collect::<String>()
        .to_uppercase()
}

fn group(symbols: &str) -> String {
    symbols
        .as_bytes()
        .chunks(GROUP_LEN)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join("-")
}
