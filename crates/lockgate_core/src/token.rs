//! Compact token layout: `base64url(header).base64url(payload).base64url(signature)`.
//!
//! The signature covers the ASCII bytes `header_b64 + "." + payload_b64`,
//! matching JWS compact serialization.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algorithm::SignatureAlgorithm;

const TOKEN_TYPE: &str = "JWT";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenFormatError {
    #[error("token must have 3 segments, found {0}")]
    SegmentCount(usize),

    #[error("token segment {0} is empty")]
    EmptySegment(usize),

    #[error("token segment {0} is not base64url")]
    InvalidCharacter(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

impl TokenHeader {
    pub fn for_algorithm(algorithm: SignatureAlgorithm) -> Self {
        Self {
            alg: algorithm.as_str().to_string(),
            typ: Some(TOKEN_TYPE.to_string()),
        }
    }
}

/// A token split into its three segments. Nothing in it is trusted until the
/// signature has been checked.
#[derive(Debug, Clone, Copy)]
pub struct CompactToken<'a> {
    header: &'a str,
    payload: &'a str,
    signature: &'a str,
}

impl<'a> CompactToken<'a> {
    pub fn parse(token: &'a str) -> Result<Self, TokenFormatError> {
        let parts: Vec<&str> = token.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(TokenFormatError::SegmentCount(parts.len()));
        }
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                return Err(TokenFormatError::EmptySegment(i));
            }
            if !part.bytes().all(is_base64url) {
                return Err(TokenFormatError::InvalidCharacter(i));
            }
        }
        Ok(Self {
            header: parts[0],
            payload: parts[1],
            signature: parts[2],
        })
    }

    /// The bytes the signature was computed over.
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header, self.payload)
    }

    pub fn signature(&self) -> Option<Vec<u8>> {
        URL_SAFE_NO_PAD.decode(self.signature).ok()
    }

    pub fn header(&self) -> Option<TokenHeader> {
        let bytes = URL_SAFE_NO_PAD.decode(self.header).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn payload(&self) -> Option<Vec<u8>> {
        URL_SAFE_NO_PAD.decode(self.payload).ok()
    }
}

/// Signing input for a header and raw payload bytes.
pub fn signing_input(header: &TokenHeader, payload: &[u8]) -> Result<String, serde_json::Error> {
    let header_json = serde_json::to_vec(header)?;
    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header_json),
        URL_SAFE_NO_PAD.encode(payload)
    ))
}

/// Append the signature segment to a signing input.
pub fn assemble(signing_input: &str, signature: &[u8]) -> String {
    format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(signature))
}

fn is_base64url(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}
