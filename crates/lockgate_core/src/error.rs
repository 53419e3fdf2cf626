use thiserror::Error;

/// Failures while loading or producing RSA key material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Unsupported key format")]
    UnsupportedKeyFormat,

    #[error("Key is not an RSA key")]
    NotRsaKey,

    #[error("RSA key too small: {0} bits (minimum 2048)")]
    WeakKey(usize),

    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("PEM error: {0}")]
    Pem(String),
}

/// Failures while decoding an activation code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("Activation code must be 16 base32 characters, got {0}")]
    InvalidFormat(usize),

    #[error("Activation code is not valid base32")]
    InvalidEncoding,
}

#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Validity duration must be positive")]
    InvalidDuration,

    #[error("Invalid fingerprint format: {0}")]
    InvalidFingerprintFormat(String),

    #[error("Customer name is required")]
    MissingCustomer,

    #[error("Missing or unreadable private key: {0}")]
    MissingOrUnreadablePrivateKey(#[source] KeyError),

    #[error("Signing failed: {0}")]
    SigningFailure(String),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}
