use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use lockgate_core::{
    activation, fingerprint, keys::public_key_from_pem, Clock, KeyError, LicenseStatus,
    LicenseVerifier, SignatureAlgorithm, SystemClock, Verification,
};

/// Client for verifying licenses. Embedded in the licensed application.
pub struct LicenseClient {
    verifier: LicenseVerifier,
}

impl LicenseClient {
    /// Create a new client from a PEM-encoded public key string.
    pub fn new(public_key_pem: &str, algorithm: SignatureAlgorithm) -> Result<Self, KeyError> {
        let public_key = public_key_from_pem(public_key_pem.as_bytes())?;
        Ok(Self {
            verifier: LicenseVerifier::new(public_key, algorithm),
        })
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self {
            verifier: self.verifier.with_clock(clock),
        }
    }

    /// Verify a token against this machine's fingerprint.
    pub fn verify_token(&self, token: &str) -> Verification {
        match local_fingerprint() {
            Some(local) => self.verify_token_for(token, &local),
            None => Verification::failure(LicenseStatus::InternalError),
        }
    }

    /// Verify a token against an explicit hex fingerprint.
    pub fn verify_token_for(&self, token: &str, local_fingerprint: &str) -> Verification {
        let result = self.verifier.verify(token, local_fingerprint);
        if !result.is_valid() {
            log::warn!("license verification failed: {}", result.status());
        }
        result
    }

    /// Verify a license file on disk.
    pub fn verify_file(&self, path: &Path) -> Verification {
        match std::fs::read_to_string(path) {
            Ok(content) => self.verify_token(content.trim()),
            Err(e) => {
                log::warn!("cannot read license file {}: {}", path.display(), e);
                Verification::failure(LicenseStatus::InvalidTokenFormat)
            }
        }
    }

    /// Verify a token and, only if it is valid for this machine, store it at
    /// `store_path` (owner read/write only on Unix).
    pub fn activate(&self, token: &str, store_path: &Path) -> std::io::Result<Verification> {
        let token = token.trim();
        let result = self.verify_token(token);
        if result.is_valid() {
            write_private(store_path, token.as_bytes())?;
            log::info!("license activated and stored at {}", store_path.display());
        }
        Ok(result)
    }

    /// Activation code of the current machine.
    pub fn get_machine_code() -> String {
        fingerprint::generate_fingerprint()
    }
}

/// One-shot verification against this machine; an unusable public key
/// yields `InvalidPublicKey`.
pub fn verify_pem(public_key_pem: &str, token: &str, algorithm: SignatureAlgorithm) -> Verification {
    match local_fingerprint() {
        Some(local) => lockgate_core::verify_with_pem(
            public_key_pem.as_bytes(),
            algorithm,
            token.trim(),
            &local,
            Arc::new(SystemClock),
        ),
        None => Verification::failure(LicenseStatus::InternalError),
    }
}

/// JSON for display: the license summary when claims were recovered,
/// otherwise `{"error": ...}`.
pub fn license_data_json(result: &Verification) -> String {
    let value = match result.claims() {
        Some(claims) => serde_json::to_value(claims.summary())
            .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() })),
        None => serde_json::json!({ "error": result.status().message() }),
    };
    value.to_string()
}

// The code is decoded back to hex the same way an administrator's input is,
// so a codec fault surfaces here rather than as a silent mismatch.
fn local_fingerprint() -> Option<String> {
    let code = fingerprint::generate_fingerprint();
    match activation::decode(&code) {
        Ok(hex) => Some(hex),
        Err(e) => {
            log::warn!("cannot decode local fingerprint: {}", e);
            None
        }
    }
}

fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)
}
