use std::fmt;
use std::sync::Arc;

use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};

use crate::algorithm::SignatureAlgorithm;
use crate::clock::{Clock, SystemClock};
use crate::keys::public_key_from_pem;
use crate::license::LicenseClaims;
use crate::token::CompactToken;

/// Outcome kind of a license verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LicenseStatus {
    Success,
    InvalidPublicKey,
    InvalidTokenFormat,
    InvalidSignature,
    MalformedClaims,
    LicenseExpired,
    FingerprintMismatch,
    InternalError,
}

impl LicenseStatus {
    /// Stable numeric code for shared-library callers.
    ///
    /// Codes 0 to 5 keep the legacy library's numbering (2 was its single
    /// "invalid license" kind); the finer signature and claims failures
    /// take 6 and 7.
    pub fn code(&self) -> i32 {
        match self {
            LicenseStatus::Success => 0,
            LicenseStatus::InvalidPublicKey => 1,
            LicenseStatus::InvalidTokenFormat => 2,
            LicenseStatus::LicenseExpired => 3,
            LicenseStatus::FingerprintMismatch => 4,
            LicenseStatus::InternalError => 5,
            LicenseStatus::InvalidSignature => 6,
            LicenseStatus::MalformedClaims => 7,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => LicenseStatus::Success,
            1 => LicenseStatus::InvalidPublicKey,
            2 => LicenseStatus::InvalidTokenFormat,
            3 => LicenseStatus::LicenseExpired,
            4 => LicenseStatus::FingerprintMismatch,
            5 => LicenseStatus::InternalError,
            6 => LicenseStatus::InvalidSignature,
            7 => LicenseStatus::MalformedClaims,
            _ => return None,
        })
    }

    pub fn message(&self) -> &'static str {
        match self {
            LicenseStatus::Success => "license is valid",
            LicenseStatus::InvalidPublicKey => "invalid public key",
            LicenseStatus::InvalidTokenFormat => "invalid license format",
            LicenseStatus::InvalidSignature => "invalid license signature",
            LicenseStatus::MalformedClaims => "malformed license claims",
            LicenseStatus::LicenseExpired => "license expired",
            LicenseStatus::FingerprintMismatch => "fingerprint mismatch",
            LicenseStatus::InternalError => "internal error",
        }
    }
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of verifying one token.
///
/// Claims are only present once the signature has been verified: for
/// `Success`, `LicenseExpired` and `FingerprintMismatch`.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    status: LicenseStatus,
    claims: Option<LicenseClaims>,
}

impl Verification {
    fn untrusted(status: LicenseStatus) -> Self {
        Self {
            status,
            claims: None,
        }
    }

    fn trusted(status: LicenseStatus, claims: LicenseClaims) -> Self {
        Self {
            status,
            claims: Some(claims),
        }
    }

    /// A failure decided outside the verifier, such as an unreadable key or
    /// local fingerprint.
    pub fn failure(status: LicenseStatus) -> Self {
        debug_assert!(status != LicenseStatus::Success);
        Self::untrusted(status)
    }

    pub fn status(&self) -> LicenseStatus {
        self.status
    }

    pub fn claims(&self) -> Option<&LicenseClaims> {
        self.claims.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.status == LicenseStatus::Success
    }
}

/// Checks tokens against one public key and algorithm.
pub struct LicenseVerifier {
    public_key: RsaPublicKey,
    algorithm: SignatureAlgorithm,
    clock: Arc<dyn Clock>,
}

impl LicenseVerifier {
    pub fn new(public_key: RsaPublicKey, algorithm: SignatureAlgorithm) -> Self {
        Self {
            public_key,
            algorithm,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    /// Verify `token` and check that it is bound to `local_fingerprint`
    /// (20-character hex form).
    ///
    /// The signature is checked before anything in the payload is read.
    pub fn verify(&self, token: &str, local_fingerprint: &str) -> Verification {
        let compact = match CompactToken::parse(token) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("rejecting license: {}", e);
                return Verification::untrusted(LicenseStatus::InvalidTokenFormat);
            }
        };

        if !self.signature_is_valid(&compact) {
            log::debug!("rejecting license: signature check failed");
            return Verification::untrusted(LicenseStatus::InvalidSignature);
        }

        let claims: LicenseClaims = match compact
            .payload()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        {
            Some(c) => c,
            None => return Verification::untrusted(LicenseStatus::MalformedClaims),
        };

        if claims.is_expired_at(self.clock.now()) {
            return Verification::trusted(LicenseStatus::LicenseExpired, claims);
        }

        if !claims.is_bound_to(local_fingerprint) {
            return Verification::trusted(LicenseStatus::FingerprintMismatch, claims);
        }

        Verification::trusted(LicenseStatus::Success, claims)
    }

    // Header algorithm and signature must both match the configured
    // algorithm; every failure looks the same to the caller.
    fn signature_is_valid(&self, compact: &CompactToken<'_>) -> bool {
        let Some(signature) = compact.signature() else {
            return false;
        };
        if !self
            .algorithm
            .verify(&self.public_key, compact.signing_input().as_bytes(), &signature)
        {
            return false;
        }
        matches!(compact.header(), Some(h) if h.alg == self.algorithm.as_str())
    }
}

/// One-shot verification with a PEM public key. A key that cannot be loaded
/// yields `InvalidPublicKey`.
pub fn verify_with_pem(
    public_key_pem: &[u8],
    algorithm: SignatureAlgorithm,
    token: &str,
    local_fingerprint: &str,
    clock: Arc<dyn Clock>,
) -> Verification {
    match public_key_from_pem(public_key_pem) {
        Ok(key) => LicenseVerifier::new(key, algorithm)
            .with_clock(clock)
            .verify(token, local_fingerprint),
        Err(e) => {
            log::warn!("cannot load public key: {}", e);
            Verification::failure(LicenseStatus::InvalidPublicKey)
        }
    }
}

/// Decode the claims of a token without verifying it. For display only.
pub fn inspect(token: &str) -> Option<LicenseClaims> {
    let compact = CompactToken::parse(token).ok()?;
    serde_json::from_slice(&compact.payload()?).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::issuer::{IssueRequest, LicenseIssuer, Validity};
    use crate::keys::{generate_keypair, public_key_to_pem, test_keypair, KeyEncoding};
    use crate::token;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    const CODE: &str = "MZXW-6YTB-OIAA-AAAA";
    const LOCAL_HEX: &str = "666f6f62617200000000";
    const T0: i64 = 1_700_000_000;

    fn clock_at(secs: i64) -> Arc<dyn Clock> {
        Arc::new(FixedClock::at_timestamp(secs).unwrap())
    }

    fn issue_token(algorithm: SignatureAlgorithm, validity: Validity) -> String {
        let (private, _) = test_keypair();
        LicenseIssuer::new(private.clone(), algorithm, "lockgate")
            .with_clock(clock_at(T0))
            .issue(&IssueRequest::new("Test Corp", CODE, validity))
            .unwrap()
    }

    fn verifier_at(algorithm: SignatureAlgorithm, secs: i64) -> LicenseVerifier {
        let (_, public) = test_keypair();
        LicenseVerifier::new(public.clone(), algorithm).with_clock(clock_at(secs))
    }

    #[test]
    fn test_issue_then_verify_succeeds() {
        for alg in [SignatureAlgorithm::Ps256, SignatureAlgorithm::Rs256] {
            let token = issue_token(alg, Validity::days(30));
            let result = verifier_at(alg, T0 + 60).verify(&token, LOCAL_HEX);
            assert_eq!(result.status(), LicenseStatus::Success);
            assert!(result.is_valid());
            let claims = result.claims().unwrap();
            assert_eq!(claims.customer, "Test Corp");
            assert_eq!(claims.fingerprint, LOCAL_HEX);
        }
    }

    #[test]
    fn test_expired_license_keeps_claims() {
        let token = issue_token(SignatureAlgorithm::Ps256, Validity::seconds(60));
        let result = verifier_at(SignatureAlgorithm::Ps256, T0 + 61).verify(&token, LOCAL_HEX);
        assert_eq!(result.status(), LicenseStatus::LicenseExpired);
        let claims = result.claims().unwrap();
        assert_eq!(claims.customer, "Test Corp");
        assert_eq!(claims.issuer, "lockgate");
        assert_eq!(claims.expires_at, T0 + 60);

        let at_boundary = verifier_at(SignatureAlgorithm::Ps256, T0 + 60).verify(&token, LOCAL_HEX);
        assert!(at_boundary.is_valid());
    }

    #[test]
    fn test_expiry_checked_before_fingerprint() {
        let token = issue_token(SignatureAlgorithm::Ps256, Validity::seconds(60));
        let result = verifier_at(SignatureAlgorithm::Ps256, T0 + 3600).verify(&token, "ffffffffffffffffffff");
        assert_eq!(result.status(), LicenseStatus::LicenseExpired);
    }

    #[test]
    fn test_fingerprint_mismatch_keeps_claims() {
        let token = issue_token(SignatureAlgorithm::Ps256, Validity::days(1));
        let result = verifier_at(SignatureAlgorithm::Ps256, T0).verify(&token, "ffffffffffffffffffff");
        assert_eq!(result.status(), LicenseStatus::FingerprintMismatch);
        assert_eq!(result.claims().unwrap().customer, "Test Corp");
    }

    #[test]
    fn test_unbound_license_accepts_any_machine() {
        let (private, _) = test_keypair();
        let issuer = LicenseIssuer::new(private.clone(), SignatureAlgorithm::Ps256, "lockgate");
        let claims = LicenseClaims {
            issuer: "lockgate".to_string(),
            subject: "Any".to_string(),
            customer: "Any".to_string(),
            fingerprint: String::new(),
            issued_at: T0,
            expires_at: T0 + 10,
            meta: None,
        };
        let token = issuer.sign_claims(&claims).unwrap();
        let result = verifier_at(SignatureAlgorithm::Ps256, T0).verify(&token, "0123456789abcdef0123");
        assert!(result.is_valid());
    }

    #[test]
    fn test_mutated_signature_is_rejected() {
        let token = issue_token(SignatureAlgorithm::Ps256, Validity::days(1));
        let verifier = verifier_at(SignatureAlgorithm::Ps256, T0);
        let sig_start = token.rfind('.').unwrap() + 1;

        for pos in [sig_start, sig_start + 10, token.len() - 1] {
            let mut bytes = token.clone().into_bytes();
            bytes[pos] = if bytes[pos] == b'A' { b'B' } else { b'A' };
            let mutated = String::from_utf8(bytes).unwrap();
            let result = verifier.verify(&mutated, LOCAL_HEX);
            assert_eq!(result.status(), LicenseStatus::InvalidSignature);
            assert!(result.claims().is_none());
        }
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let token = issue_token(SignatureAlgorithm::Rs256, Validity::days(1));
        let parts: Vec<&str> = token.split('.').collect();
        let payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
        let forged = String::from_utf8(payload)
            .unwrap()
            .replace("Test Corp", "Evil Corp");
        let forged_token = format!("{}.{}.{}", parts[0], URL_SAFE_NO_PAD.encode(forged), parts[2]);

        let result = verifier_at(SignatureAlgorithm::Rs256, T0).verify(&forged_token, LOCAL_HEX);
        assert_eq!(result.status(), LicenseStatus::InvalidSignature);
        assert!(result.claims().is_none());
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let token = issue_token(SignatureAlgorithm::Ps256, Validity::days(1));
        let (_, other_public) = generate_keypair(2048).unwrap();
        let result = LicenseVerifier::new(other_public, SignatureAlgorithm::Ps256)
            .with_clock(clock_at(T0))
            .verify(&token, LOCAL_HEX);
        assert_eq!(result.status(), LicenseStatus::InvalidSignature);
    }

    #[test]
    fn test_algorithm_mismatch_fails_closed() {
        let pss_token = issue_token(SignatureAlgorithm::Ps256, Validity::days(1));
        let result = verifier_at(SignatureAlgorithm::Rs256, T0).verify(&pss_token, LOCAL_HEX);
        assert_eq!(result.status(), LicenseStatus::InvalidSignature);

        let pkcs_token = issue_token(SignatureAlgorithm::Rs256, Validity::days(1));
        let result = verifier_at(SignatureAlgorithm::Ps256, T0).verify(&pkcs_token, LOCAL_HEX);
        assert_eq!(result.status(), LicenseStatus::InvalidSignature);
    }

    #[test]
    fn test_header_alg_must_match_configuration() {
        // A genuine RS256 signature under a header claiming PS256.
        let (private, _) = test_keypair();
        let header = token::TokenHeader {
            alg: "PS256".to_string(),
            typ: None,
        };
        let input = token::signing_input(&header, br#"{"iss":"x"}"#).unwrap();
        let sig = SignatureAlgorithm::Rs256.sign(private, input.as_bytes()).unwrap();
        let forged = token::assemble(&input, &sig);

        let result = verifier_at(SignatureAlgorithm::Rs256, T0).verify(&forged, LOCAL_HEX);
        assert_eq!(result.status(), LicenseStatus::InvalidSignature);
    }

    #[test]
    fn test_malformed_token_structure() {
        let verifier = verifier_at(SignatureAlgorithm::Ps256, T0);
        for token in ["", "abc", "a.b", "a.b.c.d", "a..c", "a.b.c d"] {
            let result = verifier.verify(token, LOCAL_HEX);
            assert_eq!(result.status(), LicenseStatus::InvalidTokenFormat, "{token:?}");
            assert!(result.claims().is_none());
        }
    }

    #[test]
    fn test_signed_garbage_payload_is_malformed_claims() {
        let (private, _) = test_keypair();
        let header = token::TokenHeader::for_algorithm(SignatureAlgorithm::Ps256);
        let input = token::signing_input(&header, b"[1, 2, 3]").unwrap();
        let sig = SignatureAlgorithm::Ps256.sign(private, input.as_bytes()).unwrap();
        let signed = token::assemble(&input, &sig);

        let result = verifier_at(SignatureAlgorithm::Ps256, T0).verify(&signed, LOCAL_HEX);
        assert_eq!(result.status(), LicenseStatus::MalformedClaims);
        assert!(result.claims().is_none());
    }

    #[test]
    fn test_verify_with_pem() {
        let (_, public) = test_keypair();
        let token = issue_token(SignatureAlgorithm::Ps256, Validity::days(1));
        let pem = public_key_to_pem(public, KeyEncoding::Pkcs1).unwrap();

        let ok = verify_with_pem(pem.as_bytes(), SignatureAlgorithm::Ps256, &token, LOCAL_HEX, clock_at(T0));
        assert!(ok.is_valid());

        let bad = verify_with_pem(b"nope", SignatureAlgorithm::Ps256, &token, LOCAL_HEX, clock_at(T0));
        assert_eq!(bad.status(), LicenseStatus::InvalidPublicKey);
        assert!(bad.claims().is_none());
    }

    #[test]
    fn test_inspect_reads_claims_without_key() {
        let token = issue_token(SignatureAlgorithm::Ps256, Validity::days(1));
        let claims = inspect(&token).unwrap();
        assert_eq!(claims.customer, "Test Corp");
        assert!(inspect("a.b.c").is_none());
    }

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(LicenseStatus::Success.code(), 0);
        assert_eq!(LicenseStatus::InvalidTokenFormat.code(), 2);
        assert_eq!(LicenseStatus::LicenseExpired.code(), 3);
        assert_eq!(LicenseStatus::FingerprintMismatch.code(), 4);
        assert_eq!(LicenseStatus::InternalError.code(), 5);
        assert_eq!(LicenseStatus::InvalidSignature.code(), 6);
        for code in 0..8 {
            assert_eq!(LicenseStatus::from_code(code).unwrap().code(), code);
        }
        assert!(LicenseStatus::from_code(8).is_none());
        assert_eq!(LicenseStatus::LicenseExpired.to_string(), "license expired");
    }

    #[test]
    fn test_verifier_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LicenseVerifier>();
        assert_send_sync::<LicenseIssuer>();

        let token = issue_token(SignatureAlgorithm::Ps256, Validity::days(1));
        let verifier = Arc::new(verifier_at(SignatureAlgorithm::Ps256, T0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let verifier = Arc::clone(&verifier);
                let token = token.clone();
                std::thread::spawn(move || verifier.verify(&token, LOCAL_HEX).status())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), LicenseStatus::Success);
        }
    }
}
