use std::sync::Arc;

use rsa::RsaPrivateKey;
use serde_json::{Map, Value};

use crate::activation;
use crate::algorithm::SignatureAlgorithm;
use crate::clock::{Clock, SystemClock};
use crate::error::IssueError;
use crate::keys::private_key_from_pem;
use crate::license::LicenseClaims;
use crate::token::{self, TokenHeader};

/// License validity expressed in whole units. The units are summed, so
/// `{ days: 1, hours: -1 }` is 23 hours.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Validity {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Validity {
    pub fn days(days: i64) -> Self {
        Self {
            days,
            ..Self::default()
        }
    }

    pub fn seconds(seconds: i64) -> Self {
        Self {
            seconds,
            ..Self::default()
        }
    }

    /// Total length in seconds, or `None` on overflow.
    pub fn total_seconds(&self) -> Option<i64> {
        let days = self.days.checked_mul(86_400)?;
        let hours = self.hours.checked_mul(3_600)?;
        let minutes = self.minutes.checked_mul(60)?;
        days.checked_add(hours)?
            .checked_add(minutes)?
            .checked_add(self.seconds)
    }

    fn positive_seconds(&self) -> Result<i64, IssueError> {
        match self.total_seconds() {
            Some(secs) if secs > 0 => Ok(secs),
            _ => Err(IssueError::InvalidDuration),
        }
    }
}

/// Everything needed to issue one license.
#[derive(Debug, Clone, PartialEq)]
pub struct IssueRequest {
    pub customer: String,
    /// Activation code, grouped (`XXXX-XXXX-XXXX-XXXX`) or bare.
    pub fingerprint: String,
    pub validity: Validity,
    /// Defaults to the customer name.
    pub subject: Option<String>,
    pub meta: Option<Map<String, Value>>,
}

impl IssueRequest {
    pub fn new(customer: impl Into<String>, fingerprint: impl Into<String>, validity: Validity) -> Self {
        Self {
            customer: customer.into(),
            fingerprint: fingerprint.into(),
            validity,
            subject: None,
            meta: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_meta(mut self, meta: Map<String, Value>) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// Signs license claims with a fixed private key and algorithm.
pub struct LicenseIssuer {
    private_key: RsaPrivateKey,
    algorithm: SignatureAlgorithm,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl LicenseIssuer {
    pub fn new(private_key: RsaPrivateKey, algorithm: SignatureAlgorithm, issuer: impl Into<String>) -> Self {
        Self {
            private_key,
            algorithm,
            issuer: issuer.into(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Build an issuer from PKCS1 or PKCS8 PEM bytes.
    pub fn from_pem(
        private_key_pem: &[u8],
        algorithm: SignatureAlgorithm,
        issuer: impl Into<String>,
    ) -> Result<Self, IssueError> {
        let private_key =
            private_key_from_pem(private_key_pem).map_err(IssueError::MissingOrUnreadablePrivateKey)?;
        Ok(Self::new(private_key, algorithm, issuer))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Validate the request and produce the claims that would be signed.
    pub fn build_claims(&self, request: &IssueRequest) -> Result<LicenseClaims, IssueError> {
        let validity_secs = request.validity.positive_seconds()?;

        let customer = request.customer.trim();
        if customer.is_empty() {
            return Err(IssueError::MissingCustomer);
        }

        if !activation::is_valid_fingerprint_input(&request.fingerprint) {
            return Err(IssueError::InvalidFingerprintFormat(request.fingerprint.clone()));
        }
        let fingerprint = activation::decode(request.fingerprint.trim())
            .map_err(|e| IssueError::InvalidFingerprintFormat(e.to_string()))?;

        let issued_at = self.clock.now().timestamp();
        let expires_at = issued_at
            .checked_add(validity_secs)
            .ok_or(IssueError::InvalidDuration)?;

        Ok(LicenseClaims {
            issuer: self.issuer.clone(),
            subject: request
                .subject
                .clone()
                .unwrap_or_else(|| customer.to_string()),
            customer: customer.to_string(),
            fingerprint,
            issued_at,
            expires_at,
            meta: request.meta.clone(),
        })
    }

    /// Issue a signed compact token for the request.
    pub fn issue(&self, request: &IssueRequest) -> Result<String, IssueError> {
        let claims = self.build_claims(request)?;
        let token = self.sign_claims(&claims)?;
        log::info!(
            "issued {} license for customer {:?} bound to {}.. expiring at {}",
            self.algorithm,
            claims.customer,
            &claims.fingerprint[..4],
            claims.expires_at
        );
        Ok(token)
    }

    /// Sign already-built claims.
    pub fn sign_claims(&self, claims: &LicenseClaims) -> Result<String, IssueError> {
        let payload = serde_json::to_vec(claims)?;
        let header = TokenHeader::for_algorithm(self.algorithm);
        let input = token::signing_input(&header, &payload)?;

        let signature = self
            .algorithm
            .sign(&self.private_key, input.as_bytes())
            .map_err(|e| IssueError::SigningFailure(e.to_string()))?;

        Ok(token::assemble(&input, &signature))
    }
}
