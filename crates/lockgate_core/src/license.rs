use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The payload that gets signed and shipped to the licensed machine.
///
/// Field order is the serialization order, so the JSON produced for signing
/// is always `iss, sub, customer, fingerprint, iat, exp[, meta]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseClaims {
    #[serde(rename = "iss")]
    pub issuer: String,
    #[serde(rename = "sub")]
    pub subject: String,
    pub customer: String,
    /// Hex form of the 10-byte truncated machine digest. Empty means the
    /// license is not bound to a machine.
    pub fingerprint: String,
    /// Unix seconds, UTC.
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Unix seconds, UTC.
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Map<String, Value>>,
}

/// Display subset of the claims handed to embedding applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseSummary {
    pub issuer: String,
    pub customer: String,
    pub fingerprint: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl LicenseClaims {
    /// A license stays valid up to and including its `exp` second.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.expires_at
    }

    pub fn is_bound_to(&self, fingerprint_hex: &str) -> bool {
        self.fingerprint.is_empty() || self.fingerprint == fingerprint_hex
    }

    pub fn issued(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.issued_at, 0)
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }

    pub fn meta_value(&self, key: &str) -> Option<&Value> {
        self.meta.as_ref().and_then(|m| m.get(key))
    }

    pub fn summary(&self) -> LicenseSummary {
        LicenseSummary {
            issuer: self.issuer.clone(),
            customer: self.customer.clone(),
            fingerprint: self.fingerprint.clone(),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }
}
