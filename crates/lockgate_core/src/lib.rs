//! Machine-bound software licenses.
//!
//! A machine is identified by a SHA-256 fingerprint, shown to users as an
//! activation code (`XXXX-XXXX-XXXX-XXXX`). An administrator issues an
//! RSA-signed compact token binding a customer to that fingerprint for a
//! validity window; the licensed machine verifies the token against the
//! issuer's public key, the clock and its own fingerprint.

pub mod activation;
pub mod algorithm;
pub mod clock;
pub mod error;
pub mod fingerprint;
pub mod issuer;
pub mod keys;
pub mod license;
pub mod token;
pub mod verifier;

pub use algorithm::SignatureAlgorithm;
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{CodeError, IssueError, KeyError};
pub use fingerprint::{generate_fingerprint, local_fingerprint_hex, MachineIdentity};
pub use issuer::{IssueRequest, LicenseIssuer, Validity};
pub use license::{LicenseClaims, LicenseSummary};
pub use verifier::{inspect, verify_with_pem, LicenseStatus, LicenseVerifier, Verification};
