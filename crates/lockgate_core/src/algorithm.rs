use std::fmt;
use std::str::FromStr;

use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use rsa::{pkcs1v15, pss, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// RSA signature scheme used for both issuing and verifying licenses.
///
/// A deployment picks exactly one. Tokens carrying any other `alg` are
/// rejected by the verifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSASSA-PSS with SHA-256, salt length equal to the digest size.
    #[default]
    #[serde(rename = "PS256")]
    Ps256,
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    #[serde(rename = "RS256")]
    Rs256,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown signature algorithm: {0} (expected PS256 or RS256)")]
pub struct UnknownAlgorithm(pub String);

impl SignatureAlgorithm {
    /// The JWS `alg` header value.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::Ps256 => "PS256",
            SignatureAlgorithm::Rs256 => "RS256",
        }
    }

    pub(crate) fn sign(
        &self,
        private_key: &RsaPrivateKey,
        message: &[u8],
    ) -> Result<Vec<u8>, rsa::signature::Error> {
        match self {
            SignatureAlgorithm::Ps256 => {
                let signing_key = pss::BlindedSigningKey::<Sha256>::new(private_key.clone());
                let mut rng = rand::thread_rng();
                let signature = signing_key.try_sign_with_rng(&mut rng, message)?;
                Ok(signature.to_vec())
            }
            SignatureAlgorithm::Rs256 => {
                let signing_key = pkcs1v15::SigningKey::<Sha256>::new(private_key.clone());
                let signature = signing_key.try_sign(message)?;
                Ok(signature.to_vec())
            }
        }
    }

    /// Returns `true` only if `signature` is a valid signature of `message`.
    /// Malformed signatures and wrong keys are indistinguishable to the caller.
    pub(crate) fn verify(&self, public_key: &RsaPublicKey, message: &[u8], signature: &[u8]) -> bool {
        match self {
            SignatureAlgorithm::Ps256 => {
                let Ok(signature) = pss::Signature::try_from(signature) else {
                    return false;
                };
                pss::VerifyingKey::<Sha256>::new(public_key.clone())
                    .verify(message, &signature)
                    .is_ok()
            }
            SignatureAlgorithm::Rs256 => {
                let Ok(signature) = pkcs1v15::Signature::try_from(signature) else {
                    return false;
                };
                pkcs1v15::VerifyingKey::<Sha256>::new(public_key.clone())
                    .verify(message, &signature)
                    .is_ok()
            }
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PS256" => Ok(SignatureAlgorithm::Ps256),
            "RS256" => Ok(SignatureAlgorithm::Rs256),
            _ => Err(UnknownAlgorithm(s.to_string())),
        }
    }
}
