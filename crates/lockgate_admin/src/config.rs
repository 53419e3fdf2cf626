use std::path::Path;

use anyhow::{Context, Result};
use lockgate_core::SignatureAlgorithm;
use serde::Deserialize;

pub const DEFAULT_PRIVATE_KEY: &str = "private.pem";
pub const DEFAULT_PUBLIC_KEY: &str = "public.pem";
pub const DEFAULT_LICENSE_STORE: &str = "license.lic";
pub const DEFAULT_ISSUER: &str = "lockgate";

/// Optional settings file (`--config config.json`). Command-line flags win
/// over file values, which win over the built-in defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminConfig {
    pub private_key_path: Option<String>,
    pub public_key_path: Option<String>,
    pub license_store_path: Option<String>,
    pub algorithm: Option<SignatureAlgorithm>,
    pub issuer: Option<String>,
}

impl AdminConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn private_key_path(&self, flag: Option<String>) -> String {
        pick(flag, &self.private_key_path, DEFAULT_PRIVATE_KEY)
    }

    pub fn public_key_path(&self, flag: Option<String>) -> String {
        pick(flag, &self.public_key_path, DEFAULT_PUBLIC_KEY)
    }

    pub fn license_store_path(&self, flag: Option<String>) -> String {
        pick(flag, &self.license_store_path, DEFAULT_LICENSE_STORE)
    }

    pub fn issuer(&self, flag: Option<String>) -> String {
        pick(flag, &self.issuer, DEFAULT_ISSUER)
    }

    pub fn algorithm(&self, flag: Option<SignatureAlgorithm>) -> SignatureAlgorithm {
        flag.or(self.algorithm).unwrap_or_default()
    }
}

fn pick(flag: Option<String>, file: &Option<String>, default: &str) -> String {
    flag.or_else(|| file.clone())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = AdminConfig::load(None).unwrap();
        assert_eq!(config.private_key_path(None), DEFAULT_PRIVATE_KEY);
        assert_eq!(config.public_key_path(None), DEFAULT_PUBLIC_KEY);
        assert_eq!(config.license_store_path(None), DEFAULT_LICENSE_STORE);
        assert_eq!(config.issuer(None), DEFAULT_ISSUER);
        assert_eq!(config.algorithm(None), SignatureAlgorithm::Ps256);
    }

    #[test]
    fn test_file_values_and_flag_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"privateKeyPath": "/keys/priv.pem", "publicKeyPath": "/keys/pub.pem", "algorithm": "RS256"}"#,
        )
        .unwrap();

        let config = AdminConfig::load(Some(&path)).unwrap();
        assert_eq!(config.private_key_path(None), "/keys/priv.pem");
        assert_eq!(config.private_key_path(Some("cli.pem".into())), "cli.pem");
        assert_eq!(config.public_key_path(None), "/keys/pub.pem");
        assert_eq!(config.license_store_path(None), DEFAULT_LICENSE_STORE);
        assert_eq!(config.algorithm(None), SignatureAlgorithm::Rs256);
        assert_eq!(
            config.algorithm(Some(SignatureAlgorithm::Ps256)),
            SignatureAlgorithm::Ps256
        );
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"algorithm": "HS256"}"#).unwrap();
        assert!(AdminConfig::load(Some(&path)).is_err());
        assert!(AdminConfig::load(Some(&dir.path().join("missing.json"))).is_err());
    }
}
