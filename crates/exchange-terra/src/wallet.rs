//! Keeper wallet holding the secp256k1 key used to sign rebalance transactions.
//!
//! The key lives in a `SecretString`, is zeroized on drop and never appears in
//! `Debug` output or logs. The account address is configured alongside the key
//! rather than derived from it.

use k256::ecdsa::SigningKey;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Expected length of a hex-encoded private key (without 0x prefix).
const PRIVATE_KEY_HEX_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

pub struct Wallet {
    private_key: SecretString,
    address: String,
    /// Compressed SEC1 public key (33 bytes).
    public_key: Vec<u8>,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    /// Reads the private key from `env_var`.
    ///
    /// # Errors
    ///
    /// Returns an error if the variable is unset or empty, or the key is malformed.
    pub fn from_env(env_var: &str, address: impl Into<String>) -> Result<Self, WalletError> {
        let key_raw =
            std::env::var(env_var).map_err(|_| WalletError::MissingEnvVar(env_var.to_string()))?;
        if key_raw.trim().is_empty() {
            return Err(WalletError::MissingEnvVar(env_var.to_string()));
        }
        Self::from_private_key(key_raw.trim(), address)
    }

    /// # Errors
    ///
    /// Returns an error if the key is not 64 hex characters or not a valid secp256k1 scalar.
    pub fn from_private_key(private_key: &str, address: impl Into<String>) -> Result<Self, WalletError> {
        let key_hex = private_key.strip_prefix("0x").unwrap_or(private_key);
        if key_hex.len() != PRIVATE_KEY_HEX_LEN {
            return Err(WalletError::InvalidPrivateKey(format!(
                "Expected {PRIVATE_KEY_HEX_LEN} hex characters, got {}",
                key_hex.len()
            )));
        }

        let signing_key = Self::parse_key(key_hex)?;
        let public_key = signing_key
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();

        Ok(Self {
            private_key: SecretString::from(key_hex.to_string()),
            address: address.into(),
            public_key,
        })
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Signs `SHA-256(message)` and returns the 64-byte `r || s` signature (low-S).
    ///
    /// # Errors
    ///
    /// Returns an error if the stored key cannot be parsed or signing fails.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; 64], WalletError> {
        let signing_key = Self::parse_key(self.private_key.expose_secret())?;
        let digest = Sha256::digest(message);
        let (signature, _recovery_id) = signing_key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| WalletError::SigningFailed(e.to_string()))?;

        let mut out = [0u8; 64];
        out.copy_from_slice(&signature.to_bytes());
        Ok(out)
    }

    fn parse_key(key_hex: &str) -> Result<SigningKey, WalletError> {
        let key_bytes = hex::decode(key_hex)
            .map_err(|e| WalletError::InvalidPrivateKey(format!("Invalid hex encoding: {e}")))?;
        SigningKey::from_slice(&key_bytes)
            .map_err(|e| WalletError::InvalidPrivateKey(format!("Invalid secp256k1 key: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::signature::Verifier;
    use k256::ecdsa::{Signature, VerifyingKey};

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_debug_hides_key() {
        let wallet = Wallet::from_private_key(TEST_KEY, "terra1keeper").unwrap();
        let debug = format!("{wallet:?}");
        assert!(debug.contains("terra1keeper"));
        assert!(!debug.contains(TEST_KEY));
    }

    #[test]
    fn test_rejects_short_key() {
        let result = Wallet::from_private_key("0xabcd", "terra1keeper");
        assert!(matches!(result, Err(WalletError::InvalidPrivateKey(_))));
    }

    #[test]
    fn test_rejects_non_hex_key() {
        let bad = "zz".repeat(32);
        let result = Wallet::from_private_key(&bad, "terra1keeper");
        assert!(matches!(result, Err(WalletError::InvalidPrivateKey(_))));
    }

    #[test]
    fn test_missing_env_var() {
        let result = Wallet::from_env("NEUTRAL_KEEPER_TEST_UNSET_KEY", "terra1keeper");
        assert!(matches!(result, Err(WalletError::MissingEnvVar(_))));
    }

    #[test]
    fn test_signature_verifies_and_is_deterministic() {
        let wallet = Wallet::from_private_key(&format!("0x{TEST_KEY}"), "terra1keeper").unwrap();
        assert_eq!(wallet.public_key().len(), 33);

        let first = wallet.sign(b"rebalance").unwrap();
        let second = wallet.sign(b"rebalance").unwrap();
        assert_eq!(first, second);

        let verifying_key = VerifyingKey::from_sec1_bytes(wallet.public_key()).unwrap();
        let signature = Signature::from_slice(&first).unwrap();
        assert!(verifying_key.verify(b"rebalance", &signature).is_ok());
    }
}
