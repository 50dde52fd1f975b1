//! Token encryption at rest
//!
//! Every OAuth token crosses this boundary on its way to or from the store.
//! Nothing outside this module sees ciphertext internals, and nothing
//! outside the token broker should see plaintext.

use std::io::{Read, Write};

use base64::Engine;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{Result, VaultError};

/// Symmetric encryption service for stored credentials.
///
/// `decrypt(encrypt(x)) == x` is the whole contract. A failed decrypt must
/// surface as an error, never as garbage plaintext that looks like a token.
pub trait CredentialVault: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// Production vault: age passphrase encryption, base64-wrapped so the
/// ciphertext fits a TEXT column.
pub struct AgeVault {
    passphrase: SecretString,
}

impl AgeVault {
    pub fn new(passphrase: String) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(VaultError::PassphraseNotSet.into());
        }
        Ok(Self {
            passphrase: SecretString::from(passphrase),
        })
    }
}

impl CredentialVault for AgeVault {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let encryptor = age::Encryptor::with_user_passphrase(age::secrecy::Secret::new(
            self.passphrase.expose_secret().to_string(),
        ));

        let mut encrypted = vec![];
        let mut writer = encryptor
            .wrap_output(&mut encrypted)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        writer
            .write_all(plaintext.as_bytes())
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        writer
            .finish()
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        Ok(base64::engine::general_purpose::STANDARD.encode(encrypted))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|_| VaultError::DecryptionFailed)?;

        let decryptor = match age::Decryptor::new(raw.as_slice()) {
            Ok(age::Decryptor::Passphrase(d)) => d,
            Ok(_) => return Err(VaultError::DecryptionFailed.into()),
            Err(_) => return Err(VaultError::DecryptionFailed.into()),
        };

        let mut decrypted = vec![];
        let mut reader = decryptor
            .decrypt(
                &age::secrecy::Secret::new(self.passphrase.expose_secret().to_string()),
                None,
            )
            .map_err(|_| VaultError::DecryptionFailed)?;

        reader
            .read_to_end(&mut decrypted)
            .map_err(|_| VaultError::DecryptionFailed)?;

        String::from_utf8(decrypted).map_err(|_| VaultError::DecryptionFailed.into())
    }
}

/// Identity vault for tests: stores tokens as-is.
///
/// Available in all builds so integration tests can wire the engine
/// without key material.
pub struct PassthroughVault;

impl CredentialVault for PassthroughVault {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        Ok(plaintext.to_string())
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        Ok(ciphertext.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyndicateError;

    #[test]
    fn test_roundtrip() {
        let vault = AgeVault::new("correct horse battery staple".to_string()).unwrap();
        let token = "EAABsbCS1iHgBAKZCZBx";

        let ciphertext = vault.encrypt(token).unwrap();
        assert_ne!(ciphertext, token);
        assert_eq!(vault.decrypt(&ciphertext).unwrap(), token);
    }

    #[test]
    fn test_ciphertext_differs_between_calls() {
        // age uses a fresh scrypt salt per encryption
        let vault = AgeVault::new("correct horse battery staple".to_string()).unwrap();
        let a = vault.encrypt("token").unwrap();
        let b = vault.encrypt("token").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_passphrase_fails_closed() {
        let vault = AgeVault::new("passphrase-one".to_string()).unwrap();
        let other = AgeVault::new("passphrase-two".to_string()).unwrap();

        let ciphertext = vault.encrypt("secret-token").unwrap();
        let result = other.decrypt(&ciphertext);

        match result {
            Err(SyndicateError::Vault(VaultError::DecryptionFailed)) => {}
            other => panic!("Expected DecryptionFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_garbage_ciphertext_rejected() {
        let vault = AgeVault::new("correct horse battery staple".to_string()).unwrap();
        assert!(vault.decrypt("not-even-base64!!!").is_err());
        assert!(vault.decrypt("aGVsbG8gd29ybGQ=").is_err());
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        assert!(AgeVault::new(String::new()).is_err());
    }

    #[test]
    fn test_passthrough_is_identity() {
        let vault = PassthroughVault;
        assert_eq!(vault.encrypt("abc").unwrap(), "abc");
        assert_eq!(vault.decrypt("abc").unwrap(), "abc");
    }
}
