//! Error types for key derivation and decryption.

use personal_server_core::ErrorKind;
use thiserror::Error;

/// Errors that can occur while deriving keys or decrypting payloads.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The user address is not 40 hex characters.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The wordlist tag names no supported language.
    #[error("unsupported mnemonic language: {0}")]
    UnsupportedLanguage(String),

    /// The master phrase is not a valid mnemonic in the chosen language.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Hierarchical derivation failed.
    #[error("key derivation error: {0}")]
    Derivation(String),

    /// A key had the wrong length or was not on the curve.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Input too short or structurally broken.
    #[error("malformed ciphertext: {0}")]
    Malformed(String),

    /// MAC or MDC mismatch.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Cipher, padding, passphrase or decompression failure.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    Encryption(String),
}

impl CryptoError {
    /// The taxonomy kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::InvalidAddress(_)
            | CryptoError::UnsupportedLanguage(_)
            | CryptoError::InvalidMnemonic(_) => ErrorKind::Validation,
            CryptoError::Integrity(_) => ErrorKind::Integrity,
            CryptoError::Derivation(_)
            | CryptoError::InvalidKey(_)
            | CryptoError::Malformed(_)
            | CryptoError::Decryption(_)
            | CryptoError::Encryption(_) => ErrorKind::Decryption,
        }
    }
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
