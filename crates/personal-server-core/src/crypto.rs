//! Cryptographic primitives for request authentication.
//!
//! Wraps secp256k1 recoverable signatures over personal-message hashes with
//! strong types.

use std::fmt;

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use crate::address::{keccak256, Address};
use crate::error::{CoreError, Result};

/// Prefix applied to personal messages before hashing.
pub const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n";

/// Hash a payload the way wallets do for `personal_sign`.
pub fn personal_message_hash(payload: &[u8]) -> [u8; 32] {
    let mut data = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 20 + payload.len());
    data.extend_from_slice(PERSONAL_MESSAGE_PREFIX);
    data.extend_from_slice(payload.len().to_string().as_bytes());
    data.extend_from_slice(payload);
    keccak256(&data)
}

/// A 65-byte recoverable signature: `r || s || v`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature(pub [u8; 65]);

impl RecoverableSignature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// Parse from hex (with or without `0x`).
    pub fn from_hex(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(hex_part)
            .map_err(|e| CoreError::InvalidSignature(format!("not hex: {}", e)))?;
        let arr: [u8; 65] = bytes.try_into().map_err(|b: Vec<u8>| {
            CoreError::InvalidSignature(format!("expected 65 bytes, got {}", b.len()))
        })?;
        Ok(Self(arr))
    }

    /// Convert to `0x`-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// The recovery id, accepting both `{0,1}` and `{27,28}` encodings.
    fn recovery_id(&self) -> Result<RecoveryId> {
        let v = match self.0[64] {
            v @ (0 | 1) => v,
            v @ (27 | 28) => v - 27,
            other => {
                return Err(CoreError::InvalidSignature(format!(
                    "invalid recovery byte {}",
                    other
                )))
            }
        };
        RecoveryId::from_byte(v)
            .ok_or_else(|| CoreError::InvalidSignature(format!("invalid recovery byte {}", v)))
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature({}...)", &self.to_hex()[..18])
    }
}

/// Recover the signer's address from a personal-message signature over `payload`.
pub fn recover_address(payload: &[u8], signature: &RecoverableSignature) -> Result<Address> {
    let prehash = personal_message_hash(payload);
    let mut recovery_id = signature.recovery_id()?;

    let mut sig = Signature::from_slice(&signature.0[..64])
        .map_err(|e| CoreError::InvalidSignature(e.to_string()))?;

    // Wallets may emit high-s signatures; recovery requires the normalized form.
    if let Some(normalized) = sig.normalize_s() {
        sig = normalized;
        recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
    }

    let verifying_key = VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id)
        .map_err(|_| CoreError::RecoveryFailed)?;

    Ok(address_of(&verifying_key))
}

/// Address of a secp256k1 verifying key.
pub fn address_of(verifying_key: &VerifyingKey) -> Address {
    let point = verifying_key.to_encoded_point(false);
    let mut uncompressed = [0u8; 65];
    uncompressed.copy_from_slice(point.as_bytes());
    Address::from_uncompressed_public_key(&uncompressed)
}

/// A secp256k1 keypair for signing requests.
///
/// Used by requesting applications and tests; the server itself only recovers.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::random(&mut rng),
        }
    }

    /// Create from a 32-byte secret.
    pub fn from_secret(secret: &[u8; 32]) -> Result<Self> {
        let signing_key = SigningKey::from_slice(secret)
            .map_err(|e| CoreError::InvalidSignature(format!("invalid secret key: {}", e)))?;
        Ok(Self { signing_key })
    }

    /// The signer's address.
    pub fn address(&self) -> Address {
        address_of(self.signing_key.verifying_key())
    }

    /// Uncompressed SEC1 public key (65 bytes).
    pub fn public_key(&self) -> [u8; 65] {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let mut out = [0u8; 65];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Sign a payload as a personal message.
    pub fn sign_message(&self, payload: &[u8]) -> Result<RecoverableSignature> {
        let prehash = personal_message_hash(payload);
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&prehash)
            .map_err(|e| CoreError::InvalidSignature(e.to_string()))?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = 27 + recovery_id.to_byte();
        Ok(RecoverableSignature(out))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({})", self.address())
    }
}
