//! ECIES key wrapping over secp256k1.
//!
//! Blob layout: `IV(16) || ephemeral_public_key(65) || ciphertext || MAC(32)`.
//!
//! The ECDH x-coordinate is hashed with SHA-512; the first half keys
//! AES-256-CBC, the second half keys HMAC-SHA256 over `IV || ephemeral || ciphertext`.
//! The MAC is always checked before any decryption is attempted.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// IV length.
pub const IV_LEN: usize = 16;
/// Uncompressed SEC1 point length.
pub const EPHEMERAL_KEY_LEN: usize = 65;
/// HMAC-SHA256 tag length.
pub const MAC_LEN: usize = 32;
/// Smallest blob that can be parsed.
pub const MIN_BLOB_LEN: usize = IV_LEN + EPHEMERAL_KEY_LEN + MAC_LEN;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;

/// Encryption and MAC keys derived from an ECDH shared secret.
struct DerivedKeys {
    digest: Zeroizing<[u8; 64]>,
}

impl DerivedKeys {
    fn from_shared_secret(shared_x: &[u8]) -> Self {
        let mut digest = Zeroizing::new([0u8; 64]);
        digest.copy_from_slice(&Sha512::digest(shared_x));
        Self { digest }
    }

    fn enc_key(&self) -> &[u8] {
        &self.digest[..32]
    }

    fn mac_key(&self) -> &[u8] {
        &self.digest[32..]
    }

    fn mac(&self, iv: &[u8], ephemeral: &[u8], ciphertext: &[u8]) -> Result<[u8; MAC_LEN]> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.mac_key())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        mac.update(iv);
        mac.update(ephemeral);
        mac.update(ciphertext);
        Ok(mac.finalize().into_bytes().into())
    }
}

fn shared_keys(secret: &SecretKey, public: &PublicKey) -> DerivedKeys {
    let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    DerivedKeys::from_shared_secret(shared.raw_secret_bytes().as_slice())
}

/// Decode a hex blob, with or without `0x`.
pub fn decode_hex_blob(blob_hex: &str) -> Result<Vec<u8>> {
    let trimmed = blob_hex.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(hex_part).map_err(|e| CryptoError::Malformed(format!("wrapped key is not hex: {}", e)))
}

/// Recover the plaintext wrapped to `private_key`.
pub fn unwrap_key(blob: &[u8], private_key: &[u8; 32]) -> Result<Zeroizing<Vec<u8>>> {
    if blob.len() < MIN_BLOB_LEN {
        return Err(CryptoError::Malformed(format!(
            "blob is {} bytes, need at least {}",
            blob.len(),
            MIN_BLOB_LEN
        )));
    }

    let iv = &blob[..IV_LEN];
    let ephemeral = &blob[IV_LEN..IV_LEN + EPHEMERAL_KEY_LEN];
    let ciphertext = &blob[IV_LEN + EPHEMERAL_KEY_LEN..blob.len() - MAC_LEN];
    let tag = &blob[blob.len() - MAC_LEN..];

    let ephemeral_key = PublicKey::from_sec1_bytes(ephemeral)
        .map_err(|_| CryptoError::Malformed("ephemeral key is not a curve point".into()))?;
    let secret = SecretKey::from_slice(private_key)
        .map_err(|_| CryptoError::InvalidKey("private key out of range".into()))?;

    let keys = shared_keys(&secret, &ephemeral_key);

    let expected = keys.mac(iv, ephemeral, ciphertext)?;
    if !bool::from(expected.as_slice().ct_eq(tag)) {
        return Err(CryptoError::Integrity("MAC verification failed".into()));
    }

    let plaintext = Aes256CbcDec::new_from_slices(keys.enc_key(), iv)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decryption("bad padding".into()))?;

    Ok(Zeroizing::new(plaintext))
}

/// Wrap `plaintext` to an uncompressed or compressed SEC1 public key.
pub fn wrap_key(plaintext: &[u8], recipient_public_key: &[u8]) -> Result<Vec<u8>> {
    let recipient = PublicKey::from_sec1_bytes(recipient_public_key)
        .map_err(|_| CryptoError::InvalidKey("recipient key is not a curve point".into()))?;

    let mut rng = rand::thread_rng();
    let ephemeral_secret = SecretKey::random(&mut rng);
    let ephemeral_point = ephemeral_secret.public_key().to_encoded_point(false);
    let ephemeral = ephemeral_point.as_bytes();

    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut iv);

    let keys = shared_keys(&ephemeral_secret, &recipient);
    let ciphertext = Aes256CbcEnc::new_from_slices(keys.enc_key(), &iv)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    let tag = keys.mac(&iv, ephemeral, &ciphertext)?;

    let mut blob = Vec::with_capacity(MIN_BLOB_LEN + ciphertext.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(ephemeral);
    blob.extend_from_slice(&ciphertext);
    blob.extend_from_slice(&tag);
    Ok(blob)
}
