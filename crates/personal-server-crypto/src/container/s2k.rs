//! String-to-key specifiers and algorithm identifiers.

use aes::{Aes128, Aes192, Aes256};
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};

/// Cipher block size shared by every supported algorithm.
pub const BLOCK_SIZE: usize = 16;

/// Supported symmetric ciphers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetricAlgorithm {
    Aes128,
    Aes192,
    Aes256,
}

impl SymmetricAlgorithm {
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            7 => Ok(SymmetricAlgorithm::Aes128),
            8 => Ok(SymmetricAlgorithm::Aes192),
            9 => Ok(SymmetricAlgorithm::Aes256),
            other => Err(CryptoError::Decryption(format!(
                "unsupported symmetric algorithm {}",
                other
            ))),
        }
    }

    pub const fn id(&self) -> u8 {
        match self {
            SymmetricAlgorithm::Aes128 => 7,
            SymmetricAlgorithm::Aes192 => 8,
            SymmetricAlgorithm::Aes256 => 9,
        }
    }

    pub const fn key_len(&self) -> usize {
        match self {
            SymmetricAlgorithm::Aes128 => 16,
            SymmetricAlgorithm::Aes192 => 24,
            SymmetricAlgorithm::Aes256 => 32,
        }
    }

    /// CFB with an all-zero IV, in place.
    pub fn cfb_decrypt(&self, key: &[u8], buf: &mut [u8]) -> Result<()> {
        let iv = [0u8; BLOCK_SIZE];
        let bad_key = |_| CryptoError::InvalidKey("session key has wrong length".into());
        match self {
            SymmetricAlgorithm::Aes128 => cfb_mode::Decryptor::<Aes128>::new_from_slices(key, &iv)
                .map_err(bad_key)?
                .decrypt(buf),
            SymmetricAlgorithm::Aes192 => cfb_mode::Decryptor::<Aes192>::new_from_slices(key, &iv)
                .map_err(bad_key)?
                .decrypt(buf),
            SymmetricAlgorithm::Aes256 => cfb_mode::Decryptor::<Aes256>::new_from_slices(key, &iv)
                .map_err(bad_key)?
                .decrypt(buf),
        }
        Ok(())
    }

    /// CFB with an all-zero IV, in place.
    pub fn cfb_encrypt(&self, key: &[u8], buf: &mut [u8]) -> Result<()> {
        let iv = [0u8; BLOCK_SIZE];
        let bad_key = |_| CryptoError::Encryption("session key has wrong length".into());
        match self {
            SymmetricAlgorithm::Aes128 => cfb_mode::Encryptor::<Aes128>::new_from_slices(key, &iv)
                .map_err(bad_key)?
                .encrypt(buf),
            SymmetricAlgorithm::Aes192 => cfb_mode::Encryptor::<Aes192>::new_from_slices(key, &iv)
                .map_err(bad_key)?
                .encrypt(buf),
            SymmetricAlgorithm::Aes256 => cfb_mode::Encryptor::<Aes256>::new_from_slices(key, &iv)
                .map_err(bad_key)?
                .encrypt(buf),
        }
        Ok(())
    }
}

/// Supported S2K hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            2 => Ok(HashAlgorithm::Sha1),
            8 => Ok(HashAlgorithm::Sha256),
            10 => Ok(HashAlgorithm::Sha512),
            other => Err(CryptoError::Decryption(format!(
                "unsupported S2K hash algorithm {}",
                other
            ))),
        }
    }

    pub const fn id(&self) -> u8 {
        match self {
            HashAlgorithm::Sha1 => 2,
            HashAlgorithm::Sha256 => 8,
            HashAlgorithm::Sha512 => 10,
        }
    }
}

/// A parsed string-to-key specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S2k {
    Simple {
        hash: HashAlgorithm,
    },
    Salted {
        hash: HashAlgorithm,
        salt: [u8; 8],
    },
    Iterated {
        hash: HashAlgorithm,
        salt: [u8; 8],
        count: u8,
    },
}

/// Expand the one-byte coded iteration count.
pub const fn decode_count(c: u8) -> usize {
    (16 + (c as usize & 15)) << ((c as usize >> 4) + 6)
}

impl S2k {
    /// Parse a specifier from the front of `data`, returning it and the bytes consumed.
    pub fn parse(data: &[u8]) -> Result<(Self, usize)> {
        let truncated = || CryptoError::Malformed("truncated S2K specifier".into());
        let kind = *data.first().ok_or_else(truncated)?;
        let hash = HashAlgorithm::from_id(*data.get(1).ok_or_else(truncated)?)?;
        let salt = |data: &[u8]| -> Result<[u8; 8]> {
            data.get(2..10)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(truncated)
        };
        match kind {
            0 => Ok((S2k::Simple { hash }, 2)),
            1 => Ok((
                S2k::Salted {
                    hash,
                    salt: salt(data)?,
                },
                10,
            )),
            3 => Ok((
                S2k::Iterated {
                    hash,
                    salt: salt(data)?,
                    count: *data.get(10).ok_or_else(truncated)?,
                },
                11,
            )),
            other => Err(CryptoError::Decryption(format!(
                "unsupported S2K type {}",
                other
            ))),
        }
    }

    /// Serialize the specifier.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            S2k::Simple { hash } => vec![0, hash.id()],
            S2k::Salted { hash, salt } => {
                let mut out = vec![1, hash.id()];
                out.extend_from_slice(salt);
                out
            }
            S2k::Iterated { hash, salt, count } => {
                let mut out = vec![3, hash.id()];
                out.extend_from_slice(salt);
                out.push(*count);
                out
            }
        }
    }

    /// Derive a `key_len`-byte key from `passphrase`.
    pub fn derive_key(&self, passphrase: &[u8], key_len: usize) -> Zeroizing<Vec<u8>> {
        let (hash, salt, count) = match self {
            S2k::Simple { hash } => (*hash, &[][..], None),
            S2k::Salted { hash, salt } => (*hash, &salt[..], None),
            S2k::Iterated { hash, salt, count } => (*hash, &salt[..], Some(decode_count(*count))),
        };

        let mut key = Zeroizing::new(Vec::with_capacity(key_len));
        let mut preload = 0;
        while key.len() < key_len {
            let digest = match hash {
                HashAlgorithm::Sha1 => hash_round::<Sha1>(preload, salt, passphrase, count),
                HashAlgorithm::Sha256 => hash_round::<Sha256>(preload, salt, passphrase, count),
                HashAlgorithm::Sha512 => hash_round::<Sha512>(preload, salt, passphrase, count),
            };
            let take = (key_len - key.len()).min(digest.len());
            key.extend_from_slice(&digest[..take]);
            preload += 1;
        }
        key
    }
}

/// One hash context, preloaded with `preload` zero bytes.
fn hash_round<D: Digest>(
    preload: usize,
    salt: &[u8],
    passphrase: &[u8],
    count: Option<usize>,
) -> Zeroizing<Vec<u8>> {
    let mut hasher = D::new();
    hasher.update(vec![0u8; preload]);

    match count {
        None => {
            hasher.update(salt);
            hasher.update(passphrase);
        }
        Some(count) => {
            let mut block = Zeroizing::new(Vec::with_capacity(salt.len() + passphrase.len()));
            block.extend_from_slice(salt);
            block.extend_from_slice(passphrase);
            if block.is_empty() {
                return Zeroizing::new(hasher.finalize().to_vec());
            }
            let mut remaining = count.max(block.len());
            while remaining > 0 {
                let n = remaining.min(block.len());
                hasher.update(&block[..n]);
                remaining -= n;
            }
        }
    }
    Zeroizing::new(hasher.finalize().to_vec())
}
