//! Deterministic per-user key derivation.
//!
//! Every user address maps to a non-hardened child index under the server's
//! master mnemonic. The child key at `m/44'/60'/0'/0/index` is the key the
//! user's files are wrapped to.

use std::fmt;
use std::str::FromStr;

use bip32::{DerivationPath, XPrv};
use bip39::{Language, Mnemonic};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use personal_server_core::crypto::address_of;
use personal_server_core::Address;

use crate::error::{CryptoError, Result};

/// Path prefix for Ethereum-style accounts: purpose 44', coin 60', account 0', external chain.
pub const BASE_DERIVATION_PATH: &str = "m/44'/60'/0'/0";

const NON_HARDENED_RANGE: u32 = 1 << 31;

/// Map a user address to its child index.
///
/// The first four bytes of `SHA256(lowercase "0x"-prefixed address)`, big
/// endian, reduced into the non-hardened range.
pub fn derivation_index(user: &Address) -> u32 {
    let digest = Sha256::digest(user.to_lower_hex().as_bytes());
    let prefix = [digest[0], digest[1], digest[2], digest[3]];
    u32::from_be_bytes(prefix) % NON_HARDENED_RANGE
}

/// Parse a wordlist tag such as `"english"` or `"chinese_simplified"`.
pub fn parse_language(tag: &str) -> Result<Language> {
    let normalized = tag.trim().to_ascii_lowercase().replace('-', "_");
    let language = match normalized.as_str() {
        "english" => Language::English,
        "chinese_simplified" | "simplified_chinese" => Language::SimplifiedChinese,
        "chinese_traditional" | "traditional_chinese" => Language::TraditionalChinese,
        "czech" => Language::Czech,
        "french" => Language::French,
        "italian" => Language::Italian,
        "japanese" => Language::Japanese,
        "korean" => Language::Korean,
        "portuguese" => Language::Portuguese,
        "spanish" => Language::Spanish,
        _ => return Err(CryptoError::UnsupportedLanguage(tag.to_string())),
    };
    Ok(language)
}

/// A user-server keypair.
///
/// Computed on demand, never persisted. The private key is zeroed on drop.
pub struct DerivedKeyMaterial {
    pub derivation_index: u32,
    pub derivation_path: String,
    pub address: Address,
    /// Uncompressed SEC1 public key.
    pub public_key: [u8; 65],
    private_key: Zeroizing<[u8; 32]>,
}

impl DerivedKeyMaterial {
    /// The raw private key scalar.
    pub fn private_key(&self) -> &[u8; 32] {
        &self.private_key
    }
}

impl fmt::Debug for DerivedKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeyMaterial")
            .field("derivation_index", &self.derivation_index)
            .field("derivation_path", &self.derivation_path)
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Derives per-user keys from the server's master mnemonic.
///
/// Built once at startup; holds only the BIP39 seed, never the phrase.
pub struct KeyDeriver {
    seed: Zeroizing<[u8; 64]>,
    language: Language,
}

impl KeyDeriver {
    /// Validate the phrase in `language` and compute its seed.
    pub fn new(mnemonic: &str, language: &str) -> Result<Self> {
        let language = parse_language(language)?;
        let mnemonic = Mnemonic::parse_in(language, mnemonic)
            .map_err(|e| CryptoError::InvalidMnemonic(e.to_string()))?;
        let seed = Zeroizing::new(mnemonic.to_seed(""));
        Ok(Self { seed, language })
    }

    /// The wordlist this deriver was built with.
    pub fn language(&self) -> Language {
        self.language
    }

    /// Derive the keypair for a textual user address.
    pub fn derive_str(&self, user_address: &str) -> Result<DerivedKeyMaterial> {
        let user = Address::from_str(user_address)
            .map_err(|_| CryptoError::InvalidAddress(user_address.to_string()))?;
        self.derive(&user)
    }

    /// Derive the keypair for `user`.
    pub fn derive(&self, user: &Address) -> Result<DerivedKeyMaterial> {
        let index = derivation_index(user);
        let path_str = format!("{}/{}", BASE_DERIVATION_PATH, index);
        let path = DerivationPath::from_str(&path_str)
            .map_err(|e| CryptoError::Derivation(e.to_string()))?;

        let xprv = XPrv::derive_from_path(self.seed.as_slice(), &path)
            .map_err(|e| CryptoError::Derivation(e.to_string()))?;
        let signing_key = xprv.private_key();

        let mut private_key = Zeroizing::new([0u8; 32]);
        private_key.copy_from_slice(&signing_key.to_bytes());

        let verifying_key = signing_key.verifying_key();
        let point = verifying_key.to_encoded_point(false);
        let mut public_key = [0u8; 65];
        public_key.copy_from_slice(point.as_bytes());

        tracing::debug!(index, path = %path_str, "derived user server key");

        Ok(DerivedKeyMaterial {
            derivation_index: index,
            derivation_path: path_str,
            address: address_of(verifying_key),
            public_key,
            private_key,
        })
    }
}

impl fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDeriver")
            .field("language", &self.language)
            .field("seed", &"<redacted>")
            .finish()
    }
}
