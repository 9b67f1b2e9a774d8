//! # Personal Server Crypto
//!
//! Key derivation and the two layers of file decryption.
//!
//! ## Layers
//!
//! 1. **Key unwrap**: each file's symmetric key is ECIES-wrapped to the
//!    server key derived for the file's owner ([`unwrap_key`]).
//! 2. **Payload decrypt**: the file itself is a passphrase-protected
//!    container whose passphrase is the unwrapped key ([`decrypt_payload`]).
//!
//! Both layers are pure functions of their explicit inputs. Key material is
//! returned in [`zeroize::Zeroizing`] buffers.

pub mod container;
pub mod derivation;
pub mod ecies;
pub mod error;

pub use container::{
    armor::armor, decrypt_payload, decrypt_payload_with, seal_payload, ContainerLimits,
};
pub use derivation::{derivation_index, parse_language, DerivedKeyMaterial, KeyDeriver};
pub use ecies::{decode_hex_blob, unwrap_key, wrap_key};
pub use error::{CryptoError, Result};
