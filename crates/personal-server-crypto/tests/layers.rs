//! Both decryption layers driven together, the way a file is opened.

use personal_server_core::{Address, ErrorKind};
use personal_server_crypto::{
    decode_hex_blob, decrypt_payload, seal_payload, unwrap_key, wrap_key, KeyDeriver,
};
use proptest::prelude::*;

const MNEMONIC: &str = "test test test test test test test test test test test junk";

#[test]
fn test_open_file_for_owner() {
    let deriver = KeyDeriver::new(MNEMONIC, "english").unwrap();
    let owner = Address::parse("0xD8675f2A9C9C2b6fa2a0A4a8C1B3a3bD1c6F0E7a").unwrap();
    let server_keys = deriver.derive(&owner).unwrap();

    // The owner's client picks a passphrase, seals the file and wraps the passphrase.
    let passphrase = b"0x4f1c9d2b7e";
    let container = seal_payload(b"{\"rows\": 3}", passphrase).unwrap();
    let wrapped_hex = format!("0x{}", hex::encode(wrap_key(passphrase, &server_keys.public_key).unwrap()));

    // The server re-derives and opens it.
    let again = deriver.derive(&owner).unwrap();
    let key = unwrap_key(&decode_hex_blob(&wrapped_hex).unwrap(), again.private_key()).unwrap();
    let plain = decrypt_payload(&container, &key).unwrap();
    assert_eq!(plain.as_slice(), b"{\"rows\": 3}");
}

#[test]
fn test_key_for_other_owner_fails_integrity() {
    let deriver = KeyDeriver::new(MNEMONIC, "english").unwrap();
    let alice = deriver.derive(&Address::from_bytes([0xa1; 20])).unwrap();
    let bob = deriver.derive(&Address::from_bytes([0xb0; 20])).unwrap();

    let wrapped = wrap_key(b"passphrase", &alice.public_key).unwrap();
    let err = unwrap_key(&wrapped, bob.private_key()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_wrap_unwrap_roundtrip(plaintext in proptest::collection::vec(any::<u8>(), 0..200)) {
        let deriver = KeyDeriver::new(MNEMONIC, "english").unwrap();
        let keys = deriver.derive(&Address::from_bytes([0x42; 20])).unwrap();
        let blob = wrap_key(&plaintext, &keys.public_key).unwrap();
        let recovered = unwrap_key(&blob, keys.private_key()).unwrap();
        prop_assert_eq!(recovered.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn prop_derivation_deterministic(bytes in proptest::array::uniform20(any::<u8>())) {
        let a = KeyDeriver::new(MNEMONIC, "english").unwrap();
        let b = KeyDeriver::new(MNEMONIC, "english").unwrap();
        let user = Address::from_bytes(bytes);
        let ka = a.derive(&user).unwrap();
        let kb = b.derive(&user).unwrap();
        prop_assert_eq!(ka.private_key(), kb.private_key());
        prop_assert_eq!(ka.address, kb.address);
    }

    #[test]
    fn prop_mac_bit_flip_detected(bit in 0usize..256) {
        let deriver = KeyDeriver::new(MNEMONIC, "english").unwrap();
        let keys = deriver.derive(&Address::from_bytes([0x17; 20])).unwrap();
        let mut blob = wrap_key(b"content key", &keys.public_key).unwrap();
        let mac_start = blob.len() - 32;
        blob[mac_start + bit / 8] ^= 1 << (bit % 8);
        let err = unwrap_key(&blob, keys.private_key()).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::Integrity);
    }
}
