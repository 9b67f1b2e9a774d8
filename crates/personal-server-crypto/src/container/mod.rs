//! Passphrase-protected message containers.
//!
//! The supported subset of OpenPGP symmetric messages: optional ASCII armor,
//! one or more SKESK v4 packets, and a SEIPD v1 packet whose plaintext ends
//! in a modification detection code. The decrypted packet stream may be
//! compressed and must contain a literal data packet.

pub mod armor;
pub mod packet;
pub mod s2k;

use std::io::Read;

use flate2::read::{DeflateDecoder, ZlibDecoder, ZlibEncoder};
use flate2::Compression;
use rand::RngCore;
use sha1::{Digest, Sha1};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::{CryptoError, Result};
use packet::{read_packets, write_packet, Packet};
use s2k::{decode_count, HashAlgorithm, S2k, SymmetricAlgorithm, BLOCK_SIZE};

/// Upper bound on decompressed plaintext.
pub const MAX_DECOMPRESSED_BYTES: u64 = 256 * 1024 * 1024;

/// Most session key packets a container may carry.
pub const MAX_SESSION_KEY_PACKETS: usize = 4;

/// Highest accepted coded S2K count. `0xe0` is 16 MiB of hashing per key.
pub const MAX_S2K_COUNT: u8 = 0xe0;

const MDC_HEADER: [u8; 2] = [0xc0 | packet::TAG_MDC, 0x14];
const MDC_LEN: usize = 22;
const SEAL_S2K_COUNT: u8 = 0x60;

/// Work bounds applied before any passphrase hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerLimits {
    pub max_session_packets: usize,
    /// Coded count byte; see [`decode_count`].
    pub max_s2k_count: u8,
}

impl Default for ContainerLimits {
    fn default() -> Self {
        Self {
            max_session_packets: MAX_SESSION_KEY_PACKETS,
            max_s2k_count: MAX_S2K_COUNT,
        }
    }
}

/// A parsed SKESK v4 packet.
struct SessionKeyPacket {
    algorithm: SymmetricAlgorithm,
    s2k: S2k,
    encrypted_key: Vec<u8>,
}

impl SessionKeyPacket {
    fn parse(body: &[u8], limits: &ContainerLimits) -> Result<Self> {
        match body.first() {
            Some(4) => {}
            Some(v) => {
                return Err(CryptoError::Decryption(format!(
                    "unsupported session key packet version {}",
                    v
                )))
            }
            None => return Err(CryptoError::Malformed("empty session key packet".into())),
        }
        let algorithm = SymmetricAlgorithm::from_id(
            *body
                .get(1)
                .ok_or_else(|| CryptoError::Malformed("truncated session key packet".into()))?,
        )?;
        let (s2k, used) = S2k::parse(&body[2..])?;
        if let S2k::Iterated { count, .. } = s2k {
            if count > limits.max_s2k_count {
                return Err(CryptoError::Decryption(format!(
                    "S2K count {} exceeds limit {}",
                    decode_count(count),
                    decode_count(limits.max_s2k_count)
                )));
            }
        }
        Ok(Self {
            algorithm,
            s2k,
            encrypted_key: body[2 + used..].to_vec(),
        })
    }

    /// The session algorithm and key this packet yields for `passphrase`.
    fn session_key(&self, passphrase: &[u8]) -> Result<(SymmetricAlgorithm, Zeroizing<Vec<u8>>)> {
        let kek = self.s2k.derive_key(passphrase, self.algorithm.key_len());
        if self.encrypted_key.is_empty() {
            return Ok((self.algorithm, kek));
        }

        let mut decrypted = Zeroizing::new(self.encrypted_key.clone());
        self.algorithm.cfb_decrypt(&kek, &mut decrypted)?;
        // A wrong passphrase usually surfaces here as a nonsense algorithm byte.
        let algorithm = SymmetricAlgorithm::from_id(decrypted[0])
            .map_err(|_| CryptoError::Decryption("wrong passphrase".into()))?;
        if decrypted.len() - 1 != algorithm.key_len() {
            return Err(CryptoError::Decryption("wrong passphrase".into()));
        }
        Ok((algorithm, Zeroizing::new(decrypted[1..].to_vec())))
    }
}

/// Decrypt a SEIPD v1 body. `Ok(None)` means the quick check failed.
fn open_seipd(
    body: &[u8],
    algorithm: SymmetricAlgorithm,
    key: &[u8],
) -> Result<Option<Zeroizing<Vec<u8>>>> {
    match body.first() {
        Some(1) => {}
        _ => return Err(CryptoError::Decryption("unsupported SEIPD version".into())),
    }
    let ciphertext = &body[1..];
    if ciphertext.len() < BLOCK_SIZE + 2 + MDC_LEN {
        return Err(CryptoError::Malformed("encrypted data packet too short".into()));
    }

    let mut plain = Zeroizing::new(ciphertext.to_vec());
    algorithm.cfb_decrypt(key, &mut plain)?;

    if plain[BLOCK_SIZE - 2..BLOCK_SIZE] != plain[BLOCK_SIZE..BLOCK_SIZE + 2] {
        return Ok(None);
    }

    let mdc_start = plain.len() - MDC_LEN;
    if plain[mdc_start..mdc_start + 2] != MDC_HEADER {
        return Err(CryptoError::Integrity("modification detection code missing".into()));
    }
    let expected = Sha1::digest(&plain[..mdc_start + 2]);
    if !bool::from(expected.as_slice().ct_eq(&plain[mdc_start + 2..])) {
        return Err(CryptoError::Integrity(
            "modification detection code mismatch".into(),
        ));
    }

    Ok(Some(Zeroizing::new(
        plain[BLOCK_SIZE + 2..mdc_start].to_vec(),
    )))
}

fn decompress(body: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let (algorithm, data) = body
        .split_first()
        .ok_or_else(|| CryptoError::Malformed("empty compressed packet".into()))?;

    let mut out = Zeroizing::new(Vec::new());
    let limit = MAX_DECOMPRESSED_BYTES + 1;
    let read = match algorithm {
        0 => {
            out.extend_from_slice(data);
            Ok(data.len())
        }
        1 => DeflateDecoder::new(data).take(limit).read_to_end(&mut out),
        2 => ZlibDecoder::new(data).take(limit).read_to_end(&mut out),
        other => {
            return Err(CryptoError::Decryption(format!(
                "unsupported compression algorithm {}",
                other
            )))
        }
    };
    read.map_err(|e| CryptoError::Decryption(format!("decompression failed: {}", e)))?;

    if out.len() as u64 > MAX_DECOMPRESSED_BYTES {
        return Err(CryptoError::Decryption("decompressed payload too large".into()));
    }
    Ok(out)
}

/// Find the literal data inside a decrypted packet stream.
fn literal_data(stream: &[u8], depth: u8) -> Result<Zeroizing<Vec<u8>>> {
    let packets = Zeroizing::new(read_packets(stream)?);
    for Packet { tag, body } in packets.iter() {
        match *tag {
            packet::TAG_LITERAL => return parse_literal(body),
            packet::TAG_COMPRESSED if depth == 0 => {
                let inner = decompress(body)?;
                return literal_data(&inner, depth + 1);
            }
            packet::TAG_ONE_PASS_SIGNATURE | packet::TAG_SIGNATURE | packet::TAG_MARKER => {}
            other => {
                return Err(CryptoError::Decryption(format!(
                    "unexpected packet {} in message",
                    other
                )))
            }
        }
    }
    Err(CryptoError::Decryption("message has no literal data".into()))
}

fn parse_literal(body: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let name_len = *body
        .get(1)
        .ok_or_else(|| CryptoError::Malformed("truncated literal packet".into()))? as usize;
    let start = 2 + name_len + 4;
    if body.len() < start {
        return Err(CryptoError::Malformed("truncated literal packet".into()));
    }
    Ok(Zeroizing::new(body[start..].to_vec()))
}

/// Decrypt a container with `passphrase` under the default [`ContainerLimits`].
///
/// A wrong passphrase yields [`CryptoError::Decryption`]; a tampered message
/// yields [`CryptoError::Integrity`]. No plaintext is returned on any error.
pub fn decrypt_payload(container: &[u8], passphrase: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    decrypt_payload_with(container, passphrase, &ContainerLimits::default())
}

/// Decrypt a container with `passphrase`.
///
/// Containers with more session key packets or a higher S2K count than
/// `limits` allows are rejected as [`CryptoError::Decryption`] before any
/// key is derived.
pub fn decrypt_payload_with(
    container: &[u8],
    passphrase: &[u8],
    limits: &ContainerLimits,
) -> Result<Zeroizing<Vec<u8>>> {
    let binary;
    let data = if armor::is_armored(container) {
        binary = armor::dearmor(container)?;
        &binary[..]
    } else {
        container
    };

    let packets = read_packets(data)?;

    let mut session_packets = Vec::new();
    let mut encrypted = None;
    for pkt in &packets {
        match pkt.tag {
            packet::TAG_SKESK => {
                if session_packets.len() == limits.max_session_packets {
                    return Err(CryptoError::Decryption(format!(
                        "more than {} session key packets",
                        limits.max_session_packets
                    )));
                }
                session_packets.push(SessionKeyPacket::parse(&pkt.body, limits)?);
            }
            packet::TAG_SEIPD => encrypted = Some(&pkt.body),
            packet::TAG_SED => {
                return Err(CryptoError::Decryption(
                    "encrypted data without integrity protection is not accepted".into(),
                ))
            }
            packet::TAG_MARKER => {}
            other => {
                return Err(CryptoError::Decryption(format!(
                    "unexpected packet {} in container",
                    other
                )))
            }
        }
    }

    let encrypted = encrypted
        .ok_or_else(|| CryptoError::Decryption("container has no encrypted data".into()))?;
    if session_packets.is_empty() {
        return Err(CryptoError::Decryption(
            "container has no passphrase session key".into(),
        ));
    }

    for session in &session_packets {
        let (algorithm, key) = match session.session_key(passphrase) {
            Ok(found) => found,
            Err(CryptoError::Decryption(_)) => continue,
            Err(e) => return Err(e),
        };
        if let Some(plain) = open_seipd(encrypted, algorithm, &key)? {
            return literal_data(&plain, 0);
        }
    }

    Err(CryptoError::Decryption("wrong passphrase".into()))
}

/// Encrypt `plaintext` under `passphrase`.
///
/// AES-256, iterated and salted SHA-256 S2K, ZLIB compression, binary output.
pub fn seal_payload(plaintext: &[u8], passphrase: &[u8]) -> Result<Vec<u8>> {
    let mut rng = rand::thread_rng();
    let algorithm = SymmetricAlgorithm::Aes256;

    let mut salt = [0u8; 8];
    rng.fill_bytes(&mut salt);
    let s2k = S2k::Iterated {
        hash: HashAlgorithm::Sha256,
        salt,
        count: SEAL_S2K_COUNT,
    };
    let key = s2k.derive_key(passphrase, algorithm.key_len());

    let mut literal = Zeroizing::new(Vec::with_capacity(plaintext.len() + 6));
    literal.extend_from_slice(&[b'b', 0, 0, 0, 0, 0]);
    literal.extend_from_slice(plaintext);
    let mut literal_packet = Zeroizing::new(Vec::new());
    write_packet(&mut literal_packet, packet::TAG_LITERAL, &literal);

    let mut compressed = Zeroizing::new(vec![2u8]);
    ZlibEncoder::new(&literal_packet[..], Compression::default())
        .read_to_end(&mut compressed)
        .map_err(|e| CryptoError::Encryption(format!("compression failed: {}", e)))?;
    let mut compressed_packet = Zeroizing::new(Vec::new());
    write_packet(&mut compressed_packet, packet::TAG_COMPRESSED, &compressed);

    let mut prefix = [0u8; BLOCK_SIZE];
    rng.fill_bytes(&mut prefix);

    let mut body = Vec::with_capacity(BLOCK_SIZE + 2 + compressed_packet.len() + MDC_LEN);
    body.extend_from_slice(&prefix);
    body.extend_from_slice(&prefix[BLOCK_SIZE - 2..]);
    body.extend_from_slice(&compressed_packet);
    body.extend_from_slice(&MDC_HEADER);
    let mdc = Sha1::digest(&body);
    body.extend_from_slice(&mdc);

    algorithm.cfb_encrypt(&key, &mut body)?;

    let mut skesk = vec![4u8, algorithm.id()];
    skesk.extend_from_slice(&s2k.to_bytes());

    let mut seipd = Vec::with_capacity(body.len() + 1);
    seipd.push(1);
    seipd.extend_from_slice(&body);

    let mut out = Vec::new();
    write_packet(&mut out, packet::TAG_SKESK, &skesk);
    write_packet(&mut out, packet::TAG_SEIPD, &seipd);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use std::io::Write;

    const PASSPHRASE: &[u8] = b"0x5c3b6e2e0f0a1b2c3d4e5f60718293a4";

    #[test]
    fn test_seal_and_decrypt() {
        let plaintext = br#"{"messages": ["hello", "world"]}"#;
        let sealed = seal_payload(plaintext, PASSPHRASE).unwrap();
        let opened = decrypt_payload(&sealed, PASSPHRASE).unwrap();
        assert_eq!(opened.as_slice(), plaintext);
    }

    #[test]
    fn test_armored_container() {
        let sealed = seal_payload(b"armored", PASSPHRASE).unwrap();
        let armored = armor::armor(&sealed);
        let opened = decrypt_payload(armored.as_bytes(), PASSPHRASE).unwrap();
        assert_eq!(opened.as_slice(), b"armored");
    }

    #[test]
    fn test_wrong_passphrase_is_decryption_error() {
        let sealed = seal_payload(b"secret", PASSPHRASE).unwrap();
        let err = decrypt_payload(&sealed, b"not the passphrase").unwrap_err();
        assert!(matches!(err, CryptoError::Decryption(_)), "{:?}", err);
    }

    #[test]
    fn test_tampered_body_never_returns_plaintext() {
        let sealed = seal_payload(&[0x41; 4096], PASSPHRASE).unwrap();
        // Flip a bit near the end, inside the encrypted data.
        let mut tampered = sealed.clone();
        let idx = tampered.len() - 30;
        tampered[idx] ^= 0x01;
        let err = decrypt_payload(&tampered, PASSPHRASE).unwrap_err();
        assert!(matches!(err, CryptoError::Integrity(_)), "{:?}", err);
    }

    #[test]
    fn test_sed_packet_rejected() {
        let mut data = Vec::new();
        write_packet(&mut data, packet::TAG_SED, &[0u8; 40]);
        assert!(matches!(
            decrypt_payload(&data, PASSPHRASE),
            Err(CryptoError::Decryption(_))
        ));
    }

    fn session_packet(count: u8) -> Vec<u8> {
        let mut skesk = vec![4u8, SymmetricAlgorithm::Aes256.id()];
        skesk.extend_from_slice(
            &S2k::Iterated {
                hash: HashAlgorithm::Sha256,
                salt: [7; 8],
                count,
            }
            .to_bytes(),
        );
        let mut out = Vec::new();
        write_packet(&mut out, packet::TAG_SKESK, &skesk);
        out
    }

    #[test]
    fn test_session_packet_count_is_bounded() {
        let sealed = seal_payload(b"bounded", PASSPHRASE).unwrap();

        // Three decoys plus the real packet is still accepted.
        let mut within = Vec::new();
        for _ in 0..3 {
            within.extend_from_slice(&session_packet(0x10));
        }
        within.extend_from_slice(&sealed);
        assert_eq!(decrypt_payload(&within, PASSPHRASE).unwrap().as_slice(), b"bounded");

        let mut flooded = Vec::new();
        for _ in 0..16 {
            flooded.extend_from_slice(&session_packet(0x10));
        }
        flooded.extend_from_slice(&sealed);
        let err = decrypt_payload(&flooded, PASSPHRASE).unwrap_err();
        assert!(matches!(err, CryptoError::Decryption(ref m) if m.contains("session key packets")), "{:?}", err);
    }

    #[test]
    fn test_s2k_count_over_ceiling_rejected() {
        let sealed = seal_payload(b"costly", PASSPHRASE).unwrap();
        let mut hostile = session_packet(0xff);
        hostile.extend_from_slice(&sealed);

        let started = std::time::Instant::now();
        let err = decrypt_payload(&hostile, PASSPHRASE).unwrap_err();
        assert!(matches!(err, CryptoError::Decryption(ref m) if m.contains("S2K count")), "{:?}", err);
        // Rejected before any hashing.
        assert!(started.elapsed() < std::time::Duration::from_millis(500));

        let strict = ContainerLimits {
            max_s2k_count: SEAL_S2K_COUNT - 1,
            ..ContainerLimits::default()
        };
        assert!(matches!(
            decrypt_payload_with(&sealed, PASSPHRASE, &strict),
            Err(CryptoError::Decryption(_))
        ));
        let exact = ContainerLimits {
            max_s2k_count: SEAL_S2K_COUNT,
            ..ContainerLimits::default()
        };
        assert_eq!(
            decrypt_payload_with(&sealed, PASSPHRASE, &exact).unwrap().as_slice(),
            b"costly"
        );
    }

    /// Build a message by hand: salted SHA-1 S2K, AES-128, ZIP compression,
    /// encrypted session key, old-format literal packet.
    #[test]
    fn test_alternate_algorithms() {
        let mut rng = rand::thread_rng();
        let kek_s2k = S2k::Salted {
            hash: HashAlgorithm::Sha1,
            salt: [9; 8],
        };
        let kek = kek_s2k.derive_key(PASSPHRASE, 16);

        let session_alg = SymmetricAlgorithm::Aes192;
        let mut session_key = vec![0u8; session_alg.key_len()];
        rng.fill_bytes(&mut session_key);

        let mut esk = vec![session_alg.id()];
        esk.extend_from_slice(&session_key);
        SymmetricAlgorithm::Aes128.cfb_encrypt(&kek, &mut esk).unwrap();

        let mut skesk = vec![4u8, SymmetricAlgorithm::Aes128.id()];
        skesk.extend_from_slice(&kek_s2k.to_bytes());
        skesk.extend_from_slice(&esk);

        let mut literal_packet = vec![0x80 | (packet::TAG_LITERAL << 2), 10, b't', 1, b'x', 0, 0, 0, 0];
        literal_packet.extend_from_slice(b"abc");
        let mut deflated = vec![1u8];
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(&literal_packet).unwrap();
        deflated.extend_from_slice(&enc.finish().unwrap());
        let mut compressed_packet = Vec::new();
        write_packet(&mut compressed_packet, packet::TAG_COMPRESSED, &deflated);

        let prefix = [3u8; BLOCK_SIZE];
        let mut body = prefix.to_vec();
        body.extend_from_slice(&prefix[BLOCK_SIZE - 2..]);
        body.extend_from_slice(&compressed_packet);
        body.extend_from_slice(&MDC_HEADER);
        let mdc = Sha1::digest(&body);
        body.extend_from_slice(&mdc);
        session_alg.cfb_encrypt(&session_key, &mut body).unwrap();

        let mut seipd = vec![1u8];
        seipd.extend_from_slice(&body);

        let mut message = Vec::new();
        write_packet(&mut message, packet::TAG_SKESK, &skesk);
        write_packet(&mut message, packet::TAG_SEIPD, &seipd);

        assert_eq!(decrypt_payload(&message, PASSPHRASE).unwrap().as_slice(), b"abc");
        assert!(decrypt_payload(&message, b"wrong").is_err());
    }
}
