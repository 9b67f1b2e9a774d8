//! ASCII armor for messages.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{CryptoError, Result};

const BEGIN: &str = "-----BEGIN PGP MESSAGE-----";
const END: &str = "-----END PGP MESSAGE-----";

const CRC24_INIT: u32 = 0x00B7_04CE;
const CRC24_POLY: u32 = 0x0186_4CFB;

/// CRC-24 as used by the armor checksum line.
pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for &byte in data {
        crc ^= (byte as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}

/// Whether `data` looks armored (ignoring leading whitespace).
pub fn is_armored(data: &[u8]) -> bool {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    data[start..].starts_with(BEGIN.as_bytes())
}

/// Strip armor and return the binary message.
pub fn dearmor(data: &[u8]) -> Result<Vec<u8>> {
    let text = std::str::from_utf8(data)
        .map_err(|_| CryptoError::Malformed("armored message is not UTF-8".into()))?;
    let mut lines = text.lines().map(str::trim);

    if !lines.by_ref().any(|line| line == BEGIN) {
        return Err(CryptoError::Malformed("missing armor header line".into()));
    }

    let mut body = String::new();
    let mut checksum: Option<&str> = None;
    let mut in_headers = true;
    let mut ended = false;

    for line in lines {
        if line == END {
            ended = true;
            break;
        }
        if in_headers {
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            if line.contains(": ") {
                continue;
            }
            in_headers = false;
        }
        if line.is_empty() {
            continue;
        }
        if let Some(sum) = line.strip_prefix('=') {
            checksum = Some(sum);
            continue;
        }
        body.push_str(line);
    }

    if !ended {
        return Err(CryptoError::Malformed("missing armor tail line".into()));
    }

    let decoded = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| CryptoError::Malformed(format!("armor body is not base64: {}", e)))?;

    if let Some(sum) = checksum {
        let sum_bytes = STANDARD
            .decode(sum)
            .map_err(|_| CryptoError::Malformed("armor checksum is not base64".into()))?;
        if sum_bytes.len() != 3 {
            return Err(CryptoError::Malformed("armor checksum has wrong length".into()));
        }
        let expected =
            (sum_bytes[0] as u32) << 16 | (sum_bytes[1] as u32) << 8 | sum_bytes[2] as u32;
        if crc24(&decoded) != expected {
            return Err(CryptoError::Integrity("armor checksum mismatch".into()));
        }
    }

    Ok(decoded)
}

/// Armor a binary message.
pub fn armor(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 64 + 80);
    out.push_str(BEGIN);
    out.push_str("\n\n");
    for chunk in encoded.as_bytes().chunks(64) {
        // base64 output is ASCII.
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    let crc = crc24(data).to_be_bytes();
    out.push('=');
    out.push_str(&STANDARD.encode(&crc[1..]));
    out.push('\n');
    out.push_str(END);
    out.push('\n');
    out
}
