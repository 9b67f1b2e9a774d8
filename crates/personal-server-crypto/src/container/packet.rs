//! Packet framing: old and new header formats, including partial body lengths.

use zeroize::Zeroize;

use crate::error::{CryptoError, Result};

pub const TAG_SKESK: u8 = 3;
pub const TAG_ONE_PASS_SIGNATURE: u8 = 4;
pub const TAG_SIGNATURE: u8 = 2;
pub const TAG_COMPRESSED: u8 = 8;
pub const TAG_SED: u8 = 9;
pub const TAG_MARKER: u8 = 10;
pub const TAG_LITERAL: u8 = 11;
pub const TAG_SEIPD: u8 = 18;
pub const TAG_MDC: u8 = 19;

/// A packet with its body fully reassembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub tag: u8,
    pub body: Vec<u8>,
}

impl Zeroize for Packet {
    fn zeroize(&mut self) {
        self.tag = 0;
        self.body.zeroize();
    }
}

fn malformed(msg: &str) -> CryptoError {
    CryptoError::Malformed(msg.to_string())
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn byte(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| malformed("truncated packet header"))?;
        self.pos += 1;
        Ok(b)
    }

    fn be(&mut self, n: usize) -> Result<usize> {
        let mut v = 0usize;
        for _ in 0..n {
            v = (v << 8) | self.byte()? as usize;
        }
        Ok(v)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| malformed("packet body runs past end of input"))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }
}

/// New-format length. Returns `(len, partial)`.
fn new_length(r: &mut Reader<'_>) -> Result<(usize, bool)> {
    let o1 = r.byte()? as usize;
    match o1 {
        0..=191 => Ok((o1, false)),
        192..=223 => {
            let o2 = r.byte()? as usize;
            Ok((((o1 - 192) << 8) + o2 + 192, false))
        }
        255 => Ok((r.be(4)?, false)),
        _ => Ok((1usize << (o1 & 0x1f), true)),
    }
}

fn read_one(r: &mut Reader<'_>) -> Result<Packet> {
    let header = r.byte()?;
    if header & 0x80 == 0 {
        return Err(malformed("packet header bit not set"));
    }

    if header & 0x40 != 0 {
        let tag = header & 0x3f;
        let mut body = Vec::new();
        loop {
            let (len, partial) = new_length(r)?;
            body.extend_from_slice(r.take(len)?);
            if !partial {
                break;
            }
        }
        Ok(Packet { tag, body })
    } else {
        let tag = (header >> 2) & 0x0f;
        let body = match header & 0x03 {
            0 => {
                let len = r.be(1)?;
                r.take(len)?
            }
            1 => {
                let len = r.be(2)?;
                r.take(len)?
            }
            2 => {
                let len = r.be(4)?;
                r.take(len)?
            }
            _ => r.rest(),
        };
        Ok(Packet {
            tag,
            body: body.to_vec(),
        })
    }
}

/// Split a byte stream into packets.
pub fn read_packets(data: &[u8]) -> Result<Vec<Packet>> {
    let mut r = Reader { data, pos: 0 };
    let mut packets = Vec::new();
    while !r.is_empty() {
        packets.push(read_one(&mut r)?);
    }
    Ok(packets)
}

/// Append a new-format packet with a definite length.
pub fn write_packet(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    out.push(0xc0 | (tag & 0x3f));
    let len = body.len();
    if len < 192 {
        out.push(len as u8);
    } else if len < 8384 {
        let v = len - 192;
        out.push(((v >> 8) + 192) as u8);
        out.push((v & 0xff) as u8);
    } else {
        out.push(0xff);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
    out.extend_from_slice(body);
}
