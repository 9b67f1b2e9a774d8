//! Solidity ABI encoding for the handful of types contract views need.
//!
//! Values are encoded as a tuple: static members in the head, dynamic
//! members as offsets into the tail.

use personal_server_core::{keccak256, Address};

use crate::error::{ChainError, Result};

const WORD: usize = 32;

/// A Solidity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiType {
    Uint256,
    Address,
    Bool,
    String,
    Bytes,
    Array(Box<AbiType>),
    Tuple(Vec<AbiType>),
}

impl AbiType {
    /// Whether values of this type live in the tail.
    pub fn is_dynamic(&self) -> bool {
        match self {
            AbiType::String | AbiType::Bytes | AbiType::Array(_) => true,
            AbiType::Tuple(members) => members.iter().any(AbiType::is_dynamic),
            _ => false,
        }
    }

    /// Bytes occupied in a head. Only meaningful for static types.
    fn head_size(&self) -> usize {
        match self {
            AbiType::Tuple(members) if !self.is_dynamic() => {
                members.iter().map(AbiType::head_size).sum()
            }
            _ => WORD,
        }
    }

    /// Canonical name as used in function signatures.
    pub fn canonical(&self) -> String {
        match self {
            AbiType::Uint256 => "uint256".into(),
            AbiType::Address => "address".into(),
            AbiType::Bool => "bool".into(),
            AbiType::String => "string".into(),
            AbiType::Bytes => "bytes".into(),
            AbiType::Array(inner) => format!("{}[]", inner.canonical()),
            AbiType::Tuple(members) => format!(
                "({})",
                members
                    .iter()
                    .map(AbiType::canonical)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }
}

/// A decoded value.
///
/// Integers are limited to 128 bits; larger values fail to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Uint(u128),
    Address(Address),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<AbiValue>),
    Tuple(Vec<AbiValue>),
}

impl AbiValue {
    fn is_dynamic(&self) -> bool {
        match self {
            AbiValue::String(_) | AbiValue::Bytes(_) | AbiValue::Array(_) => true,
            AbiValue::Tuple(members) => members.iter().any(AbiValue::is_dynamic),
            _ => false,
        }
    }

    fn matches(&self, ty: &AbiType) -> bool {
        match (self, ty) {
            (AbiValue::Uint(_), AbiType::Uint256)
            | (AbiValue::Address(_), AbiType::Address)
            | (AbiValue::Bool(_), AbiType::Bool)
            | (AbiValue::String(_), AbiType::String)
            | (AbiValue::Bytes(_), AbiType::Bytes) => true,
            (AbiValue::Array(items), AbiType::Array(inner)) => {
                items.iter().all(|item| item.matches(inner))
            }
            (AbiValue::Tuple(items), AbiType::Tuple(members)) => {
                items.len() == members.len()
                    && items.iter().zip(members).all(|(v, t)| v.matches(t))
            }
            _ => false,
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        match self {
            AbiValue::Uint(n) => u64::try_from(*n)
                .map_err(|_| ChainError::Decode(format!("{} does not fit in u64", n))),
            other => Err(unexpected("uint256", other)),
        }
    }

    pub fn as_address(&self) -> Result<Address> {
        match self {
            AbiValue::Address(a) => Ok(*a),
            other => Err(unexpected("address", other)),
        }
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            AbiValue::Bool(b) => Ok(*b),
            other => Err(unexpected("bool", other)),
        }
    }

    pub fn into_string(self) -> Result<String> {
        match self {
            AbiValue::String(s) => Ok(s),
            other => Err(unexpected("string", &other)),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            AbiValue::Bytes(b) => Ok(b),
            other => Err(unexpected("bytes", &other)),
        }
    }

    pub fn into_array(self) -> Result<Vec<AbiValue>> {
        match self {
            AbiValue::Array(items) => Ok(items),
            other => Err(unexpected("array", &other)),
        }
    }

    pub fn into_tuple(self) -> Result<Vec<AbiValue>> {
        match self {
            AbiValue::Tuple(items) => Ok(items),
            other => Err(unexpected("tuple", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &AbiValue) -> ChainError {
    ChainError::Decode(format!("expected {}, got {:?}", wanted, got))
}

/// A contract function: name plus input and output types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiFunction {
    pub name: &'static str,
    pub inputs: Vec<AbiType>,
    pub outputs: Vec<AbiType>,
}

impl AbiFunction {
    pub fn new(name: &'static str, inputs: Vec<AbiType>, outputs: Vec<AbiType>) -> Self {
        Self {
            name,
            inputs,
            outputs,
        }
    }

    /// Canonical signature, e.g. `files(uint256)`.
    pub fn signature(&self) -> String {
        format!(
            "{}({})",
            self.name,
            self.inputs
                .iter()
                .map(AbiType::canonical)
                .collect::<Vec<_>>()
                .join(",")
        )
    }

    /// First four bytes of the signature's Keccak-256.
    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature().as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// Selector followed by the encoded arguments.
    pub fn encode_call(&self, args: &[AbiValue]) -> Result<Vec<u8>> {
        if args.len() != self.inputs.len() {
            return Err(ChainError::Encode(format!(
                "{} takes {} arguments, got {}",
                self.signature(),
                self.inputs.len(),
                args.len()
            )));
        }
        for (i, (arg, ty)) in args.iter().zip(&self.inputs).enumerate() {
            if !arg.matches(ty) {
                return Err(ChainError::Encode(format!(
                    "argument {} of {} is not a {}",
                    i,
                    self.signature(),
                    ty.canonical()
                )));
            }
        }
        let mut out = self.selector().to_vec();
        out.extend_from_slice(&encode(args));
        Ok(out)
    }

    /// Decode return data against the function's outputs.
    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<AbiValue>> {
        decode(&self.outputs, data)
    }
}

fn uint_word(n: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&n.to_be_bytes());
    word
}

fn padded(data: &[u8]) -> Vec<u8> {
    let mut out = uint_word(data.len() as u128).to_vec();
    out.extend_from_slice(data);
    let rem = data.len() % WORD;
    if rem != 0 {
        out.resize(out.len() + WORD - rem, 0);
    }
    out
}

fn encode_value(value: &AbiValue) -> Vec<u8> {
    match value {
        AbiValue::Uint(n) => uint_word(*n).to_vec(),
        AbiValue::Address(a) => {
            let mut word = [0u8; WORD];
            word[12..].copy_from_slice(a.as_bytes());
            word.to_vec()
        }
        AbiValue::Bool(b) => uint_word(*b as u128).to_vec(),
        AbiValue::String(s) => padded(s.as_bytes()),
        AbiValue::Bytes(b) => padded(b),
        AbiValue::Array(items) => {
            let mut out = uint_word(items.len() as u128).to_vec();
            out.extend_from_slice(&encode(items));
            out
        }
        AbiValue::Tuple(items) => encode(items),
    }
}

/// Encode values as a tuple.
pub fn encode(values: &[AbiValue]) -> Vec<u8> {
    let head_len: usize = values
        .iter()
        .map(|v| {
            if v.is_dynamic() {
                WORD
            } else {
                encode_value(v).len()
            }
        })
        .sum();

    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();
    for value in values {
        let encoded = encode_value(value);
        if value.is_dynamic() {
            head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
            tail.extend_from_slice(&encoded);
        } else {
            head.extend_from_slice(&encoded);
        }
    }
    head.extend_from_slice(&tail);
    head
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8]> {
    offset
        .checked_add(WORD)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| ChainError::Decode(format!("word at {} past end of data", offset)))
}

fn usize_at(data: &[u8], offset: usize) -> Result<usize> {
    let word = word_at(data, offset)?;
    if word[..24].iter().any(|b| *b != 0) {
        return Err(ChainError::Decode("offset or length too large".into()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(buf))
        .map_err(|_| ChainError::Decode("offset or length too large".into()))
}

fn decode_value(ty: &AbiType, data: &[u8]) -> Result<AbiValue> {
    match ty {
        AbiType::Uint256 => {
            let word = word_at(data, 0)?;
            if word[..16].iter().any(|b| *b != 0) {
                return Err(ChainError::Decode("integer exceeds 128 bits".into()));
            }
            let mut buf = [0u8; 16];
            buf.copy_from_slice(&word[16..]);
            Ok(AbiValue::Uint(u128::from_be_bytes(buf)))
        }
        AbiType::Address => {
            let word = word_at(data, 0)?;
            if word[..12].iter().any(|b| *b != 0) {
                return Err(ChainError::Decode("dirty address padding".into()));
            }
            let mut buf = [0u8; 20];
            buf.copy_from_slice(&word[12..]);
            Ok(AbiValue::Address(Address::from_bytes(buf)))
        }
        AbiType::Bool => match usize_at(data, 0)? {
            0 => Ok(AbiValue::Bool(false)),
            1 => Ok(AbiValue::Bool(true)),
            other => Err(ChainError::Decode(format!("invalid bool {}", other))),
        },
        AbiType::Bytes | AbiType::String => {
            let len = usize_at(data, 0)?;
            let bytes = WORD
                .checked_add(len)
                .and_then(|end| data.get(WORD..end))
                .ok_or_else(|| ChainError::Decode("byte string past end of data".into()))?
                .to_vec();
            if *ty == AbiType::String {
                String::from_utf8(bytes)
                    .map(AbiValue::String)
                    .map_err(|_| ChainError::Decode("string is not UTF-8".into()))
            } else {
                Ok(AbiValue::Bytes(bytes))
            }
        }
        AbiType::Array(inner) => {
            let len = usize_at(data, 0)?;
            // Every element takes at least one word.
            if len > data.len() / WORD {
                return Err(ChainError::Decode("array length past end of data".into()));
            }
            let body = &data[WORD..];
            let types = vec![(**inner).clone(); len];
            Ok(AbiValue::Array(decode(&types, body)?))
        }
        AbiType::Tuple(members) => Ok(AbiValue::Tuple(decode(members, data)?)),
    }
}

/// Decode a tuple of `types` from `data`.
pub fn decode(types: &[AbiType], data: &[u8]) -> Result<Vec<AbiValue>> {
    let mut offset = 0;
    let mut out = Vec::with_capacity(types.len());
    for ty in types {
        if ty.is_dynamic() {
            let ptr = usize_at(data, offset)?;
            let tail = data
                .get(ptr..)
                .ok_or_else(|| ChainError::Decode(format!("offset {} past end of data", ptr)))?;
            out.push(decode_value(ty, tail)?);
            offset += WORD;
        } else {
            let head = data
                .get(offset..)
                .ok_or_else(|| ChainError::Decode("head past end of data".into()))?;
            out.push(decode_value(ty, head)?);
            offset += ty.head_size();
        }
    }
    Ok(out)
}
