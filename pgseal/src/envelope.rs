//! Storage envelope for non-text attribute values.
//!
//! Text values are encrypted verbatim. Every other non-null value is
//! serialized into a tagged binary envelope and escaped as PostgreSQL bytea
//! hex text (`\x...`) before encryption, so integers, floats and composite
//! values survive the trip through a text column with their type intact.
//!
//! Reading goes the other way, and falls back to the raw decrypted text when
//! it is not an envelope: plain strings were never wrapped.

use crate::error::Error;
use crate::value::Value;
use std::collections::BTreeMap;
use tracing::trace;

/// Leading bytes of every envelope.
pub const MAGIC: &[u8; 3] = b"PGS";

/// Envelope format version.
pub const ENVELOPE_VERSION: u8 = 1;

/// Maximum nesting depth accepted when decoding.
pub const MAX_DEPTH: usize = 64;

const BYTEA_HEX_PREFIX: &str = "\\x";

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_TEXT: u8 = 0x04;
const TAG_LIST: u8 = 0x05;
const TAG_MAP: u8 = 0x06;

/// Returns the form a value is encrypted in, or `None` for null.
///
/// # Errors
///
/// Returns `Error::InvalidEnvelope` if a string or collection is too long
/// for a 32-bit length prefix.
///
/// # Example
///
/// ```
/// use pgseal::envelope::to_storage;
/// use pgseal::value::Value;
///
/// assert_eq!(to_storage(&Value::from("hello")).unwrap().as_deref(), Some("hello"));
/// assert_eq!(to_storage(&Value::Null).unwrap(), None);
/// assert!(to_storage(&Value::from(42)).unwrap().unwrap().starts_with("\\x"));
/// ```
pub fn to_storage(value: &Value) -> Result<Option<String>, Error> {
    match value {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s.clone())),
        other => Ok(Some(escape_bytea(&encode(other)?))),
    }
}

/// Recovers a value from its decrypted storage form.
///
/// Anything that does not parse as an envelope is returned as text.
#[must_use]
pub fn from_storage(text: String) -> Value {
    match unescape_bytea(&text).and_then(|bytes| decode(&bytes)) {
        Ok(value) => value,
        Err(e) => {
            trace!(reason = %e, "decrypted value is not an envelope, using raw text");
            Value::Text(text)
        }
    }
}

/// Escapes bytes as PostgreSQL bytea hex text.
#[must_use]
pub fn escape_bytea(bytes: &[u8]) -> String {
    format!("{BYTEA_HEX_PREFIX}{}", hex::encode(bytes))
}

/// Reverses [`escape_bytea`].
///
/// # Errors
///
/// Returns `Error::InvalidEnvelope` if the prefix is missing or the hex is malformed.
pub fn unescape_bytea(text: &str) -> Result<Vec<u8>, Error> {
    let digits = text
        .strip_prefix(BYTEA_HEX_PREFIX)
        .ok_or_else(|| Error::InvalidEnvelope("Missing bytea hex prefix".to_string()))?;
    hex::decode(digits).map_err(|e| Error::InvalidEnvelope(format!("Invalid bytea hex: {e}")))
}

/// Serializes a value into an envelope.
///
/// Format:
/// ```text
/// [magic:3][version:1][value]
/// value := [tag:1][payload]
///   bool    -> [0|1:1]
///   integer -> [i64 big-endian:8]
///   float   -> [f64 bits big-endian:8]
///   text    -> [len:4][utf8:len]
///   list    -> [count:4][value]*count
///   map     -> [count:4]([key_len:4][key:key_len][value])*count
/// ```
///
/// # Errors
///
/// Returns `Error::InvalidEnvelope` if a length does not fit in 32 bits.
pub fn encode(value: &Value) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::with_capacity(16);
    bytes.extend_from_slice(MAGIC);
    bytes.push(ENVELOPE_VERSION);
    write_value(&mut bytes, value)?;
    Ok(bytes)
}

/// Parses an envelope produced by [`encode`].
///
/// # Errors
///
/// Returns error if:
/// - The magic bytes are missing
/// - The version is not supported
/// - The data is truncated, malformed or too deeply nested
/// - Bytes remain after the value
pub fn decode(data: &[u8]) -> Result<Value, Error> {
    let mut reader = Reader { data, pos: 0 };

    if reader.take(MAGIC.len())? != MAGIC {
        return Err(Error::InvalidEnvelope("Missing envelope magic".to_string()));
    }

    let version = reader.u8()?;
    if version != ENVELOPE_VERSION {
        return Err(Error::UnsupportedVersion {
            version,
            supported: ENVELOPE_VERSION.to_string(),
        });
    }

    let value = reader.value(0)?;
    if reader.pos != data.len() {
        return Err(Error::InvalidEnvelope(format!(
            "{} trailing bytes after value",
            data.len() - reader.pos
        )));
    }
    Ok(value)
}

fn write_len(bytes: &mut Vec<u8>, len: usize) -> Result<(), Error> {
    let len = u32::try_from(len)
        .map_err(|_| Error::InvalidEnvelope(format!("Length too large: {len} (max: {})", u32::MAX)))?;
    bytes.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

fn write_value(bytes: &mut Vec<u8>, value: &Value) -> Result<(), Error> {
    match value {
        Value::Null => bytes.push(TAG_NULL),
        Value::Bool(b) => {
            bytes.push(TAG_BOOL);
            bytes.push(u8::from(*b));
        }
        Value::Integer(i) => {
            bytes.push(TAG_INTEGER);
            bytes.extend_from_slice(&i.to_be_bytes());
        }
        Value::Float(f) => {
            bytes.push(TAG_FLOAT);
            bytes.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        Value::Text(s) => {
            bytes.push(TAG_TEXT);
            write_len(bytes, s.len())?;
            bytes.extend_from_slice(s.as_bytes());
        }
        Value::List(items) => {
            bytes.push(TAG_LIST);
            write_len(bytes, items.len())?;
            for item in items {
                write_value(bytes, item)?;
            }
        }
        Value::Map(entries) => {
            bytes.push(TAG_MAP);
            write_len(bytes, entries.len())?;
            for (key, item) in entries {
                write_len(bytes, key.len())?;
                bytes.extend_from_slice(key.as_bytes());
                write_value(bytes, item)?;
            }
        }
    }
    Ok(())
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| Error::InvalidEnvelope("Envelope truncated".to_string()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u32(&mut self) -> Result<usize, Error> {
        Ok(u32::from_be_bytes(self.array()?) as usize)
    }

    fn string(&mut self) -> Result<String, Error> {
        let len = self.u32()?;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| Error::InvalidEnvelope(format!("Invalid UTF-8: {e}")))
    }

    fn value(&mut self, depth: usize) -> Result<Value, Error> {
        if depth > MAX_DEPTH {
            return Err(Error::InvalidEnvelope(format!("Nesting deeper than {MAX_DEPTH}")));
        }

        match self.u8()? {
            TAG_NULL => Ok(Value::Null),
            TAG_BOOL => match self.u8()? {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                other => Err(Error::InvalidEnvelope(format!("Invalid bool byte: {other}"))),
            },
            TAG_INTEGER => Ok(Value::Integer(i64::from_be_bytes(self.array()?))),
            TAG_FLOAT => Ok(Value::Float(f64::from_bits(u64::from_be_bytes(self.array()?)))),
            TAG_TEXT => Ok(Value::Text(self.string()?)),
            TAG_LIST => {
                let count = self.u32()?;
                // each item takes at least one byte
                let mut items = Vec::with_capacity(count.min(self.data.len() - self.pos));
                for _ in 0..count {
                    items.push(self.value(depth + 1)?);
                }
                Ok(Value::List(items))
            }
            TAG_MAP => {
                let count = self.u32()?;
                let mut entries = BTreeMap::new();
                for _ in 0..count {
                    let key = self.string()?;
                    let item = self.value(depth + 1)?;
                    entries.insert(key, item);
                }
                Ok(Value::Map(entries))
            }
            other => Err(Error::InvalidEnvelope(format!("Unknown value tag: {other:#04x}"))),
        }
    }
}
