// ABOUTME: Minimal NDN TLV codec: variable-length numbers, non-negative integers, and element reads.
// ABOUTME: Shared by Name, Data, and command parameter encoding so every wire form uses one reader.

use thiserror::Error;

/// TLV type numbers used by ndnrepo.
pub mod types {
    pub const IMPLICIT_SHA256_DIGEST_COMPONENT: u64 = 1;
    pub const INTEREST: u64 = 5;
    pub const DATA: u64 = 6;
    pub const NAME: u64 = 7;
    pub const GENERIC_NAME_COMPONENT: u64 = 8;
    pub const META_INFO: u64 = 20;
    pub const CONTENT: u64 = 21;
    pub const SIGNATURE_INFO: u64 = 22;
    pub const SIGNATURE_VALUE: u64 = 23;
    pub const CONTENT_TYPE: u64 = 24;
    pub const FRESHNESS_PERIOD: u64 = 25;
    pub const SIGNATURE_TYPE: u64 = 27;
    pub const KEY_LOCATOR: u64 = 28;
    pub const KEY_DIGEST: u64 = 29;

    pub const REPO_COMMAND_PARAMETER: u64 = 201;
    pub const SYNC_TIMEOUT: u64 = 210;
    pub const MAX_INTEREST_NUM: u64 = 211;
    pub const INTEREST_LIFETIME: u64 = 212;
}

/// Errors raised while decoding TLV structures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    #[error("buffer truncated while reading TLV")]
    Truncated,

    #[error("unexpected TLV type: expected {expected}, found {found}")]
    UnexpectedType { expected: u64, found: u64 },

    #[error("missing required element: {0}")]
    Missing(&'static str),

    #[error("invalid non-negative integer length: {0}")]
    InvalidInteger(usize),

    #[error("implicit digest component must be 32 bytes, got {0}")]
    InvalidDigestLength(usize),

    #[error("trailing bytes after TLV element")]
    TrailingBytes,

    #[error("invalid name URI: {0}")]
    InvalidUri(String),
}

/// Append a TLV variable-length number.
pub fn write_var_number(buf: &mut Vec<u8>, n: u64) {
    if n < 253 {
        buf.push(n as u8);
    } else if n <= u16::MAX as u64 {
        buf.push(0xFD);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= u32::MAX as u64 {
        buf.push(0xFE);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(0xFF);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Read a TLV variable-length number, returning the value and the bytes consumed.
pub fn read_var_number(input: &[u8]) -> Result<(u64, usize), TlvError> {
    let first = *input.first().ok_or(TlvError::Truncated)?;
    let width = match first {
        0xFD => 2,
        0xFE => 4,
        0xFF => 8,
        _ => return Ok((first as u64, 1)),
    };
    let bytes = input.get(1..1 + width).ok_or(TlvError::Truncated)?;
    let value = bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64);
    Ok((value, 1 + width))
}

/// Encode a non-negative integer in the shortest of the 1/2/4/8 byte forms.
pub fn encode_nonneg(n: u64) -> Vec<u8> {
    if n <= u8::MAX as u64 {
        vec![n as u8]
    } else if n <= u16::MAX as u64 {
        (n as u16).to_be_bytes().to_vec()
    } else if n <= u32::MAX as u64 {
        (n as u32).to_be_bytes().to_vec()
    } else {
        n.to_be_bytes().to_vec()
    }
}

/// Decode a non-negative integer value.
pub fn decode_nonneg(bytes: &[u8]) -> Result<u64, TlvError> {
    match bytes.len() {
        1 | 2 | 4 | 8 => Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)),
        len => Err(TlvError::InvalidInteger(len)),
    }
}

/// Append a complete TLV element.
pub fn write_tlv(buf: &mut Vec<u8>, typ: u64, value: &[u8]) {
    write_var_number(buf, typ);
    write_var_number(buf, value.len() as u64);
    buf.extend_from_slice(value);
}

/// Append a TLV element whose value is a non-negative integer.
pub fn write_nonneg_tlv(buf: &mut Vec<u8>, typ: u64, n: u64) {
    write_tlv(buf, typ, &encode_nonneg(n));
}

/// A borrowed TLV element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    pub typ: u64,
    pub value: &'a [u8],
    /// The whole element including its type and length octets.
    pub wire: &'a [u8],
}

impl<'a> Element<'a> {
    /// Fail unless this element carries the expected type.
    pub fn expect_type(&self, expected: u64) -> Result<&Self, TlvError> {
        if self.typ != expected {
            return Err(TlvError::UnexpectedType {
                expected,
                found: self.typ,
            });
        }
        Ok(self)
    }

    pub fn as_nonneg(&self) -> Result<u64, TlvError> {
        decode_nonneg(self.value)
    }
}

/// Read one TLV element from the front of `input`.
pub fn read_element(input: &[u8]) -> Result<Element<'_>, TlvError> {
    let (typ, type_len) = read_var_number(input)?;
    let (len, len_len) = read_var_number(&input[type_len..])?;
    let header = type_len + len_len;
    let len = usize::try_from(len).map_err(|_| TlvError::Truncated)?;
    let end = header.checked_add(len).ok_or(TlvError::Truncated)?;
    if input.len() < end {
        return Err(TlvError::Truncated);
    }
    Ok(Element {
        typ,
        value: &input[header..end],
        wire: &input[..end],
    })
}

/// Read exactly one TLV element spanning all of `input`.
pub fn read_single(input: &[u8]) -> Result<Element<'_>, TlvError> {
    let element = read_element(input)?;
    if element.wire.len() != input.len() {
        return Err(TlvError::TrailingBytes);
    }
    Ok(element)
}

/// Sequential reader over the nested elements of a TLV value.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Type of the next element without consuming it.
    pub fn peek_type(&self) -> Option<u64> {
        if self.is_empty() {
            return None;
        }
        read_var_number(&self.buf[self.pos..]).ok().map(|(t, _)| t)
    }

    pub fn read(&mut self) -> Result<Element<'a>, TlvError> {
        let element = read_element(&self.buf[self.pos..])?;
        self.pos += element.wire.len();
        Ok(element)
    }

    /// Consume the next element, requiring it to be of type `typ`.
    pub fn expect(&mut self, typ: u64, what: &'static str) -> Result<Element<'a>, TlvError> {
        match self.peek_type() {
            None => Err(TlvError::Missing(what)),
            Some(found) if found != typ => Err(TlvError::UnexpectedType {
                expected: typ,
                found,
            }),
            Some(_) => self.read(),
        }
    }

    /// Consume the next element only if it is of type `typ`.
    pub fn optional(&mut self, typ: u64) -> Result<Option<Element<'a>>, TlvError> {
        if self.peek_type() == Some(typ) {
            return self.read().map(Some);
        }
        Ok(None)
    }

    /// Current offset into the underlying buffer.
    pub fn position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_number_uses_shortest_form() {
        let cases: [(u64, usize); 5] = [(0, 1), (252, 1), (253, 3), (70_000, 5), (u64::MAX, 9)];
        for (n, width) in cases {
            let mut buf = Vec::new();
            write_var_number(&mut buf, n);
            assert_eq!(buf.len(), width, "width for {}", n);
            assert_eq!(read_var_number(&buf).unwrap(), (n, width));
        }
    }

    #[test]
    fn var_number_encoding_preserves_order() {
        let mut prev = Vec::new();
        for n in [1u64, 252, 253, 65_535, 65_536, 1 << 40] {
            let mut buf = Vec::new();
            write_var_number(&mut buf, n);
            assert!(buf > prev, "encoding of {} should sort after its predecessor", n);
            prev = buf;
        }
    }

    #[test]
    fn read_element_reports_truncation() {
        let mut buf = Vec::new();
        write_tlv(&mut buf, types::CONTENT, b"hello");
        assert!(read_element(&buf).is_ok());
        assert_eq!(read_element(&buf[..4]), Err(TlvError::Truncated));
        assert_eq!(read_element(&[]), Err(TlvError::Truncated));
    }

    #[test]
    fn read_single_rejects_trailing_bytes() {
        let mut buf = Vec::new();
        write_tlv(&mut buf, types::CONTENT, b"x");
        buf.push(0);
        assert_eq!(read_single(&buf), Err(TlvError::TrailingBytes));
    }

    #[test]
    fn nonneg_rejects_odd_widths() {
        assert_eq!(decode_nonneg(&encode_nonneg(300)).unwrap(), 300);
        assert_eq!(decode_nonneg(&[1, 2, 3]), Err(TlvError::InvalidInteger(3)));
    }

    #[test]
    fn reader_expect_and_optional() {
        let mut buf = Vec::new();
        write_nonneg_tlv(&mut buf, types::CONTENT_TYPE, 2);
        write_tlv(&mut buf, types::CONTENT, b"abc");

        let mut reader = Reader::new(&buf);
        assert!(reader.optional(types::FRESHNESS_PERIOD).unwrap().is_none());
        let ct = reader.expect(types::CONTENT_TYPE, "ContentType").unwrap();
        assert_eq!(ct.as_nonneg().unwrap(), 2);
        let err = reader.expect(types::NAME, "Name").unwrap_err();
        assert_eq!(
            err,
            TlvError::UnexpectedType {
                expected: types::NAME,
                found: types::CONTENT
            }
        );
        assert_eq!(reader.read().unwrap().value, b"abc");
        assert!(reader.is_empty());
        assert_eq!(reader.expect(types::NAME, "Name"), Err(TlvError::Missing("Name")));
    }
}
