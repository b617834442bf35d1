// ABOUTME: Name and Component types with NDN canonical ordering, prefix tests, and TLV encoding.
// ABOUTME: Names key every stored object; their ordering drives index lookups and SQL range scans.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::tlv::{self, TlvError, types};

/// A single name component: a TLV type plus an opaque value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Component {
    typ: u64,
    value: Vec<u8>,
}

impl Component {
    pub fn new(typ: u64, value: Vec<u8>) -> Self {
        Self { typ, value }
    }

    /// A generic component holding arbitrary bytes.
    pub fn generic(value: impl Into<Vec<u8>>) -> Self {
        Self::new(types::GENERIC_NAME_COMPONENT, value.into())
    }

    /// A generic component holding a non-negative integer, as used for sequence numbers.
    pub fn from_number(n: u64) -> Self {
        Self::generic(tlv::encode_nonneg(n))
    }

    /// The implicit SHA-256 digest component that turns a name into a full name.
    pub fn implicit_digest(digest: [u8; 32]) -> Self {
        Self::new(types::IMPLICIT_SHA256_DIGEST_COMPONENT, digest.to_vec())
    }

    pub fn typ(&self) -> u64 {
        self.typ
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn is_implicit_digest(&self) -> bool {
        self.typ == types::IMPLICIT_SHA256_DIGEST_COMPONENT
    }

    /// Interpret the value as a non-negative integer, if it is one.
    pub fn to_number(&self) -> Option<u64> {
        tlv::decode_nonneg(&self.value).ok()
    }

    /// The next component in canonical order with the same type.
    /// Increments the value as a big-endian number; on overflow the value
    /// becomes all zeros one byte longer.
    pub fn successor(&self) -> Self {
        let mut value = self.value.clone();
        for byte in value.iter_mut().rev() {
            if *byte == u8::MAX {
                *byte = 0;
            } else {
                *byte += 1;
                return Self::new(self.typ, value);
            }
        }
        Self::new(self.typ, vec![0; self.value.len() + 1])
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        tlv::write_tlv(buf, self.typ, &self.value);
    }

    fn from_element(element: &tlv::Element<'_>) -> Result<Self, TlvError> {
        if element.typ == types::IMPLICIT_SHA256_DIGEST_COMPONENT && element.value.len() != 32 {
            return Err(TlvError::InvalidDigestLength(element.value.len()));
        }
        Ok(Self::new(element.typ, element.value.to_vec()))
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.typ
            .cmp(&other.typ)
            .then(self.value.len().cmp(&other.value.len()))
            .then_with(|| self.value.cmp(&other.value))
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.typ {
            types::IMPLICIT_SHA256_DIGEST_COMPONENT => {
                write!(f, "sha256digest={}", hex::encode(&self.value))
            }
            types::GENERIC_NAME_COMPONENT => escape_into(f, &self.value),
            other => {
                write!(f, "{}=", other)?;
                escape_into(f, &self.value)
            }
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

fn escape_into(f: &mut fmt::Formatter<'_>, value: &[u8]) -> fmt::Result {
    if value.iter().all(|b| *b == b'.') {
        // Empty and dot-only components gain three extra dots to stay distinguishable.
        f.write_str("...")?;
    }
    for b in value {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            write!(f, "{}", *b as char)?;
        } else {
            write!(f, "%{:02X}", b)?;
        }
    }
    Ok(())
}

fn unescape(segment: &str) -> Result<Vec<u8>, TlvError> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = segment
                .get(i + 1..i + 3)
                .ok_or_else(|| TlvError::InvalidUri(segment.to_string()))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| TlvError::InvalidUri(segment.to_string()))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    if out.len() >= 3 && out.iter().all(|b| *b == b'.') {
        out.truncate(out.len() - 3);
    }
    Ok(out)
}

/// An ordered sequence of components identifying a named object.
///
/// Ordering is component-wise in NDN canonical order, so a name sorts
/// immediately before all of its extensions. This matches the byte order
/// of the TLV encoding, which the SQLite backend relies on for range scans.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_components(components: Vec<Component>) -> Self {
        Self { components }
    }

    /// Parse a URI such as `/producer/data`. The `ndn:` scheme is optional.
    pub fn from_uri(uri: &str) -> Result<Self, TlvError> {
        let path = uri.strip_prefix("ndn:").unwrap_or(uri);
        let mut name = Name::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if let Some(digest) = segment.strip_prefix("sha256digest=") {
                let bytes =
                    hex::decode(digest).map_err(|_| TlvError::InvalidUri(segment.to_string()))?;
                let digest: [u8; 32] = bytes
                    .try_into()
                    .map_err(|b: Vec<u8>| TlvError::InvalidDigestLength(b.len()))?;
                name.push(Component::implicit_digest(digest));
            } else {
                name.push(Component::generic(unescape(segment)?));
            }
        }
        Ok(name)
    }

    pub fn push(&mut self, component: Component) {
        self.components.push(component);
    }

    /// Builder-style append.
    pub fn append(mut self, component: Component) -> Self {
        self.push(component);
        self
    }

    pub fn append_str(self, value: &str) -> Self {
        self.append(Component::generic(value.as_bytes()))
    }

    pub fn append_number(self, n: u64) -> Self {
        self.append(Component::from_number(n))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn last(&self) -> Option<&Component> {
        self.components.last()
    }

    /// The first `n` components.
    pub fn prefix(&self, n: usize) -> Name {
        Name::from_components(self.components[..n.min(self.len())].to_vec())
    }

    /// True if every component of `self` matches the leading components of `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        self.len() <= other.len() && self.components[..] == other.components[..self.len()]
    }

    /// Strip a trailing implicit digest, yielding the application-level name.
    pub fn without_implicit_digest(&self) -> Name {
        match self.last() {
            Some(c) if c.is_implicit_digest() => self.prefix(self.len() - 1),
            _ => self.clone(),
        }
    }

    /// The next name in canonical order after this name and all of its
    /// extensions, formed by incrementing the final component. The empty
    /// name yields `/sha256digest=00..00`, which does not bound generic
    /// names; prefix scans treat the empty name as unbounded instead.
    pub fn successor(&self) -> Name {
        match self.components.split_last() {
            None => Name::new().append(Component::implicit_digest([0; 32])),
            Some((last, rest)) => {
                let mut components = rest.to_vec();
                components.push(last.successor());
                Name::from_components(components)
            }
        }
    }

    /// Concatenated component TLVs, without the outer Name header.
    /// This is the form stored in the backend's `name` column.
    pub fn encode_value(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for component in &self.components {
            component.encode_into(&mut buf);
        }
        buf
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        tlv::write_tlv(buf, types::NAME, &self.encode_value());
    }

    pub fn wire_encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Decode a sequence of component TLVs (the inverse of `encode_value`).
    pub fn decode_value(value: &[u8]) -> Result<Self, TlvError> {
        let mut reader = tlv::Reader::new(value);
        let mut name = Name::new();
        while !reader.is_empty() {
            let element = reader.read()?;
            name.push(Component::from_element(&element)?);
        }
        Ok(name)
    }

    /// Decode a complete Name TLV.
    pub fn wire_decode(wire: &[u8]) -> Result<Self, TlvError> {
        let element = tlv::read_single(wire)?;
        element.expect_type(types::NAME)?;
        Self::decode_value(element.value)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self)
    }
}

impl FromStr for Name {
    type Err = TlvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Name::from_uri(s)
    }
}
