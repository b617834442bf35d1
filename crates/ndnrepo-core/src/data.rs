// ABOUTME: Data packet (the stored object): name, meta info, content, and signature block.
// ABOUTME: Keeps the exact wire bytes so the implicit digest and full name are stable across decode.

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::name::{Component, Name};
use crate::tlv::{self, TlvError, types};

/// Signature type for a plain SHA-256 digest over the signed portion.
pub const DIGEST_SHA256: u64 = 0;

/// Optional metadata carried by a Data packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaInfo {
    pub content_type: Option<u64>,
    pub freshness_period: Option<Duration>,
}

impl MetaInfo {
    fn encode_into(&self, buf: &mut Vec<u8>) {
        let mut value = Vec::new();
        if let Some(content_type) = self.content_type {
            tlv::write_nonneg_tlv(&mut value, types::CONTENT_TYPE, content_type);
        }
        if let Some(freshness) = self.freshness_period {
            tlv::write_nonneg_tlv(&mut value, types::FRESHNESS_PERIOD, freshness.as_millis() as u64);
        }
        tlv::write_tlv(buf, types::META_INFO, &value);
    }

    fn decode(value: &[u8]) -> Result<Self, TlvError> {
        let mut reader = tlv::Reader::new(value);
        let content_type = reader
            .optional(types::CONTENT_TYPE)?
            .map(|e| e.as_nonneg())
            .transpose()?;
        let freshness_period = reader
            .optional(types::FRESHNESS_PERIOD)?
            .map(|e| e.as_nonneg().map(Duration::from_millis))
            .transpose()?;
        Ok(Self {
            content_type,
            freshness_period,
        })
    }
}

/// Identifies the key that signed a packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLocator {
    Name(Name),
    KeyDigest(Vec<u8>),
}

impl KeyLocator {
    pub fn wire_encode(&self) -> Vec<u8> {
        let mut value = Vec::new();
        match self {
            KeyLocator::Name(name) => name.encode_into(&mut value),
            KeyLocator::KeyDigest(digest) => tlv::write_tlv(&mut value, types::KEY_DIGEST, digest),
        }
        let mut buf = Vec::new();
        tlv::write_tlv(&mut buf, types::KEY_LOCATOR, &value);
        buf
    }

    fn decode(value: &[u8]) -> Result<Self, TlvError> {
        let inner = tlv::read_single(value)?;
        match inner.typ {
            types::NAME => Ok(KeyLocator::Name(Name::decode_value(inner.value)?)),
            types::KEY_DIGEST => Ok(KeyLocator::KeyDigest(inner.value.to_vec())),
            found => Err(TlvError::UnexpectedType {
                expected: types::NAME,
                found,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature_type: u64,
    pub key_locator: Option<KeyLocator>,
}

impl SignatureInfo {
    pub(crate) fn encode_into(&self, buf: &mut Vec<u8>) {
        let mut value = Vec::new();
        tlv::write_nonneg_tlv(&mut value, types::SIGNATURE_TYPE, self.signature_type);
        if let Some(locator) = &self.key_locator {
            value.extend_from_slice(&locator.wire_encode());
        }
        tlv::write_tlv(buf, types::SIGNATURE_INFO, &value);
    }

    pub(crate) fn decode(value: &[u8]) -> Result<Self, TlvError> {
        let mut reader = tlv::Reader::new(value);
        let signature_type = reader
            .expect(types::SIGNATURE_TYPE, "SignatureType")?
            .as_nonneg()?;
        let key_locator = reader
            .optional(types::KEY_LOCATOR)?
            .map(|e| KeyLocator::decode(e.value))
            .transpose()?;
        Ok(Self {
            signature_type,
            key_locator,
        })
    }
}

/// An immutable named, signed unit of data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    name: Name,
    meta_info: MetaInfo,
    content: Vec<u8>,
    signature_info: SignatureInfo,
    signature_value: Vec<u8>,
    wire: Vec<u8>,
    signed_start: usize,
    signed_end: usize,
}

impl Data {
    /// Start building a Data packet with the given name.
    pub fn builder(name: Name) -> DataBuilder {
        DataBuilder {
            name,
            meta_info: MetaInfo::default(),
            content: Vec::new(),
            key_locator: None,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn meta_info(&self) -> &MetaInfo {
        &self.meta_info
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn signature_info(&self) -> &SignatureInfo {
        &self.signature_info
    }

    pub fn signature_value(&self) -> &[u8] {
        &self.signature_value
    }

    /// The complete Data TLV.
    pub fn wire_encode(&self) -> &[u8] {
        &self.wire
    }

    /// The bytes covered by the signature: Name through SignatureInfo.
    pub fn signed_portion(&self) -> &[u8] {
        &self.wire[self.signed_start..self.signed_end]
    }

    /// True when this packet carries a DigestSha256 signature over its signed portion.
    pub fn verify_digest_sha256(&self) -> bool {
        self.signature_info.signature_type == DIGEST_SHA256
            && Sha256::digest(self.signed_portion()).as_slice() == self.signature_value.as_slice()
    }

    /// SHA-256 over the complete wire encoding.
    pub fn implicit_digest(&self) -> [u8; 32] {
        Sha256::digest(&self.wire).into()
    }

    /// The name with the implicit digest appended; unique per distinct wire encoding.
    pub fn full_name(&self) -> Name {
        self.name
            .clone()
            .append(Component::implicit_digest(self.implicit_digest()))
    }

    pub fn wire_decode(wire: &[u8]) -> Result<Self, TlvError> {
        let outer = tlv::read_single(wire)?;
        outer.expect_type(types::DATA)?;
        let header_len = outer.wire.len() - outer.value.len();

        let mut reader = tlv::Reader::new(outer.value);
        let name_el = reader.expect(types::NAME, "Name")?;
        let name = Name::decode_value(name_el.value)?;
        let meta_info = match reader.optional(types::META_INFO)? {
            Some(e) => MetaInfo::decode(e.value)?,
            None => MetaInfo::default(),
        };
        let content = reader
            .optional(types::CONTENT)?
            .map(|e| e.value.to_vec())
            .unwrap_or_default();
        let signature_info =
            SignatureInfo::decode(reader.expect(types::SIGNATURE_INFO, "SignatureInfo")?.value)?;
        let signed_end = header_len + reader.position();
        let signature_value = reader
            .expect(types::SIGNATURE_VALUE, "SignatureValue")?
            .value
            .to_vec();
        if !reader.is_empty() {
            return Err(TlvError::TrailingBytes);
        }

        Ok(Self {
            name,
            meta_info,
            content,
            signature_info,
            signature_value,
            wire: wire.to_vec(),
            signed_start: header_len,
            signed_end,
        })
    }
}

/// Collects the unsigned fields of a Data packet, then signs and freezes it.
#[derive(Debug, Clone)]
pub struct DataBuilder {
    name: Name,
    meta_info: MetaInfo,
    content: Vec<u8>,
    key_locator: Option<KeyLocator>,
}

impl DataBuilder {
    pub fn content(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    pub fn content_type(mut self, content_type: u64) -> Self {
        self.meta_info.content_type = Some(content_type);
        self
    }

    pub fn freshness_period(mut self, period: Duration) -> Self {
        self.meta_info.freshness_period = Some(period);
        self
    }

    pub fn key_locator(mut self, locator: KeyLocator) -> Self {
        self.key_locator = Some(locator);
        self
    }

    /// Sign with a DigestSha256 signature.
    pub fn sign_digest_sha256(self) -> Data {
        self.sign_with(DIGEST_SHA256, |signed| Sha256::digest(signed).to_vec())
    }

    /// Sign with an arbitrary signature type; `signer` receives the signed portion.
    pub fn sign_with(self, signature_type: u64, signer: impl FnOnce(&[u8]) -> Vec<u8>) -> Data {
        let signature_info = SignatureInfo {
            signature_type,
            key_locator: self.key_locator,
        };

        let mut signed = Vec::new();
        self.name.encode_into(&mut signed);
        self.meta_info.encode_into(&mut signed);
        tlv::write_tlv(&mut signed, types::CONTENT, &self.content);
        signature_info.encode_into(&mut signed);

        let signature_value = signer(&signed);
        let signed_len = signed.len();
        let mut value = signed;
        tlv::write_tlv(&mut value, types::SIGNATURE_VALUE, &signature_value);

        let mut wire = Vec::with_capacity(value.len() + 10);
        tlv::write_tlv(&mut wire, types::DATA, &value);
        let header_len = wire.len() - value.len();

        Data {
            name: self.name,
            meta_info: self.meta_info,
            content: self.content,
            signature_info,
            signature_value,
            wire,
            signed_start: header_len,
            signed_end: header_len + signed_len,
        }
    }
}
