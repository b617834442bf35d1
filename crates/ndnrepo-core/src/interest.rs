// ABOUTME: Interest request value: a name to fetch, its lifetime, and freshness/signer constraints.
// ABOUTME: Also carries the DigestSha256 signed-interest form used for repo commands.

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::data::{DIGEST_SHA256, SignatureInfo};
use crate::name::{Component, Name};
use crate::tlv::{self, types};

/// Lifetime applied to Interests that do not set one.
pub const DEFAULT_INTEREST_LIFETIME: Duration = Duration::from_millis(4000);

/// A request for the Data packet matching `name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interest {
    name: Name,
    lifetime: Duration,
    must_be_fresh: bool,
    publisher_fingerprint: Option<[u8; 32]>,
}

impl Interest {
    pub fn new(name: Name) -> Self {
        Self {
            name,
            lifetime: DEFAULT_INTEREST_LIFETIME,
            must_be_fresh: false,
            publisher_fingerprint: None,
        }
    }

    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_must_be_fresh(mut self, must_be_fresh: bool) -> Self {
        self.must_be_fresh = must_be_fresh;
        self
    }

    /// Restrict matches to Data whose key locator hashes to `fingerprint`.
    pub fn with_publisher_fingerprint(mut self, fingerprint: [u8; 32]) -> Self {
        self.publisher_fingerprint = Some(fingerprint);
        self
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn must_be_fresh(&self) -> bool {
        self.must_be_fresh
    }

    pub fn publisher_fingerprint(&self) -> Option<&[u8; 32]> {
        self.publisher_fingerprint.as_ref()
    }

    /// Append a SignatureInfo component and a DigestSha256 SignatureValue component.
    pub fn sign_digest_sha256(mut self) -> Self {
        let info = SignatureInfo {
            signature_type: DIGEST_SHA256,
            key_locator: None,
        };
        let mut info_wire = Vec::new();
        info.encode_into(&mut info_wire);
        self.name.push(Component::generic(info_wire));

        let digest = Sha256::digest(self.name.encode_value());
        let mut value_wire = Vec::new();
        tlv::write_tlv(&mut value_wire, types::SIGNATURE_VALUE, &digest);
        self.name.push(Component::generic(value_wire));
        self
    }

    /// Signature info and value carried by the final two name components, if present.
    pub fn signature(&self) -> Option<(SignatureInfo, Vec<u8>)> {
        let len = self.name.len();
        if len < 2 {
            return None;
        }
        let info_el = tlv::read_single(self.name.get(len - 2)?.value()).ok()?;
        info_el.expect_type(types::SIGNATURE_INFO).ok()?;
        let info = SignatureInfo::decode(info_el.value).ok()?;
        let value_el = tlv::read_single(self.name.get(len - 1)?.value()).ok()?;
        value_el.expect_type(types::SIGNATURE_VALUE).ok()?;
        Some((info, value_el.value.to_vec()))
    }

    /// True when the Interest carries a DigestSha256 signature matching its name.
    pub fn verify_digest_sha256(&self) -> bool {
        let Some((info, value)) = self.signature() else {
            return false;
        };
        if info.signature_type != DIGEST_SHA256 {
            return false;
        }
        let signed = self.name.prefix(self.name.len() - 1).encode_value();
        Sha256::digest(signed).as_slice() == value.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_four_second_lifetime() {
        let interest = Interest::new(Name::from_uri("/a").unwrap());
        assert_eq!(interest.lifetime(), Duration::from_millis(4000));
        assert!(!interest.must_be_fresh());
        assert!(interest.publisher_fingerprint().is_none());
    }

    #[test]
    fn signed_interest_verifies_and_detects_tampering() {
        let signed = Interest::new(Name::from_uri("/repo/command/sync/start").unwrap())
            .sign_digest_sha256();
        assert_eq!(signed.name().len(), 6);
        assert!(signed.verify_digest_sha256());

        let mut components = signed.name().components().to_vec();
        components[0] = Component::generic("other");
        let tampered = Interest::new(Name::from_components(components));
        assert!(!tampered.verify_digest_sha256());
    }

    #[test]
    fn unsigned_interest_does_not_verify() {
        let interest = Interest::new(Name::from_uri("/a/b/c").unwrap());
        assert!(interest.signature().is_none());
        assert!(!interest.verify_digest_sha256());
    }
}
