// ABOUTME: Repo command types: the parameter block carried in command names and the status response.
// ABOUTME: Includes helpers to build and parse `<prefix>/sync/<verb>/<parameters>` command Interests.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interest::Interest;
use crate::name::{Component, Name};
use crate::tlv::{self, TlvError, types};

/// Status codes carried in command responses.
pub mod status {
    pub const IN_PROGRESS: u32 = 100;
    pub const STOPPED: u32 = 101;
    pub const FETCHING: u32 = 300;
    pub const UNAUTHORIZED: u32 = 401;
    pub const MALFORMED: u32 = 403;
    pub const NOT_FOUND: u32 = 404;
}

/// The sync command verbs, each registered as `<prefix>/sync/<verb>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncVerb {
    Start,
    Check,
    Stop,
}

impl SyncVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncVerb::Start => "start",
            SyncVerb::Check => "check",
            SyncVerb::Stop => "stop",
        }
    }

    fn from_component(component: &Component) -> Option<Self> {
        match component.value() {
            b"start" => Some(SyncVerb::Start),
            b"check" => Some(SyncVerb::Check),
            b"stop" => Some(SyncVerb::Stop),
            _ => None,
        }
    }
}

impl fmt::Display for SyncVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a repo command, encoded as a RepoCommandParameter TLV block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoCommandParameter {
    pub name: Option<Name>,
    pub sync_timeout: Option<Duration>,
    pub max_interest_num: Option<u64>,
    pub interest_lifetime: Option<Duration>,
}

impl RepoCommandParameter {
    pub fn with_name(name: Name) -> Self {
        Self {
            name: Some(name),
            ..Self::default()
        }
    }

    pub fn sync_timeout(mut self, timeout: Duration) -> Self {
        self.sync_timeout = Some(timeout);
        self
    }

    pub fn max_interest_num(mut self, n: u64) -> Self {
        self.max_interest_num = Some(n);
        self
    }

    pub fn interest_lifetime(mut self, lifetime: Duration) -> Self {
        self.interest_lifetime = Some(lifetime);
        self
    }

    pub fn wire_encode(&self) -> Vec<u8> {
        let mut value = Vec::new();
        if let Some(name) = &self.name {
            name.encode_into(&mut value);
        }
        if let Some(timeout) = self.sync_timeout {
            tlv::write_nonneg_tlv(&mut value, types::SYNC_TIMEOUT, timeout.as_millis() as u64);
        }
        if let Some(n) = self.max_interest_num {
            tlv::write_nonneg_tlv(&mut value, types::MAX_INTEREST_NUM, n);
        }
        if let Some(lifetime) = self.interest_lifetime {
            tlv::write_nonneg_tlv(&mut value, types::INTEREST_LIFETIME, lifetime.as_millis() as u64);
        }
        let mut buf = Vec::new();
        tlv::write_tlv(&mut buf, types::REPO_COMMAND_PARAMETER, &value);
        buf
    }

    pub fn wire_decode(wire: &[u8]) -> Result<Self, TlvError> {
        let outer = tlv::read_single(wire)?;
        outer.expect_type(types::REPO_COMMAND_PARAMETER)?;
        let mut reader = tlv::Reader::new(outer.value);

        let name = reader
            .optional(types::NAME)?
            .map(|e| Name::decode_value(e.value))
            .transpose()?;
        let sync_timeout = reader
            .optional(types::SYNC_TIMEOUT)?
            .map(|e| e.as_nonneg().map(Duration::from_millis))
            .transpose()?;
        let max_interest_num = reader
            .optional(types::MAX_INTEREST_NUM)?
            .map(|e| e.as_nonneg())
            .transpose()?;
        let interest_lifetime = reader
            .optional(types::INTEREST_LIFETIME)?
            .map(|e| e.as_nonneg().map(Duration::from_millis))
            .transpose()?;
        if !reader.is_empty() {
            return Err(TlvError::TrailingBytes);
        }

        Ok(Self {
            name,
            sync_timeout,
            max_interest_num,
            interest_lifetime,
        })
    }
}

/// Reply to a repo command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCommandResponse {
    pub status_code: u32,
    pub insert_num: u64,
}

impl RepoCommandResponse {
    pub fn with_status(status_code: u32) -> Self {
        Self {
            status_code,
            insert_num: 0,
        }
    }
}

/// Build the name `<prefix>/sync/<verb>/<parameters>`.
pub fn command_name(prefix: &Name, verb: SyncVerb, parameter: &RepoCommandParameter) -> Name {
    prefix
        .clone()
        .append_str("sync")
        .append_str(verb.as_str())
        .append(Component::generic(parameter.wire_encode()))
}

/// Build a DigestSha256-signed command Interest.
pub fn command_interest(prefix: &Name, verb: SyncVerb, parameter: &RepoCommandParameter) -> Interest {
    Interest::new(command_name(prefix, verb, parameter)).sign_digest_sha256()
}

/// Why a command name could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("name is not under the command prefix")]
    WrongPrefix,

    #[error("unknown command verb")]
    UnknownVerb,

    #[error("missing parameter component")]
    MissingParameter,

    #[error("malformed parameter block: {0}")]
    Malformed(#[from] TlvError),
}

/// Split a command name under `prefix` into its verb and decoded parameter block.
/// Components after the parameter block (signature fields) are ignored.
pub fn parse_command(prefix: &Name, name: &Name) -> Result<(SyncVerb, RepoCommandParameter), CommandError> {
    if !prefix.is_prefix_of(name) || name.get(prefix.len()).map(Component::value) != Some(b"sync".as_slice()) {
        return Err(CommandError::WrongPrefix);
    }
    let verb = name
        .get(prefix.len() + 1)
        .and_then(SyncVerb::from_component)
        .ok_or(CommandError::UnknownVerb)?;
    let block = name
        .get(prefix.len() + 2)
        .ok_or(CommandError::MissingParameter)?;
    let parameter = RepoCommandParameter::wire_decode(block.value())?;
    Ok((verb, parameter))
}
