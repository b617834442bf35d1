// ABOUTME: Core library for ndnrepo, providing names, the TLV codec, and packet types.
// ABOUTME: Also defines the repo command parameter and response formats shared by store and server.

pub mod command;
pub mod data;
pub mod interest;
pub mod name;
pub mod tlv;

pub use command::{RepoCommandParameter, RepoCommandResponse, SyncVerb, status};
pub use data::{Data, KeyLocator, MetaInfo, SignatureInfo};
pub use interest::{DEFAULT_INTEREST_LIFETIME, Interest};
pub use name::{Component, Name};
pub use tlv::TlvError;
