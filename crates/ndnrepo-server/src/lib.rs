// ABOUTME: Service layer for ndnrepo: sync-driven ingestion, TCP bulk insert, and daemon configuration.
// ABOUTME: Network access goes through the Face, Validator, and SyncTransport traits.

pub mod app_state;
pub mod bulk_insert;
pub mod config;
pub mod face;
pub mod sync_handle;
pub mod testing;
pub mod transport;
pub mod validator;

pub use app_state::{AppState, RepoStatus, SharedState, open_storage};
pub use bulk_insert::{BulkInsertError, BulkInsertListener, MAX_NDN_PACKET_SIZE};
pub use config::{ConfigError, RepoConfig, StorageKind};
pub use face::{Face, FetchError};
pub use sync_handle::{
    DEFAULT_SESSION_GRACE, SyncError, SyncHandle, SyncHandleConfig, SyncHandleDeps, spawn,
};
pub use transport::{MissingData, MissingRanges, SyncTransport, TransportError};
pub use validator::{DigestSha256Validator, ValidationError, Validator};
