// ABOUTME: Shared daemon state: the configured repo, the sync session manager, and the config they came from.
// ABOUTME: Opens the Storage backend named by the config and wires the sync handle to it.

use std::sync::Arc;

use ndnrepo_store::{MemoryStorage, RepoError, RepoStorage, SharedRepo, SqliteStorage, Storage, StorageError};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{RepoConfig, StorageKind};
use crate::face::Face;
use crate::sync_handle::{self, SyncError, SyncHandle, SyncHandleConfig, SyncHandleDeps};
use crate::transport::SyncTransport;
use crate::validator::Validator;

/// Point-in-time summary of the repo, suitable for logging as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoStatus {
    pub command_prefix: String,
    pub storage: StorageKind,
    pub packets: i64,
    pub capacity: usize,
}

pub struct AppState {
    pub config: RepoConfig,
    pub repo: SharedRepo,
    pub sync: SyncHandle,
}

pub type SharedState = Arc<AppState>;

/// Open the backend selected by `config.storage`.
pub fn open_storage(config: &RepoConfig) -> Result<Box<dyn Storage>, StorageError> {
    match config.storage {
        StorageKind::Sqlite => {
            let storage = SqliteStorage::open(&config.db_dir, config.max_packets)?;
            info!(
                dir = %config.db_dir.display(),
                packets = storage.index().size(),
                "opened sqlite storage"
            );
            Ok(Box::new(storage))
        }
        StorageKind::Memory => {
            info!(capacity = config.max_packets, "using in-memory storage");
            Ok(Box::new(MemoryStorage::new(config.max_packets)))
        }
    }
}

impl AppState {
    /// Open storage and start the sync session manager.
    ///
    /// The returned task resolves when the manager exits; see `sync_handle::spawn`.
    pub fn open(
        config: RepoConfig,
        face: Arc<dyn Face>,
        validator: Arc<dyn Validator>,
        transport: Arc<dyn SyncTransport>,
    ) -> Result<(Self, JoinHandle<Result<(), SyncError>>), StorageError> {
        let repo = RepoStorage::new(open_storage(&config)?).into_shared();
        let sync_config = SyncHandleConfig {
            command_prefix: config.command_prefix.clone(),
            session_grace: config.session_grace,
        };
        let (sync, task) = sync_handle::spawn(
            sync_config,
            SyncHandleDeps {
                repo: repo.clone(),
                face,
                validator,
                transport,
            },
        );
        Ok((Self { config, repo, sync }, task))
    }

    pub async fn status(&self) -> Result<RepoStatus, RepoError> {
        let packets = self.repo.lock().await.size()?;
        Ok(RepoStatus {
            command_prefix: self.config.command_prefix.to_string(),
            storage: self.config.storage,
            packets,
            capacity: self.config.max_packets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{AcceptAllValidator, MemoryFace, MemorySyncTransport};
    use ndnrepo_core::{Data, Name};
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(dir: &TempDir, storage: StorageKind) -> RepoConfig {
        RepoConfig {
            db_dir: dir.path().join("db"),
            command_prefix: Name::from_uri("/repo/command").unwrap(),
            max_packets: 10,
            storage,
            bulk_insert_addr: None,
            session_grace: Duration::from_secs(1),
        }
    }

    fn open(config: RepoConfig) -> AppState {
        let face = MemoryFace::new();
        let transport = MemorySyncTransport::with_face(Name::from_uri("/sync").unwrap(), face.clone());
        let (state, _task) =
            AppState::open(config, face, Arc::new(AcceptAllValidator), transport).unwrap();
        state
    }

    #[tokio::test]
    async fn sqlite_state_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let data = Data::builder(Name::from_uri("/persist/1").unwrap())
            .content(b"kept".to_vec())
            .sign_digest_sha256();

        let state = open(config(&dir, StorageKind::Sqlite));
        state.repo.lock().await.insert_data(&data).unwrap();
        drop(state);

        let state = open(config(&dir, StorageKind::Sqlite));
        let status = state.status().await.unwrap();
        assert_eq!(status.packets, 1);
        assert_eq!(status.storage, StorageKind::Sqlite);
        assert!(dir.path().join("db").join(ndnrepo_store::DB_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn status_serializes_as_json() {
        let dir = TempDir::new().unwrap();
        let state = open(config(&dir, StorageKind::Memory));
        let json = serde_json::to_value(state.status().await.unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "command_prefix": "/repo/command",
                "storage": "memory",
                "packets": 0,
                "capacity": 10,
            })
        );
        assert!(!dir.path().join("db").exists());
    }
}
