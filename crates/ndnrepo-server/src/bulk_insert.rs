// ABOUTME: TCP bulk insert listener: accepts connections streaming concatenated Data TLVs into the repo.
// ABOUTME: Each connection keeps a bounded receive buffer and is closed if one element cannot fit.

use std::net::SocketAddr;

use ndnrepo_core::tlv::{self, TlvError, types};
use ndnrepo_core::Data;
use ndnrepo_store::SharedRepo;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Largest Data packet a connection will buffer.
pub const MAX_NDN_PACKET_SIZE: usize = 8800;

#[derive(Debug, Error)]
pub enum BulkInsertError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("element does not fit in the 8800 byte receive buffer")]
    Oversized,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct BulkInsertListener {
    listener: TcpListener,
    repo: SharedRepo,
}

impl BulkInsertListener {
    pub async fn bind(addr: SocketAddr, repo: SharedRepo) -> Result<Self, BulkInsertError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BulkInsertError::Bind { addr, source })?;
        info!(addr = %listener.local_addr()?, "bulk insert listening");
        Ok(Self { listener, repo })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BulkInsertError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    info!(%peer, "bulk insert connection");
                    let repo = self.repo.clone();
                    tokio::spawn(async move {
                        match handle_connection(stream, repo).await {
                            Ok(inserted) => info!(%peer, inserted, "bulk insert connection closed"),
                            Err(e) => warn!(%peer, error = %e, "bulk insert connection dropped"),
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept bulk insert connection");
                }
            }
        }
    }
}

/// Read Data elements from `stream` until EOF, inserting each. Returns the number inserted.
async fn handle_connection(mut stream: TcpStream, repo: SharedRepo) -> Result<u64, BulkInsertError> {
    let mut buf = vec![0u8; MAX_NDN_PACKET_SIZE];
    let mut filled = 0;
    let mut inserted = 0;

    loop {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled > 0 {
                debug!(leftover = filled, "connection closed mid-element");
            }
            return Ok(inserted);
        }
        filled += n;

        let mut offset = 0;
        while offset < filled {
            let element = match tlv::read_element(&buf[offset..filled]) {
                Ok(element) => element,
                Err(TlvError::Truncated) => break,
                Err(e) => {
                    warn!(error = %e, "unreadable element header");
                    break;
                }
            };
            offset += element.wire.len();
            if element.typ != types::DATA {
                debug!(typ = element.typ, "skipping non-Data element");
                continue;
            }
            let data = match Data::wire_decode(element.wire) {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "error decoding received Data packet");
                    continue;
                }
            };
            match repo.lock().await.insert_data(&data) {
                Ok(_) => {
                    inserted += 1;
                    debug!(name = %data.name(), "injected");
                }
                Err(e) => error!(name = %data.name(), error = %e, "failed to inject"),
            }
        }

        if offset == 0 && filled == MAX_NDN_PACKET_SIZE {
            return Err(BulkInsertError::Oversized);
        }
        buf.copy_within(offset..filled, 0);
        filled -= offset;
    }
}
