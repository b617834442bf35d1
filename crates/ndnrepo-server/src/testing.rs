// ABOUTME: In-memory Face, SyncTransport, and Validator doubles for driving the server without a network.
// ABOUTME: Used by unit tests, the integration tests, and the binary's standalone mode.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use ndnrepo_core::{Data, Interest, Name};
use tokio::sync::mpsc;

use crate::face::{Face, FetchError};
use crate::transport::{MissingData, MissingRanges, SyncTransport, TransportError};
use crate::validator::{ValidationError, Validator};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct FaceState {
    queued: Vec<Data>,
    nacked: Vec<Name>,
    expressed: Vec<Interest>,
}

/// A Face that answers each Interest from a queue of Data.
///
/// Every queued packet satisfies at most one Interest. Interests with no
/// matching packet wait out their lifetime and then time out.
#[derive(Debug, Default)]
pub struct MemoryFace {
    state: Mutex<FaceState>,
}

impl MemoryFace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue `data` to answer the next Interest whose name is a prefix of it.
    pub fn put(&self, data: Data) {
        lock(&self.state).queued.push(data);
    }

    /// Answer Interests under `prefix` with a Nack until cleared.
    pub fn nack(&self, prefix: Name) {
        lock(&self.state).nacked.push(prefix);
    }

    /// Every Interest expressed so far, in order.
    pub fn expressed(&self) -> Vec<Interest> {
        lock(&self.state).expressed.clone()
    }

    pub fn expressed_count(&self) -> usize {
        lock(&self.state).expressed.len()
    }
}

#[async_trait]
impl Face for MemoryFace {
    async fn express_interest(&self, interest: Interest) -> Result<Data, FetchError> {
        let answer = {
            let mut state = lock(&self.state);
            state.expressed.push(interest.clone());
            if state.nacked.iter().any(|p| p.is_prefix_of(interest.name())) {
                return Err(FetchError::Nack("no route".to_string()));
            }
            state
                .queued
                .iter()
                .position(|d| interest.name().is_prefix_of(d.name()))
                .map(|pos| state.queued.remove(pos))
        };
        match answer {
            Some(data) => Ok(data),
            None => {
                tokio::time::sleep(interest.lifetime()).await;
                Err(FetchError::Timeout)
            }
        }
    }
}

/// A single-group sync transport living in process memory.
///
/// `publish` signs the payload into a Data packet, hands it to the attached
/// face (if any) so fetches can find it, and reports it as missing to every
/// subscriber of the group.
#[derive(Debug)]
pub struct MemorySyncTransport {
    group: Name,
    face: Option<Arc<MemoryFace>>,
    subscribers: Mutex<HashMap<Name, Vec<mpsc::UnboundedSender<Vec<MissingData>>>>>,
}

impl MemorySyncTransport {
    pub fn new(group: Name) -> Arc<Self> {
        Arc::new(Self {
            group,
            face: None,
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_face(group: Name, face: Arc<MemoryFace>) -> Arc<Self> {
        Arc::new(Self {
            group,
            face: Some(face),
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    /// Deliver `ranges` to every live subscriber of `root`; returns how many received them.
    pub fn report(&self, root: &Name, ranges: Vec<MissingData>) -> usize {
        let mut subscribers = lock(&self.subscribers);
        let Some(senders) = subscribers.get_mut(root) else {
            return 0;
        };
        senders.retain(|tx| tx.send(ranges.clone()).is_ok());
        senders.len()
    }

    /// Number of live subscriptions for `root`.
    pub fn subscriber_count(&self, root: &Name) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers
            .get_mut(root)
            .map(|senders| {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            })
            .unwrap_or(0)
    }
}

impl SyncTransport for MemorySyncTransport {
    fn subscribe(&self, root: &Name) -> MissingRanges {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers)
            .entry(root.clone())
            .or_default()
            .push(tx);
        rx
    }

    fn publish(
        &self,
        payload: &[u8],
        freshness: Duration,
        seq: u64,
        producer: &Name,
    ) -> Result<Data, TransportError> {
        let data = Data::builder(producer.clone().append_number(seq))
            .content(payload.to_vec())
            .freshness_period(freshness)
            .sign_digest_sha256();
        if let Some(face) = &self.face {
            face.put(data.clone());
        }
        self.report(
            &self.group,
            vec![MissingData {
                session: producer.clone(),
                low: seq,
                high: seq,
            }],
        );
        Ok(data)
    }
}

/// Accepts every command and packet.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllValidator;

#[async_trait]
impl Validator for AcceptAllValidator {
    async fn validate_data(&self, _data: &Data) -> Result<(), ValidationError> {
        Ok(())
    }

    async fn validate_command(&self, _interest: &Interest) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Rejects every command and packet.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAllValidator;

#[async_trait]
impl Validator for RejectAllValidator {
    async fn validate_data(&self, data: &Data) -> Result<(), ValidationError> {
        Err(ValidationError(format!("rejected {}", data.name())))
    }

    async fn validate_command(&self, interest: &Interest) -> Result<(), ValidationError> {
        Err(ValidationError(format!("rejected {}", interest.name())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn face_answers_each_packet_once_then_times_out() {
        let face = MemoryFace::new();
        face.put(Data::builder(name("/p/1")).sign_digest_sha256());

        let first = face.express_interest(Interest::new(name("/p"))).await;
        assert_eq!(first.unwrap().name(), &name("/p/1"));

        let started = tokio::time::Instant::now();
        let second = face
            .express_interest(Interest::new(name("/p")).with_lifetime(Duration::from_millis(250)))
            .await;
        assert_eq!(second, Err(FetchError::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(face.expressed_count(), 2);
    }

    #[tokio::test]
    async fn face_nacks_configured_prefixes() {
        let face = MemoryFace::new();
        face.nack(name("/down"));
        let result = face.express_interest(Interest::new(name("/down/1"))).await;
        assert!(matches!(result, Err(FetchError::Nack(_))));
    }

    #[tokio::test]
    async fn publish_reaches_group_subscribers_and_face() {
        let face = MemoryFace::new();
        let transport = MemorySyncTransport::with_face(name("/sync"), face.clone());
        let mut rx = transport.subscribe(&name("/sync"));
        let mut other = transport.subscribe(&name("/elsewhere"));

        let published = transport
            .publish(b"hello", Duration::from_secs(10), 1, &name("/producer"))
            .unwrap();

        let ranges = rx.recv().await.unwrap();
        assert_eq!(
            ranges,
            vec![MissingData {
                session: name("/producer"),
                low: 1,
                high: 1
            }]
        );
        assert!(other.try_recv().is_err());

        let fetched = face
            .express_interest(Interest::new(published.name().clone()))
            .await
            .unwrap();
        assert_eq!(fetched.content(), b"hello");
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let transport = MemorySyncTransport::new(name("/sync"));
        let rx = transport.subscribe(&name("/sync"));
        assert_eq!(transport.subscriber_count(&name("/sync")), 1);
        drop(rx);
        assert_eq!(transport.subscriber_count(&name("/sync")), 0);
        assert_eq!(transport.report(&name("/sync"), Vec::new()), 0);
    }

    #[tokio::test]
    async fn validators_accept_or_reject_everything() {
        let data = Data::builder(name("/x")).sign_digest_sha256();
        assert!(AcceptAllValidator.validate_data(&data).await.is_ok());
        assert!(RejectAllValidator.validate_data(&data).await.is_err());
        let interest = Interest::new(name("/x"));
        assert!(AcceptAllValidator.validate_command(&interest).await.is_ok());
        assert!(RejectAllValidator.validate_command(&interest).await.is_err());
    }
}
