// ABOUTME: End-to-end tests for the ndnrepo ingestion pipeline over a SQLite-backed repo.
// ABOUTME: Drives publish, missing ranges, fetch, validation, insert, and the command status replies.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use ndnrepo_core::command::{command_interest, command_name};
use ndnrepo_core::{Component, Interest, Name, RepoCommandParameter, RepoCommandResponse, SyncVerb, status};
use ndnrepo_server::testing::{MemoryFace, MemorySyncTransport};
use ndnrepo_server::{AppState, DigestSha256Validator, RepoConfig, StorageKind, SyncTransport};
use ndnrepo_store::RepoEvent;
use tempfile::TempDir;

fn name(uri: &str) -> Name {
    Name::from_uri(uri).unwrap()
}

fn prefix() -> Name {
    name("/repo/command")
}

fn config(dir: &TempDir) -> RepoConfig {
    RepoConfig {
        db_dir: dir.path().to_path_buf(),
        command_prefix: prefix(),
        max_packets: 1000,
        storage: StorageKind::Sqlite,
        bulk_insert_addr: None,
        session_grace: Duration::from_secs(5),
    }
}

struct Pipeline {
    state: AppState,
    transport: Arc<MemorySyncTransport>,
}

/// Open a SQLite-backed repo whose transport reports for the `/sync` group.
fn open(dir: &TempDir) -> Pipeline {
    let face = MemoryFace::new();
    let transport = MemorySyncTransport::with_face(name("/sync"), face.clone());
    let (state, _task) = AppState::open(
        config(dir),
        face,
        Arc::new(DigestSha256Validator::new(prefix())),
        transport.clone(),
    )
    .unwrap();
    Pipeline { state, transport }
}

async fn command(p: &Pipeline, verb: SyncVerb, parameter: &RepoCommandParameter) -> RepoCommandResponse {
    p.state
        .sync
        .on_interest(&command_interest(&prefix(), verb, parameter))
        .await
        .unwrap()
}

async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn published_revisions_are_fetched_stored_and_survive_restart() {
    let dir = TempDir::new().unwrap();
    let p = open(&dir);
    let parameter = RepoCommandParameter::with_name(name("/sync"))
        .sync_timeout(Duration::from_secs(2))
        .interest_lifetime(Duration::from_secs(1));

    let mut events = p.state.repo.lock().await.subscribe();

    // 1. Start the session
    let response = command(&p, SyncVerb::Start, &parameter).await;
    assert_eq!(response.status_code, status::IN_PROGRESS);

    // 2. A producer publishes three revisions into the group
    for seq in 1..=3u64 {
        let payload = format!("revision {seq}");
        p.transport
            .publish(payload.as_bytes(), Duration::from_secs(10), seq, &name("/producer"))
            .unwrap();
    }
    settle(100).await;

    // 3. Every revision was fetched, validated, and stored
    let response = command(&p, SyncVerb::Check, &parameter).await;
    assert_eq!(response.status_code, status::FETCHING);
    assert_eq!(response.insert_num, 3);
    let stored = p
        .state
        .repo
        .lock()
        .await
        .read_data(&name("/producer").append_number(2))
        .unwrap()
        .unwrap();
    assert_eq!(stored.content(), b"revision 2");
    let mut inserted = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            RepoEvent::Inserted { name } => inserted.push(name),
            other => panic!("unexpected event {other:?}"),
        }
    }
    inserted.sort();
    let expected: Vec<Name> = (1..=3u64).map(|seq| name("/producer").append_number(seq)).collect();
    assert_eq!(inserted, expected);

    // 4. With no new ranges the session times out and keeps its final counters
    settle(4_000).await;
    let response = command(&p, SyncVerb::Check, &parameter).await;
    assert_eq!(response.status_code, status::STOPPED);
    assert_eq!(response.insert_num, 3);

    // 5. After the grace period the session is forgotten
    settle(6_000).await;
    let response = command(&p, SyncVerb::Check, &parameter).await;
    assert_eq!(response.status_code, status::NOT_FOUND);

    // 6. The objects are still there after reopening the database
    drop(p);
    let p = open(&dir);
    assert_eq!(p.state.status().await.unwrap().packets, 3);
    let interest = Interest::new(name("/producer").append_number(1));
    let stored = p.state.repo.lock().await.read_interest(&interest).unwrap().unwrap();
    assert_eq!(stored.content(), b"revision 1");
}

#[tokio::test(start_paused = true)]
async fn rejected_commands_reply_with_error_status() {
    let dir = TempDir::new().unwrap();
    let p = open(&dir);
    let parameter = RepoCommandParameter::with_name(name("/sync"));

    let unsigned = Interest::new(command_name(&prefix(), SyncVerb::Start, &parameter));
    let response = p.state.sync.on_interest(&unsigned).await.unwrap();
    assert_eq!(response.status_code, status::UNAUTHORIZED);
    assert_eq!(p.transport.subscriber_count(&name("/sync")), 0);

    let garbage = Interest::new(
        prefix()
            .append_str("sync")
            .append_str("start")
            .append(Component::generic(b"not a parameter block".to_vec())),
    )
    .sign_digest_sha256();
    let response = p.state.sync.on_interest(&garbage).await.unwrap();
    assert_eq!(response.status_code, status::MALFORMED);

    let nameless = command(&p, SyncVerb::Start, &RepoCommandParameter::default()).await;
    assert_eq!(nameless.status_code, status::MALFORMED);

    let unknown = command(&p, SyncVerb::Check, &RepoCommandParameter::with_name(name("/nowhere"))).await;
    assert_eq!(unknown.status_code, status::NOT_FOUND);

    let stop_unknown = command(&p, SyncVerb::Stop, &RepoCommandParameter::with_name(name("/nowhere"))).await;
    assert_eq!(stop_unknown.status_code, status::STOPPED);

    assert_eq!(p.state.status().await.unwrap().packets, 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_sessions_are_tracked_independently() {
    let dir = TempDir::new().unwrap();
    let p = open(&dir);
    let roots: Vec<Name> = (0..4).map(|i| name(&format!("/group/{i}"))).collect();
    let pipeline = &p;

    let started = join_all(roots.iter().map(|root| {
        let parameter = RepoCommandParameter::with_name(root.clone());
        async move { command(pipeline, SyncVerb::Start, &parameter).await }
    }))
    .await;
    assert!(started.iter().all(|r| r.status_code == status::IN_PROGRESS));

    let stop = RepoCommandParameter::with_name(roots[0].clone());
    assert_eq!(command(&p, SyncVerb::Stop, &stop).await.status_code, status::STOPPED);

    let checked = join_all(roots.iter().map(|root| {
        let parameter = RepoCommandParameter::with_name(root.clone());
        async move { command(pipeline, SyncVerb::Check, &parameter).await.status_code }
    }))
    .await;
    assert_eq!(
        checked,
        vec![status::STOPPED, status::FETCHING, status::FETCHING, status::FETCHING]
    );
    settle(1).await;
    assert_eq!(p.transport.subscriber_count(&roots[0]), 0);
    assert_eq!(p.transport.subscriber_count(&roots[1]), 1);
}
