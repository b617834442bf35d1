// ABOUTME: Sync session manager: an actor that runs start/check/stop commands and drives per-session fetch loops.
// ABOUTME: Fetched Data is validated and inserted through the shared repo; sessions stop on timeout or fetch budget.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ndnrepo_core::command::{CommandError, parse_command};
use ndnrepo_core::{
    DEFAULT_INTEREST_LIFETIME, Data, Interest, Name, RepoCommandParameter, RepoCommandResponse,
    SyncVerb, status,
};
use ndnrepo_store::{RepoError, SharedRepo};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::face::{Face, FetchError};
use crate::transport::{MissingData, SyncTransport};
use crate::validator::{ValidationError, Validator};

/// How long a stopped session stays queryable before it is forgotten.
pub const DEFAULT_SESSION_GRACE: Duration = Duration::from_secs(10);

/// Errors that can occur in the sync session manager.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync actor channel closed")]
    ChannelClosed,

    #[error("fatal insert failure: {0}")]
    Insert(#[from] RepoError),
}

/// The collaborators a sync session manager talks to.
#[derive(Clone)]
pub struct SyncHandleDeps {
    pub repo: SharedRepo,
    pub face: Arc<dyn Face>,
    pub validator: Arc<dyn Validator>,
    pub transport: Arc<dyn SyncTransport>,
}

#[derive(Debug, Clone)]
pub struct SyncHandleConfig {
    pub command_prefix: Name,
    pub session_grace: Duration,
}

impl SyncHandleConfig {
    pub fn new(command_prefix: Name) -> Self {
        Self {
            command_prefix,
            session_grace: DEFAULT_SESSION_GRACE,
        }
    }
}

#[derive(Debug)]
enum FetchOutcome {
    Valid(Data),
    Invalid(ValidationError),
    Failed(FetchError),
}

enum Message {
    Start {
        name: Name,
        parameter: RepoCommandParameter,
        reply: oneshot::Sender<RepoCommandResponse>,
    },
    Check {
        name: Name,
        reply: oneshot::Sender<RepoCommandResponse>,
    },
    Stop {
        name: Name,
        reply: oneshot::Sender<RepoCommandResponse>,
    },
    Missing {
        root: Name,
        generation: u64,
        ranges: Vec<MissingData>,
    },
    Fetched {
        root: Name,
        generation: u64,
        interest: Interest,
        outcome: FetchOutcome,
    },
    Expire {
        root: Name,
        generation: u64,
    },
}

/// Public handle for submitting commands to the sync session manager.
#[derive(Clone)]
pub struct SyncHandle {
    cmd_tx: mpsc::Sender<Message>,
    validator: Arc<dyn Validator>,
    command_prefix: Name,
}

impl SyncHandle {
    pub fn command_prefix(&self) -> &Name {
        &self.command_prefix
    }

    /// Authenticate, parse, and dispatch a command Interest.
    ///
    /// Validation failures reply 401 and unparseable parameters reply 403;
    /// neither reaches the session table.
    pub async fn on_interest(&self, interest: &Interest) -> Result<RepoCommandResponse, SyncError> {
        if let Err(e) = self.validator.validate_command(interest).await {
            warn!(name = %interest.name(), error = %e, "rejecting unauthenticated command");
            return Ok(RepoCommandResponse::with_status(status::UNAUTHORIZED));
        }
        let (verb, parameter) = match parse_command(&self.command_prefix, interest.name()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(name = %interest.name(), error = %e, "malformed command");
                return Ok(RepoCommandResponse::with_status(status::MALFORMED));
            }
        };
        debug!(%verb, name = ?parameter.name, "dispatching sync command");
        match verb {
            SyncVerb::Start => self.start(parameter).await,
            SyncVerb::Check => self.check(parameter).await,
            SyncVerb::Stop => self.stop(parameter).await,
        }
    }

    /// Start (or restart) the session named by `parameter.name`.
    pub async fn start(&self, parameter: RepoCommandParameter) -> Result<RepoCommandResponse, SyncError> {
        let Some(name) = parameter.name.clone() else {
            return Ok(malformed(CommandError::MissingParameter));
        };
        self.request(|reply| Message::Start {
            name,
            parameter,
            reply,
        })
        .await
    }

    pub async fn check(&self, parameter: RepoCommandParameter) -> Result<RepoCommandResponse, SyncError> {
        let Some(name) = parameter.name else {
            return Ok(malformed(CommandError::MissingParameter));
        };
        self.request(|reply| Message::Check { name, reply }).await
    }

    pub async fn stop(&self, parameter: RepoCommandParameter) -> Result<RepoCommandResponse, SyncError> {
        let Some(name) = parameter.name else {
            return Ok(malformed(CommandError::MissingParameter));
        };
        self.request(|reply| Message::Stop { name, reply }).await
    }

    async fn request(
        &self,
        message: impl FnOnce(oneshot::Sender<RepoCommandResponse>) -> Message,
    ) -> Result<RepoCommandResponse, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(message(tx))
            .await
            .map_err(|_| SyncError::ChannelClosed)?;
        rx.await.map_err(|_| SyncError::ChannelClosed)
    }
}

fn malformed(reason: CommandError) -> RepoCommandResponse {
    warn!(%reason, "malformed sync command");
    RepoCommandResponse::with_status(status::MALFORMED)
}

/// Spawn the session manager task.
///
/// The task ends when every `SyncHandle` is dropped, or with `SyncError::Insert`
/// if the repo rejects fetched Data for a reason other than duplication.
pub fn spawn(
    config: SyncHandleConfig,
    deps: SyncHandleDeps,
) -> (SyncHandle, JoinHandle<Result<(), SyncError>>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Message>(256);

    let handle = SyncHandle {
        cmd_tx: cmd_tx.clone(),
        validator: Arc::clone(&deps.validator),
        command_prefix: config.command_prefix.clone(),
    };

    let actor = SyncActor {
        cmd_rx,
        self_tx: cmd_tx.downgrade(),
        deps,
        session_grace: config.session_grace,
        sessions: HashMap::new(),
        next_generation: 1,
    };

    (handle, tokio::spawn(actor.run()))
}

struct Session {
    generation: u64,
    running: bool,
    response: RepoCommandResponse,
    last_activity: Instant,
    interest_lifetime: Duration,
    /// Zero means unbounded.
    sync_timeout: Duration,
    /// Zero means unbounded.
    max_interest_num: u64,
    interest_num: u64,
    insert_num: u64,
    subscription: Option<JoinHandle<()>>,
    deletion: Option<JoinHandle<()>>,
}

impl Session {
    fn new(generation: u64, parameter: &RepoCommandParameter) -> Self {
        Self {
            generation,
            running: true,
            response: RepoCommandResponse::with_status(status::FETCHING),
            last_activity: Instant::now(),
            interest_lifetime: parameter.interest_lifetime.unwrap_or(DEFAULT_INTEREST_LIFETIME),
            sync_timeout: parameter.sync_timeout.unwrap_or(Duration::ZERO),
            max_interest_num: parameter.max_interest_num.unwrap_or(0),
            interest_num: 0,
            insert_num: 0,
            subscription: None,
            deletion: None,
        }
    }

    fn should_stop(&self) -> bool {
        let timed_out =
            !self.sync_timeout.is_zero() && self.last_activity.elapsed() > self.sync_timeout;
        let exhausted = self.max_interest_num != 0 && self.interest_num >= self.max_interest_num;
        timed_out || exhausted
    }

    fn fetch_interest(&self, name: Name) -> Interest {
        Interest::new(name)
            .with_lifetime(self.interest_lifetime)
            .with_must_be_fresh(true)
    }

    fn abort_tasks(&mut self) {
        if let Some(task) = self.subscription.take() {
            task.abort();
        }
        if let Some(task) = self.deletion.take() {
            task.abort();
        }
    }
}

struct SyncActor {
    cmd_rx: mpsc::Receiver<Message>,
    self_tx: mpsc::WeakSender<Message>,
    deps: SyncHandleDeps,
    session_grace: Duration,
    sessions: HashMap<Name, Session>,
    next_generation: u64,
}

impl SyncActor {
    async fn run(mut self) -> Result<(), SyncError> {
        while let Some(message) = self.cmd_rx.recv().await {
            if let Err(e) = self.handle(message).await {
                error!(error = %e, "sync session manager stopping");
                for session in self.sessions.values_mut() {
                    session.abort_tasks();
                }
                return Err(e);
            }
        }
        for session in self.sessions.values_mut() {
            session.abort_tasks();
        }
        Ok(())
    }

    async fn handle(&mut self, message: Message) -> Result<(), SyncError> {
        match message {
            Message::Start {
                name,
                parameter,
                reply,
            } => {
                self.start(name, &parameter);
                let _ = reply.send(RepoCommandResponse::with_status(status::IN_PROGRESS));
            }
            Message::Check { name, reply } => {
                let _ = reply.send(self.check(&name));
            }
            Message::Stop { name, reply } => {
                if self.sessions.contains_key(&name) {
                    self.stop(&name);
                }
                let _ = reply.send(RepoCommandResponse::with_status(status::STOPPED));
            }
            Message::Missing {
                root,
                generation,
                ranges,
            } => self.on_missing(&root, generation, ranges),
            Message::Fetched {
                root,
                generation,
                interest,
                outcome,
            } => self.on_fetched(&root, generation, interest, outcome).await?,
            Message::Expire { root, generation } => {
                let expired = self
                    .sessions
                    .get(&root)
                    .is_some_and(|s| s.generation == generation && !s.running);
                if expired {
                    debug!(%root, "forgetting stopped session");
                    self.sessions.remove(&root);
                }
            }
        }
        Ok(())
    }

    fn start(&mut self, name: Name, parameter: &RepoCommandParameter) {
        let generation = self.next_generation;
        self.next_generation += 1;

        let mut session = Session::new(generation, parameter);
        if let Some(mut previous) = self.sessions.remove(&name) {
            previous.abort_tasks();
        }

        let mut ranges = self.deps.transport.subscribe(&name);
        let weak = self.self_tx.clone();
        let root = name.clone();
        session.subscription = Some(tokio::spawn(async move {
            while let Some(ranges) = ranges.recv().await {
                let Some(tx) = weak.upgrade() else { break };
                let message = Message::Missing {
                    root: root.clone(),
                    generation,
                    ranges,
                };
                if tx.send(message).await.is_err() {
                    break;
                }
            }
        }));

        info!(
            %name,
            generation,
            sync_timeout_ms = session.sync_timeout.as_millis() as u64,
            max_interest_num = session.max_interest_num,
            "sync session started"
        );
        self.sessions.insert(name, session);
    }

    fn check(&mut self, name: &Name) -> RepoCommandResponse {
        let Some(session) = self.sessions.get_mut(name) else {
            debug!(%name, "check for unknown session");
            return RepoCommandResponse::with_status(status::NOT_FOUND);
        };
        if !session.running {
            session.response.status_code = status::STOPPED;
        }
        session.response
    }

    /// Mark the session stopped, drop its subscription, and schedule its removal.
    fn stop(&mut self, name: &Name) {
        let grace = self.session_grace;
        let weak = self.self_tx.clone();
        let Some(session) = self.sessions.get_mut(name) else {
            return;
        };

        session.running = false;
        session.interest_num = 0;
        session.insert_num = 0;
        session.max_interest_num = 0;
        session.sync_timeout = Duration::ZERO;
        session.interest_lifetime = DEFAULT_INTEREST_LIFETIME;
        session.last_activity = Instant::now();
        session.abort_tasks();

        let root = name.clone();
        let generation = session.generation;
        session.deletion = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(Message::Expire { root, generation }).await;
            }
        }));
        info!(%name, generation, "sync session stopped");
    }

    fn on_missing(&mut self, root: &Name, generation: u64, ranges: Vec<MissingData>) {
        let Some(session) = self.running_session(root, generation) else {
            return;
        };
        let mut interests = Vec::new();
        for range in &ranges {
            for name in range.names() {
                session.last_activity = Instant::now();
                session.interest_num += 1;
                interests.push(session.fetch_interest(name));
            }
        }
        for interest in interests {
            debug!(%root, name = %interest.name(), "fetching missing data");
            self.spawn_fetch(root.clone(), generation, interest);
        }
    }

    async fn on_fetched(
        &mut self,
        root: &Name,
        generation: u64,
        interest: Interest,
        outcome: FetchOutcome,
    ) -> Result<(), SyncError> {
        if self.running_session(root, generation).is_none() {
            debug!(%root, name = %interest.name(), "dropping fetch result for inactive session");
            return Ok(());
        }

        match outcome {
            FetchOutcome::Valid(data) => {
                self.deps.repo.lock().await.insert_data(&data)?;
                if let Some(session) = self.sessions.get_mut(root) {
                    session.insert_num += 1;
                    session.response.insert_num = session.insert_num;
                }
                debug!(%root, name = %data.name(), "stored fetched data");
            }
            FetchOutcome::Invalid(e) => {
                warn!(%root, name = %interest.name(), error = %e, "fetched data failed validation");
            }
            FetchOutcome::Failed(e) => {
                debug!(%root, name = %interest.name(), error = %e, "fetch failed");
            }
        }

        if self.continue_or_stop(root) {
            self.reissue(root, generation, interest.name().clone());
        }
        Ok(())
    }

    /// Run the continuation check, stopping the session if its budget is spent.
    fn continue_or_stop(&mut self, root: &Name) -> bool {
        let Some(session) = self.sessions.get(root) else {
            return false;
        };
        if session.should_stop() {
            info!(
                %root,
                interest_num = session.interest_num,
                insert_num = session.insert_num,
                "sync session reached its limit"
            );
            self.stop(root);
            return false;
        }
        true
    }

    fn reissue(&mut self, root: &Name, generation: u64, name: Name) {
        let Some(session) = self.running_session(root, generation) else {
            return;
        };
        session.interest_num += 1;
        let interest = session.fetch_interest(name);
        self.spawn_fetch(root.clone(), generation, interest);
    }

    fn running_session(&mut self, root: &Name, generation: u64) -> Option<&mut Session> {
        self.sessions
            .get_mut(root)
            .filter(|s| s.running && s.generation == generation)
    }

    fn spawn_fetch(&self, root: Name, generation: u64, interest: Interest) {
        let face = Arc::clone(&self.deps.face);
        let validator = Arc::clone(&self.deps.validator);
        let weak = self.self_tx.clone();
        tokio::spawn(async move {
            let outcome = match face.express_interest(interest.clone()).await {
                Ok(data) => match validator.validate_data(&data).await {
                    Ok(()) => FetchOutcome::Valid(data),
                    Err(e) => FetchOutcome::Invalid(e),
                },
                Err(e) => FetchOutcome::Failed(e),
            };
            if let Some(tx) = weak.upgrade() {
                let _ = tx
                    .send(Message::Fetched {
                        root,
                        generation,
                        interest,
                        outcome,
                    })
                    .await;
            }
        });
    }
}
