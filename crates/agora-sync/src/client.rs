use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agora_types::api::{MessagePage, SendMessageRequest};
use agora_types::events::GatewayEvent;
use agora_types::models::{Channel, Message, ReactionMap, StreamId};

use crate::config::SyncConfig;
use crate::directory::ChannelDirectory;
use crate::error::ClientError;
use crate::refresh::{IntervalSource, PushSource, RefreshSource, RefreshTrigger};
use crate::transport::{ChatApi, HttpApi, StagedFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No stream selected.
    Idle,
    /// A fetch for the selected stream is in flight.
    Loading,
    /// Messages displayed; refresh triggers are honored.
    Synced,
    /// A post is in flight.
    Sending,
}

/// What the user is composing. Only cleared once the server confirms a send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compose {
    pub text: String,
    pub staged: Option<StagedFile>,
}

/// Everything a view needs to render, published after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub state: SyncState,
    pub stream: Option<StreamId>,
    pub channel_name: Option<String>,
    /// Chronological, unique by id.
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub compose: Compose,
    pub error: Option<ClientError>,
    pub directory_loaded: bool,
    /// Channel switch waiting for the directory to load.
    pub pending_channel: Option<String>,
    pub channels: Vec<Channel>,
    pub unread: BTreeMap<Uuid, u64>,
}

impl Snapshot {
    fn initial() -> Self {
        Self {
            state: SyncState::Idle,
            stream: None,
            channel_name: None,
            messages: Vec::new(),
            has_more: false,
            compose: Compose::default(),
            error: None,
            directory_loaded: false,
            pending_channel: None,
            channels: Vec::new(),
            unread: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
enum Command {
    SelectChannel(String),
    OpenThread(Uuid),
    Focus,
    SetText(String),
    StageFile(StagedFile),
    ClearStaged,
    Send,
    React { message_id: Uuid, emoji: String },
    LoadMore,
    ReloadDirectory,
}

struct SendOutcome {
    message: Message,
    refreshed: Result<MessagePage, ClientError>,
}

struct ReactOutcome {
    message_id: Uuid,
    reactions: ReactionMap,
    refreshed: Result<MessagePage, ClientError>,
}

enum Outcome {
    Directory {
        generation: u64,
        lookup: Option<String>,
        result: Result<Vec<Channel>, ClientError>,
    },
    Page {
        generation: u64,
        page: u32,
        result: Result<MessagePage, ClientError>,
    },
    Sent {
        generation: u64,
        sent: Compose,
        result: Result<SendOutcome, ClientError>,
    },
    Reacted {
        generation: u64,
        result: Result<ReactOutcome, ClientError>,
    },
}

/// Handle to a running synchronization client. Dropping it does not stop the
/// client; call [`SyncHandle::shutdown`].
pub struct SyncHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SyncHandle {
    fn command(&self, command: Command) {
        if let Err(e) = self.commands.send(command) {
            debug!("Sync client gone, dropping {:?}", e.0);
        }
    }

    /// Switch to a channel by name. Queued until the directory has loaded.
    pub fn select_channel(&self, name: impl Into<String>) {
        self.command(Command::SelectChannel(name.into()));
    }

    pub fn open_thread(&self, thread_id: Uuid) {
        self.command(Command::OpenThread(thread_id));
    }

    /// The window regained focus.
    pub fn focus(&self) {
        self.command(Command::Focus);
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.command(Command::SetText(text.into()));
    }

    pub fn stage_file(&self, file: StagedFile) {
        self.command(Command::StageFile(file));
    }

    pub fn clear_staged(&self) {
        self.command(Command::ClearStaged);
    }

    pub fn send(&self) {
        self.command(Command::Send);
    }

    pub fn react(&self, message_id: Uuid, emoji: impl Into<String>) {
        self.command(Command::React {
            message_id,
            emoji: emoji.into(),
        });
    }

    pub fn load_more(&self) {
        self.command(Command::LoadMore);
    }

    pub fn reload_directory(&self) {
        self.command(Command::ReloadDirectory);
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    /// Stop polling and abandon in-flight requests.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!("Sync client task failed: {}", e);
        }
    }
}

/// The polling state machine. Owns the local message list for the selected
/// stream and reconciles it against server pages by message id.
pub struct SyncClient<A: ChatApi> {
    api: Arc<A>,
    config: SyncConfig,
    directory: ChannelDirectory,

    state: SyncState,
    stream: Option<StreamId>,
    channel_name: Option<String>,
    messages: Vec<Message>,
    oldest_page: u32,
    has_more: bool,
    compose: Compose,
    error: Option<ClientError>,
    /// Whether `error` came from a fetch, which the next good fetch clears.
    error_from_fetch: bool,
    pending_channel: Option<String>,
    /// Name of the newest cache-miss lookup still waiting on the server.
    requested_lookup: Option<String>,

    /// Bumped on every stream switch; results tagged with an older value are stale.
    generation: u64,
    fetch_in_flight: bool,
    load_more_in_flight: bool,
    send_in_flight: bool,
    directory_in_flight: bool,

    cancel: CancellationToken,
    view_cancel: CancellationToken,
    outcomes_tx: mpsc::UnboundedSender<Outcome>,
    outcomes_rx: mpsc::UnboundedReceiver<Outcome>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl SyncClient<HttpApi> {
    /// Client over HTTP, refreshing on a fixed interval.
    pub fn polling(config: SyncConfig) -> Result<SyncHandle, ClientError> {
        let api = HttpApi::new(config.clone())?;
        let source = IntervalSource::new(config.poll_interval);
        Ok(Self::spawn(api, config, source))
    }

    /// Client over HTTP, refreshing on gateway pushes instead of a timer.
    pub async fn with_gateway(config: SyncConfig) -> Result<SyncHandle, ClientError> {
        let api = HttpApi::new(config.clone())?;
        let source = PushSource::connect(&config).await?;
        Ok(Self::spawn(api, config, source))
    }
}

impl<A: ChatApi> SyncClient<A> {
    fn new(api: A, config: SyncConfig) -> Self {
        let cancel = CancellationToken::new();
        let view_cancel = cancel.child_token();
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(Snapshot::initial());
        Self {
            api: Arc::new(api),
            config,
            directory: ChannelDirectory::new(),
            state: SyncState::Idle,
            stream: None,
            channel_name: None,
            messages: Vec::new(),
            oldest_page: 1,
            has_more: false,
            compose: Compose::default(),
            error: None,
            error_from_fetch: false,
            pending_channel: None,
            requested_lookup: None,
            generation: 0,
            fetch_in_flight: false,
            load_more_in_flight: false,
            send_in_flight: false,
            directory_in_flight: false,
            cancel,
            view_cancel,
            outcomes_tx,
            outcomes_rx,
            snapshot_tx,
        }
    }

    /// Start the client on the current tokio runtime.
    pub fn spawn<S: RefreshSource>(api: A, config: SyncConfig, source: S) -> SyncHandle {
        let client = Self::new(api, config);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let snapshot = client.snapshot_tx.subscribe();
        let cancel = client.cancel.clone();
        let task = tokio::spawn(client.run(source, command_rx));
        SyncHandle {
            commands: command_tx,
            snapshot,
            cancel,
            task,
        }
    }

    async fn run<S: RefreshSource>(mut self, mut source: S, mut commands: mpsc::UnboundedReceiver<Command>) {
        let cancel = self.cancel.clone();
        let mut source_open = true;
        self.start_directory_load(None);
        self.publish();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, &mut source),
                    None => break,
                },
                Some(outcome) = self.outcomes_rx.recv() => self.handle_outcome(outcome, &mut source),
                trigger = source.next(), if source_open => match trigger {
                    Some(trigger) => self.handle_trigger(trigger),
                    None => {
                        warn!("Refresh source closed; only explicit refreshes remain");
                        source_open = false;
                    }
                },
            }
            self.publish();
        }

        self.cancel.cancel();
        debug!("Sync client stopped");
    }

    fn handle_command<S: RefreshSource>(&mut self, command: Command, source: &mut S) {
        match command {
            Command::SelectChannel(name) => self.select_channel(name, source),
            Command::OpenThread(thread_id) => self.switch_to(StreamId::Thread(thread_id), None, source),
            Command::Focus => self.handle_trigger(RefreshTrigger::Focus),
            Command::SetText(text) => self.compose.text = text,
            Command::StageFile(file) => self.compose.staged = Some(file),
            Command::ClearStaged => self.compose.staged = None,
            Command::Send => self.start_send(),
            Command::React { message_id, emoji } => self.start_react(message_id, emoji),
            Command::LoadMore => self.start_load_more(),
            Command::ReloadDirectory => self.start_directory_load(None),
        }
    }

    fn select_channel<S: RefreshSource>(&mut self, name: String, source: &mut S) {
        if !self.directory.is_loaded() {
            debug!("Directory not loaded yet, queueing switch to '{}'", name);
            self.pending_channel = Some(name);
            if !self.directory_in_flight {
                self.start_directory_load(None);
            }
            return;
        }
        match self.directory.resolve(&name) {
            Some(id) => self.switch_to(StreamId::Channel(id), Some(name), source),
            // Cache miss: ask the server before giving up on the name.
            None => {
                self.requested_lookup = Some(name.clone());
                self.start_directory_load(Some(name));
            }
        }
    }

    fn switch_to<S: RefreshSource>(&mut self, stream: StreamId, name: Option<String>, source: &mut S) {
        info!("Switching to {}", stream);
        self.view_cancel.cancel();
        self.view_cancel = self.cancel.child_token();
        self.generation += 1;

        // The newest explicit switch supersedes queued and in-flight lookups.
        self.pending_channel = None;
        self.requested_lookup = None;
        self.stream = Some(stream);
        self.channel_name = name;
        self.messages.clear();
        self.oldest_page = 1;
        self.has_more = false;
        self.error = None;
        self.fetch_in_flight = false;
        self.load_more_in_flight = false;
        if self.state != SyncState::Sending {
            self.state = SyncState::Loading;
        }

        source.retarget(Some(stream));
        self.start_fetch();
    }

    fn handle_trigger(&mut self, trigger: RefreshTrigger) {
        if !self.directory_in_flight && (!self.directory.is_loaded() || self.pending_channel.is_some()) {
            self.start_directory_load(None);
        }

        match trigger {
            RefreshTrigger::Tick | RefreshTrigger::Focus => self.start_fetch(),
            RefreshTrigger::Push(GatewayEvent::MessageCreate { message }) => {
                if message.stream().is_some() && message.stream() == self.stream {
                    self.start_fetch();
                } else if let Some(channel_id) = message.channel_id {
                    self.directory.note_new_message(channel_id);
                }
            }
            RefreshTrigger::Push(GatewayEvent::ReactionToggle { stream, .. }) => {
                if Some(stream) == self.stream {
                    self.start_fetch();
                }
            }
            RefreshTrigger::Push(_) => {}
        }
    }

    fn handle_outcome<S: RefreshSource>(&mut self, outcome: Outcome, source: &mut S) {
        match outcome {
            Outcome::Directory {
                generation,
                lookup,
                result,
            } => {
                self.directory_in_flight = false;
                let lookup = lookup.filter(|name| {
                    let current =
                        generation == self.generation && self.requested_lookup.as_deref() == Some(name.as_str());
                    if !current {
                        debug!("Discarding stale lookup for '{}'", name);
                    }
                    current
                });
                if lookup.is_some() {
                    self.requested_lookup = None;
                }
                match result {
                    Ok(channels) => {
                        self.directory.load(channels);
                        if let Some(StreamId::Channel(id)) = self.stream {
                            if let Some(name) = self.directory.name_of(id) {
                                self.channel_name = Some(name.to_string());
                            }
                        }
                        // An explicit lookup is newer than any queued switch.
                        let pending = self.pending_channel.take();
                        if let Some(name) = lookup.or(pending) {
                            match self.directory.resolve(&name) {
                                Some(id) => self.switch_to(StreamId::Channel(id), Some(name), source),
                                None => {
                                    warn!("No channel named '{}'", name);
                                    self.action_failed(ClientError::UnknownChannel(name));
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Directory load failed: {}", e);
                        if let Some(name) = lookup {
                            self.pending_channel.get_or_insert(name);
                        }
                        self.action_failed(e);
                    }
                }
            }
            Outcome::Page {
                generation,
                page,
                result,
            } => {
                if generation != self.generation {
                    debug!("Discarding stale page {} (generation {})", page, generation);
                    return;
                }
                if page == 1 {
                    self.fetch_in_flight = false;
                } else {
                    self.load_more_in_flight = false;
                }
                match result {
                    Ok(fetched) => {
                        self.apply_page(page, fetched);
                        self.fetch_succeeded();
                    }
                    Err(e) => {
                        warn!("Fetch of page {} failed: {}", page, e);
                        self.fetch_failed(e);
                    }
                }
                if self.state == SyncState::Loading {
                    self.state = SyncState::Synced;
                }
            }
            Outcome::Sent {
                generation,
                sent,
                result,
            } => {
                self.send_in_flight = false;
                if self.state == SyncState::Sending {
                    self.state = if self.stream.is_some() {
                        SyncState::Synced
                    } else {
                        SyncState::Idle
                    };
                }
                match result {
                    Ok(SendOutcome { message, refreshed }) => {
                        if generation == self.generation {
                            self.merge(vec![message]);
                            match refreshed {
                                Ok(page) => self.apply_page(1, page),
                                Err(e) => debug!("Refetch after send failed: {}", e),
                            }
                        }
                        // Keep whatever was typed or staged while the send was in flight.
                        if self.compose.text == sent.text {
                            self.compose.text.clear();
                        }
                        if self.compose.staged == sent.staged {
                            self.compose.staged = None;
                        }
                        self.error = None;
                    }
                    Err(e) => {
                        warn!("Send failed: {}", e);
                        self.action_failed(e);
                    }
                }
            }
            Outcome::Reacted { generation, result } => {
                if generation != self.generation {
                    return;
                }
                match result {
                    Ok(ReactOutcome {
                        message_id,
                        reactions,
                        refreshed,
                    }) => {
                        if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
                            message.reactions = reactions;
                        }
                        match refreshed {
                            Ok(page) => self.apply_page(1, page),
                            Err(e) => debug!("Refetch after reaction failed: {}", e),
                        }
                        self.error = None;
                    }
                    Err(e) => {
                        warn!("Reaction failed: {}", e);
                        self.action_failed(e);
                    }
                }
            }
        }
    }

    fn fetch_failed(&mut self, e: ClientError) {
        self.error = Some(e);
        self.error_from_fetch = true;
    }

    fn fetch_succeeded(&mut self) {
        if self.error_from_fetch {
            self.error = None;
            self.error_from_fetch = false;
        }
    }

    /// Send, reaction and lookup failures stay visible until the next action.
    fn action_failed(&mut self, e: ClientError) {
        self.error = Some(e);
        self.error_from_fetch = false;
    }

    fn apply_page(&mut self, page: u32, fetched: MessagePage) {
        if page == 1 {
            // Older pages already loaded keep governing `has_more`.
            if self.oldest_page == 1 {
                self.has_more = fetched.pagination.has_more;
            }
        } else if page > self.oldest_page {
            self.oldest_page = page;
            self.has_more = fetched.pagination.has_more;
        }
        if let Some(StreamId::Channel(channel_id)) = self.stream {
            self.directory.mark_read(channel_id, fetched.pagination.total);
        }
        self.merge(fetched.messages);
    }

    /// Reconcile incoming messages by id: known ids are replaced with the
    /// server's copy, new ids are inserted, and order is chronological.
    fn merge(&mut self, incoming: Vec<Message>) {
        for message in incoming {
            if self.stream.is_some() && message.stream() != self.stream {
                continue;
            }
            match self.messages.iter_mut().find(|m| m.id == message.id) {
                Some(existing) => *existing = message,
                None => self.messages.push(message),
            }
        }
        self.messages.sort_by_key(Message::sort_key);
    }

    fn spawn_task<F>(&self, token: CancellationToken, task: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let tx = self.outcomes_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                outcome = task => {
                    let _ = tx.send(outcome);
                }
            }
        });
    }

    fn start_directory_load(&mut self, lookup: Option<String>) {
        self.directory_in_flight = true;
        let api = self.api.clone();
        let generation = self.generation;
        self.spawn_task(self.cancel.child_token(), async move {
            let result = api.list_channels().await;
            Outcome::Directory {
                generation,
                lookup,
                result,
            }
        });
    }

    fn start_fetch(&mut self) {
        let Some(stream) = self.stream else { return };
        if self.fetch_in_flight {
            return;
        }
        self.fetch_in_flight = true;
        if self.state == SyncState::Synced {
            self.state = SyncState::Loading;
        }

        let api = self.api.clone();
        let generation = self.generation;
        let limit = self.config.page_size;
        self.spawn_task(self.view_cancel.clone(), async move {
            let result = api.list_messages(stream, 1, limit).await;
            Outcome::Page {
                generation,
                page: 1,
                result,
            }
        });
    }

    fn start_load_more(&mut self) {
        let Some(stream) = self.stream else { return };
        if !self.has_more || self.load_more_in_flight {
            return;
        }
        self.load_more_in_flight = true;

        let api = self.api.clone();
        let generation = self.generation;
        let page = self.oldest_page + 1;
        let limit = self.config.page_size;
        self.spawn_task(self.view_cancel.clone(), async move {
            let result = api.list_messages(stream, page, limit).await;
            Outcome::Page {
                generation,
                page,
                result,
            }
        });
    }

    fn start_send(&mut self) {
        if self.send_in_flight {
            return;
        }
        let Some(stream) = self.stream else {
            self.action_failed(ClientError::Validation("No channel selected".into()));
            return;
        };
        let content = self.compose.text.trim().to_string();
        if content.is_empty() && self.compose.staged.is_none() {
            self.action_failed(ClientError::Validation("Message content is required".into()));
            return;
        }

        self.send_in_flight = true;
        self.state = SyncState::Sending;

        let api = self.api.clone();
        let sent = self.compose.clone();
        let staged = sent.staged.clone();
        let generation = self.generation;
        let limit = self.config.page_size;
        let upload_timeout = self.config.upload_timeout;
        // Sends outlive a stream switch; only shutdown abandons them.
        self.spawn_task(self.cancel.child_token(), async move {
            let result: Result<SendOutcome, ClientError> = async {
                let (file_url, file_type) = match staged {
                    Some(file) => {
                        let uploaded = tokio::time::timeout(upload_timeout, api.upload(file))
                            .await
                            .map_err(|_| ClientError::Timeout)??;
                        (Some(uploaded.url), Some(uploaded.file_type))
                    }
                    None => (None, None),
                };
                let req = SendMessageRequest {
                    content,
                    file_url,
                    file_type,
                };
                let message = api.send_message(stream, req).await?;
                let refreshed = api.list_messages(stream, 1, limit).await;
                Ok(SendOutcome { message, refreshed })
            }
            .await;
            Outcome::Sent {
                generation,
                sent,
                result,
            }
        });
    }

    fn start_react(&mut self, message_id: Uuid, emoji: String) {
        let Some(stream) = self.stream else { return };
        let api = self.api.clone();
        let generation = self.generation;
        let limit = self.config.page_size;
        self.spawn_task(self.view_cancel.clone(), async move {
            let result: Result<ReactOutcome, ClientError> = async {
                let toggled = api.toggle_reaction(message_id, emoji).await?;
                let refreshed = api.list_messages(stream, 1, limit).await;
                Ok(ReactOutcome {
                    message_id,
                    reactions: toggled.reactions,
                    refreshed,
                })
            }
            .await;
            Outcome::Reacted { generation, result }
        });
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            stream: self.stream,
            channel_name: self.channel_name.clone(),
            messages: self.messages.clone(),
            has_more: self.has_more,
            compose: self.compose.clone(),
            error: self.error.clone(),
            directory_loaded: self.directory.is_loaded(),
            pending_channel: self.pending_channel.clone(),
            channels: self.directory.channels().to_vec(),
            unread: self.directory.unread_counts(),
        }
    }

    fn publish(&self) {
        let next = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
