use crate::core::config::Credentials;
use crate::core::converter::WsConverter;
use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::{sign_ws_handshake, Signer};
use crate::core::kernel::ws::{WsConfig, WsTransport};
use crate::core::types::{ApiError, Endpoint, Entity, ErrorCode, Parsed, Subscription};
use serde_json::Value;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, error, info, instrument, warn};

/// Connection lifecycle of a `WsClient`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsState {
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
    Subscribed,
    Reconnecting,
    /// Terminal: no command or reconnect is processed any more
    Closed,
}

impl fmt::Display for WsState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Item delivered to the consumer, in frame arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    Data(Entity),
    Error(ApiError),
}

type Reply<T> = oneshot::Sender<Result<T, ExchangeError>>;

enum WsCommand {
    Connect(Reply<()>),
    Subscribe(Endpoint, Vec<String>, Reply<()>),
    Unsubscribe(Endpoint, Vec<String>, Reply<()>),
    Subscriptions(oneshot::Sender<Vec<Subscription>>),
    Close(oneshot::Sender<()>),
}

/// Commands that arrived while the worker waited on the transport or the
/// event consumer; replayed before the next frame is read
#[derive(Default)]
struct Backlog {
    commands: VecDeque<WsCommand>,
    closing: bool,
}

impl Backlog {
    /// Queue a command taken off the channel; `None` means the handle is gone
    fn stash(&mut self, command: Option<WsCommand>) {
        match command {
            Some(command) => {
                self.closing |= matches!(command, WsCommand::Close(_));
                self.commands.push_back(command);
            }
            None => self.closing = true,
        }
    }
}

struct HandshakeSigning {
    credentials: Credentials,
    signer: Arc<dyn Signer>,
}

/// Configures and spawns a `WsClient`
pub struct WsClientBuilder<T: WsTransport> {
    converter: WsConverter,
    transport: T,
    config: WsConfig,
    url: Option<String>,
    signing: Option<HandshakeSigning>,
}

impl<T: WsTransport> WsClientBuilder<T> {
    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the converter's base URL
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Authenticate every handshake with `credentials`
    pub fn with_auth(mut self, credentials: Credentials, signer: Arc<dyn Signer>) -> Self {
        self.signing = Some(HandshakeSigning {
            credentials,
            signer,
        });
        self
    }

    /// Start the connection task; must be called inside a tokio runtime.
    ///
    /// The client starts `Disconnected`; call [`WsClient::connect`] to open it.
    pub fn spawn(self) -> (WsClient, mpsc::Receiver<WsEvent>) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::channel(self.config.message_buffer_size.max(1));
        let (state_tx, state_rx) = watch::channel(WsState::Disconnected);

        let worker = WsWorker {
            url: self.url.unwrap_or_else(|| self.converter.converter().base_url()),
            reconnect_delays: reconnect_strategy(&self.config),
            transport: self.transport,
            converter: self.converter,
            config: self.config,
            signing: self.signing,
            subscriptions: BTreeSet::new(),
            state: state_tx,
            events: event_tx,
            commands: command_rx,
            backlog: Backlog::default(),
            reconnect_attempt: 0,
            reconnect_at: None,
        };
        let task = tokio::spawn(worker.run());

        (
            WsClient {
                commands: command_tx,
                state: state_rx,
                task: Some(task),
            },
            event_rx,
        )
    }
}

/// Handle over one WebSocket connection task.
///
/// The task owns the transport and the subscription set; the handle only
/// sends commands. Dropping the handle closes the connection.
pub struct WsClient {
    commands: mpsc::Sender<WsCommand>,
    state: watch::Receiver<WsState>,
    task: Option<JoinHandle<()>>,
}

impl WsClient {
    pub fn builder<T: WsTransport>(converter: WsConverter, transport: T) -> WsClientBuilder<T> {
        WsClientBuilder {
            converter,
            transport,
            config: WsConfig::default(),
            url: None,
            signing: None,
        }
    }

    pub fn state(&self) -> WsState {
        *self.state.borrow()
    }

    /// Receiver observing every state transition
    pub fn state_changes(&self) -> watch::Receiver<WsState> {
        self.state.clone()
    }

    /// Open the connection and re-issue the current subscription set
    pub async fn connect(&self) -> Result<(), ExchangeError> {
        let (reply, response) = oneshot::channel();
        self.send(WsCommand::Connect(reply)).await?;
        response.await.map_err(|_| task_gone())?
    }

    /// Add `symbols` of `endpoint` to the subscription set
    pub async fn subscribe(&self, endpoint: Endpoint, symbols: &[&str]) -> Result<(), ExchangeError> {
        let (reply, response) = oneshot::channel();
        self.send(WsCommand::Subscribe(endpoint, owned(symbols), reply))
            .await?;
        response.await.map_err(|_| task_gone())?
    }

    pub async fn unsubscribe(
        &self,
        endpoint: Endpoint,
        symbols: &[&str],
    ) -> Result<(), ExchangeError> {
        let (reply, response) = oneshot::channel();
        self.send(WsCommand::Unsubscribe(endpoint, owned(symbols), reply))
            .await?;
        response.await.map_err(|_| task_gone())?
    }

    /// Snapshot of the authoritative subscription set
    pub async fn subscriptions(&self) -> Result<Vec<Subscription>, ExchangeError> {
        let (reply, response) = oneshot::channel();
        self.send(WsCommand::Subscriptions(reply)).await?;
        response.await.map_err(|_| task_gone())
    }

    /// Close the connection and stop the task; idempotent
    pub async fn close(&mut self) -> Result<(), ExchangeError> {
        let (reply, response) = oneshot::channel();
        if self.commands.send(WsCommand::Close(reply)).await.is_ok() {
            let _ = response.await;
        }
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| ExchangeError::Other(format!("WebSocket task failed: {}", e)))?;
        }
        Ok(())
    }

    async fn send(&self, command: WsCommand) -> Result<(), ExchangeError> {
        self.commands.send(command).await.map_err(|_| task_gone())
    }
}

fn owned(symbols: &[&str]) -> Vec<String> {
    symbols.iter().map(|symbol| (*symbol).to_string()).collect()
}

fn task_gone() -> ExchangeError {
    ExchangeError::NetworkError("WebSocket client is closed".to_string())
}

fn closing() -> ExchangeError {
    ExchangeError::NetworkError("Connection attempt abandoned: client closing".to_string())
}

fn reconnect_strategy(config: &WsConfig) -> ExponentialBackoff {
    ExponentialBackoff::from_millis(2)
        .factor(config.reconnect_delay_ms / 2)
        .max_delay(Duration::from_millis(config.max_reconnect_delay_ms))
}

struct WsWorker<T: WsTransport> {
    transport: T,
    converter: WsConverter,
    config: WsConfig,
    url: String,
    signing: Option<HandshakeSigning>,
    subscriptions: BTreeSet<Subscription>,
    state: watch::Sender<WsState>,
    events: mpsc::Sender<WsEvent>,
    commands: mpsc::Receiver<WsCommand>,
    backlog: Backlog,
    reconnect_delays: ExponentialBackoff,
    reconnect_attempt: u32,
    reconnect_at: Option<Instant>,
}

impl<T: WsTransport> WsWorker<T> {
    async fn run(mut self) {
        loop {
            while let Some(command) = self.backlog.commands.pop_front() {
                if !self.handle_command(command).await {
                    return;
                }
            }
            if self.backlog.closing {
                debug!(platform = %self.converter.platform(), "Client handle dropped");
                self.shutdown().await;
                return;
            }

            let reconnect_at = self.reconnect_at;
            let connected = self.transport.is_connected();

            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        debug!(platform = %self.converter.platform(), "Client handle dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                frame = self.transport.next_frame(), if connected => self.handle_frame(frame).await,
                _ = sleep_until(reconnect_at.unwrap_or_else(Instant::now)), if reconnect_at.is_some() => {
                    self.reconnect().await;
                }
            }
        }
    }

    fn set_state(&self, state: WsState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(platform = %self.converter.platform(), from = %previous, to = %state, "WebSocket state changed");
        }
    }

    fn current_state(&self) -> WsState {
        *self.state.borrow()
    }

    /// Returns `false` once the client is closed
    async fn handle_command(&mut self, command: WsCommand) -> bool {
        match command {
            WsCommand::Connect(reply) => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            WsCommand::Subscribe(endpoint, symbols, reply) => {
                let added: Vec<Subscription> = symbols
                    .into_iter()
                    .map(|symbol| Subscription::new(endpoint, symbol))
                    .filter(|subscription| self.subscriptions.insert(subscription.clone()))
                    .collect();
                let result = self.apply_change(&added, true).await;
                let _ = reply.send(result);
            }
            WsCommand::Unsubscribe(endpoint, symbols, reply) => {
                let removed: Vec<Subscription> = symbols
                    .into_iter()
                    .map(|symbol| Subscription::new(endpoint, symbol))
                    .filter(|subscription| self.subscriptions.remove(subscription))
                    .collect();
                let result = self.apply_change(&removed, false).await;
                let _ = reply.send(result);
            }
            WsCommand::Subscriptions(reply) => {
                let _ = reply.send(self.subscriptions.iter().cloned().collect());
            }
            WsCommand::Close(reply) => {
                self.shutdown().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    async fn connect(&mut self) -> Result<(), ExchangeError> {
        if self.transport.is_connected() {
            return Ok(());
        }
        self.reconnect_at = None;
        match self.open().await {
            Ok(()) => {
                self.reconnect_attempt = 0;
                Ok(())
            }
            Err(err) => {
                let _ = self.transport.close().await;
                self.set_state(WsState::Disconnected);
                Err(err)
            }
        }
    }

    /// Connect and restore the whole subscription set
    #[instrument(skip(self), fields(platform = %self.converter.platform(), subscriptions = self.subscriptions.len()))]
    async fn open(&mut self) -> Result<(), ExchangeError> {
        self.set_state(WsState::Connecting);
        let url = self.converter.url_for(&self.url, &self.subscriptions);
        let headers = self.handshake_headers()?;
        self.connect_transport(&url, &headers).await?;
        self.set_state(WsState::Connected);
        info!(%url, "WebSocket connected");

        if self.subscriptions.is_empty() {
            return Ok(());
        }
        if self.converter.subscription_command_supported() {
            let command = self.converter.subscribe_command(&self.subscriptions);
            self.send_command(command).await
        } else {
            self.set_state(WsState::Subscribed);
            Ok(())
        }
    }

    /// Open the transport while still taking commands, so a close is not
    /// held up by a slow handshake
    async fn connect_transport(
        &mut self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<(), ExchangeError> {
        if self.backlog.closing {
            return Err(closing());
        }
        let connect = self.transport.connect(url, headers);
        tokio::pin!(connect);
        loop {
            tokio::select! {
                biased;

                result = &mut connect => return result,
                command = self.commands.recv(), if !self.backlog.closing => {
                    self.backlog.stash(command);
                }
            }
            if self.backlog.closing {
                return Err(closing());
            }
        }
    }

    fn handshake_headers(&self) -> Result<Vec<(String, String)>, ExchangeError> {
        match (&self.signing, self.converter.auth()) {
            (Some(signing), Some(auth)) => {
                sign_ws_handshake(auth, &signing.credentials, signing.signer.as_ref())
            }
            (Some(_), None) => {
                warn!("Credentials given but the platform has no authenticated stream, ignored");
                Ok(Vec::new())
            }
            (None, Some(_)) => {
                info!("Not authenticating: no API credentials");
                Ok(Vec::new())
            }
            (None, None) => Ok(Vec::new()),
        }
    }

    async fn send_command(&mut self, command: Option<Value>) -> Result<(), ExchangeError> {
        let Some(command) = command else {
            return Ok(());
        };
        self.set_state(WsState::Subscribing);
        self.transport.send(&command).await?;
        self.set_state(if self.subscriptions.is_empty() {
            WsState::Connected
        } else {
            WsState::Subscribed
        });
        Ok(())
    }

    /// Propagate a change of the subscription set to the live connection
    async fn apply_change(
        &mut self,
        changed: &[Subscription],
        subscribe: bool,
    ) -> Result<(), ExchangeError> {
        if changed.is_empty() || !self.transport.is_connected() {
            // picked up by the next connect
            return Ok(());
        }

        if self.converter.subscription_command_supported() {
            let command = if subscribe {
                self.converter.subscribe_command(changed)
            } else {
                self.converter.unsubscribe_command(changed)
            };
            if let Err(err) = self.send_command(command).await {
                self.connection_lost(&err.to_string()).await;
                return Err(err);
            }
            Ok(())
        } else {
            debug!("Subscription set changed, reconnecting with a new URL");
            let _ = self.transport.close().await;
            if let Err(err) = self.open().await {
                self.connection_lost(&err.to_string()).await;
                return Err(err);
            }
            Ok(())
        }
    }

    async fn handle_frame(&mut self, frame: Option<Result<Value, ExchangeError>>) {
        match frame {
            Some(Ok(frame)) => match self.converter.parse_frame(&frame) {
                Parsed::Error(err) => self.emit(WsEvent::Error(err)).await,
                Parsed::Entity(entity) => self.emit(WsEvent::Data(entity)).await,
                Parsed::Entities(entities) => {
                    for entity in entities {
                        self.emit(WsEvent::Data(entity)).await;
                    }
                }
            },
            Some(Err(err)) if self.transport.is_connected() => {
                warn!("Undecodable frame: {}", err);
                self.emit(WsEvent::Error(err.into())).await;
            }
            Some(Err(err)) => self.connection_lost(&err.to_string()).await,
            None => self.connection_lost("connection closed by peer").await,
        }
    }

    /// Deliver one event, waiting for buffer space while still taking
    /// commands; once closing, events are discarded
    async fn emit(&mut self, event: WsEvent) {
        while !self.backlog.closing {
            tokio::select! {
                biased;

                permit = self.events.reserve() => {
                    match permit {
                        Ok(permit) => permit.send(event),
                        Err(_) => debug!("Event receiver dropped, event discarded"),
                    }
                    return;
                }
                command = self.commands.recv() => self.backlog.stash(command),
            }
        }
    }

    async fn connection_lost(&mut self, reason: &str) {
        warn!(platform = %self.converter.platform(), reason, "WebSocket connection lost");
        let _ = self.transport.close().await;
        self.reconnect_attempt = 0;
        self.reconnect_delays = reconnect_strategy(&self.config);
        self.schedule_reconnect().await;
    }

    async fn schedule_reconnect(&mut self) {
        let max_attempts = self.config.max_reconnect_attempts;
        if max_attempts > 0 && self.reconnect_attempt >= max_attempts {
            error!(attempts = self.reconnect_attempt, "Giving up reconnecting");
            self.reconnect_at = None;
            self.set_state(WsState::Disconnected);
            self.emit(WsEvent::Error(ApiError::new(
                ErrorCode::Network,
                format!(
                    "Reconnection failed after {} attempts",
                    self.reconnect_attempt
                ),
            )))
            .await;
            return;
        }

        let delay = self
            .reconnect_delays
            .next()
            .unwrap_or_else(|| Duration::from_millis(self.config.max_reconnect_delay_ms));
        debug!(?delay, attempt = self.reconnect_attempt + 1, "Reconnect scheduled");
        self.reconnect_at = Some(Instant::now() + delay);
        self.set_state(WsState::Reconnecting);
    }

    async fn reconnect(&mut self) {
        self.reconnect_at = None;
        self.reconnect_attempt += 1;
        info!(attempt = self.reconnect_attempt, "Reconnecting");

        match self.open().await {
            Ok(()) => {
                info!(subscriptions = self.subscriptions.len(), "Reconnected");
                self.reconnect_attempt = 0;
                self.reconnect_delays = reconnect_strategy(&self.config);
            }
            Err(_) if self.backlog.closing => {}
            Err(err) => {
                warn!(attempt = self.reconnect_attempt, "Reconnect failed: {}", err);
                let _ = self.transport.close().await;
                self.schedule_reconnect().await;
            }
        }
    }

    async fn shutdown(&mut self) {
        self.reconnect_at = None;
        if self.current_state() != WsState::Closed {
            if let Err(err) = self.transport.close().await {
                warn!("Error closing WebSocket: {}", err);
            }
            self.set_state(WsState::Closed);
            info!(platform = %self.converter.platform(), "WebSocket closed");
        }
    }
}
