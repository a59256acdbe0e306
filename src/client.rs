//! High-level client: `WatchlistClient`, the watchlist sync engine.
//!
//! The client owns the watch state (subscribed tickers + price history) and a
//! background tokio task that manages the feed connection:
//! - connect with timeout, subscribe with the current ticker set
//! - single read loop decoding frames and merging them into history
//! - resubscribe on ticker changes, answer pings, idle timeout
//! - reconnect through a pluggable backoff strategy
//!
//! The public API never blocks on I/O. It talks to the task over an mpsc
//! command channel; observers receive [`WatchEvent`]s.

use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::time::Duration;

use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::domain::price_history::{Gain, GainPeriod, PriceBar};
use crate::domain::watchlist::{TickerChange, WatchState};
use crate::error::WsError;
use crate::shared::{Period, Ticker};
use crate::ws::codec::{decode_update, encode_subscription};
use crate::ws::reconnect::BackoffStrategy;
use crate::ws::transport::{CloseInfo, Connection, Connector, Frame, FrameSink, FrameStream};
use crate::ws::{ConnectionState, WatchEvent, WsConfig};

// ─── Commands from public API to background task ─────────────────────────────

enum Command {
    /// Send the current subscription set again.
    Resubscribe,
    Disconnect,
}

// ─── Disconnect reasons for reconnection decision ────────────────────────────

enum DisconnectReason {
    UserRequested,
    NormalClose,
    IdleTimeout,
    Error(String),
}

enum ConnectOutcome {
    Connected(Connection),
    Cancelled,
    Failed(WsError),
}

// ─── State shared between the client and its task ────────────────────────────

struct Shared {
    watch: RwLock<WatchState>,
    conn_state: AtomicU8,
    /// Bumped on every connect/disconnect; tasks from older generations go quiet.
    /// Held while a task checks its generation and writes shared state.
    generation: Mutex<u64>,
    event_tx: mpsc::Sender<WatchEvent>,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, WatchState> {
        self.watch.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WatchState> {
        self.watch.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new generation in `state` and return it.
    fn advance(&self, state: ConnectionState) -> u64 {
        let mut generation = self.lifecycle();
        *generation += 1;
        self.set_state(state);
        *generation
    }

    fn emit(&self, event: WatchEvent) {
        let _ = self.event_tx.try_send(event);
    }

    fn set_state(&self, state: ConnectionState) {
        let prev = self.conn_state.swap(state as u8, Ordering::SeqCst);
        if prev != state as u8 {
            tracing::debug!("Connection state: {:?}", state);
            self.emit(WatchEvent::State(state));
        }
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from(self.conn_state.load(Ordering::SeqCst))
    }
}

// ─── Background task state ───────────────────────────────────────────────────

struct TaskState {
    url: String,
    connect_timeout: Duration,
    idle_timeout: Option<Duration>,
    connector: Arc<dyn Connector>,
    backoff: Box<dyn BackoffStrategy>,
    shared: Arc<Shared>,
    cmd_rx: mpsc::Receiver<Command>,
    generation: u64,
}

impl TaskState {
    /// The lifecycle lock, if this task still owns the current generation.
    fn current(&self) -> Option<MutexGuard<'_, u64>> {
        let generation = self.shared.lifecycle();
        (*generation == self.generation).then_some(generation)
    }

    fn set_state(&self, state: ConnectionState) {
        if let Some(_current) = self.current() {
            self.shared.set_state(state);
        }
    }

    fn emit(&self, event: WatchEvent) {
        if let Some(_current) = self.current() {
            self.shared.emit(event);
        }
    }
}

// ─── Public WatchlistClient ──────────────────────────────────────────────────

/// Live watchlist: subscribed tickers, their price history, and the feed
/// connection keeping both in sync.
///
/// # Example
///
/// ```ignore
/// use quantpulse::prelude::*;
/// use futures_util::StreamExt;
///
/// let mut client = WatchlistClient::new(WsConfig::default());
/// client.set_tickers(["AAPL", "GOOGL", "TSLA"]);
/// client.connect()?;
///
/// let mut events = client.events();
/// while let Some(event) = events.next().await {
///     if let WatchEvent::HistoryUpdated(tickers) = event {
///         for ticker in tickers {
///             if let Some(bar) = client.latest(ticker.as_str()) {
///                 println!("{ticker} ${:.2} {}", bar.close, bar.gain().unwrap());
///             }
///         }
///     }
/// }
/// ```
pub struct WatchlistClient {
    config: WsConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
    cmd_tx: Option<mpsc::Sender<Command>>,
    event_rx: tokio::sync::Mutex<mpsc::Receiver<WatchEvent>>,
    task_handle: Option<JoinHandle<()>>,
}

impl WatchlistClient {
    /// Create a client using the native WebSocket transport. Does not connect yet.
    #[cfg(feature = "ws-native")]
    pub fn new(config: WsConfig) -> Self {
        Self::with_connector(config, crate::ws::native::NativeConnector)
    }

    /// Create a client over a custom transport. Does not connect yet.
    pub fn with_connector(config: WsConfig, connector: impl Connector) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity.max(1));
        let shared = Shared {
            watch: RwLock::new(WatchState::new(config.period)),
            conn_state: AtomicU8::new(ConnectionState::Disconnected as u8),
            generation: Mutex::new(0),
            event_tx,
        };
        Self {
            config,
            connector: Arc::new(connector),
            shared: Arc::new(shared),
            cmd_tx: None,
            event_rx: tokio::sync::Mutex::new(event_rx),
            task_handle: None,
        }
    }

    // ── Connection commands ──────────────────────────────────────────────

    /// Start connecting to the feed.
    ///
    /// Returns immediately; progress is reported through [`WatchEvent::State`].
    /// Must be called from within a tokio runtime.
    pub fn connect(&mut self) -> Result<(), WsError> {
        let running = self.cmd_tx.is_some()
            && self
                .task_handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished());
        if running {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| WsError::NoRuntime)?;

        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.command_channel_capacity.max(1));
        let generation = self.shared.advance(ConnectionState::Connecting);

        let state = TaskState {
            url: self.config.url.clone(),
            connect_timeout: self.config.connect_timeout,
            idle_timeout: self.config.idle_timeout,
            connector: Arc::clone(&self.connector),
            backoff: self.config.backoff_strategy(),
            shared: Arc::clone(&self.shared),
            cmd_rx,
            generation,
        };

        self.cmd_tx = Some(cmd_tx);
        self.task_handle = Some(runtime.spawn(run_task(state)));
        Ok(())
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Idempotent and safe in any state, including before `connect()`.
    pub fn disconnect(&mut self) {
        let Some(tx) = self.cmd_tx.take() else {
            return;
        };
        // Dropping `tx` closes the channel, which the task also treats as a disconnect.
        let _ = tx.try_send(Command::Disconnect);
        self.shared.advance(ConnectionState::Disconnected);
    }

    /// Disconnect and wait for the background task to finish.
    pub async fn shutdown(&mut self) {
        self.disconnect();
        if let Some(handle) = self.task_handle.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }

    // ── Subscription commands ────────────────────────────────────────────

    /// Replace the watchlist in full.
    ///
    /// Entries are trimmed, uppercased and de-duplicated. History for tickers
    /// that left the list is purged before this returns. When connected the
    /// full list is sent to the feed even if it did not change, which makes
    /// the feed send fresh history. Otherwise it is sent on the next connect.
    pub fn set_tickers<I, S>(&self, tickers: I) -> TickerChange
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let change = self.shared.write().set_tickers(tickers);
        self.publish_change(&change);
        self.request_resubscribe();
        change
    }

    /// Add `ticker`. Adding one already watched sends nothing.
    pub fn add_ticker(&self, ticker: &str) -> TickerChange {
        let change = self.shared.write().add_ticker(ticker);
        self.publish_change(&change);
        if change.changed {
            self.request_resubscribe();
        }
        change
    }

    /// Remove `ticker` and purge its history synchronously.
    pub fn remove_ticker(&self, ticker: &str) -> TickerChange {
        let change = self.shared.write().remove_ticker(ticker);
        self.publish_change(&change);
        if change.changed {
            self.request_resubscribe();
        }
        change
    }

    /// Change the requested bar period and resubscribe.
    pub fn set_period(&self, period: Period) {
        if self.shared.write().set_period(period) {
            self.request_resubscribe();
        }
    }

    fn publish_change(&self, change: &TickerChange) {
        if !change.evicted.is_empty() {
            self.shared.emit(WatchEvent::Evicted(change.evicted.clone()));
        }
        if change.changed {
            tracing::info!("Watchlist now {} ticker(s)", change.tickers.len());
            self.shared.emit(WatchEvent::TickersChanged(change.tickers.clone()));
        }
    }

    fn request_resubscribe(&self) {
        if let Some(tx) = &self.cmd_tx {
            // A full queue already holds a resubscribe, which reads the latest set when sent.
            let _ = tx.try_send(Command::Resubscribe);
        }
    }

    // ── Reads ────────────────────────────────────────────────────────────

    /// Current watchlist in display order.
    pub fn tickers(&self) -> Vec<Ticker> {
        self.shared.read().subscriptions().as_slice().to_vec()
    }

    pub fn period(&self) -> Period {
        self.shared.read().period()
    }

    /// Copy of every stored series.
    pub fn history(&self) -> std::collections::HashMap<Ticker, Vec<PriceBar>> {
        self.shared.read().history().to_map()
    }

    /// Latest bar for `ticker`, if any has been received.
    pub fn latest(&self, ticker: &str) -> Option<PriceBar> {
        let ticker = Ticker::parse(ticker)?;
        self.shared.read().latest(&ticker).cloned()
    }

    pub fn series(&self, ticker: &str) -> Option<Vec<PriceBar>> {
        let ticker = Ticker::parse(ticker)?;
        self.shared.read().series(&ticker).map(<[PriceBar]>::to_vec)
    }

    pub fn gain(&self, ticker: &str, period: GainPeriod) -> Option<Gain> {
        let ticker = Ticker::parse(ticker)?;
        self.shared.read().gain(&ticker, period)
    }

    /// Run `f` against a consistent view of the whole watch state.
    pub fn with_state<R>(&self, f: impl FnOnce(&WatchState) -> R) -> R {
        f(&*self.shared.read())
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Get a stream of change notifications.
    ///
    /// The returned stream borrows `self`, so it must be dropped
    /// before calling `disconnect()`.
    pub fn events(&self) -> Pin<Box<dyn Stream<Item = WatchEvent> + Send + '_>> {
        Box::pin(futures_util::stream::unfold(
            &self.event_rx,
            |rx| async move {
                let mut guard = rx.lock().await;
                guard.recv().await.map(|event| (event, rx))
            },
        ))
    }
}

impl Drop for WatchlistClient {
    fn drop(&mut self) {
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

// ─── Background task ─────────────────────────────────────────────────────────

async fn run_task(mut state: TaskState) {
    loop {
        // ── 1. Attempt connection ────────────────────────────────────────
        let Connection { mut sink, stream } = match open_connection(&mut state).await {
            ConnectOutcome::Connected(conn) => conn,
            ConnectOutcome::Cancelled => {
                state.set_state(ConnectionState::Disconnected);
                return;
            }
            ConnectOutcome::Failed(e) => {
                tracing::error!("Feed connection failed: {}", e);
                state.emit(WatchEvent::Diagnostic(format!("Connection failed: {e}")));
                state.set_state(ConnectionState::Disconnected);
                if wait_before_retry(&mut state).await {
                    continue;
                }
                return;
            }
        };

        // ── 2. Connected: subscribe with the set as it is right now ──────
        state.set_state(ConnectionState::Connected);
        send_subscription(&mut state, &mut sink).await;

        // ── 3. Read loop ─────────────────────────────────────────────────
        let reason = run_connected(&mut state, sink, stream).await;

        // ── 4. Post-disconnect decision ──────────────────────────────────
        state.set_state(ConnectionState::Disconnected);
        match reason {
            DisconnectReason::UserRequested | DisconnectReason::NormalClose => return,
            DisconnectReason::IdleTimeout => tracing::warn!("Feed went quiet, reconnecting"),
            DisconnectReason::Error(reason) => tracing::warn!("Connection lost: {}", reason),
        }
        if !wait_before_retry(&mut state).await {
            return;
        }
    }
}

/// Connect with a timeout, abandoning the attempt if a disconnect arrives first.
async fn open_connection(state: &mut TaskState) -> ConnectOutcome {
    state.set_state(ConnectionState::Connecting);
    tracing::info!("Connecting to {}", state.url);

    let connect = tokio::time::timeout(state.connect_timeout, state.connector.connect(&state.url));
    tokio::pin!(connect);

    loop {
        tokio::select! {
            biased;

            cmd = state.cmd_rx.recv() => match cmd {
                // The set is sent once connected.
                Some(Command::Resubscribe) => {}
                Some(Command::Disconnect) | None => return ConnectOutcome::Cancelled,
            },

            result = &mut connect => {
                return match result {
                    Ok(Ok(conn)) => ConnectOutcome::Connected(conn),
                    Ok(Err(e)) => ConnectOutcome::Failed(e),
                    Err(_) => ConnectOutcome::Failed(WsError::Timeout),
                };
            }
        }
    }
}

/// The inner connected loop. Runs until the connection breaks.
///
/// Exactly one read is outstanding at a time. Commands are polled first so a
/// pending disconnect wins over buffered frames. The backoff is reset by the
/// first frame other than a close, not by the handshake.
async fn run_connected(
    state: &mut TaskState,
    mut sink: FrameSink,
    mut stream: FrameStream,
) -> DisconnectReason {
    let idle = state.idle_timeout;
    let far_future = Instant::now() + Duration::from_secs(86400);
    let idle_sleep = tokio::time::sleep_until(idle.map_or(far_future, |d| Instant::now() + d));
    tokio::pin!(idle_sleep);
    let mut healthy = false;

    loop {
        tokio::select! {
            biased;

            // ── a) Command from public API ───────────────────────────────
            cmd = state.cmd_rx.recv() => {
                match cmd {
                    Some(Command::Resubscribe) => send_subscription(state, &mut sink).await,
                    Some(Command::Disconnect) | None => {
                        let _ = sink
                            .send(Frame::Close(Some(CloseInfo::normal("Client disconnect"))))
                            .await;
                        return DisconnectReason::UserRequested;
                    }
                }
            }

            // ── b) Incoming frame ────────────────────────────────────────
            frame = stream.next() => {
                if let Some(window) = idle {
                    idle_sleep.as_mut().reset(Instant::now() + window);
                }
                if !healthy && matches!(&frame, Some(Ok(f)) if !matches!(f, Frame::Close(_))) {
                    healthy = true;
                    state.backoff.reset();
                }
                match frame {
                    Some(Ok(Frame::Text(text))) => handle_payload(state, text.as_bytes()),
                    Some(Ok(Frame::Binary(data))) => handle_payload(state, &data),
                    Some(Ok(Frame::Ping(data))) => {
                        if let Err(e) = sink.send(Frame::Pong(data)).await {
                            tracing::warn!("Failed to answer ping: {}", e);
                        }
                    }
                    Some(Ok(Frame::Pong(_))) => {}
                    Some(Ok(Frame::Close(info))) => {
                        let (code, reason) = match info {
                            Some(info) => (info.code, info.reason),
                            None => (1006, "No close frame".to_string()),
                        };
                        tracing::info!("Feed closed the connection: {} {}", code, reason);
                        state.emit(WatchEvent::Diagnostic(
                            WsError::Closed { code: Some(code), reason: reason.clone() }.to_string(),
                        ));
                        return if code == 1000 {
                            DisconnectReason::NormalClose
                        } else {
                            DisconnectReason::Error(reason)
                        };
                    }
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        state.emit(WatchEvent::Diagnostic(e.to_string()));
                        return DisconnectReason::Error(e.to_string());
                    }
                    None => {
                        state.emit(WatchEvent::Diagnostic("Stream ended".into()));
                        return DisconnectReason::Error("Stream ended".into());
                    }
                }
            }

            // ── c) Read-idle timeout ─────────────────────────────────────
            () = &mut idle_sleep, if idle.is_some() => {
                tracing::warn!("No frame from feed within {:?}, dropping connection", idle);
                state.emit(WatchEvent::Diagnostic(WsError::Timeout.to_string()));
                let _ = sink.close().await;
                return DisconnectReason::IdleTimeout;
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Send the subscription set as it is at the moment of sending.
///
/// Failures are reported but do not tear the connection down.
async fn send_subscription(state: &mut TaskState, sink: &mut FrameSink) {
    let encoded = {
        let watch = state.shared.read();
        encode_subscription(watch.subscriptions().as_slice(), watch.period())
            .map(|text| (text, watch.subscriptions().len()))
    };

    let (text, count) = match encoded {
        Ok(encoded) => encoded,
        Err(e) => {
            tracing::warn!("Failed to encode subscription: {}", e);
            state.emit(WatchEvent::Diagnostic(e.to_string()));
            return;
        }
    };

    match sink.send(Frame::Text(text)).await {
        Ok(()) => tracing::info!("Subscribed to {} ticker(s)", count),
        Err(e) => {
            tracing::warn!("Send failed: {}", e);
            state.emit(WatchEvent::Diagnostic(
                WsError::SendFailed(e.to_string()).to_string(),
            ));
        }
    }
}

/// Decode one frame payload and merge it. Undecodable frames are dropped.
fn handle_payload(state: &TaskState, payload: &[u8]) {
    match decode_update(payload) {
        Ok(update) => {
            let Some(_current) = state.current() else {
                return;
            };
            let applied = state.shared.write().merge(update);
            if !applied.is_empty() {
                state.shared.emit(WatchEvent::HistoryUpdated(applied));
            }
        }
        Err(e) => {
            tracing::warn!("Dropping undecodable frame: {}", e);
            state.emit(WatchEvent::Diagnostic(format!("Decode error: {e}")));
        }
    }
}

// ─── Reconnection backoff ────────────────────────────────────────────────────

/// Sleep out the next backoff delay. Returns `false` when the task should stop,
/// either because the strategy gave up or a disconnect arrived.
async fn wait_before_retry(state: &mut TaskState) -> bool {
    let Some(delay) = state.backoff.next_delay() else {
        let attempts = state.backoff.attempts();
        if attempts > 0 {
            tracing::warn!("Giving up after {} reconnect attempt(s)", attempts);
            state.emit(WatchEvent::GaveUp { attempts });
        }
        return false;
    };

    state.set_state(ConnectionState::Reconnecting);
    tracing::info!(
        "Reconnect attempt {} in {}ms",
        state.backoff.attempts(),
        delay.as_millis()
    );

    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            biased;

            cmd = state.cmd_rx.recv() => match cmd {
                Some(Command::Resubscribe) => {}
                Some(Command::Disconnect) | None => {
                    state.set_state(ConnectionState::Disconnected);
                    return false;
                }
            },

            () = &mut sleep => return true,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
