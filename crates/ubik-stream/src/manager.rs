// Connection Manager
//
// A LogStream is the consumer's handle on one live log feed. A driver task
// owns the socket and the reconnect timer; the handle talks to it over a
// command channel and reads shared state that the driver updates.
//
// Lifecycle:
// - start(): close any live socket, fetch a token, open the stream
// - message: decode and buffer; malformed messages are logged and dropped
// - error: remembered as last_error, the close that follows reconnects
// - close: disconnected, one reconnect after the fixed delay
// - token failure: remembered, no automatic retry until the next start()
// - stop(): cancel the pending reconnect, then close the socket

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ubik_core::ActivityEvent;

use crate::buffer::EventBuffer;
use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::state::{Phase, Signal};
use crate::token::TokenSource;
use crate::transport::{Connection, Transport, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
}

/// State shared between the driver and the consumer handle
#[derive(Debug)]
struct Shared {
    phase: Phase,
    last_error: Option<StreamError>,
    buffer: EventBuffer,
}

/// Consumer handle on a live activity log stream.
///
/// Created idle; call [`LogStream::start`] to connect. Must be created inside
/// a tokio runtime. Dropping the handle tears the stream down.
pub struct LogStream {
    shared: Arc<Mutex<Shared>>,
    revision: watch::Receiver<u64>,
    commands: mpsc::UnboundedSender<Command>,
    driver: Option<JoinHandle<()>>,
}

impl LogStream {
    /// Create an idle stream
    pub fn new(
        config: StreamConfig,
        tokens: Arc<dyn TokenSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let shared = Arc::new(Mutex::new(Shared {
            phase: Phase::Idle,
            last_error: None,
            buffer: EventBuffer::new(config.buffer_capacity),
        }));
        let (revision_tx, revision_rx) = watch::channel(0u64);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            config,
            tokens,
            transport,
            shared: shared.clone(),
            revision: revision_tx,
            commands: command_rx,
        };

        Self {
            shared,
            revision: revision_rx,
            commands: command_tx,
            driver: Some(tokio::spawn(driver.run())),
        }
    }

    /// Create a stream and start connecting immediately
    pub fn connect(
        config: StreamConfig,
        tokens: Arc<dyn TokenSource>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let stream = Self::new(config, tokens, transport);
        stream.start();
        stream
    }

    /// Connect, or reconnect now.
    ///
    /// A live socket is closed before the new one opens and a pending
    /// reconnect is cancelled. Ignored after [`LogStream::stop`].
    pub fn start(&self) {
        if self.commands.send(Command::Start).is_err() {
            debug!("Start ignored, stream is stopped");
        }
    }

    /// Tear the stream down: cancel any pending reconnect, then close the
    /// socket. No state changes after this returns.
    pub async fn stop(&mut self) {
        let Some(driver) = self.driver.take() else {
            return;
        };
        let _ = self.commands.send(Command::Stop);
        if let Err(e) = driver.await {
            warn!(error = %e, "Log stream driver ended abnormally");
        }
    }

    /// Whether the socket is currently open
    pub fn connected(&self) -> bool {
        self.shared.lock().phase.is_connected()
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    /// Most recent failure, cleared when a socket opens
    pub fn last_error(&self) -> Option<StreamError> {
        self.shared.lock().last_error.clone()
    }

    /// Events received since the last drain, in delivery order
    pub fn new_events(&self) -> Vec<ActivityEvent> {
        self.shared.lock().buffer.snapshot()
    }

    /// Drain the buffered events
    pub fn clear_new_events(&self) -> Vec<ActivityEvent> {
        self.shared.lock().buffer.drain()
    }

    /// Events dropped because the buffer was full
    pub fn dropped_events(&self) -> u64 {
        self.shared.lock().buffer.dropped()
    }

    /// Receiver that changes whenever stream state changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.clone()
    }

    /// Wait until stream state changes. Returns false once the stream has
    /// stopped and no further changes can happen.
    pub async fn changed(&mut self) -> bool {
        self.revision.changed().await.is_ok()
    }
}

impl Drop for LogStream {
    fn drop(&mut self) {
        if self.driver.is_some() {
            let _ = self.commands.send(Command::Stop);
        }
    }
}

// ============================================================================
// Driver
// ============================================================================

/// What the driver does after finishing a step
enum Next {
    /// Wait for an explicit start
    Park,
    /// Connect now (explicit start)
    Connect,
    /// Connect because the reconnect delay elapsed
    Retry,
    Stop,
}

/// Result of racing an operation against the command channel
enum Race<T> {
    Done(T),
    Command(Option<Command>),
}

struct Driver {
    config: StreamConfig,
    tokens: Arc<dyn TokenSource>,
    transport: Arc<dyn Transport>,
    shared: Arc<Mutex<Shared>>,
    revision: watch::Sender<u64>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl Driver {
    async fn run(mut self) {
        let mut next = Next::Park;
        loop {
            next = match next {
                Next::Park => match self.commands.recv().await {
                    Some(Command::Start) => Next::Connect,
                    Some(Command::Stop) | None => Next::Stop,
                },
                Next::Connect => self.connect(Signal::Start).await,
                Next::Retry => self.connect(Signal::RetryElapsed).await,
                Next::Stop => break,
            };
        }

        self.transition(Signal::Stop);
        info!("Log stream stopped");
    }

    /// One connect cycle: token, handshake, then pump until close
    async fn connect(&mut self, signal: Signal) -> Next {
        self.transition(signal);

        let tokens = self.tokens.clone();
        let token = match self.race(tokens.fetch_token()).await {
            Race::Done(Ok(token)) => token,
            Race::Done(Err(e)) => {
                warn!(error = %e, "Stream token exchange failed, not retrying");
                self.record_error(e);
                self.transition(Signal::TokenFailed);
                return Next::Park;
            }
            Race::Command(cmd) => return Self::on_command(cmd),
        };

        let url = self.config.stream_url(&token);
        let transport = self.transport.clone();
        let connection = match self.race(transport.connect(&url)).await {
            Race::Done(Ok(connection)) => connection,
            Race::Done(Err(e)) => {
                warn!(error = %e, "Failed to open log stream");
                self.record_error(e);
                self.transition(Signal::Closed);
                return self.wait_for_retry().await;
            }
            Race::Command(cmd) => return Self::on_command(cmd),
        };

        {
            let mut shared = self.shared.lock();
            shared.last_error = None;
        }
        self.transition(Signal::Opened);
        info!("Connected to log stream");

        self.pump(connection).await
    }

    /// Dispatch socket events until the socket closes or a command arrives
    async fn pump(&mut self, mut connection: Box<dyn Connection>) -> Next {
        loop {
            let outcome = tokio::select! {
                event = connection.recv() => Race::Done(event),
                cmd = self.commands.recv() => Race::Command(cmd),
            };

            match outcome {
                Race::Done(TransportEvent::Message(text)) => self.on_message(&text),
                Race::Done(TransportEvent::Error(message)) => {
                    warn!(error = %message, "Log stream socket error");
                    self.record_error(StreamError::Transport(message));
                }
                Race::Done(TransportEvent::Closed) => {
                    info!("Disconnected from log stream");
                    {
                        let mut shared = self.shared.lock();
                        if shared.last_error.is_none() {
                            shared.last_error = Some(StreamError::ConnectionLost);
                        }
                    }
                    self.transition(Signal::Closed);
                    return self.wait_for_retry().await;
                }
                Race::Command(cmd) => {
                    connection.close().await;
                    return Self::on_command(cmd);
                }
            }
        }
    }

    /// Sleep for the reconnect delay unless a command arrives first
    async fn wait_for_retry(&mut self) -> Next {
        let delay = self.config.reconnect_delay;
        debug!(delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

        match self.race(tokio::time::sleep(delay)).await {
            Race::Done(()) => {
                info!("Attempting to reconnect");
                Next::Retry
            }
            Race::Command(cmd) => Self::on_command(cmd),
        }
    }

    async fn race<F: std::future::Future>(&mut self, fut: F) -> Race<F::Output> {
        tokio::select! {
            output = fut => Race::Done(output),
            cmd = self.commands.recv() => Race::Command(cmd),
        }
    }

    fn on_command(cmd: Option<Command>) -> Next {
        match cmd {
            Some(Command::Start) => Next::Connect,
            Some(Command::Stop) | None => Next::Stop,
        }
    }

    fn on_message(&self, text: &str) {
        match ActivityEvent::from_json(text) {
            Ok(event) => {
                let overflow = self.shared.lock().buffer.append(event);
                if overflow {
                    debug!("Event buffer full, dropped oldest event");
                }
                self.bump();
            }
            Err(e) => {
                let error = StreamError::from(e);
                warn!(error = %error, "Dropping malformed log message");
            }
        }
    }

    fn record_error(&self, error: StreamError) {
        self.shared.lock().last_error = Some(error);
        self.bump();
    }

    fn transition(&self, signal: Signal) {
        {
            let mut shared = self.shared.lock();
            match shared.phase.on(signal) {
                Some(next) => {
                    debug!(from = ?shared.phase, to = ?next, ?signal, "Stream transition");
                    shared.phase = next;
                }
                None => {
                    debug!(phase = ?shared.phase, ?signal, "Ignoring transition");
                    return;
                }
            }
        }
        self.bump();
    }

    fn bump(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{event_json, MockTokens, MockTransport};
    use std::time::Duration;
    use url::Url;

    fn config() -> StreamConfig {
        StreamConfig::new(Url::parse("ws://localhost:3001").unwrap())
    }

    fn spawn(tokens: Arc<MockTokens>, transport: &MockTransport) -> LogStream {
        LogStream::connect(config(), tokens, Arc::new(transport.clone()))
    }

    async fn wait_for(stream: &mut LogStream, condition: impl Fn(&LogStream) -> bool) {
        let reached = tokio::time::timeout(Duration::from_secs(60), async {
            while !condition(&*stream) {
                if !stream.changed().await {
                    break;
                }
            }
            condition(&*stream)
        })
        .await
        .unwrap_or(false);
        assert!(reached, "condition not reached");
    }

    fn ids(events: &[ActivityEvent]) -> Vec<String> {
        events.iter().map(|e| e.id.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffers_messages_in_delivery_order() {
        let transport = MockTransport::new();
        let mut stream = spawn(MockTokens::new(), &transport);
        wait_for(&mut stream, |s| s.connected()).await;

        let expected: Vec<String> = (0..25).map(|i| format!("e{}", i)).collect();
        for id in &expected {
            transport.send(0, TransportEvent::Message(event_json(id)));
        }
        wait_for(&mut stream, |s| s.new_events().len() == 25).await;

        assert_eq!(ids(&stream.new_events()), expected);
        assert!(stream.last_error().is_none());
        stream.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_new_events_drains() {
        let transport = MockTransport::new();
        let mut stream = spawn(MockTokens::new(), &transport);
        wait_for(&mut stream, |s| s.connected()).await;

        transport.send(0, TransportEvent::Message(event_json("e1")));
        transport.send(0, TransportEvent::Message(event_json("e2")));
        wait_for(&mut stream, |s| s.new_events().len() == 2).await;

        assert_eq!(ids(&stream.clear_new_events()), vec!["e1", "e2"]);
        assert!(stream.new_events().is_empty());
        assert!(stream.clear_new_events().is_empty());
        stream.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_message_is_dropped() {
        let transport = MockTransport::new();
        let mut stream = spawn(MockTokens::new(), &transport);
        wait_for(&mut stream, |s| s.connected()).await;

        transport.send(0, TransportEvent::Message(event_json("e1")));
        wait_for(&mut stream, |s| s.new_events().len() == 1).await;

        transport.send(0, TransportEvent::Message("{bad".to_string()));
        transport.send(0, TransportEvent::Message(r#"{"id":"e2"}"#.to_string()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(ids(&stream.new_events()), vec!["e1"]);
        assert!(stream.connected());
        assert!(stream.last_error().is_none());
        stream.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_socket_error_is_recorded_without_reconnect() {
        let transport = MockTransport::new();
        let mut stream = spawn(MockTokens::new(), &transport);
        wait_for(&mut stream, |s| s.connected()).await;

        transport.send(0, TransportEvent::Error("reset by peer".to_string()));
        wait_for(&mut stream, |s| s.last_error().is_some()).await;

        assert_eq!(
            stream.last_error(),
            Some(StreamError::Transport("reset by peer".to_string()))
        );
        assert!(stream.connected());
        assert_eq!(transport.connects(), 1);

        // The close that follows keeps the transport error
        transport.send(0, TransportEvent::Closed);
        wait_for(&mut stream, |s| s.phase() == Phase::Closed).await;
        assert_eq!(
            stream.last_error(),
            Some(StreamError::Transport("reset by peer".to_string()))
        );
        stream.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_reconnects_after_fixed_delay() {
        let transport = MockTransport::new();
        let tokens = MockTokens::new();
        let mut stream = spawn(tokens.clone(), &transport);
        wait_for(&mut stream, |s| s.connected()).await;

        transport.send(0, TransportEvent::Closed);
        wait_for(&mut stream, |s| !s.connected()).await;
        let closed_at = tokio::time::Instant::now();
        assert_eq!(stream.phase(), Phase::Closed);
        assert_eq!(stream.last_error(), Some(StreamError::ConnectionLost));

        wait_for(&mut stream, |s| s.connected()).await;
        assert_eq!(transport.connects(), 2);
        assert_eq!(tokens.calls(), 2);

        let waited = transport.connect_time(1) - closed_at;
        assert!(waited >= Duration::from_secs(5), "reconnected after {:?}", waited);
        assert!(waited < Duration::from_secs(6), "reconnected after {:?}", waited);
        assert!(stream.last_error().is_none());
        stream.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_is_unbounded() {
        let transport = MockTransport::new();
        let mut stream = spawn(MockTokens::new(), &transport);

        for attempt in 0..5 {
            wait_for(&mut stream, |s| s.connected()).await;
            transport.send(attempt, TransportEvent::Closed);
            wait_for(&mut stream, |s| !s.connected()).await;
        }
        wait_for(&mut stream, |s| s.connected()).await;
        assert_eq!(transport.connects(), 6);
        stream.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_handshake_retries() {
        let transport = MockTransport::new();
        transport.fail_next(1);
        let mut stream = spawn(MockTokens::new(), &transport);

        wait_for(&mut stream, |s| s.phase() == Phase::Closed).await;
        assert_eq!(
            stream.last_error(),
            Some(StreamError::Transport("connection refused".to_string()))
        );

        wait_for(&mut stream, |s| s.connected()).await;
        assert_eq!(transport.connects(), 2);
        assert!(transport.connect_time(1) - transport.connect_time(0) >= Duration::from_secs(5));
        stream.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_reconnect() {
        let transport = MockTransport::new();
        let tokens = MockTokens::new();
        let mut stream = spawn(tokens.clone(), &transport);
        wait_for(&mut stream, |s| s.connected()).await;

        transport.send(0, TransportEvent::Closed);
        wait_for(&mut stream, |s| s.phase() == Phase::Closed).await;

        stream.stop().await;
        assert_eq!(stream.phase(), Phase::Stopped);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connects(), 1);
        assert_eq!(tokens.calls(), 1);
        assert_eq!(stream.phase(), Phase::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_live_socket() {
        let transport = MockTransport::new();
        let mut stream = spawn(MockTokens::new(), &transport);
        wait_for(&mut stream, |s| s.connected()).await;

        stream.stop().await;
        assert_eq!(transport.client_closes(0), 1);
        assert!(!stream.connected());

        // start after stop is ignored
        stream.start();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_closes_stale_socket_once() {
        let transport = MockTransport::new();
        let mut stream = spawn(MockTokens::new(), &transport);
        wait_for(&mut stream, |s| s.connected()).await;

        stream.start();
        wait_for(&mut stream, |_| transport.connects() == 2).await;
        wait_for(&mut stream, |s| s.connected()).await;

        assert_eq!(transport.client_closes(0), 1);
        assert_eq!(transport.client_closes(1), 0);
        assert_eq!(transport.max_live(), 1);
        stream.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_failure_is_not_retried() {
        let transport = MockTransport::new();
        let tokens = MockTokens::scripted(vec![Err(StreamError::Unauthenticated)]);
        let mut stream = spawn(tokens.clone(), &transport);

        wait_for(&mut stream, |s| s.last_error().is_some()).await;
        assert_eq!(stream.last_error(), Some(StreamError::Unauthenticated));
        assert_eq!(stream.phase(), Phase::Idle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(tokens.calls(), 1);
        assert_eq!(transport.connects(), 0);

        // An explicit start tries again
        stream.start();
        wait_for(&mut stream, |s| s.connected()).await;
        assert_eq!(tokens.calls(), 2);
        assert!(stream.last_error().is_none());
        stream.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_bound_drops_oldest() {
        let transport = MockTransport::new();
        let mut stream = LogStream::connect(
            config().with_buffer_capacity(2),
            MockTokens::new(),
            Arc::new(transport.clone()),
        );
        wait_for(&mut stream, |s| s.connected()).await;

        for id in ["e1", "e2", "e3"] {
            transport.send(0, TransportEvent::Message(event_json(id)));
        }
        wait_for(&mut stream, |s| s.dropped_events() == 1).await;

        assert_eq!(ids(&stream.new_events()), vec!["e2", "e3"]);
        stream.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_tears_down() {
        let transport = MockTransport::new();
        let tokens = MockTokens::new();
        let mut stream = spawn(tokens.clone(), &transport);
        wait_for(&mut stream, |s| s.connected()).await;
        drop(stream);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(transport.client_closes(0), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_scenario() {
        let transport = MockTransport::new();
        let tokens = MockTokens::scripted(vec![Ok("tok-1".to_string()), Ok("tok-2".to_string())]);
        let mut stream = spawn(tokens.clone(), &transport);

        wait_for(&mut stream, |s| s.connected()).await;
        assert_eq!(
            transport.connect_url(0).as_str(),
            "ws://localhost:3001/api/v1/logs/stream?token=tok-1"
        );

        transport.send(
            0,
            TransportEvent::Message(
                r#"{"id":"e1","org_id":"org-1","event_type":"input","event_category":"io","created_at":"2024-01-01T00:00:00Z","payload":{}}"#
                    .to_string(),
            ),
        );
        wait_for(&mut stream, |s| s.new_events().len() == 1).await;
        assert_eq!(ids(&stream.new_events()), vec!["e1"]);

        transport.send(0, TransportEvent::Message("{bad".to_string()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(ids(&stream.new_events()), vec!["e1"]);

        transport.send(0, TransportEvent::Closed);
        wait_for(&mut stream, |s| !s.connected()).await;
        assert_eq!(tokens.calls(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        wait_for(&mut stream, |s| s.connected()).await;
        assert_eq!(tokens.calls(), 2);
        assert_eq!(
            transport.connect_url(1).as_str(),
            "ws://localhost:3001/api/v1/logs/stream?token=tok-2"
        );
        // Buffered events survive the reconnect
        assert_eq!(ids(&stream.new_events()), vec!["e1"]);
        stream.stop().await;
    }
}
