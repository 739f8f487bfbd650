// Test doubles for the stream: scripted token source and in-memory transport

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use ubik_core::ActivityEvent;
use url::Url;

use crate::error::{Result, StreamError};
use crate::token::TokenSource;
use crate::transport::{Connection, Transport, TransportEvent};

/// Minimal valid event with the given id
pub fn event(id: &str) -> ActivityEvent {
    ActivityEvent::from_json(&event_json(id)).unwrap()
}

/// Wire JSON for a minimal valid event
pub fn event_json(id: &str) -> String {
    format!(
        r#"{{"id":"{}","org_id":"org-1","event_type":"input","event_category":"io","created_at":"2024-01-01T00:00:00Z"}}"#,
        id
    )
}

/// Token source that replays scripted results, then `tok-<n>`
#[derive(Default)]
pub struct MockTokens {
    script: Mutex<VecDeque<Result<String>>>,
    calls: Mutex<Vec<Instant>>,
}

impl MockTokens {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn scripted(results: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(results.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TokenSource for MockTokens {
    async fn fetch_token(&self) -> Result<String> {
        let n = {
            let mut calls = self.calls.lock();
            calls.push(Instant::now());
            calls.len()
        };
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("tok-{}", n)))
    }
}

#[derive(Default)]
struct TransportState {
    connects: Vec<(Url, Instant)>,
    servers: Vec<mpsc::UnboundedSender<TransportEvent>>,
    client_closes: Vec<usize>,
    live: usize,
    max_live: usize,
    failures: usize,
}

/// In-memory transport; each connection is fed by the test through `send`
#[derive(Default, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<TransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connect attempts fail
    pub fn fail_next(&self, n: usize) {
        self.state.lock().failures = n;
    }

    /// Push an event to connection `index` as if the server sent it
    pub fn send(&self, index: usize, event: TransportEvent) {
        let state = self.state.lock();
        let _ = state.servers[index].send(event);
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects.len()
    }

    pub fn connect_url(&self, index: usize) -> Url {
        self.state.lock().connects[index].0.clone()
    }

    pub fn connect_time(&self, index: usize) -> Instant {
        self.state.lock().connects[index].1
    }

    /// How many times the client closed connection `index`
    pub fn client_closes(&self, index: usize) -> usize {
        self.state.lock().client_closes[index]
    }

    /// Highest number of simultaneously live connections observed
    pub fn max_live(&self) -> usize {
        self.state.lock().max_live
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>> {
        let mut state = self.state.lock();
        state.connects.push((url.clone(), Instant::now()));

        let (tx, rx) = mpsc::unbounded_channel();
        let index = state.servers.len();
        state.servers.push(tx);
        state.client_closes.push(0);

        if state.failures > 0 {
            state.failures -= 1;
            return Err(StreamError::transport("connection refused"));
        }

        state.live += 1;
        state.max_live = state.max_live.max(state.live);

        Ok(Box::new(MockConnection {
            index,
            rx,
            state: self.state.clone(),
            live: true,
        }))
    }
}

struct MockConnection {
    index: usize,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
    state: Arc<Mutex<TransportState>>,
    live: bool,
}

impl MockConnection {
    fn mark_dead(&mut self) {
        if self.live {
            self.live = false;
            self.state.lock().live -= 1;
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn recv(&mut self) -> TransportEvent {
        if !self.live {
            return TransportEvent::Closed;
        }
        match self.rx.recv().await {
            Some(TransportEvent::Closed) | None => {
                self.mark_dead();
                TransportEvent::Closed
            }
            Some(event) => event,
        }
    }

    async fn close(&mut self) {
        self.state.lock().client_closes[self.index] += 1;
        self.mark_dead();
    }
}
