//! In-memory connector for tests and offline development.
//!
//! Each call to [`Connector::connect`] consumes the next scripted outcome.
//! Accepted connections hand the server side of the pipe to the test as a
//! [`MockServer`].

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use url::Url;

use super::transport::{CloseInfo, Connector, Frame, Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Accept,
    Refuse,
    Hang,
}

#[derive(Default)]
struct MockState {
    script: VecDeque<Outcome>,
    attempts: Vec<Instant>,
    servers: VecDeque<MockServer>,
}

/// Scriptable [`Connector`]. Unscripted attempts are refused.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
    accepted: Arc<Notify>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next attempt completes the handshake.
    pub fn accept_next(&self) -> &Self {
        self.state.lock().script.push_back(Outcome::Accept);
        self
    }

    /// Next attempt fails immediately.
    pub fn refuse_next(&self) -> &Self {
        self.state.lock().script.push_back(Outcome::Refuse);
        self
    }

    /// Next attempt never finishes its handshake.
    pub fn hang_next(&self) -> &Self {
        self.state.lock().script.push_back(Outcome::Hang);
        self
    }

    /// Number of connection attempts made so far.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts.len()
    }

    /// When each attempt was made.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.lock().attempts.clone()
    }

    /// Take the server side of the oldest accepted, untaken connection.
    pub fn take_server(&self) -> Option<MockServer> {
        self.state.lock().servers.pop_front()
    }

    /// Wait until an accepted connection is available and take it.
    pub async fn next_server(&self) -> MockServer {
        loop {
            let notified = self.accepted.notified();
            if let Some(server) = self.take_server() {
                return server;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &Url) -> Result<Transport, TransportError> {
        let outcome = {
            let mut state = self.state.lock();
            state.attempts.push(Instant::now());
            state.script.pop_front().unwrap_or(Outcome::Refuse)
        };

        match outcome {
            Outcome::Refuse => Err(TransportError::Refused("mock refused".to_string())),
            Outcome::Hang => futures_util::future::pending().await,
            Outcome::Accept => {
                let (client_tx, server_rx) = unbounded::<Frame>();
                let (server_tx, client_rx) = unbounded::<Result<Frame, TransportError>>();
                self.state.lock().servers.push_back(MockServer {
                    outgoing: server_tx,
                    incoming: server_rx,
                });
                self.accepted.notify_waiters();
                Ok(Transport {
                    sink: Box::pin(client_tx.sink_map_err(|_| TransportError::Closed)),
                    stream: Box::pin(client_rx),
                })
            }
        }
    }
}

/// Server side of an accepted mock connection. Dropping it ends the client's
/// stream without a close frame.
pub struct MockServer {
    outgoing: UnboundedSender<Result<Frame, TransportError>>,
    incoming: UnboundedReceiver<Frame>,
}

impl MockServer {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.outgoing.unbounded_send(Ok(Frame::Text(text.into())));
    }

    pub fn send_binary(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.outgoing.unbounded_send(Ok(Frame::Binary(bytes.into())));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.outgoing.unbounded_send(Ok(Frame::Close(Some(CloseInfo {
            code,
            reason: reason.to_string(),
        }))));
    }

    pub fn fail(&self, message: &str) {
        let _ = self
            .outgoing
            .unbounded_send(Err(TransportError::Refused(message.to_string())));
    }

    /// Next frame written by the client, or `None` once the client hung up.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.incoming.next().await
    }
}
