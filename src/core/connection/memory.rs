//! Scripted in-process transport for driving a [`ConnectionManager`]
//! without a server.
//!
//! Each call to [`Connector::open`] consumes the next scripted step:
//! either a refusal or an accepted socket whose far end is handed back to
//! the script author as a [`MemoryPeer`]. An exhausted script refuses.
//!
//! [`ConnectionManager`]: super::ConnectionManager

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::transport::{Connector, EventSocket, Frame, TransportError};

#[derive(Debug, Clone)]
pub struct OpenAttempt {
    pub url: String,
    pub at: Instant,
}

enum Step {
    Refuse(String),
    Accept(MemorySocket),
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
    attempts: Vec<OpenAttempt>,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    script: Arc<Mutex<Script>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn refuse_next(&self, reason: &str) {
        self.script()
            .steps
            .push_back(Step::Refuse(reason.to_string()));
    }

    pub fn refuse_times(&self, count: usize, reason: &str) {
        for _ in 0..count {
            self.refuse_next(reason);
        }
    }

    /// Script an accepted open; the returned peer is the server side.
    pub fn accept_next(&self) -> MemoryPeer {
        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        self.script().steps.push_back(Step::Accept(MemorySocket {
            incoming,
            outgoing,
            closed: closed.clone(),
        }));
        MemoryPeer {
            to_client: Some(to_client),
            from_client,
            closed_by_client: closed,
        }
    }

    pub fn attempts(&self) -> Vec<OpenAttempt> {
        self.script().attempts.clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.script().attempts.len()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn EventSocket>, TransportError> {
        let mut script = self.script();
        script.attempts.push(OpenAttempt {
            url: url.to_string(),
            at: Instant::now(),
        });
        match script.steps.pop_front() {
            Some(Step::Accept(socket)) => Ok(Box::new(socket)),
            Some(Step::Refuse(reason)) => Err(TransportError::Open {
                url: url.to_string(),
                reason,
            }),
            None => Err(TransportError::Open {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

struct MemorySocket {
    incoming: mpsc::UnboundedReceiver<Frame>,
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl EventSocket for MemorySocket {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.outgoing
            .send(text)
            .map_err(|_| TransportError::Send("peer went away".to_string()))
    }

    async fn next_frame(&mut self) -> Result<Frame, TransportError> {
        Ok(self.incoming.recv().await.unwrap_or(Frame::Closed {
            code: None,
            reason: "peer dropped".to_string(),
        }))
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.incoming.close();
    }
}

/// Server side of a scripted connection.
pub struct MemoryPeer {
    to_client: Option<mpsc::UnboundedSender<Frame>>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed_by_client: Arc<AtomicBool>,
}

impl MemoryPeer {
    pub fn send_text(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Frame::Text(text.to_string()));
        }
    }

    pub fn close_with(&self, code: u16) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Frame::Closed {
                code: Some(code),
                reason: String::new(),
            });
        }
    }

    /// End the stream without a close frame.
    pub fn drop_connection(&mut self) {
        self.to_client = None;
    }

    /// Frames the client has sent so far, without waiting.
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = self.from_client.try_recv() {
            out.push(text);
        }
        out
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    pub fn closed_by_client(&self) -> bool {
        self.closed_by_client.load(Ordering::SeqCst)
    }
}
