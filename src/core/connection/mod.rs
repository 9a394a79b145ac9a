//! Connection lifecycle: one logical event-stream connection with
//! keep-alive, topic re-subscription and exponential reconnect.
//!
//! All socket reads, timer ticks and routing for a connection happen inside
//! a single driver task, so the console state sees exactly one writer.

pub mod backoff;
pub mod control;
pub mod listeners;
pub mod memory;
pub mod subscriptions;
pub mod transport;

#[cfg(test)]
mod tests;

use rand::Rng;
use rand::distributions::Alphanumeric;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::core::router::MessageRouter;
use crate::core::router::events::InboundEvent;
use backoff::{ReconnectDecision, ReconnectPolicy};
use control::ControlFrame;
use listeners::{ListenerHandle, ListenerSet};
use subscriptions::{SubscriptionRegistry, topics};
use transport::{Connector, EventSocket, Frame, NORMAL_CLOSURE};

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Socket base; `/ws/<client id>` is appended.
    pub endpoint: Url,
    pub ping_interval: Duration,
    pub resubscribe_delay: Duration,
    pub reconnect: ReconnectPolicy,
    pub default_topics: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConnectionSnapshot {
    pub client_id: String,
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection lost, manual action required")]
    Exhausted { attempts: u32 },
    #[error("not connected")]
    NotConnected,
}

/// `client_<unix millis>_<9 random alphanumerics>`
pub fn generate_client_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!(
        "client_{}_{}",
        chrono::Utc::now().timestamp_millis(),
        suffix
    )
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

struct Outbound {
    generation: u64,
    tx: mpsc::UnboundedSender<ControlFrame>,
}

struct Shared {
    config: ConnectionConfig,
    client_id: String,
    endpoint: String,
    connector: Arc<dyn Connector>,
    router: MessageRouter,
    status: watch::Sender<ConnectionSnapshot>,
    registry: Mutex<SubscriptionRegistry>,
    listeners: ListenerSet,
    outbound: Mutex<Option<Outbound>>,
    /// Bumped on every connect and disconnect; a driver only writes status
    /// while its generation is current.
    generation: AtomicU64,
}

impl Shared {
    fn publish<F>(&self, generation: u64, update: F)
    where
        F: FnOnce(&mut ConnectionSnapshot),
    {
        self.status.send_if_modified(|snapshot| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            update(snapshot);
            true
        });
    }

    fn clear_outbound(&self, generation: u64) {
        let mut outbound = lock(&self.outbound);
        if outbound.as_ref().is_some_and(|o| o.generation == generation) {
            *outbound = None;
        }
    }

    fn send_control(&self, frame: ControlFrame) -> bool {
        match lock(&self.outbound).as_ref() {
            Some(outbound) => outbound.tx.send(frame).is_ok(),
            None => false,
        }
    }
}

struct Driver {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        router: MessageRouter,
    ) -> Self {
        let client_id = generate_client_id();
        let endpoint = format!(
            "{}/ws/{}",
            config.endpoint.as_str().trim_end_matches('/'),
            client_id
        );
        let registry = SubscriptionRegistry::with_topics(config.default_topics.iter().cloned());
        let (status, _) = watch::channel(ConnectionSnapshot {
            client_id: client_id.clone(),
            status: ConnectionStatus::Disconnected,
            reconnect_attempts: 0,
            last_error: None,
        });
        Self {
            shared: Arc::new(Shared {
                config,
                client_id,
                endpoint,
                connector,
                router,
                status,
                registry: Mutex::new(registry),
                listeners: ListenerSet::default(),
                outbound: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
            driver: Mutex::new(None),
        }
    }

    /// Start connecting. A no-op while connecting or connected. Must be
    /// called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut driver = lock(&self.driver);
        let current = self.shared.status.borrow().status;
        if matches!(
            current,
            ConnectionStatus::Connecting | ConnectionStatus::Connected
        ) {
            debug!("connect() ignored: already {}", current.as_str());
            return;
        }
        if let Some(stale) = driver.take() {
            stale.cancel.cancel();
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.status.send_modify(|snapshot| {
            if snapshot.status == ConnectionStatus::Error {
                snapshot.reconnect_attempts = 0;
            }
            snapshot.status = ConnectionStatus::Connecting;
        });

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_driver(
            self.shared.clone(),
            generation,
            cancel.clone(),
        ));
        *driver = Some(Driver { cancel, task });
    }

    /// Stop the driver, its timers and the socket. Safe from any state.
    pub async fn disconnect(&self) {
        let driver = lock(&self.driver).take();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(driver) = driver {
            driver.cancel.cancel();
            if let Err(e) = driver.task.await
                && e.is_panic()
            {
                error!("Connection driver panicked: {}", e);
            }
        }
        *lock(&self.shared.outbound) = None;
        self.shared.status.send_modify(|snapshot| {
            snapshot.status = ConnectionStatus::Disconnected;
            snapshot.reconnect_attempts = 0;
            snapshot.last_error = None;
        });
        info!("Disconnected");
    }

    pub fn on_message<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.add(listener)
    }

    /// Register `topic`; sent right away if a socket is live, otherwise on
    /// the next connect.
    pub fn subscribe(&self, topic: &str) {
        if !topics::is_known(topic) {
            warn!("Subscribing to unrecognised topic {:?}", topic);
        }
        lock(&self.shared.registry).add(topic);
        self.shared.send_control(ControlFrame::Subscribe {
            topic: topic.to_string(),
        });
    }

    pub fn unsubscribe(&self, topic: &str) {
        lock(&self.shared.registry).remove(topic);
        self.shared.send_control(ControlFrame::Unsubscribe {
            topic: topic.to_string(),
        });
    }

    pub fn subscriptions(&self) -> Vec<String> {
        lock(&self.shared.registry)
            .iter()
            .map(str::to_string)
            .collect()
    }

    /// Ask the server for its client and subscription counts.
    pub fn request_status(&self) -> Result<(), ConnectionError> {
        if self.shared.send_control(ControlFrame::GetStatus) {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected)
        }
    }

    pub fn status(&self) -> ConnectionSnapshot {
        self.shared.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.shared.status.subscribe()
    }

    pub fn client_id(&self) -> &str {
        &self.shared.client_id
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    pub fn router(&self) -> &MessageRouter {
        &self.shared.router
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let slot = self.driver.get_mut().unwrap_or_else(|p| p.into_inner());
        if let Some(driver) = slot.take() {
            driver.cancel.cancel();
        }
    }
}

enum SessionEnd {
    Cancelled,
    Normal,
    Abnormal(String),
}

async fn run_driver(shared: Arc<Shared>, generation: u64, cancel: CancellationToken) {
    let policy = shared.config.reconnect;
    let mut failures: u32 = 0;

    loop {
        info!("Connecting to {}", shared.endpoint);
        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            opened = shared.connector.open(&shared.endpoint) => opened,
        };

        let reason = match opened {
            Ok(socket) => {
                failures = 0;
                match run_session(&shared, generation, &cancel, socket).await {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Normal => {
                        shared.clear_outbound(generation);
                        info!("Server closed the connection");
                        shared.publish(generation, |s| {
                            s.status = ConnectionStatus::Disconnected;
                        });
                        return;
                    }
                    SessionEnd::Abnormal(reason) => reason,
                }
            }
            Err(e) => e.to_string(),
        };
        shared.clear_outbound(generation);
        warn!("Connection lost: {}", reason);

        match policy.decide(failures) {
            ReconnectDecision::GiveUp { attempts } => {
                let err = ConnectionError::Exhausted { attempts: failures };
                error!("{} after {} attempts", err, attempts - 1);
                shared.publish(generation, |s| {
                    s.status = ConnectionStatus::Error;
                    s.last_error = Some(err.to_string());
                });
                return;
            }
            ReconnectDecision::Retry { attempt, delay } => {
                failures = attempt;
                shared.publish(generation, |s| {
                    s.status = ConnectionStatus::Connecting;
                    s.reconnect_attempts = attempt;
                    s.last_error = Some(reason);
                });
                info!(
                    "Reconnecting in {:?} (attempt {}/{})",
                    delay, attempt, policy.max_attempts
                );
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

async fn run_session(
    shared: &Shared,
    generation: u64,
    cancel: &CancellationToken,
    mut socket: Box<dyn EventSocket>,
) -> SessionEnd {
    let (tx, mut outbound) = mpsc::unbounded_channel();
    *lock(&shared.outbound) = Some(Outbound { generation, tx });
    shared.publish(generation, |s| {
        s.status = ConnectionStatus::Connected;
        s.reconnect_attempts = 0;
        s.last_error = None;
    });
    info!("Connected as {}", shared.client_id);

    let period = shared.config.ping_interval;
    let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let resubscribe = tokio::time::sleep(shared.config.resubscribe_delay);
    tokio::pin!(resubscribe);
    let mut resubscribed = false;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                socket.close().await;
                return SessionEnd::Cancelled;
            }
            _ = &mut resubscribe, if !resubscribed => {
                resubscribed = true;
                let frames = lock(&shared.registry).subscribe_frames();
                debug!("Re-issuing {} subscriptions", frames.len());
                for frame in frames {
                    if let Err(e) = socket.send_text(frame.to_json()).await {
                        return SessionEnd::Abnormal(e.to_string());
                    }
                }
            }
            _ = keepalive.tick() => {
                if let Err(e) = socket.send_text(ControlFrame::Ping.to_json()).await {
                    return SessionEnd::Abnormal(e.to_string());
                }
            }
            Some(frame) = outbound.recv() => {
                if let Err(e) = socket.send_text(frame.to_json()).await {
                    return SessionEnd::Abnormal(e.to_string());
                }
            }
            incoming = socket.next_frame() => match incoming {
                Ok(Frame::Text(text)) => {
                    if let Some(event) = shared.router.handle_frame(&text) {
                        shared.listeners.notify(&event);
                    }
                }
                Ok(Frame::Closed { code: Some(NORMAL_CLOSURE), .. }) => return SessionEnd::Normal,
                Ok(Frame::Closed { code, reason }) => {
                    return SessionEnd::Abnormal(match code {
                        Some(code) => format!("closed with code {}: {}", code, reason),
                        None => format!("closed without status: {}", reason),
                    });
                }
                Err(e) => return SessionEnd::Abnormal(e.to_string()),
            }
        }
    }
}
