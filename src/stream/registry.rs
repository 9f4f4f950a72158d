use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::NotificationEvent;
use crate::constants::MIN_SINK_CAPACITY;
use crate::errors::Result;
use crate::monitoring::NotifierMetrics;

pub type ClientId = Uuid;

/// What a client sink carries.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A relayed notification tagged with the registry's broadcast sequence.
    Notification {
        seq: u64,
        event: Arc<NotificationEvent>,
    },
    /// Liveness marker with no alert payload.
    Heartbeat { timestamp: DateTime<Utc> },
}

#[derive(Serialize)]
struct HeartbeatPayload {
    timestamp: DateTime<Utc>,
}

impl StreamEvent {
    /// JSON body sent to the client.
    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            StreamEvent::Notification { event, .. } => serde_json::to_string(event.as_ref())?,
            StreamEvent::Heartbeat { timestamp } => serde_json::to_string(&HeartbeatPayload {
                timestamp: *timestamp,
            })?,
        };
        Ok(json)
    }

    /// Sequence number, absent for heartbeats.
    pub fn seq(&self) -> Option<u64> {
        match self {
            StreamEvent::Notification { seq, .. } => Some(*seq),
            StreamEvent::Heartbeat { .. } => None,
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, StreamEvent::Heartbeat { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Backpressure,
    Closed,
    NoSubscribers,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Backpressure => "backpressure",
            DropReason::Closed => "closed",
            DropReason::NoSubscribers => "no_subscribers",
        }
    }
}

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub seq: u64,
    pub delivered: usize,
    pub dropped_backpressure: usize,
    pub dropped_closed: usize,
    pub no_subscribers: bool,
}

impl BroadcastReport {
    pub fn dropped(&self) -> usize {
        self.dropped_backpressure + self.dropped_closed + usize::from(self.no_subscribers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Sent,
    /// Buffer full; counted like a dropped broadcast, the client stays.
    Dropped,
    /// Sink deregistered or its receiver is gone.
    Gone,
}

/// Counter snapshot for health reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FanoutStats {
    pub connected_clients: usize,
    pub total_connections: u64,
    pub broadcasts: u64,
    pub delivered: u64,
    pub dropped_backpressure: u64,
    pub dropped_closed: u64,
    pub dropped_no_subscribers: u64,
    pub heartbeats_sent: u64,
    pub heartbeats_dropped: u64,
    pub last_seq: u64,
}

#[derive(Default)]
struct Counters {
    total_connections: AtomicU64,
    broadcasts: AtomicU64,
    delivered: AtomicU64,
    dropped_backpressure: AtomicU64,
    dropped_closed: AtomicU64,
    dropped_no_subscribers: AtomicU64,
    heartbeats_sent: AtomicU64,
    heartbeats_dropped: AtomicU64,
}

/// The receiving half handed to one streaming connection.
pub struct ClientSink {
    id: ClientId,
    receiver: mpsc::Receiver<StreamEvent>,
}

impl ClientSink {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.receiver.try_recv().ok()
    }

    /// Stop accepting new events; already-buffered ones stay readable.
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Live set of client sinks with non-blocking, drop-on-backpressure broadcast.
///
/// The set is guarded by one mutex held only for insert, remove or a pass of
/// `try_send` calls, so broadcasts never interleave with membership changes
/// and never wait on a client.
pub struct FanoutRegistry {
    clients: Mutex<HashMap<ClientId, mpsc::Sender<StreamEvent>>>,
    capacity: usize,
    last_seq: AtomicU64,
    counters: Counters,
    metrics: Option<Arc<NotifierMetrics>>,
}

impl FanoutRegistry {
    /// `capacity` is the per-client buffer size, raised to the minimum of 10.
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            capacity: capacity.max(MIN_SINK_CAPACITY),
            last_seq: AtomicU64::new(0),
            counters: Counters::default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<NotifierMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn connect(&self) -> ClientSink {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.capacity);

        let total = {
            let mut clients = self.clients.lock();
            clients.insert(id, tx);
            clients.len()
        };
        self.counters.total_connections.fetch_add(1, Ordering::Relaxed);
        self.update_gauge(total);

        info!(client_id = %id, total_clients = total, "Streaming client connected");
        ClientSink { id, receiver: rx }
    }

    /// Remove a client. Returns `false` if it was already gone.
    pub fn disconnect(&self, id: ClientId) -> bool {
        let (removed, total) = {
            let mut clients = self.clients.lock();
            let removed = clients.remove(&id).is_some();
            (removed, clients.len())
        };

        if removed {
            self.update_gauge(total);
            info!(client_id = %id, total_clients = total, "Streaming client disconnected");
        }
        removed
    }

    pub fn connected_count(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_connected(&self, id: ClientId) -> bool {
        self.clients.lock().contains_key(&id)
    }

    /// Offer `event` to every registered sink without waiting on any of them.
    pub fn broadcast(&self, event: NotificationEvent) -> BroadcastReport {
        let event = Arc::new(event);
        let mut report = BroadcastReport::default();

        {
            let clients = self.clients.lock();
            report.seq = self.last_seq.fetch_add(1, Ordering::Relaxed) + 1;

            if clients.is_empty() {
                report.no_subscribers = true;
            }

            for (id, tx) in clients.iter() {
                let item = StreamEvent::Notification {
                    seq: report.seq,
                    event: Arc::clone(&event),
                };
                match tx.try_send(item) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        report.dropped_backpressure += 1;
                        warn!(client_id = %id, seq = report.seq, "Client buffer full, dropping event");
                    }
                    Err(TrySendError::Closed(_)) => {
                        report.dropped_closed += 1;
                        debug!(client_id = %id, seq = report.seq, "Client sink closed, dropping event");
                    }
                }
            }
        }

        if report.no_subscribers {
            debug!(seq = report.seq, symbol = %event.symbol, "No subscribers, event dropped");
        }

        self.record(&report);
        report
    }

    /// Enqueue a heartbeat for one client without waiting.
    pub fn heartbeat(&self, id: ClientId) -> HeartbeatOutcome {
        let outcome = {
            let clients = self.clients.lock();
            match clients.get(&id) {
                None => HeartbeatOutcome::Gone,
                Some(tx) => match tx.try_send(StreamEvent::Heartbeat {
                    timestamp: Utc::now(),
                }) {
                    Ok(()) => HeartbeatOutcome::Sent,
                    Err(TrySendError::Full(_)) => HeartbeatOutcome::Dropped,
                    Err(TrySendError::Closed(_)) => HeartbeatOutcome::Gone,
                },
            }
        };

        match outcome {
            HeartbeatOutcome::Sent => {
                self.counters.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics {
                    metrics.heartbeat_sent();
                }
            }
            HeartbeatOutcome::Dropped => {
                self.counters.heartbeats_dropped.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics {
                    metrics.events_dropped(DropReason::Backpressure, 1);
                }
                debug!(client_id = %id, "Client buffer full, heartbeat dropped");
            }
            HeartbeatOutcome::Gone => {}
        }
        outcome
    }

    pub fn stats(&self) -> FanoutStats {
        let c = &self.counters;
        FanoutStats {
            connected_clients: self.connected_count(),
            total_connections: c.total_connections.load(Ordering::Relaxed),
            broadcasts: c.broadcasts.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            dropped_backpressure: c.dropped_backpressure.load(Ordering::Relaxed),
            dropped_closed: c.dropped_closed.load(Ordering::Relaxed),
            dropped_no_subscribers: c.dropped_no_subscribers.load(Ordering::Relaxed),
            heartbeats_sent: c.heartbeats_sent.load(Ordering::Relaxed),
            heartbeats_dropped: c.heartbeats_dropped.load(Ordering::Relaxed),
            last_seq: self.last_seq.load(Ordering::Relaxed),
        }
    }

    fn record(&self, report: &BroadcastReport) {
        let c = &self.counters;
        c.broadcasts.fetch_add(1, Ordering::Relaxed);
        c.delivered.fetch_add(report.delivered as u64, Ordering::Relaxed);
        c.dropped_backpressure
            .fetch_add(report.dropped_backpressure as u64, Ordering::Relaxed);
        c.dropped_closed
            .fetch_add(report.dropped_closed as u64, Ordering::Relaxed);
        if report.no_subscribers {
            c.dropped_no_subscribers.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(metrics) = &self.metrics {
            metrics.event_broadcast();
            metrics.events_dropped(DropReason::Backpressure, report.dropped_backpressure);
            metrics.events_dropped(DropReason::Closed, report.dropped_closed);
            metrics.events_dropped(DropReason::NoSubscribers, usize::from(report.no_subscribers));
        }
    }

    fn update_gauge(&self, total: usize) {
        if let Some(metrics) = &self.metrics {
            metrics.set_connected_clients(total);
        }
    }
}
