use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{Event, EventHandler};

/// Default number of queued events before `publish_async` starts dropping.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1_000;

/// Opaque token returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Read-only view of a subscriber, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberInfo {
    pub id: SubscriptionId,
    pub name: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusState {
    Running,
    ShuttingDown,
    Stopped,
}

/// One handler that returned an error during a publish.
#[derive(Debug)]
pub struct HandlerFailure {
    pub handler: String,
    pub error: anyhow::Error,
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:#}", self.handler, self.error)
    }
}

fn describe_failures(failures: &[HandlerFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("handler '{name}' is already subscribed to '{event_type}'")]
    DuplicateHandler { event_type: String, name: String },
    #[error("subscription {0} not found")]
    SubscriptionNotFound(SubscriptionId),
    #[error("handler '{0}' is not subscribed to any event type")]
    HandlerNotFound(String),
    #[error("{} handler(s) failed for '{event_type}': {}", failures.len(), describe_failures(failures))]
    HandlersFailed {
        event_type: String,
        failures: Vec<HandlerFailure>,
    },
    #[error("event bus is shut down")]
    Closed,
    #[error("event queue was not drained within {0:?}")]
    ShutdownTimeout(Duration),
}

impl EventBusError {
    /// Names of the handlers that failed, if this is a publish failure.
    pub fn failed_handlers(&self) -> Vec<&str> {
        match self {
            EventBusError::HandlersFailed { failures, .. } => {
                failures.iter().map(|f| f.handler.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Clone)]
struct Subscriber {
    id: SubscriptionId,
    name: String,
    priority: i32,
    handler: Arc<dyn EventHandler>,
}

/// Subscriber table shared between the bus and its queue worker.
#[derive(Default)]
struct Dispatcher {
    table: RwLock<HashMap<String, Vec<Subscriber>>>,
}

impl Dispatcher {
    /// Copy of the subscribers for `event_type`, highest priority first.
    /// The sort is stable, so equal priorities keep subscription order.
    fn snapshot(&self, event_type: &str) -> Vec<Subscriber> {
        let mut subs = self
            .table
            .read()
            .get(event_type)
            .cloned()
            .unwrap_or_default();
        subs.sort_by(|a, b| b.priority.cmp(&a.priority));
        subs
    }

    async fn dispatch(&self, event: &Event) -> Result<(), EventBusError> {
        let subs = self.snapshot(&event.event_type);
        if subs.is_empty() {
            tracing::trace!(event_type = %event.event_type, "No subscribers for event");
            return Ok(());
        }

        let mut failures = Vec::new();
        for sub in subs {
            if let Err(error) = sub.handler.handle(event).await {
                tracing::warn!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    handler = %sub.name,
                    error = %format!("{error:#}"),
                    "Event handler failed"
                );
                failures.push(HandlerFailure {
                    handler: sub.name,
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EventBusError::HandlersFailed {
                event_type: event.event_type.clone(),
                failures,
            })
        }
    }
}

async fn drain_queue(dispatcher: Arc<Dispatcher>, mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match AssertUnwindSafe(dispatcher.dispatch(&event))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    error = %err,
                    "Queued event delivered with handler failures"
                );
            }
            Err(_) => {
                tracing::error!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    "Event handler panicked while draining queue"
                );
            }
        }
    }
    tracing::debug!("Event queue worker finished");
}

/// Publish/subscribe engine keyed by event-type string.
///
/// Construct it inside a tokio runtime: the queue worker is spawned by [`EventBus::new`].
pub struct EventBus {
    dispatcher: Arc<Dispatcher>,
    next_id: AtomicU64,
    queue: Mutex<Option<mpsc::Sender<Event>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<BusState>,
    stopped: watch::Sender<bool>,
    capacity: usize,
    dropped: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let event_types: Vec<String> = self.dispatcher.table.read().keys().cloned().collect();
        f.debug_struct("EventBus")
            .field("state", &self.state())
            .field("capacity", &self.capacity)
            .field("event_types", &event_types)
            .field("dropped", &self.dropped_events())
            .finish()
    }
}

impl EventBus {
    /// Create a bus whose async queue holds up to `capacity` events.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let dispatcher = Arc::new(Dispatcher::default());
        let (tx, rx) = mpsc::channel(capacity);
        let worker = tokio::spawn(drain_queue(Arc::clone(&dispatcher), rx));

        Self {
            dispatcher,
            next_id: AtomicU64::new(1),
            queue: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            state: Mutex::new(BusState::Running),
            stopped: watch::Sender::new(false),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn state(&self) -> BusState {
        *self.state.lock()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events dropped because the queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of events currently waiting in the queue.
    pub fn pending_events(&self) -> usize {
        self.queue
            .lock()
            .as_ref()
            .map(|tx| self.capacity - tx.capacity())
            .unwrap_or(0)
    }

    fn ensure_open(&self) -> Result<(), EventBusError> {
        if self.state() == BusState::Stopped {
            return Err(EventBusError::Closed);
        }
        Ok(())
    }

    /// Subscribe `handler` to `event_type` under the identity `name`.
    pub fn subscribe(
        &self,
        event_type: &str,
        name: &str,
        handler: Arc<dyn EventHandler>,
        priority: i32,
    ) -> Result<SubscriptionId, EventBusError> {
        self.ensure_open()?;

        let mut table = self.dispatcher.table.write();
        let subs = table.entry(event_type.to_string()).or_default();
        if subs.iter().any(|s| s.name == name) {
            return Err(EventBusError::DuplicateHandler {
                event_type: event_type.to_string(),
                name: name.to_string(),
            });
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        subs.push(Subscriber {
            id,
            name: name.to_string(),
            priority,
            handler,
        });
        tracing::debug!(event_type, handler = name, priority, %id, "Handler subscribed");
        Ok(id)
    }

    /// Remove the subscription identified by `id`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<(), EventBusError> {
        self.ensure_open()?;

        let mut table = self.dispatcher.table.write();
        let mut emptied = None;
        let mut found = false;
        for (event_type, subs) in table.iter_mut() {
            if let Some(pos) = subs.iter().position(|s| s.id == id) {
                subs.remove(pos);
                found = true;
                if subs.is_empty() {
                    emptied = Some(event_type.clone());
                }
                break;
            }
        }
        if let Some(event_type) = emptied {
            table.remove(&event_type);
        }

        if found {
            tracing::debug!(%id, "Handler unsubscribed");
            Ok(())
        } else {
            Err(EventBusError::SubscriptionNotFound(id))
        }
    }

    /// Remove the handler identity `name` from every event type.
    pub fn unsubscribe_handler(&self, name: &str) -> Result<(), EventBusError> {
        self.ensure_open()?;

        let mut table = self.dispatcher.table.write();
        let mut removed = 0usize;
        for subs in table.values_mut() {
            let before = subs.len();
            subs.retain(|s| s.name != name);
            removed += before - subs.len();
        }
        table.retain(|_, subs| !subs.is_empty());

        if removed == 0 {
            return Err(EventBusError::HandlerNotFound(name.to_string()));
        }
        tracing::debug!(handler = name, removed, "Handler unsubscribed from all event types");
        Ok(())
    }

    /// Subscribers of `event_type` in delivery order.
    pub fn subscribers(&self, event_type: &str) -> Vec<SubscriberInfo> {
        self.dispatcher
            .snapshot(event_type)
            .into_iter()
            .map(|s| SubscriberInfo {
                id: s.id,
                name: s.name,
                priority: s.priority,
            })
            .collect()
    }

    /// Deliver an event to every subscriber, highest priority first.
    ///
    /// All handlers run even if some fail; the failures are returned together.
    pub async fn publish(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), EventBusError> {
        self.publish_event(&Event::new(event_type, payload)).await
    }

    pub async fn publish_event(&self, event: &Event) -> Result<(), EventBusError> {
        self.ensure_open()?;
        self.dispatcher.dispatch(event).await
    }

    /// Queue an event for background delivery. Never blocks.
    ///
    /// A full queue drops the event and counts it in [`EventBus::dropped_events`];
    /// the only error is [`EventBusError::Closed`] once shutdown has begun.
    pub fn publish_async(
        &self,
        event_type: &str,
        payload: serde_json::Value,
    ) -> Result<(), EventBusError> {
        self.publish_event_async(Event::new(event_type, payload))
    }

    pub fn publish_event_async(&self, event: Event) -> Result<(), EventBusError> {
        let queue = self.queue.lock();
        let Some(tx) = queue.as_ref() else {
            return Err(EventBusError::Closed);
        };

        match tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                let dropped_total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    capacity = self.capacity,
                    dropped_total,
                    "Event queue full; dropping event"
                );
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(EventBusError::Closed),
        }
    }

    /// Stop accepting queued events and wait for the worker to drain.
    ///
    /// If `deadline` elapses first the worker is aborted and whatever is still
    /// queued is abandoned. A call made while another one is draining waits
    /// for that drain to finish, bounded by its own `deadline`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), EventBusError> {
        let draining_elsewhere = {
            let mut state = self.state.lock();
            match *state {
                BusState::Stopped => return Ok(()),
                BusState::ShuttingDown => true,
                BusState::Running => {
                    *state = BusState::ShuttingDown;
                    false
                }
            }
        };

        if draining_elsewhere {
            let mut stopped = self.stopped.subscribe();
            return match tokio::time::timeout(deadline, stopped.wait_for(|done| *done)).await {
                Ok(_) => Ok(()),
                Err(_) => {
                    tracing::warn!(?deadline, "Timed out waiting for the event queue drain");
                    Err(EventBusError::ShutdownTimeout(deadline))
                }
            };
        }

        // Dropping the only sender lets the worker finish once the queue is empty.
        drop(self.queue.lock().take());
        let worker = self.worker.lock().take();

        let result = match worker {
            Some(mut handle) => match tokio::time::timeout(deadline, &mut handle).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(join_err)) => {
                    tracing::error!(error = %join_err, "Event queue worker terminated abnormally");
                    Ok(())
                }
                Err(_) => {
                    handle.abort();
                    tracing::warn!(?deadline, "Event queue drain timed out; abandoning queued events");
                    Err(EventBusError::ShutdownTimeout(deadline))
                }
            },
            None => Ok(()),
        };

        *self.state.lock() = BusState::Stopped;
        self.stopped.send_replace(true);
        tracing::info!("Event bus stopped");
        result
    }
}
