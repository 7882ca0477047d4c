//! Event bus for state-change notification.
//!
//! A synchronous publish-subscribe channel: the scheduler and agent registry
//! publish [`Event`]s, and every [`Subscriber`] registered for the event's
//! kind is called in registration order before `publish` returns.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, AgentState};
use crate::task::{TaskId, TaskStatus};

/// Kinds of events that can be published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// A task was submitted to the scheduler.
    TaskCreated,
    /// A task moved to a new status.
    TaskStatusChanged,
    /// An agent moved to a new state.
    AgentStateChanged,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [EventKind; 3] = [
        EventKind::TaskCreated,
        EventKind::TaskStatusChanged,
        EventKind::AgentStateChanged,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskCreated => "task_created",
            EventKind::TaskStatusChanged => "task_status_changed",
            EventKind::AgentStateChanged => "agent_state_changed",
        }
    }
}

/// An event in the system. Each variant carries only its own payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    TaskCreated { task_id: TaskId, description: String },
    TaskStatusChanged { task_id: TaskId, new_status: TaskStatus },
    AgentStateChanged { agent_id: AgentId, new_state: AgentState },
}

impl Event {
    pub fn task_created(task_id: TaskId, description: impl Into<String>) -> Self {
        Event::TaskCreated {
            task_id,
            description: description.into(),
        }
    }

    pub fn task_status_changed(task_id: TaskId, new_status: TaskStatus) -> Self {
        Event::TaskStatusChanged { task_id, new_status }
    }

    pub fn agent_state_changed(agent_id: AgentId, new_state: AgentState) -> Self {
        Event::AgentStateChanged { agent_id, new_state }
    }

    /// The kind used to route this event to subscribers.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::TaskCreated { .. } => EventKind::TaskCreated,
            Event::TaskStatusChanged { .. } => EventKind::TaskStatusChanged,
            Event::AgentStateChanged { .. } => EventKind::AgentStateChanged,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::TaskCreated { task_id, description } => {
                write!(f, "TaskCreated: ID={}, Desc=\"{}\"", task_id, description)
            }
            Event::TaskStatusChanged { task_id, new_status } => {
                write!(f, "TaskStatusChanged: ID={}, NewStatus={}", task_id, new_status)
            }
            Event::AgentStateChanged { agent_id, new_state } => {
                write!(f, "AgentStateChanged: ID={}, NewState={}", agent_id, new_state)
            }
        }
    }
}

/// Something that handles events delivered by the bus.
pub trait Subscriber: Send + Sync {
    fn on_event(&self, event: &Event);
}

type SubscriberList = Vec<Arc<dyn Subscriber>>;

/// Synchronous event bus.
#[derive(Default)]
pub struct EventBus {
    /// Registered subscribers by kind, in registration order.
    subscribers: Mutex<BTreeMap<EventKind, SubscriberList>>,
}

impl EventBus {
    /// Create a new event bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber for one event kind.
    ///
    /// Registering the same subscriber twice delivers each event to it twice.
    pub fn subscribe(&self, kind: EventKind, subscriber: Arc<dyn Subscriber>) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let list = subscribers.entry(kind).or_default();
        list.push(subscriber);
        log::debug!("Subscriber added for {} ({} total)", kind.as_str(), list.len());
    }

    /// Register a subscriber for every event kind.
    pub fn subscribe_all(&self, subscriber: Arc<dyn Subscriber>) {
        for kind in EventKind::ALL {
            self.subscribe(kind, subscriber.clone());
        }
    }

    /// Remove every registration of `subscriber` for `kind`.
    ///
    /// Returns false if the subscriber was not registered.
    pub fn unsubscribe<S: Subscriber + ?Sized>(&self, kind: EventKind, subscriber: &Arc<S>) -> bool {
        let target = Arc::as_ptr(subscriber) as *const ();
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = subscribers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| Arc::as_ptr(s) as *const () != target);
        list.len() != before
    }

    /// Deliver an event to the subscribers registered for its kind.
    ///
    /// Delivery works on a snapshot of the subscriber list, so callbacks may
    /// subscribe or unsubscribe without affecting the current pass.
    pub fn publish(&self, event: Event) {
        let snapshot: SubscriberList = {
            let subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            match subscribers.get(&event.kind()) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        for subscriber in snapshot {
            subscriber.on_event(&event);
        }
    }

    /// Number of registrations for a kind.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.get(&kind).map_or(0, Vec::len)
    }
}

/// Writes every event it receives to the log.
#[derive(Debug, Default)]
pub struct LoggingSubscriber;

impl Subscriber for LoggingSubscriber {
    fn on_event(&self, event: &Event) {
        log::info!("[EVENT] {}", event);
    }
}

/// An event together with the time it was observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub event: Event,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct RecorderState {
    history: VecDeque<RecordedEvent>,
    counts: HashMap<EventKind, usize>,
}

/// Keeps a bounded history of received events and per-kind counts.
pub struct EventRecorder {
    state: Mutex<RecorderState>,
    max_history: usize,
}

impl EventRecorder {
    /// Create a recorder with the default history size.
    pub fn new() -> Self {
        Self::with_history_size(1000)
    }

    /// Create a recorder with custom history size.
    pub fn with_history_size(size: usize) -> Self {
        Self {
            state: Mutex::new(RecorderState::default()),
            max_history: size,
        }
    }

    /// Recorded events, oldest first.
    pub fn events(&self) -> Vec<Event> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.history.iter().map(|r| r.event.clone()).collect()
    }

    /// The last `limit` recorded events with timestamps.
    pub fn recent(&self, limit: usize) -> Vec<RecordedEvent> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let start = state.history.len().saturating_sub(limit);
        state.history.iter().skip(start).cloned().collect()
    }

    /// Total events of a kind seen, including ones evicted from history.
    pub fn count(&self, kind: EventKind) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget history and counts.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.history.clear();
        state.counts.clear();
    }
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscriber for EventRecorder {
    fn on_event(&self, event: &Event) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state.counts.entry(event.kind()).or_insert(0) += 1;
        state.history.push_back(RecordedEvent {
            event: event.clone(),
            timestamp: Utc::now(),
        });
        while state.history.len() > self.max_history {
            state.history.pop_front();
        }
    }
}
