//! Message Bus for inter-component communication
//!
//! The MessageBus provides a pub/sub pattern for components to observe the
//! kernel without tight coupling: the cycle controller publishes an event at
//! every boundary it crosses, and consumers (the CLI run loop, tests) pick
//! the types they care about. Bounded channels prevent unbounded memory
//! growth; a slow subscriber drops events rather than stalling the kernel.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use sdk::{Outcome, Phase};

/// Channel buffer size for bounded channels
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Event types that can be subscribed to on the message bus
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum EventType {
    ObjectiveSubmitted,
    ObjectiveRouted,
    PhaseCompleted,
    ToolInvoked,
    ObjectiveCompleted,
    ObjectiveFailed,
    ObjectiveBlocked,
    /// Subscribe to all event types
    All,
}

/// Events published by the kernel
#[derive(Debug, Clone)]
pub enum Event {
    ObjectiveSubmitted {
        objective_id: String,
        description: String,
    },
    ObjectiveRouted {
        objective_id: String,
        capability: String,
    },
    PhaseCompleted {
        objective_id: String,
        phase: Phase,
        outcome: Outcome,
    },
    ToolInvoked {
        objective_id: String,
        tool: String,
        success: bool,
    },
    ObjectiveCompleted {
        objective_id: String,
        summary: String,
    },
    ObjectiveFailed {
        objective_id: String,
        error: String,
    },
    ObjectiveBlocked {
        objective_id: String,
        reason: String,
    },
}

impl Event {
    /// Get the event type for this event
    pub fn event_type(&self) -> EventType {
        match self {
            Event::ObjectiveSubmitted { .. } => EventType::ObjectiveSubmitted,
            Event::ObjectiveRouted { .. } => EventType::ObjectiveRouted,
            Event::PhaseCompleted { .. } => EventType::PhaseCompleted,
            Event::ToolInvoked { .. } => EventType::ToolInvoked,
            Event::ObjectiveCompleted { .. } => EventType::ObjectiveCompleted,
            Event::ObjectiveFailed { .. } => EventType::ObjectiveFailed,
            Event::ObjectiveBlocked { .. } => EventType::ObjectiveBlocked,
        }
    }
}

/// Message bus for pub/sub communication between components
pub struct MessageBus {
    /// Map of event types to subscriber channels, each bounded by
    /// CHANNEL_BUFFER_SIZE
    channels: Arc<Mutex<HashMap<EventType, Vec<mpsc::Sender<Event>>>>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Subscribe to a specific event type, or `EventType::All` for everything.
    pub async fn subscribe(&self, event_type: EventType) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let mut channels = self.channels.lock().await;
        channels.entry(event_type).or_default().push(tx);
        rx
    }

    /// Publish an event to all subscribers of its type and to `All`
    /// subscribers. A full or closed subscriber channel is skipped.
    pub async fn publish(&self, event: Event) {
        let channels = self.channels.lock().await;
        let event_type = event.event_type();

        if let Some(subscribers) = channels.get(&event_type) {
            for tx in subscribers {
                let _ = tx.try_send(event.clone());
            }
        }

        if let Some(subscribers) = channels.get(&EventType::All) {
            for tx in subscribers {
                let _ = tx.try_send(event.clone());
            }
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
