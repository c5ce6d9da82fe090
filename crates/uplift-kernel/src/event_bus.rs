//! Event bus — pub/sub over kernel events with a history ring buffer.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use uplift_memory::events::EventStore;
use uplift_types::agent::AgentId;
use uplift_types::event::{Event, EventTarget};

/// Maximum events retained in the history ring buffer.
const HISTORY_SIZE: usize = 1000;

/// The central event bus for lifecycle, task, and approval events.
pub struct EventBus {
    /// Broadcast channel for all events.
    sender: broadcast::Sender<Event>,
    /// Per-agent event channels.
    agent_channels: DashMap<AgentId, broadcast::Sender<Event>>,
    /// Event history ring buffer.
    history: Arc<RwLock<VecDeque<Event>>>,
    /// Durable copy of every published event.
    store: Option<EventStore>,
}

impl EventBus {
    /// Create a new in-memory-only event bus.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            sender,
            agent_channels: DashMap::new(),
            history: Arc::new(RwLock::new(VecDeque::with_capacity(HISTORY_SIZE))),
            store: None,
        }
    }

    /// Create an event bus that also persists every published event.
    pub fn with_store(store: EventStore) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    /// Publish an event to the bus.
    pub async fn publish(&self, event: Event) {
        debug!(
            event_id = %event.id,
            source = %event.source,
            "Publishing event"
        );

        // Store in history
        {
            let mut history = self.history.write().await;
            if history.len() >= HISTORY_SIZE {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // Durable copy; a write failure must not block delivery
        if let Some(store) = &self.store {
            if let Err(e) = store.insert(&event) {
                warn!(event_id = %event.id, error = %e, "Could not persist event");
            }
        }

        // Route to target
        match &event.target {
            EventTarget::Agent(agent_id) => {
                if let Some(sender) = self.agent_channels.get(agent_id) {
                    let _ = sender.send(event.clone());
                }
            }
            EventTarget::Broadcast => {
                let _ = self.sender.send(event.clone());
                for entry in self.agent_channels.iter() {
                    let _ = entry.value().send(event.clone());
                }
            }
            EventTarget::System => {
                let _ = self.sender.send(event.clone());
            }
        }
    }

    /// Subscribe to events for a specific agent.
    pub fn subscribe_agent(&self, agent_id: AgentId) -> broadcast::Receiver<Event> {
        let entry = self.agent_channels.entry(agent_id).or_insert_with(|| {
            let (tx, _) = broadcast::channel(256);
            tx
        });
        entry.subscribe()
    }

    /// Subscribe to all broadcast/system events.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Get recent event history, newest first.
    pub async fn history(&self, limit: usize) -> Vec<Event> {
        let history = self.history.read().await;
        history.iter().rev().take(limit).cloned().collect()
    }

    /// Remove an agent's channel when it is terminated.
    pub fn unsubscribe_agent(&self, agent_id: AgentId) {
        self.agent_channels.remove(&agent_id);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uplift_types::event::{EventPayload, SystemEvent, TaskEvent};
    use uplift_types::task::{TaskId, TaskStatus};

    #[tokio::test]
    async fn publish_and_history() {
        let bus = EventBus::new();
        let event = Event::new(
            AgentId::new(),
            EventTarget::System,
            EventPayload::System(SystemEvent::KernelStarted),
        );
        bus.publish(event).await;
        let history = bus.history(10).await;
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn agent_subscribe_receives_directed_events() {
        let bus = EventBus::new();
        let agent_id = AgentId::new();
        let mut rx = bus.subscribe_agent(agent_id);

        let event = Event::new(
            AgentId::new(),
            EventTarget::Agent(agent_id),
            EventPayload::Task(TaskEvent::Finished {
                task_id: TaskId::new(),
                status: TaskStatus::Completed,
            }),
        );
        bus.publish(event).await;

        let received = rx.recv().await.unwrap();
        match received.payload {
            EventPayload::Task(TaskEvent::Finished { status, .. }) => {
                assert_eq!(status, TaskStatus::Completed);
            }
            _ => panic!("Wrong payload"),
        }
    }

    #[tokio::test]
    async fn store_backed_bus_keeps_a_durable_copy() {
        let db = uplift_memory::open_in_memory().unwrap();
        let bus = EventBus::with_store(EventStore::new(db.clone()));

        bus.publish(Event::new(
            AgentId::new(),
            EventTarget::System,
            EventPayload::System(SystemEvent::KernelStarted),
        ))
        .await;

        let store = EventStore::new(db);
        let persisted = store.recent(10).unwrap();
        assert_eq!(persisted.len(), 1);
        assert!(matches!(
            persisted[0].payload,
            EventPayload::System(SystemEvent::KernelStarted)
        ));

        // The plain bus stays in-memory only
        let plain = EventBus::new();
        plain
            .publish(Event::new(
                AgentId::new(),
                EventTarget::System,
                EventPayload::System(SystemEvent::KernelStopping),
            ))
            .await;
        assert_eq!(store.recent(10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn broadcast_reaches_all_agents() {
        let bus = EventBus::new();
        let a = AgentId::new();
        let b = AgentId::new();
        let mut rx_a = bus.subscribe_agent(a);
        let mut rx_b = bus.subscribe_agent(b);

        bus.publish(Event::new(
            AgentId::new(),
            EventTarget::Broadcast,
            EventPayload::System(SystemEvent::EmergencyStop {
                reason: "drill".to_string(),
            }),
        ))
        .await;

        assert!(rx_a.recv().await.is_ok());
        assert!(rx_b.recv().await.is_ok());
    }
}
