//! Station event bus
//!
//! Every connector worker and meter sampler of a station publishes onto one
//! broadcast channel. Subscribers choose what they see with an
//! [`EventFilter`]: one connector, a set of event types, or everything.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::events::{Event, EventMessage};

/// Default channel capacity
const DEFAULT_CAPACITY: usize = 1024;

/// Which events a subscriber receives. The default filter passes everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Only events of this connector
    pub connector_id: Option<u32>,
    /// Only these event types (see [`Event::event_type`])
    pub event_types: Option<Vec<&'static str>>,
}

impl EventFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn connector(connector_id: u32) -> Self {
        Self {
            connector_id: Some(connector_id),
            event_types: None,
        }
    }

    /// Restrict to the given event types.
    pub fn of_types(mut self, event_types: &[&'static str]) -> Self {
        self.event_types = Some(event_types.to_vec());
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.connector_id.map_or(true, |c| event.connector_id() == c)
            && self
                .event_types
                .as_ref()
                .map_or(true, |types| types.contains(&event.event_type()))
    }
}

/// Broadcast bus shared by the workers of one station
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Slow subscribers lose the oldest events once `capacity` are queued.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; with no subscriber it is dropped.
    pub fn publish(&self, event: Event) {
        let event_type = event.event_type();
        let connector_id = event.connector_id();
        metrics::counter!("simulator_events_published_total", "event_type" => event_type)
            .increment(1);

        let delivered = self.sender.send(EventMessage::new(event)).unwrap_or(0);
        debug!(event_type, connector_id, subscribers = delivered, "Event published");
    }

    /// Every event of the station.
    pub fn subscribe(&self) -> EventSubscriber {
        self.subscribe_filtered(EventFilter::all())
    }

    /// Events of one connector only.
    pub fn subscribe_connector(&self, connector_id: u32) -> EventSubscriber {
        self.subscribe_filtered(EventFilter::connector(connector_id))
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> EventSubscriber {
        debug!(?filter, subscribers = self.sender.receiver_count() + 1, "New event subscriber");
        EventSubscriber {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    /// Live subscribers, whatever their filter.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a filtered subscription
pub struct EventSubscriber {
    receiver: broadcast::Receiver<EventMessage>,
    filter: EventFilter,
}

impl EventSubscriber {
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Next matching event; `None` once every publisher is gone.
    pub async fn recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) if self.filter.matches(&msg.event) => return Some(msg),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, filter = ?self.filter, "Event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<EventMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(msg) if self.filter.matches(&msg.event) => return Some(msg),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!(missed, filter = ?self.filter, "Event subscriber lagged");
                }
                Err(_) => return None,
            }
        }
    }
}

/// Shared event bus type
pub type SharedEventBus = Arc<EventBus>;

pub fn create_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}
