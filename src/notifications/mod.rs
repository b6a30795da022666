//! Notifications module
//!
//! In-process event bus carrying effective-limit changes, profile and
//! transaction lifecycle events and sampled meter values.
//!
//! # Usage
//! ```ignore
//! use cp_simulator::notifications::{create_event_bus, Event};
//!
//! let event_bus = create_event_bus();
//! let mut events = event_bus.subscribe();
//! while let Some(msg) = events.recv().await {
//!     println!("{} on connector {}", msg.event.event_type(), msg.event.connector_id());
//! }
//! ```

pub mod event_bus;
pub mod events;

pub use event_bus::{create_event_bus, EventBus, EventFilter, EventSubscriber, SharedEventBus};
pub use events::*;
