mod channel;
mod dispatcher;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use dispatcher::{DispatcherConfig, EventDispatcher};
pub use event_types::{DomainEvent, EventRecord};
pub use hooks::{EventHandlers, EventHooks, EventProducers};
