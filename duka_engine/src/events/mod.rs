//! Engine events
//!
//! The engine publishes an event whenever an order changes status, a payment transaction settles, or a stock level
//! crosses its reorder point. Subscribers register async closures with [`EventHooks`]; each hook runs on its own
//! channel so that a slow subscriber never holds up the engine.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
