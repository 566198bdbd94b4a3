

mod base;
mod bus;

pub use base::{Event, EventMetadata, EventType};
pub use bus::{EventBus, EventHandler};
