

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::base::{Event, EventType};


pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;


/// Fan-out for pipeline events. `emit` hands each handler its own task and
/// returns immediately; observers can never stall a request.
pub struct EventBus {
    handlers: RwLock<HashMap<EventType, Vec<EventHandler>>>,
    catch_all: RwLock<Vec<EventHandler>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            catch_all: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, event_type: EventType, handler: EventHandler) {
        self.handlers
            .write()
            .entry(event_type)
            .or_default()
            .push(handler);
        let name: &'static str = event_type.into();
        debug!("Registered handler for event type: {}", name);
    }

    pub fn register_all(&self, handler: EventHandler) {
        self.catch_all.write().push(handler);
    }

    pub fn emit(&self, event: Event) {
        let mut targets: Vec<EventHandler> = self.catch_all.read().clone();
        if let Some(specific) = self.handlers.read().get(&event.event_type) {
            targets.extend(specific.iter().cloned());
        }

        if targets.is_empty() {
            return;
        }

        // Outside a runtime (sync callers, tests) handlers run inline.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                for handler in targets {
                    let event = event.clone();
                    handle.spawn(async move {
                        handler(event);
                    });
                }
            }
            Err(_) => {
                for handler in targets {
                    handler(event.clone());
                }
            }
        }
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
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_event_bus_dispatches_by_type() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);

        let handler: EventHandler = Arc::new(move |_event| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.register(EventType::CacheHit, handler);

        bus.emit(Event::new(EventType::CacheHit, json!({"test": true})));
        bus.emit(Event::new(EventType::CacheMiss, json!({"test": true})));

        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_catch_all_runs_inline_without_runtime() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = Arc::clone(&counter);
        bus.register_all(Arc::new(move |_event| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));

        bus.emit(Event::new(EventType::QueryFailed, json!({})));
        bus.emit(Event::new(EventType::StageLatency, json!({})));

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
