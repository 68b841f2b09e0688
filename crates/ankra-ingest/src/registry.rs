use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use ankra_core::{EnrichedEvent, EventType};

/// Downstream consumer of a verified event.
///
/// Handlers must be idempotent and commutative within their event type:
/// the pipeline guarantees at-most-once dispatch per process lifetime, not
/// across restarts, and no cross-source ordering.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &EnrichedEvent) -> anyhow::Result<()>;
}

/// Numeric type code → handler. Built once at wiring time and immutable
/// afterwards.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<u32, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, event_type: EventType, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.insert(event_type.code(), handler);
        self
    }

    pub fn get(&self, code: u32) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(&code)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    #[async_trait]
    impl EventHandler for Nop {
        async fn handle(&self, _event: &EnrichedEvent) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn lookup_by_numeric_code() {
        let registry = HandlerRegistry::new()
            .register(EventType::CreateReleaseBundle, Arc::new(Nop))
            .register(EventType::Vote, Arc::new(Nop));
        assert!(registry.get(21).is_some());
        assert!(registry.get(40).is_some());
        assert!(registry.get(99).is_none());
        assert_eq!(registry.len(), 2);
    }
}
