// ── Handler registry ──
//
// Maps request identifiers to the handler waiting on them and owns the
// identifier counter. It is always accessed through the connection's
// lock, so allocation and registration happen in one critical section.

use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::Handler;

/// How long a registration lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifetime {
    /// Removed by the first terminal frame (`result` or `pong`).
    OneShot,
    /// Survives its acknowledgement; removed explicitly or on close.
    Subscription,
}

struct Entry {
    handler: Arc<dyn Handler>,
    lifetime: Lifetime,
}

pub(crate) struct Registry {
    entries: HashMap<u64, Entry>,
    last_id: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            last_id: 0,
        }
    }

    /// Allocate the next identifier and register `handler` under it.
    ///
    /// Identifiers start at 1, strictly increase, and are never reused,
    /// even when no handler is supplied.
    pub(crate) fn allocate(&mut self, handler: Option<Arc<dyn Handler>>) -> u64 {
        self.last_id += 1;
        let id = self.last_id;
        if let Some(handler) = handler {
            let lifetime = if handler.as_event().is_some() {
                Lifetime::Subscription
            } else {
                Lifetime::OneShot
            };
            self.entries.insert(id, Entry { handler, lifetime });
        }
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> Option<Arc<dyn Handler>> {
        self.entries.remove(&id).map(|entry| entry.handler)
    }

    pub(crate) fn lookup(&self, id: u64) -> Option<Arc<dyn Handler>> {
        self.entries.get(&id).map(|entry| Arc::clone(&entry.handler))
    }

    /// Resolve the handler for a terminal frame.
    ///
    /// One-shot registrations are removed so a duplicate delivery finds
    /// nothing; subscriptions stay in place.
    pub(crate) fn resolve_terminal(&mut self, id: u64) -> Option<Arc<dyn Handler>> {
        match self.entries.get(&id)?.lifetime {
            Lifetime::OneShot => self.remove(id),
            Lifetime::Subscription => self.lookup(id),
        }
    }

    /// Remove every registration, returning them for close notification.
    pub(crate) fn drain(&mut self) -> Vec<(u64, Arc<dyn Handler>)> {
        let mut drained: Vec<_> = self
            .entries
            .drain()
            .map(|(id, entry)| (id, entry.handler))
            .collect();
        drained.sort_unstable_by_key(|(id, _)| *id);
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::connection::Connection;
    use crate::event::Event;
    use crate::handler::{EventHandler, ResultHandler};
    use crate::frame::Reply;

    struct OneShot;

    impl ResultHandler for OneShot {
        fn handle_result(&self, _conn: &Connection, _reply: Reply) {}
    }

    impl Handler for OneShot {
        fn as_result(&self) -> Option<&dyn ResultHandler> {
            Some(self)
        }
    }

    struct Subscriber;

    impl EventHandler for Subscriber {
        fn handle_event(
            &self,
            _conn: &Connection,
            _id: u64,
            _origin: &str,
            _fired_at: DateTime<Utc>,
            _event: &Event,
        ) {
        }
    }

    impl Handler for Subscriber {
        fn as_event(&self) -> Option<&dyn EventHandler> {
            Some(self)
        }
    }

    #[test]
    fn identifiers_start_at_one_and_increase() {
        let mut registry = Registry::new();
        let ids: Vec<u64> = (0..5)
            .map(|_| registry.allocate(Some(Arc::new(OneShot))))
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn allocation_without_handler_still_consumes_an_identifier() {
        let mut registry = Registry::new();
        assert_eq!(registry.allocate(None), 1);
        assert_eq!(registry.allocate(Some(Arc::new(OneShot))), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(1).is_none());
        assert!(registry.lookup(2).is_some());
    }

    #[test]
    fn removed_identifiers_are_not_reused() {
        let mut registry = Registry::new();
        let first = registry.allocate(Some(Arc::new(OneShot)));
        assert!(registry.remove(first).is_some());
        assert_eq!(registry.allocate(Some(Arc::new(OneShot))), 2);
    }

    #[test]
    fn terminal_frame_removes_one_shot_only() {
        let mut registry = Registry::new();
        let request = registry.allocate(Some(Arc::new(OneShot)));
        let subscription = registry.allocate(Some(Arc::new(Subscriber)));

        assert!(registry.resolve_terminal(request).is_some());
        assert!(registry.resolve_terminal(request).is_none());

        assert!(registry.resolve_terminal(subscription).is_some());
        assert!(registry.lookup(subscription).is_some());
    }

    #[test]
    fn drain_empties_the_registry_but_keeps_the_counter() {
        let mut registry = Registry::new();
        registry.allocate(Some(Arc::new(OneShot)));
        registry.allocate(Some(Arc::new(Subscriber)));

        let drained: Vec<u64> = registry.drain().into_iter().map(|(id, _)| id).collect();
        assert_eq!(drained, vec![1, 2]);
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.allocate(None), 3);
    }
}
