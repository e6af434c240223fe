//! Event matchers: which events a saga reacts to.

use std::collections::BTreeSet;
use std::sync::Arc;

use eventide_core::event::{Event, EventPayload};
use eventide_core::registry::EventRegistry;

/// Predicate over committed events, expressed as data.
#[derive(Debug, Clone)]
pub enum EventMatcher {
    /// Every event.
    Any,
    /// Events of exactly one type.
    EventType(String),
    /// Events whose type is in the set.
    AnyOf(BTreeSet<String>),
    /// Events registered and not local-only.
    NotLocal(Arc<EventRegistry>),
    /// Events whose type is registered.
    InRegistry(Arc<EventRegistry>),
}

impl EventMatcher {
    /// Matches events carrying payload `T`.
    #[must_use]
    pub fn of<T: EventPayload>() -> Self {
        Self::EventType(T::EVENT_TYPE.to_owned())
    }

    /// Matches events whose type is one of `names`.
    pub fn any_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyOf(names.into_iter().map(Into::into).collect())
    }

    /// Returns `true` if `event` matches.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        let name = event.event_type.as_str();
        match self {
            Self::Any => true,
            Self::EventType(expected) => expected == name,
            Self::AnyOf(names) => names.contains(name),
            Self::NotLocal(registry) => registry.is_local(name).is_ok_and(|local| !local),
            Self::InRegistry(registry) => registry.contains(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    use eventide_core::context::Context;

    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    struct Paid;

    impl EventPayload for Paid {
        const EVENT_TYPE: &'static str = "Paid";
    }

    fn event(event_type: &str) -> Event {
        Event {
            aggregate_id: "A1".into(),
            aggregate_type: "Order".into(),
            event_type: event_type.into(),
            version: 1,
            timestamp: Context::new().now(),
            data: json!(null),
        }
    }

    #[test]
    fn test_type_matchers() {
        let any_of = EventMatcher::any_of(["Paid", "Refunded"]);

        assert!(EventMatcher::Any.matches(&event("Whatever")));
        assert!(EventMatcher::of::<Paid>().matches(&event("Paid")));
        assert!(!EventMatcher::of::<Paid>().matches(&event("Refunded")));
        assert!(any_of.matches(&event("Refunded")));
        assert!(!any_of.matches(&event("Shipped")));
    }

    #[test]
    fn test_registry_matchers() {
        let registry = EventRegistry::new();
        registry.register::<Paid>(false).unwrap();
        registry.register_shape(
            "Viewed",
            eventide_core::registry::PayloadShape::opaque(),
            true,
        )
        .unwrap();
        let registry = Arc::new(registry);
        let not_local = EventMatcher::NotLocal(Arc::clone(&registry));
        let registered = EventMatcher::InRegistry(registry);

        assert!(not_local.matches(&event("Paid")));
        assert!(!not_local.matches(&event("Viewed")));
        assert!(!not_local.matches(&event("Typo")));
        assert!(registered.matches(&event("Viewed")));
        assert!(!registered.matches(&event("Typo")));
    }
}
