//! Event registry: event type names, payload shapes and the local-only flag.
//!
//! The registry is filled once during setup and read for the rest of the
//! process lifetime. Entries are append-only: a name can be registered once,
//! so the local-only flag of an event type never changes after the fact.
//! Writes and reads are guarded by a read-write lock so a late registration
//! cannot race a reader.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::DomainError;
use crate::event::EventPayload;

type Decoder =
    dyn Fn(serde_json::Value) -> Result<serde_json::Value, serde_json::Error> + Send + Sync;

/// Decoder that checks a raw payload against a registered type.
#[derive(Clone)]
pub struct PayloadShape {
    type_name: &'static str,
    decode: Arc<Decoder>,
}

impl PayloadShape {
    /// Shape backed by the serde implementation of `T`.
    ///
    /// A payload is accepted when it deserializes into `T`; the normalized
    /// re-serialized form is what gets handed to the aggregate.
    #[must_use]
    pub fn of<T: EventPayload>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            decode: Arc::new(|value: serde_json::Value| {
                let typed: T = serde_json::from_value(value)?;
                serde_json::to_value(typed)
            }),
        }
    }

    /// Shape that accepts any JSON payload unchanged.
    #[must_use]
    pub fn opaque() -> Self {
        Self {
            type_name: "serde_json::Value",
            decode: Arc::new(|value: serde_json::Value| Ok::<_, serde_json::Error>(value)),
        }
    }

    /// Name of the Rust type backing this shape.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for PayloadShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PayloadShape")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// A registered event type.
#[derive(Debug, Clone)]
pub struct EventType {
    /// The event type name.
    pub name: String,
    /// The payload shape for deserialization.
    pub shape: PayloadShape,
    /// Whether the event must stay inside the process.
    pub is_local: bool,
}

/// Maps event type names to payload shapes and the local-only flag.
#[derive(Debug, Default)]
pub struct EventRegistry {
    entries: RwLock<HashMap<String, EventType>>,
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the payload type `T` under `T::EVENT_TYPE`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DuplicateEventType` if the name is taken.
    pub fn register<T: EventPayload>(&self, is_local: bool) -> Result<(), DomainError> {
        self.register_shape(T::EVENT_TYPE, PayloadShape::of::<T>(), is_local)
    }

    /// Registers an explicit payload shape under `name`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DuplicateEventType` if the name is taken; the
    /// first registration is kept.
    pub fn register_shape(
        &self,
        name: impl Into<String>,
        shape: PayloadShape,
        is_local: bool,
    ) -> Result<(), DomainError> {
        let name = name.into();
        let mut entries = self.entries.write();
        if entries.contains_key(&name) {
            return Err(DomainError::DuplicateEventType(name));
        }
        entries.insert(
            name.clone(),
            EventType {
                name,
                shape,
                is_local,
            },
        );
        Ok(())
    }

    /// Looks up a registered event type.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` if `name` is not registered.
    pub fn lookup(&self, name: &str) -> Result<EventType, DomainError> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::UnknownEventType(name.to_owned()))
    }

    /// Returns whether the event type must stay inside the process.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` if `name` is not registered.
    pub fn is_local(&self, name: &str) -> Result<bool, DomainError> {
        self.entries
            .read()
            .get(name)
            .map(|entry| entry.is_local)
            .ok_or_else(|| DomainError::UnknownEventType(name.to_owned()))
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Decodes a JSON payload against the shape registered for `name`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` for an unregistered name and
    /// `DomainError::PayloadDecode` when the payload does not fit.
    pub fn decode_value(
        &self,
        name: &str,
        value: serde_json::Value,
    ) -> Result<serde_json::Value, DomainError> {
        let decode = {
            let entries = self.entries.read();
            let entry = entries
                .get(name)
                .ok_or_else(|| DomainError::UnknownEventType(name.to_owned()))?;
            Arc::clone(&entry.shape.decode)
        };
        decode(value).map_err(|source| DomainError::PayloadDecode {
            event_type: name.to_owned(),
            source,
        })
    }

    /// Decodes raw JSON bytes against the shape registered for `name`.
    ///
    /// # Errors
    ///
    /// Same as [`EventRegistry::decode_value`]; bytes that are not JSON at
    /// all are reported as `DomainError::PayloadDecode`.
    pub fn decode(&self, name: &str, bytes: &[u8]) -> Result<serde_json::Value, DomainError> {
        if !self.contains(name) {
            return Err(DomainError::UnknownEventType(name.to_owned()));
        }
        let value = serde_json::from_slice(bytes).map_err(|source| DomainError::PayloadDecode {
            event_type: name.to_owned(),
            source,
        })?;
        self.decode_value(name, value)
    }

    /// Returns the registered event type names, sorted.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}
