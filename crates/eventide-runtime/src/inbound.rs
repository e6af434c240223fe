//! Decoding events received from other services.

use eventide_core::error::DomainError;
use eventide_core::event::Event;
use eventide_core::registry::EventRegistry;

/// Decodes an inbound JSON event envelope declared as `event_type`.
///
/// The declared name must be registered and must equal the envelope's own
/// `event_type`; the payload is checked against the registered shape.
///
/// # Errors
///
/// Returns `DomainError::UnknownEventType`, `DomainError::MismatchedEventType`
/// or `DomainError::PayloadDecode`.
pub fn decode_envelope(
    registry: &EventRegistry,
    event_type: &str,
    envelope: &[u8],
) -> Result<Event, DomainError> {
    if !registry.contains(event_type) {
        return Err(DomainError::UnknownEventType(event_type.to_owned()));
    }
    let mut event: Event =
        serde_json::from_slice(envelope).map_err(|source| DomainError::PayloadDecode {
            event_type: event_type.to_owned(),
            source,
        })?;
    if event.event_type != event_type {
        return Err(DomainError::MismatchedEventType {
            expected: event_type.to_owned(),
            found: event.event_type,
        });
    }
    let data = std::mem::take(&mut event.data);
    event.data = registry.decode_value(event_type, data)?;
    Ok(event)
}
