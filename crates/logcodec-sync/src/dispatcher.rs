//! Instance filtering and routing of decoded events.

use crate::game_event::{EventShapeError, GameEvent};
use logcodec_core::DecodedEvent;
use tracing::{trace, warn};

/// Where a decoded event goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Carries an `instance` other than the active one
    OtherInstance(u64),
    /// Decoded fine but has no `GameEvent` variant
    Unhandled,
    /// Known name, fields of the wrong shape
    Malformed(EventShapeError),
    Handle(GameEvent),
}

/// Route one decoded event for the active game instance.
///
/// Events without an `instance` field are not instance-scoped and always
/// pass the filter. An `instance` that is not a u64 makes the event malformed.
pub fn dispatch(event: &DecodedEvent, active_instance: u64) -> Route {
    if let Some(value) = event.field("instance") {
        let Some(instance) = value.as_u64() else {
            let e = EventShapeError {
                event: event.name.clone(),
                field: "instance".to_string(),
                expected: "u64",
            };
            warn!(error = %e, "dropping event with unexpected shape");
            return Route::Malformed(e);
        };
        if instance != active_instance {
            trace!(event = %event.name, instance, active_instance, "event for another instance");
            return Route::OtherInstance(instance);
        }
    }

    match GameEvent::from_decoded(event) {
        Ok(Some(game_event)) => Route::Handle(game_event),
        Ok(None) => {
            trace!(event = %event.name, "no handler for event");
            Route::Unhandled
        }
        Err(e) => {
            warn!(error = %e, "dropping event with unexpected shape");
            Route::Malformed(e)
        }
    }
}
