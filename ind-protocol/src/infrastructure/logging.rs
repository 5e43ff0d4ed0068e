//! Utilities for our logging (tracing) infrastructure.

use std::fmt::Debug;
use tracing::{warn, Span};

/// For the current active span, record `field_value` for the field
/// `field_name`. This field must already be defined in the current span.
///
/// All events that happen inside this span will have these fields attached as
/// additional data. Operations declare `guid = tracing::field::Empty` on their
/// span and record the trade guid once it is known, so every event of one
/// trade flow can be correlated in the logs.
///
/// In debug builds this function logs a warning when the field has NOT been
/// defined on the span.
pub fn record_field(field_name: &str, field_value: &dyn Debug) {
    if cfg!(debug_assertions) && !Span::current().has_field(field_name) {
        warn!("Field {} not defined in current span!", field_name);
    }

    // Ignore the resulting span.
    let _ = Span::current().record(field_name, &format!("{field_value:?}"));
}
