//! Transform hook
//!
//! Migration can rewrite events in flight: schema upcasts, splits, drops.
//! The engine only carries the seam; transform authoring is external. The
//! copier applies the hook per source event and appends the outputs in
//! input order, so causal order is preserved whatever the fan-out.

use lode_core::error::Result;
use lode_core::event::Event;

/// Pluggable event transform applied during catch-up copying.
///
/// `transform` may return 0..n events: an empty vector drops the event, one
/// event rewrites it, several split it.
pub trait TransformHook: Send + Sync {
    /// True if events of this type/schema version should be transformed
    fn applies_to(&self, event_type: &str, schema_version: u32) -> bool;

    /// Produce the target-stream rendition of one source event
    ///
    /// # Errors
    ///
    /// A transform error fails the migration round; nothing is appended for
    /// the failing page.
    fn transform(&self, event: &Event) -> Result<Vec<Event>>;
}

/// Hook that transforms nothing; every event copies verbatim
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTransform;

impl TransformHook for NoTransform {
    fn applies_to(&self, _event_type: &str, _schema_version: u32) -> bool {
        false
    }

    fn transform(&self, event: &Event) -> Result<Vec<Event>> {
        Ok(vec![event.clone()])
    }
}
