use tracing::{trace, warn};

use hottakes_wire::{CommentEvent, Envelope, FeedEvent};

/// Decode a feed-topic envelope into a typed event. Unknown types are
/// ignored; known types with a bad payload are logged and dropped.
/// Delivery order is arrival order, there is no buffering here.
pub fn route_feed(envelope: &Envelope) -> Option<FeedEvent> {
    match FeedEvent::from_envelope(envelope) {
        Ok(Some(event)) => Some(event),
        Ok(None) => {
            trace!(kind = %envelope.kind, "ignoring unknown feed frame");
            None
        }
        Err(err) => {
            warn!(kind = %envelope.kind, error = %err, "dropping undecodable feed frame");
            None
        }
    }
}

/// Decode a comments-topic envelope. Scoping to one take is done by the
/// topic path, not by filtering here.
pub fn route_comment(envelope: &Envelope) -> Option<CommentEvent> {
    match CommentEvent::from_envelope(envelope) {
        Ok(Some(event)) => Some(event),
        Ok(None) => {
            trace!(kind = %envelope.kind, "ignoring unknown comment frame");
            None
        }
        Err(err) => {
            warn!(kind = %envelope.kind, error = %err, "dropping undecodable comment frame");
            None
        }
    }
}
