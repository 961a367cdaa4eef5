//! Progress event stream.
//!
//! - [`ProgressEvent`] — the event envelope every producer emits.
//! - [`Broadcaster`] — non-blocking fan-out to any number of subscribers.
//! - [`start_heartbeat`] — periodic liveness events for the channel itself.

pub mod broadcaster;
pub mod event;
pub mod heartbeat;

pub use broadcaster::{Broadcaster, SubscriberId, Subscription};
pub use event::{EventKind, EventScope, ProgressEvent};
pub use heartbeat::{start_heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
