//! Progress stream over WebSocket.
//!
//! Each connection is one [`Broadcaster`](sculpt_events::Broadcaster)
//! subscriber. The periodic heartbeat lives in `sculpt_events`.

mod handler;

pub use handler::ws_handler;
