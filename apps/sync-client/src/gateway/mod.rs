//! Real-time gateway: wire format, transport seam, connection manager, and
//! the event bus that fans decoded events out to the rest of the engine.

pub mod bus;
pub mod connection;
pub mod events;
pub mod transport;
