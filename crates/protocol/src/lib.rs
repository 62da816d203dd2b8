//! Wire types for the messaging bridge protocol.
//!
//! The bridge is a Node.js process that drives the messaging web client inside
//! a headless browser, one process per sender. This crate contains the
//! serde-serializable shapes exchanged with it over the length-prefixed stdio
//! pipe:
//!
//! - [`Request`] / [`Response`]: id-correlated method calls
//! - [`BridgeEvent`]: unsolicited lifecycle notifications (pairing code,
//!   authenticated, ready, auth failure, disconnected)
//! - [`Message`]: discriminated union of everything the bridge writes
//!
//! Types here are pure data. Correlation, framing and process management live
//! in `invite-runtime`.

pub mod message;
pub mod params;

pub use message::*;
pub use params::*;
