//! Messaging bridge runtime - process lifecycle, transport, and correlation
//!
//! This crate provides the low-level runtime infrastructure for talking to
//! the Node.js bridge that drives the messaging web client:
//!
//! - **Driver lookup**: Locating `node` and the bridge script
//! - **Process**: Spawning and tearing down one bridge process per sender
//! - **Transport**: Length-prefixed JSON frames over stdio pipes
//! - **Connection**: Request/response correlation and event forwarding
//! - **Client**: The typed API used by `invite-core`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ invite-core  │  Session lifecycle, dispatch
//! └──────┬───────┘
//!        │ BridgeClient
//! ┌──────▼───────┐
//! │ invite-rt    │  This crate
//! │  ┌────────┐  │
//! │  │ Conn   │  │  id correlation, events
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  framed stdio pipe
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Proc   │  │  node bridge.js
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod client;
pub mod connection;
pub mod driver;
pub mod error;
pub mod process;
pub mod transport;

pub use client::{BridgeClient, BridgeOptions};
pub use connection::BridgeConnection;
pub use driver::{BridgeExecutable, locate_bridge};
pub use error::{Error, Result};
pub use process::BridgeProcess;
pub use transport::{PipeTransport, PipeTransportReceiver, PipeTransportSender};
