//! Per-sender messaging sessions.
//!
//! - [`SessionStore`]: the in-memory map of sessions, shared by the manager
//!   and the reaper
//! - [`SessionManager`]: opens connections, tracks pairing and readiness,
//!   tears sessions down
//! - [`IdleReaper`]: periodic sweeps of stale codes and stuck sessions
//! - [`state`]: the pure per-session state machine

mod manager;
mod reaper;
pub mod state;
mod store;


pub use manager::{DEFAULT_POLL_INTERVAL, ManagerConfig, PairingOutcome, SessionManager};
pub use reaper::{DEFAULT_CODES_INTERVAL, DEFAULT_STUCK_INTERVAL, IdleReaper, ReaperConfig};
pub use state::{SessionEvent, SessionState};
pub use store::{SessionHandle, SessionStatus, SessionStore, Signal};
