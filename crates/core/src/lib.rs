//! invite: wedding invitations over a personal messaging account.
//!
//! Each sender (one of the couple, a parent, ...) links their own account by
//! scanning a pairing code. Once the sender's session is ready, guests
//! assigned to them are invited one at a time with a personal RSVP link.
//!
//! - [`session`]: per-sender connection lifecycle, pairing and the idle reaper
//! - [`dispatch`]: sequential sending with retry and pacing
//! - [`phone`]: phone number normalization
//! - [`gateway`]: the guest-list contract
//! - [`transport`]: the seam to a concrete messaging connection
//! - [`bridge`]: that seam implemented over the Node.js bridge
//!
//! ```ignore
//! use invite::{BridgeConnector, Dispatcher, ManagerConfig, SessionManager, SessionStore};
//!
//! let sessions = SessionManager::new(SessionStore::new(), Arc::new(BridgeConnector::new()), ManagerConfig::new(root));
//! let summary = dispatcher.send_batch(&sender, &guests).await?;
//! println!("{} of {} sent", summary.successful, summary.total);
//! ```

pub mod bridge;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod phone;
pub mod session;
pub mod testing;
pub mod transport;
pub mod types;

pub use bridge::BridgeConnector;
pub use dispatch::{BatchSummary, DEFAULT_TEMPLATE, DispatchConfig, DispatchDetail, Dispatcher, MessageComposer};
pub use error::{ErrorCode, Failure, InviteError, Result};
pub use gateway::{Guest, GuestSource, RsvpResponse};
pub use phone::{DEFAULT_COUNTRY_CODE, PhoneNormalizer};
pub use session::{
	IdleReaper, ManagerConfig, PairingOutcome, ReaperConfig, SessionManager, SessionState, SessionStatus, SessionStore,
};
pub use transport::{Connection, ConnectionEvent, Connector, TransportError, TransportErrorKind};
pub use types::{Identity, MessageId, SenderId};
