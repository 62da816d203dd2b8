//! Periodic cleanup of idle session state.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::manager::close_quietly;
use super::store::SessionStore;

pub const DEFAULT_CODES_INTERVAL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_STUCK_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct ReaperConfig {
	/// Period of the stale pairing code sweep.
	pub codes_interval: Duration,
	/// Period of the stuck session sweep.
	pub stuck_interval: Duration,
	/// Minimum time without a transition before a session counts as stuck.
	pub stuck_after: Duration,
}

impl Default for ReaperConfig {
	fn default() -> Self {
		Self {
			codes_interval: DEFAULT_CODES_INTERVAL,
			stuck_interval: DEFAULT_STUCK_INTERVAL,
			stuck_after: DEFAULT_STUCK_INTERVAL,
		}
	}
}

pub struct IdleReaper {
	store: SessionStore,
	config: ReaperConfig,
}

impl IdleReaper {
	pub fn new(store: SessionStore, config: ReaperConfig) -> Self {
		Self { store, config }
	}

	/// Drop pairing codes held by sessions that are already ready.
	///
	/// Sessions still pairing keep their code. Returns how many were cleared.
	pub fn sweep_stale_codes(&self) -> usize {
		let cleared = self.store.clear_stale_codes();
		for sender in &cleared {
			debug!(target = "invite.reaper", sender = %sender, "cleared stale pairing code");
		}
		cleared.len()
	}

	/// Remove and close sessions with a connection but no identity and no
	/// pairing code, idle for at least `stuck_after`. Returns how many were
	/// removed.
	pub async fn sweep_stuck(&self) -> usize {
		let stuck = self.store.take_stuck(self.config.stuck_after);
		let count = stuck.len();
		for (sender, connection) in stuck {
			info!(target = "invite.reaper", sender = %sender, "removing stuck session");
			close_quietly(&sender, connection.as_ref()).await;
		}
		count
	}

	/// Run both sweeps on their own periods until `shutdown` flips to `true`
	/// or its sender is dropped.
	pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
		let now = Instant::now();
		let mut codes = tokio::time::interval_at(now + self.config.codes_interval, self.config.codes_interval);
		let mut stuck = tokio::time::interval_at(now + self.config.stuck_interval, self.config.stuck_interval);
		codes.set_missed_tick_behavior(MissedTickBehavior::Delay);
		stuck.set_missed_tick_behavior(MissedTickBehavior::Delay);

		debug!(
			target = "invite.reaper",
			codes_secs = self.config.codes_interval.as_secs(),
			stuck_secs = self.config.stuck_interval.as_secs(),
			"reaper started"
		);

		loop {
			tokio::select! {
				_ = codes.tick() => {
					let cleared = self.sweep_stale_codes();
					if cleared > 0 {
						info!(target = "invite.reaper", cleared, "stale pairing codes cleared");
					}
				}
				_ = stuck.tick() => {
					self.sweep_stuck().await;
				}
				changed = shutdown.changed() => {
					if changed.is_err() || *shutdown.borrow() {
						break;
					}
				}
			}
		}

		debug!(target = "invite.reaper", "reaper stopped");
	}

	pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
		tokio::spawn(self.run(shutdown))
	}
}
