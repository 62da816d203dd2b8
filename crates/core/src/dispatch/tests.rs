use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::Instant;

use super::*;
use crate::session::{ManagerConfig, SessionStore};
use crate::testing::{FakeConnection, FakeConnector};
use crate::transport::TransportErrorKind;
use crate::types::Identity;

const RSVP_URL: &str = "https://rsvp.example.com/rsvp";

struct Fixture {
	_root: TempDir,
	connector: Arc<FakeConnector>,
	sessions: SessionManager,
	dispatcher: Dispatcher,
	sender: SenderId,
}

impl Fixture {
	fn ready() -> Self {
		Self::with_connector(FakeConnector::with_stored_credentials(Identity::new("972521112222@c.us")))
	}

	fn with_connector(connector: Arc<FakeConnector>) -> Self {
		let root = TempDir::new().unwrap();
		let sessions = SessionManager::new(SessionStore::new(), connector.clone(), ManagerConfig::new(root.path()));
		let composer = MessageComposer::new(DEFAULT_TEMPLATE, RSVP_URL).unwrap();
		let dispatcher = Dispatcher::new(sessions.clone(), PhoneNormalizer::default(), composer, DispatchConfig::default());
		Self {
			_root: root,
			connector,
			sessions,
			dispatcher,
			sender: SenderId::new("Yuval").unwrap(),
		}
	}

	/// Open the sender's session up front so a test can script its connection.
	async fn connection(&self) -> Arc<FakeConnection> {
		self.sessions.open(&self.sender).await.unwrap();
		self.connector.connection("Yuval").unwrap()
	}
}

fn guest(name: &str, phone: &str) -> Guest {
	Guest {
		sender: "Yuval".to_string(),
		..Guest::new(name, phone)
	}
}

fn transient() -> TransportError {
	TransportError::new(TransportErrorKind::Evaluation, "Evaluation failed: t is undefined")
}

#[tokio::test(start_paused = true)]
async fn local_number_is_normalized_and_sent() {
	let fx = Fixture::ready();

	let summary = fx.dispatcher.send_batch(&fx.sender, &[guest("Dana", "0501234567")]).await.unwrap();

	assert_eq!((summary.total, summary.successful, summary.failed), (1, 1, 0));
	let detail = &summary.details[0];
	assert_eq!(detail.name, "Dana");
	assert_eq!(detail.phone, "972501234567");
	assert!(detail.success);
	assert!(detail.message_id.is_some());
	assert_eq!(detail.error, None);

	let sent = fx.connector.connection("Yuval").unwrap().sent();
	assert_eq!(sent.len(), 1);
	assert_eq!(sent[0].phone, "972501234567");
	assert!(sent[0].body.contains("Dana"));
	assert!(sent[0].body.contains("https://rsvp.example.com/rsvp?phone=972501234567"));
}

#[tokio::test(start_paused = true)]
async fn one_failure_does_not_abort_the_batch() {
	let fx = Fixture::ready();
	let connection = fx.connection().await;
	connection.fail_always("972502222222", TransportError::new(TransportErrorKind::Other, "invalid chat"));

	let guests = [
		guest("Avi", "0501111111"),
		guest("Bat", "0502222222"),
		guest("Gil", "0503333333"),
		guest("Dor", "0504444444"),
	];
	let summary = fx.dispatcher.send_batch(&fx.sender, &guests).await.unwrap();

	assert_eq!((summary.total, summary.successful, summary.failed), (4, 3, 1));
	let names: Vec<_> = summary.details.iter().map(|d| d.name.as_str()).collect();
	assert_eq!(names, ["Avi", "Bat", "Gil", "Dor"]);
	assert!(!summary.details[1].success);
	assert!(summary.details[1].error.as_deref().unwrap().contains("invalid chat"));
	assert_eq!(connection.attempts().iter().filter(|p| *p == "972502222222").count(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried_with_backoff() {
	let fx = Fixture::ready();
	let connection = fx.connection().await;
	connection.fail_times("972501234567", 2, transient());

	let started = Instant::now();
	let summary = fx.dispatcher.send_batch(&fx.sender, &[guest("Dana", "050-123-4567")]).await.unwrap();

	assert_eq!(summary.successful, 1);
	assert_eq!(connection.attempts().len(), 3);
	assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn transient_failure_gives_up_after_three_attempts() {
	let fx = Fixture::ready();
	let connection = fx.connection().await;
	connection.fail_always("972501234567", TransportError::new(TransportErrorKind::NotRegistered, "not registered"));

	let summary = fx.dispatcher.send_batch(&fx.sender, &[guest("Dana", "0501234567")]).await.unwrap();

	assert_eq!(summary.failed, 1);
	assert_eq!(connection.attempts().len(), 3);
	assert!(summary.details[0].error.as_deref().unwrap().contains("not registered"));
}

#[tokio::test(start_paused = true)]
async fn permanent_failure_is_not_retried() {
	let fx = Fixture::ready();
	let connection = fx.connection().await;
	connection.fail_always("972501234567", TransportError::new(TransportErrorKind::Other, "rejected"));

	let started = Instant::now();
	let summary = fx.dispatcher.send_batch(&fx.sender, &[guest("Dana", "0501234567")]).await.unwrap();

	assert_eq!(summary.failed, 1);
	assert_eq!(connection.attempts().len(), 1);
	assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn delay_between_guests_but_not_after_the_last() {
	let fx = Fixture::ready();
	fx.connection().await;

	let started = Instant::now();
	fx.dispatcher
		.send_batch(&fx.sender, &[guest("Avi", "0501111111"), guest("Bat", "0502222222")])
		.await
		.unwrap();
	let elapsed = started.elapsed();
	assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
	assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");

	let started = Instant::now();
	fx.dispatcher.send_batch(&fx.sender, &[guest("Gil", "0503333333")]).await.unwrap();
	assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn empty_phone_fails_without_sending() {
	let fx = Fixture::ready();
	let connection = fx.connection().await;

	let summary = fx.dispatcher.send_batch(&fx.sender, &[guest("Dana", " - ")]).await.unwrap();

	assert_eq!(summary.failed, 1);
	assert_eq!(summary.details[0].phone, "");
	assert!(connection.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn batch_fails_when_session_never_becomes_ready() {
	let mut fx = Fixture::with_connector(FakeConnector::new());
	fx.dispatcher.config.ready_timeout = Some(Duration::from_secs(1));

	let err = fx.dispatcher.send_batch(&fx.sender, &[guest("Dana", "0501234567")]).await.unwrap_err();

	assert!(matches!(err, InviteError::Timeout { ms: 1000, .. }), "{err:?}");
	assert!(fx.connector.connection("Yuval").unwrap().attempts().is_empty());
}

#[tokio::test]
async fn empty_batch_is_an_empty_summary() {
	let fx = Fixture::ready();
	let summary = fx.dispatcher.send_batch(&fx.sender, &[]).await.unwrap();
	assert_eq!((summary.total, summary.successful, summary.failed), (0, 0, 0));
}

#[test]
fn composer_fills_placeholders() {
	let composer = MessageComposer::new("{name}|{addons}|{link}", "https://rsvp.example.com/r?event=1").unwrap();

	assert_eq!(
		composer.compose(" Dana ", Some("+1 welcome"), "972501234567"),
		"Dana|\n+1 welcome|https://rsvp.example.com/r?event=1&phone=972501234567"
	);
	assert_eq!(
		composer.compose("Dana", Some("   "), "972501234567"),
		"Dana||https://rsvp.example.com/r?event=1&phone=972501234567"
	);
}

#[test]
fn composer_rejects_relative_url() {
	let err = MessageComposer::new(DEFAULT_TEMPLATE, "/rsvp").unwrap_err();
	assert!(matches!(err, InviteError::Configuration(_)));
}
