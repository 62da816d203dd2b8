//! HTTP API over the session manager and dispatcher.


use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use invite::{BatchSummary, ErrorCode, Failure, IdleReaper, InviteError, RsvpResponse, SenderId, SessionStatus};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::app::App;
use crate::config::Settings;

#[derive(Clone)]
pub struct AppState {
	pub app: App,
	/// How long opening a session waits for a pairing code.
	pub pairing_wait: Duration,
	pub diagnostics: bool,
}

pub struct ApiError {
	status: StatusCode,
	failure: Failure,
}

impl ApiError {
	fn new(err: InviteError, diagnostics: bool) -> Self {
		let failure = err.to_failure(diagnostics);
		Self {
			status: status_for(failure.code),
			failure,
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status, Json(self.failure)).into_response()
	}
}

fn status_for(code: ErrorCode) -> StatusCode {
	match code {
		ErrorCode::ConfigurationError => StatusCode::BAD_REQUEST,
		ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
		ErrorCode::SessionClosed => StatusCode::CONFLICT,
		ErrorCode::AuthFailure | ErrorCode::TransportError | ErrorCode::DataSourceError => StatusCode::BAD_GATEWAY,
		ErrorCode::IoError | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

type ApiResult<T> = std::result::Result<T, ApiError>;

impl AppState {
	fn fail(&self, err: InviteError) -> ApiError {
		ApiError::new(err, self.diagnostics)
	}

	fn sender(&self, raw: &str) -> ApiResult<SenderId> {
		SenderId::new(raw).map_err(|e| self.fail(e))
	}
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(|| async { "OK" }))
		.route("/api/sessions/{sender}", get(session_status).post(open_session).delete(clear_session))
		.route("/api/sheets/{sheet}/senders", get(list_senders))
		.route("/api/sheets/{sheet}/dispatch", post(dispatch))
		.route("/api/sheets/{sheet}/rsvp", post(submit_rsvp))
		.with_state(state)
}

async fn open_session(State(state): State<AppState>, Path(sender): Path<String>) -> ApiResult<Json<SessionStatus>> {
	let sender = state.sender(&sender)?;
	state
		.app
		.sessions
		.request_pairing(&sender, state.pairing_wait)
		.await
		.map_err(|e| state.fail(e))?;
	Ok(Json(state.app.sessions.status(&sender)))
}

async fn session_status(State(state): State<AppState>, Path(sender): Path<String>) -> ApiResult<Json<SessionStatus>> {
	let sender = state.sender(&sender)?;
	Ok(Json(state.app.sessions.status(&sender)))
}

async fn clear_session(State(state): State<AppState>, Path(sender): Path<String>) -> ApiResult<StatusCode> {
	let sender = state.sender(&sender)?;
	state.app.sessions.clear_session(&sender).await.map_err(|e| state.fail(e))?;
	Ok(StatusCode::NO_CONTENT)
}

async fn list_senders(State(state): State<AppState>, Path(sheet): Path<String>) -> ApiResult<Json<Vec<String>>> {
	let senders = state.app.sheets.fetch_senders_distinct(&sheet).await.map_err(|e| state.fail(e))?;
	Ok(Json(senders))
}

#[derive(Debug, Deserialize)]
struct DispatchRequest {
	sender: String,
}

/// The batch runs on its own task so it finishes, and records every send,
/// even if the caller disconnects first.
async fn dispatch(State(state): State<AppState>, Path(sheet): Path<String>, Json(request): Json<DispatchRequest>) -> ApiResult<Json<BatchSummary>> {
	let sender = state.sender(&request.sender)?;
	let app = state.app.clone();
	let batch = tokio::spawn(async move { app.dispatch_sheet(&sheet, &sender).await });

	let summary = batch
		.await
		.map_err(|e| state.fail(InviteError::Io(std::io::Error::other(format!("dispatch task failed: {e}")))))?
		.map_err(|e| state.fail(e))?;
	Ok(Json(summary))
}

async fn submit_rsvp(State(state): State<AppState>, Path(sheet): Path<String>, Json(mut response): Json<RsvpResponse>) -> ApiResult<StatusCode> {
	let phone = state.app.normalizer.normalize(&response.phone);
	if phone.is_empty() {
		return Err(state.fail(InviteError::Configuration(format!("no usable phone number in {:?}", response.phone))));
	}
	response.phone = phone;
	state
		.app
		.sheets
		.append_or_update_response(&sheet, &response)
		.await
		.map_err(|e| state.fail(e))?;
	Ok(StatusCode::NO_CONTENT)
}

/// Serve until Ctrl-C, then stop the reaper and close every session.
pub async fn serve(settings: &Settings, app: App) -> Result<()> {
	let (shutdown_tx, shutdown_rx) = watch::channel(false);
	let reaper = IdleReaper::new(app.sessions.store().clone(), settings.reaper.clone()).spawn(shutdown_rx);

	let state = AppState {
		app: app.clone(),
		pairing_wait: settings.pairing_wait,
		diagnostics: settings.diagnostics,
	};

	let host = settings.host.as_str();
	let port = settings.port;
	let addr: SocketAddr = format!("{host}:{port}")
		.parse()
		.with_context(|| format!("Invalid host/port combination: {host}:{port}"))?;
	let listener = TcpListener::bind(addr).await.with_context(|| format!("Failed to bind server to {addr}"))?;
	info!(target = "invite.server", host, port, "listening");

	let served = axum::serve(listener, router(state).into_make_service())
		.with_graceful_shutdown(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				warn!(target = "invite.server", error = %e, "cannot listen for Ctrl-C");
				std::future::pending::<()>().await;
			}
			info!(target = "invite.server", "shutting down");
		})
		.await
		.context("Server error");

	let _ = shutdown_tx.send(true);
	if let Err(e) = reaper.await {
		warn!(target = "invite.server", error = %e, "reaper task failed");
	}
	app.sessions.shutdown().await;
	served
}
