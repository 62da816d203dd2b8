//! Failure reporting at the process boundary.

use invite::{ErrorCode, Failure, InviteError};

/// Structured failure for any error reaching `main`.
///
/// Library errors keep their own code; anything else is `INTERNAL_ERROR`.
pub fn failure_for(err: &anyhow::Error, diagnostics: bool) -> Failure {
	if let Some(invite_err) = err.downcast_ref::<InviteError>() {
		let mut failure = invite_err.to_failure(diagnostics);
		failure.error = format!("{err:#}");
		return failure;
	}

	Failure {
		success: false,
		error: format!("{err:#}"),
		code: ErrorCode::InternalError,
		details: diagnostics.then(|| serde_json::json!({ "debug": format!("{err:?}") })),
	}
}

pub fn print_failure(failure: &Failure) {
	eprintln!("error: {}", failure.error);
	match serde_json::to_string_pretty(failure) {
		Ok(json) => println!("{json}"),
		Err(e) => eprintln!("(could not serialize failure: {e})"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use anyhow::Context;

	#[test]
	fn invite_errors_keep_their_code_through_context() {
		let err = Err::<(), _>(InviteError::Configuration("dispatch.rsvp_base_url is required".into()))
			.context("loading settings")
			.unwrap_err();
		let failure = failure_for(&err, false);
		assert_eq!(failure.code, ErrorCode::ConfigurationError);
		assert!(failure.error.starts_with("loading settings: "));
		assert!(failure.details.is_none());
	}

	#[test]
	fn other_errors_are_internal() {
		let failure = failure_for(&anyhow::anyhow!("boom"), true);
		assert_eq!(failure.code, ErrorCode::InternalError);
		assert!(!failure.success);
		assert!(failure.details.is_some());
	}
}
