//! Phone number normalization.
//!
//! Recipients are typed into a spreadsheet by hand, so the same number shows
//! up as `050-123-4567`, `+972 50 123 4567` or `501234567`. All of them map to
//! one dialable digit string with the country code in front.

use crate::error::{InviteError, Result};

pub const DEFAULT_COUNTRY_CODE: &str = "972";

/// Length of a national number written without trunk prefix or country code.
const BARE_NATIONAL_LEN: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNormalizer {
	country_code: String,
}

impl PhoneNormalizer {
	/// # Errors
	///
	/// Returns `InviteError::Configuration` unless `country_code` is non-empty
	/// ASCII digits not starting with `0`.
	pub fn new(country_code: impl Into<String>) -> Result<Self> {
		let country_code = country_code.into();
		let valid = !country_code.is_empty() && country_code.bytes().all(|b| b.is_ascii_digit()) && !country_code.starts_with('0');
		if !valid {
			return Err(InviteError::Configuration(format!("invalid country code {country_code:?}")));
		}
		Ok(Self { country_code })
	}

	pub fn country_code(&self) -> &str {
		&self.country_code
	}

	/// Map `raw` to digits with the country code in front.
	///
	/// Rules, applied to the digits only:
	/// - a leading trunk `0` is replaced by the country code;
	/// - a bare 9-digit national number gets the country code prepended;
	/// - anything else (including `+<country><number>`) keeps its digits.
	///
	/// A leading `+` never changes which rule applies. Input without digits
	/// yields an empty string.
	pub fn normalize(&self, raw: &str) -> String {
		let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

		if let Some(national) = digits.strip_prefix('0') {
			return format!("{}{}", self.country_code, national);
		}
		if digits.len() == BARE_NATIONAL_LEN && !digits.starts_with(&self.country_code) {
			return format!("{}{}", self.country_code, digits);
		}
		digits
	}
}

impl Default for PhoneNormalizer {
	fn default() -> Self {
		Self {
			country_code: DEFAULT_COUNTRY_CODE.to_string(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLES: &[&str] = &[
		"0501234567",
		"050-123-4567",
		"(050) 123 4567",
		"+972501234567",
		"+972 50-123-4567",
		"972501234567",
		"501234567",
		"036123456",
		"+14155550123",
		"0",
		"",
		"n/a",
		"+",
		"972123456",
	];

	#[test]
	fn trunk_prefix_is_replaced_with_country_code() {
		let normalizer = PhoneNormalizer::default();
		for raw in ["0501234567", "050-123-4567", " 050 123 4567 ", "(050)1234567"] {
			let normalized = normalizer.normalize(raw);
			assert_eq!(normalized, "972501234567", "input {raw:?}");
			assert!(normalized.bytes().all(|b| b.is_ascii_digit()));
		}
	}

	#[test]
	fn plus_prefix_is_dropped() {
		let normalizer = PhoneNormalizer::default();
		assert_eq!(normalizer.normalize("+972501234567"), "972501234567");
		assert_eq!(normalizer.normalize("+1 415 555 0123"), "14155550123");
	}

	#[test]
	fn bare_national_number_gets_country_code() {
		let normalizer = PhoneNormalizer::default();
		assert_eq!(normalizer.normalize("501234567"), "972501234567");
		// Already carries the country code; left as is.
		assert_eq!(normalizer.normalize("972123456"), "972123456");
	}

	#[test]
	fn inputs_without_digits_normalize_to_empty() {
		let normalizer = PhoneNormalizer::default();
		assert_eq!(normalizer.normalize(""), "");
		assert_eq!(normalizer.normalize("n/a"), "");
		assert_eq!(normalizer.normalize("+"), "");
	}

	#[test]
	fn normalization_is_idempotent() {
		for country_code in ["972", "1", "44"] {
			let normalizer = PhoneNormalizer::new(country_code).unwrap();
			for raw in SAMPLES {
				let once = normalizer.normalize(raw);
				assert_eq!(normalizer.normalize(&once), once, "country {country_code}, input {raw:?}");
				assert!(!once.starts_with('0'), "country {country_code}, input {raw:?}");
			}
		}
	}

	#[test]
	fn custom_country_code_is_used() {
		let normalizer = PhoneNormalizer::new("44").unwrap();
		assert_eq!(normalizer.normalize("07700900123"), "447700900123");
	}

	#[test]
	fn invalid_country_codes_are_rejected() {
		for bad in ["", "0972", "+972", "97a"] {
			assert!(matches!(PhoneNormalizer::new(bad), Err(InviteError::Configuration(_))), "{bad:?}");
		}
	}
}
