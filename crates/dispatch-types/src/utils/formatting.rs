//! String and number formatting helpers used in logs and responses.

/// Truncates an identifier for display purposes.
///
/// Shows only the first 8 characters followed by ".." for longer ids.
pub fn truncate_id(id: &str) -> String {
	if id.chars().count() <= 8 {
		id.to_string()
	} else {
		let prefix: String = id.chars().take(8).collect();
		format!("{}..", prefix)
	}
}

/// Rounds a kilometre or currency value to two decimal places.
pub fn round_to_cents(value: f64) -> f64 {
	(value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("short"), "short");
		assert_eq!(truncate_id("0123456789abcdef"), "01234567..");
		// Multi-byte characters must not be split
		assert_eq!(truncate_id("חנות-מספר-אחת"), "חנות-מספ..");
	}

	#[test]
	fn test_round_to_cents() {
		assert_eq!(round_to_cents(9.876), 9.88);
		assert_eq!(round_to_cents(10.0), 10.0);
	}
}
