//! Canonical phone numbers, the identity key every stored record is filed under.
//!
//! The canonical form is exactly ten digits with no country code:
//!
//! - `+91 96995 85045` → `9699585045`
//! - `09699585045` → `9699585045`
//! - `919699585045` → `9699585045`

/// Normalise a phone number into its 10-digit canonical form.
///
/// Returns `None` unless exactly ten digits remain.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.starts_with("91") && digits.len() >= 12 {
        digits = digits.split_off(digits.len() - 10);
    }
    if digits.starts_with('0') && digits.len() >= 11 {
        digits = digits.split_off(digits.len() - 10);
    }
    if digits.len() > 10 {
        digits = digits.split_off(digits.len() - 10);
    }

    (digits.len() == 10).then_some(digits)
}
