//! Verify/correct sub-protocol: yes/no, field selection, and applying a
//! single correction to the candidate.

use finman_ai::json::recover_object;
use finman_core::{Confidences, Entry, Field, coerce_price, normalize, parse_category};

use crate::state::CorrectionTarget;

const AFFIRMATIVE: &[&str] = &[
    "yes", "y", "yeah", "yep", "yup", "ok", "okay", "sure", "confirm", "correct", "right", "save",
];

/// Whether a verify reply accepts the candidate.
pub fn is_affirmative(reply: &str) -> bool {
    let word = reply
        .trim()
        .trim_end_matches(['.', '!'])
        .to_ascii_lowercase();
    AFFIRMATIVE.contains(&word.as_str())
}

/// Parse a field choice: `name`, `category`, `price`, or `all`.
pub fn parse_choice(reply: &str) -> Option<CorrectionTarget> {
    let choice = reply.trim();
    if choice.eq_ignore_ascii_case("all") {
        return Some(CorrectionTarget::All);
    }
    Field::parse(choice).map(CorrectionTarget::Field)
}

/// Apply `reply` as the new value for `target`.
///
/// On failure the candidate is left untouched. A corrected field is taken
/// at full confidence.
pub fn apply_correction(
    target: CorrectionTarget,
    candidate: &mut Entry,
    reply: &str,
) -> Result<(), InvalidCorrection> {
    let reply = reply.trim();
    match target {
        CorrectionTarget::Field(Field::Name) => {
            if reply.is_empty() {
                return Err(InvalidCorrection);
            }
            candidate.name = Some(reply.to_string());
        }
        CorrectionTarget::Field(Field::Category) => {
            candidate.category = parse_category(reply).ok_or(InvalidCorrection)?;
        }
        CorrectionTarget::Field(Field::Price) => {
            let price = coerce_price(reply)
                .filter(|p| *p >= 0.0)
                .ok_or(InvalidCorrection)?;
            candidate.price = Some(price);
        }
        CorrectionTarget::All => {
            let obj = recover_object(reply).ok_or(InvalidCorrection)?;
            let mut entry = normalize(&obj);
            entry.confidences = Confidences::certain();
            *candidate = entry;
            return Ok(());
        }
    }
    if let CorrectionTarget::Field(field) = target {
        candidate.confidences.set(field, 1.0);
    }
    Ok(())
}

/// The reply could not be applied to the chosen target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidCorrection;
