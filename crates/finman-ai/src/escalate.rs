//! Two-attempt extraction with force-guess escalation.
//!
//! The first attempt runs normally. When it fails, or comes back with every
//! field below threshold, a second attempt is made with `force_guess` set.
//! The second result is normalized and returned whatever its confidence;
//! there is never a third attempt.

use finman_core::{Entry, Policy, normalize};
use tracing::{debug, warn};

use crate::extractor::{ExtractError, Extractor, ImageRef};

/// Normalized result of [`extract_entry`].
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub entry: Entry,
    /// Number of extractor calls made (1 or 2).
    pub attempts: u8,
    /// True when both attempts returned unparseable output and `entry` is the
    /// all-null, zero-confidence fallback.
    pub fallback: bool,
}

enum Attempt {
    Parsed(Entry),
    Unparseable,
    Failed(ExtractError),
}

async fn attempt(
    extractor: &dyn Extractor,
    text: &str,
    image: Option<&ImageRef>,
    force_guess: bool,
) -> Attempt {
    match extractor.extract(text, image, force_guess).await {
        Ok(raw) => Attempt::Parsed(normalize(&raw)),
        Err(e) if e.is_unparseable() => {
            debug!(force_guess, error = %e, "extractor output unparseable");
            Attempt::Unparseable
        }
        Err(e) => {
            warn!(force_guess, error = %e, "extractor call failed");
            Attempt::Failed(e)
        }
    }
}

/// Run the extractor with escalation and normalize the result.
///
/// Errors only when no attempt produced an object and at least one attempt
/// failed outright; two unparseable answers yield the fallback entry instead.
pub async fn extract_entry(
    extractor: &dyn Extractor,
    text: &str,
    image: Option<&ImageRef>,
    policy: &Policy,
) -> Result<Extraction, ExtractError> {
    let first = attempt(extractor, text, image, false).await;
    if let Attempt::Parsed(entry) = &first
        && !policy.universally_low(entry)
    {
        return Ok(Extraction {
            entry: entry.clone(),
            attempts: 1,
            fallback: false,
        });
    }

    debug!("escalating to force-guess extraction");
    let second = attempt(extractor, text, image, true).await;

    let done = |entry, fallback| Extraction {
        entry,
        attempts: 2,
        fallback,
    };
    match (first, second) {
        (_, Attempt::Parsed(entry)) => Ok(done(entry, false)),
        (Attempt::Parsed(entry), _) => Ok(done(entry, false)),
        (Attempt::Unparseable, Attempt::Unparseable) => Ok(done(Entry::unknown(), true)),
        (Attempt::Failed(e), _) | (_, Attempt::Failed(e)) => Err(e),
    }
}
