//! Per-conversation pending resolution.

use chrono::{DateTime, Utc};
use finman_ai::ImageRef;
use finman_core::{Entry, Field, FieldSet, RecordId};

/// Where a pending resolution sits in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for the user to supply the fields named in `issues`.
    AwaitClarify,
    /// Showed the candidate; waiting for yes or no.
    VerifyAwaitResponse,
    /// User said no; waiting for which field to change.
    VerifyChooseField,
    /// Waiting for the corrected value of `correction_target`.
    VerifyAwaitCorrection,
}

/// What a verify-flow correction replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionTarget {
    Field(Field),
    /// The whole entry, supplied as a JSON object.
    All,
}

impl CorrectionTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Field(f) => f.as_str(),
            Self::All => "all",
        }
    }
}

/// A partially resolved entry carried across turns.
///
/// At most one exists per conversation. It is created by the first turn
/// that cannot be saved outright and removed only by a successful insert
/// or an explicit cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResolution {
    pub stage: Stage,
    pub candidate: Entry,
    /// Every user text folded into this resolution, space-joined in order.
    pub accumulated_text: String,
    /// Fields still below threshold; meaningful in [`Stage::AwaitClarify`].
    pub issues: FieldSet,
    pub correction_target: Option<CorrectionTarget>,
    /// First image seen for this resolution, reused on every re-extraction.
    pub source_image: Option<ImageRef>,
    /// Set when the candidate was accepted but the insert failed; the next
    /// message retries the insert instead of re-extracting.
    pub commit_pending: bool,
    /// Set when the insert succeeded but the state could not be cleared.
    /// The next turn only clears it; the entry is never inserted again.
    pub committed: Option<RecordId>,
    /// When the resolution started; becomes the record's `occurred_at`.
    pub started_at: DateTime<Utc>,
}

impl PendingResolution {
    pub fn new(
        candidate: Entry,
        text: &str,
        source_image: Option<ImageRef>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage: Stage::AwaitClarify,
            candidate,
            accumulated_text: text.trim().to_string(),
            issues: FieldSet::empty(),
            correction_target: None,
            source_image,
            commit_pending: false,
            committed: None,
            started_at,
        }
    }

    /// The accumulated text with `text` appended.
    pub fn folded_text(&self, text: &str) -> String {
        let text = text.trim();
        match (self.accumulated_text.is_empty(), text.is_empty()) {
            (_, true) => self.accumulated_text.clone(),
            (true, false) => text.to_string(),
            (false, false) => format!("{} {}", self.accumulated_text, text),
        }
    }

    /// Adopt `image` unless one is already attached.
    pub fn attach_image(&mut self, image: Option<ImageRef>) {
        if self.source_image.is_none() {
            self.source_image = image;
        }
    }

    pub fn enter_verify(&mut self) {
        self.stage = Stage::VerifyAwaitResponse;
        self.issues = FieldSet::empty();
        self.correction_target = None;
    }
}
