//! The resolution state machine.
//!
//! One call to [`Resolver::handle`] is one conversation turn. A turn reads
//! the conversation's pending resolution (if any), advances it, and writes
//! it back; the record insert is always the last side effect, and a failed
//! insert leaves the resolution in place with `commit_pending` set so the
//! next message retries exactly that insert.

use std::sync::Arc;

use chrono::Utc;
use finman_ai::{Extractor, ImageRef, extract_entry};
use finman_core::{Entry, Field, FieldSet, IdentityKey, NewRecord, Policy, RecordId};
use finman_store::EntryStore;
use tracing::{debug, error, info, warn};

use crate::error::ResolveError;
use crate::reply::Reply;
use crate::session::{ConversationId, IdentitySource, SessionStore};
use crate::state::{CorrectionTarget, PendingResolution, Stage};
use crate::verify;

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolverConfig {
    pub policy: Policy,
    /// Show every accepted entry for a yes/no before saving it.
    pub confirm_before_save: bool,
}

/// One inbound user event.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message {
        text: String,
        image: Option<ImageRef>,
    },
    Cancel,
}

impl Inbound {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Message {
            text: text.into(),
            image: None,
        }
    }

    pub fn image(image: ImageRef, caption: impl Into<String>) -> Self {
        Self::Message {
            text: caption.into(),
            image: Some(image),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub reply: Reply,
    /// Whether the conversation still has a pending resolution.
    pub still_pending: bool,
    /// Set on the turn whose insert succeeded.
    pub saved: Option<(RecordId, Entry)>,
}

impl TurnOutcome {
    pub(crate) fn pending(reply: Reply) -> Self {
        Self {
            reply,
            still_pending: true,
            saved: None,
        }
    }

    pub(crate) fn idle(reply: Reply) -> Self {
        Self {
            reply,
            still_pending: false,
            saved: None,
        }
    }
}

pub struct Resolver {
    extractor: Arc<dyn Extractor>,
    store: Arc<dyn EntryStore>,
    sessions: Arc<dyn SessionStore>,
    identities: Arc<dyn IdentitySource>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        store: Arc<dyn EntryStore>,
        sessions: Arc<dyn SessionStore>,
        identities: Arc<dyn IdentitySource>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            extractor,
            store,
            sessions,
            identities,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Run one turn. Failures become replies; none of them advance state.
    pub async fn handle(&self, conv: &ConversationId, inbound: Inbound) -> TurnOutcome {
        match self.turn(conv, inbound).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(conversation = %conv, error = %e, "turn failed");
                TurnOutcome {
                    reply: e.reply(),
                    still_pending: self.has_pending(conv).await,
                    saved: None,
                }
            }
        }
    }

    async fn turn(&self, conv: &ConversationId, inbound: Inbound) -> Result<TurnOutcome, ResolveError> {
        let (text, image) = match inbound {
            Inbound::Cancel => return self.cancel(conv).await,
            Inbound::Message { text, image } => (text, image),
        };
        let identity = self
            .identities
            .identity(conv)
            .await
            .ok_or(ResolveError::Precondition)?;

        let mut pending = self.sessions.pending(conv).await?;
        if let Some(record_id) = pending.as_ref().and_then(|s| s.committed) {
            self.sessions.clear_pending(conv).await?;
            debug!(conversation = %conv, record_id = %record_id, "cleared already-saved entry");
            pending = None;
        }
        let Some(state) = pending else {
            return self.submit(conv, &identity, &text, image).await;
        };
        if state.commit_pending {
            debug!(conversation = %conv, "retrying save of accepted entry");
            return self.commit(conv, &identity, state).await;
        }
        match state.stage {
            Stage::AwaitClarify => self.clarify(conv, &identity, state, &text, image).await,
            Stage::VerifyAwaitResponse => self.verify_response(conv, &identity, state, &text).await,
            Stage::VerifyChooseField => self.choose_field(conv, state, &text).await,
            Stage::VerifyAwaitCorrection => self.correct(conv, state, &text).await,
        }
    }

    async fn cancel(&self, conv: &ConversationId) -> Result<TurnOutcome, ResolveError> {
        let Some(state) = self.sessions.pending(conv).await? else {
            return Ok(TurnOutcome::idle(Reply::NothingToCancel));
        };
        self.sessions.clear_pending(conv).await?;
        if state.committed.is_some() {
            return Ok(TurnOutcome::idle(Reply::NothingToCancel));
        }
        info!(conversation = %conv, "pending entry cancelled");
        Ok(TurnOutcome::idle(Reply::Cancelled))
    }

    /// Whether the session holds a resolution that is not yet saved.
    async fn has_pending(&self, conv: &ConversationId) -> bool {
        matches!(self.sessions.pending(conv).await, Ok(Some(s)) if s.committed.is_none())
    }

    /// A fresh message with nothing pending.
    async fn submit(
        &self,
        conv: &ConversationId,
        identity: &IdentityKey,
        text: &str,
        image: Option<ImageRef>,
    ) -> Result<TurnOutcome, ResolveError> {
        if text.trim().is_empty() && image.is_none() {
            return Ok(TurnOutcome::idle(Reply::NeedInput));
        }
        let extraction =
            extract_entry(self.extractor.as_ref(), text, image.as_ref(), &self.config.policy).await?;
        debug!(
            conversation = %conv,
            attempts = extraction.attempts,
            fallback = extraction.fallback,
            "extracted entry"
        );
        let state = PendingResolution::new(extraction.entry, text, image, Utc::now());
        self.evaluate(conv, identity, state).await
    }

    /// A reply while waiting on clarification: fold it in and re-extract.
    async fn clarify(
        &self,
        conv: &ConversationId,
        identity: &IdentityKey,
        mut state: PendingResolution,
        text: &str,
        image: Option<ImageRef>,
    ) -> Result<TurnOutcome, ResolveError> {
        if text.trim().is_empty() && image.is_none() {
            return Ok(TurnOutcome::pending(Reply::Ask {
                issues: state.issues,
            }));
        }
        state.attach_image(image);
        let combined = state.folded_text(text);
        let extraction = extract_entry(
            self.extractor.as_ref(),
            &combined,
            state.source_image.as_ref(),
            &self.config.policy,
        )
        .await?;
        debug!(
            conversation = %conv,
            attempts = extraction.attempts,
            "re-extracted with clarification"
        );
        state.accumulated_text = combined;
        state.candidate = extraction.entry;
        self.evaluate(conv, identity, state).await
    }

    /// Decide between asking, confirming and saving a fresh candidate.
    async fn evaluate(
        &self,
        conv: &ConversationId,
        identity: &IdentityKey,
        mut state: PendingResolution,
    ) -> Result<TurnOutcome, ResolveError> {
        let verdict = self.config.policy.evaluate(&state.candidate);
        if verdict.ask {
            state.stage = Stage::AwaitClarify;
            state.issues = verdict.issues;
            info!(
                conversation = %conv,
                issues = ?verdict.issues.names(),
                "asking for clarification"
            );
            self.sessions.set_pending(conv, state).await?;
            return Ok(TurnOutcome::pending(Reply::Ask {
                issues: verdict.issues,
            }));
        }
        if self.config.confirm_before_save {
            state.enter_verify();
            let entry = state.candidate.clone();
            self.sessions.set_pending(conv, state).await?;
            return Ok(TurnOutcome::pending(Reply::Confirm { entry }));
        }
        self.commit(conv, identity, state).await
    }

    async fn verify_response(
        &self,
        conv: &ConversationId,
        identity: &IdentityKey,
        mut state: PendingResolution,
        text: &str,
    ) -> Result<TurnOutcome, ResolveError> {
        if !verify::is_affirmative(text) {
            state.stage = Stage::VerifyChooseField;
            self.sessions.set_pending(conv, state).await?;
            return Ok(TurnOutcome::pending(Reply::ChooseField));
        }
        if state.candidate.price.is_none() {
            let target = CorrectionTarget::Field(Field::Price);
            state.stage = Stage::VerifyAwaitCorrection;
            state.correction_target = Some(target);
            self.sessions.set_pending(conv, state).await?;
            return Ok(TurnOutcome::pending(Reply::AskCorrection { target }));
        }
        self.commit(conv, identity, state).await
    }

    async fn choose_field(
        &self,
        conv: &ConversationId,
        mut state: PendingResolution,
        text: &str,
    ) -> Result<TurnOutcome, ResolveError> {
        let Some(target) = verify::parse_choice(text) else {
            return Ok(TurnOutcome::pending(Reply::ChooseField));
        };
        state.stage = Stage::VerifyAwaitCorrection;
        state.correction_target = Some(target);
        self.sessions.set_pending(conv, state).await?;
        Ok(TurnOutcome::pending(Reply::AskCorrection { target }))
    }

    async fn correct(
        &self,
        conv: &ConversationId,
        mut state: PendingResolution,
        text: &str,
    ) -> Result<TurnOutcome, ResolveError> {
        let Some(target) = state.correction_target else {
            state.stage = Stage::VerifyChooseField;
            self.sessions.set_pending(conv, state).await?;
            return Ok(TurnOutcome::pending(Reply::ChooseField));
        };
        if verify::apply_correction(target, &mut state.candidate, text).is_err() {
            return Ok(TurnOutcome::pending(Reply::InvalidCorrection { target }));
        }
        debug!(conversation = %conv, field = target.as_str(), "correction applied");
        state.enter_verify();
        let entry = state.candidate.clone();
        self.sessions.set_pending(conv, state).await?;
        Ok(TurnOutcome::pending(Reply::Confirm { entry }))
    }

    /// Insert the accepted candidate. The only place a record is written.
    async fn commit(
        &self,
        conv: &ConversationId,
        identity: &IdentityKey,
        mut state: PendingResolution,
    ) -> Result<TurnOutcome, ResolveError> {
        let Some(record) = NewRecord::from_entry(
            identity.clone(),
            &state.candidate,
            state.started_at,
            Some(conv.to_string()),
        ) else {
            let issues: FieldSet = [Field::Price].into_iter().collect();
            state.stage = Stage::AwaitClarify;
            state.issues = issues;
            state.commit_pending = false;
            self.sessions.set_pending(conv, state).await?;
            return Ok(TurnOutcome::pending(Reply::Ask { issues }));
        };

        match self.store.insert(&record).await {
            Ok(record_id) => {
                info!(conversation = %conv, record_id = %record_id, "entry resolved");
                let entry = state.candidate.clone();
                if let Err(e) = self.sessions.clear_pending(conv).await {
                    warn!(conversation = %conv, error = %e, "saved entry but could not clear pending state");
                    state.committed = Some(record_id);
                    state.commit_pending = false;
                    if let Err(e) = self.sessions.set_pending(conv, state).await {
                        error!(
                            conversation = %conv,
                            record_id = %record_id,
                            error = %e,
                            "could not mark pending state as saved"
                        );
                    }
                }
                Ok(TurnOutcome {
                    reply: Reply::Saved {
                        record_id,
                        entry: entry.clone(),
                    },
                    still_pending: self.has_pending(conv).await,
                    saved: Some((record_id, entry)),
                })
            }
            Err(e) => {
                state.commit_pending = true;
                self.sessions.set_pending(conv, state).await?;
                Err(ResolveError::Persistence(e))
            }
        }
    }
}
