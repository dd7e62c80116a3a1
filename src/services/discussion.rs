//! One discussion controller, configured per variant (chapter, synopsis
//! builder, division refinement).
//!
//! Sending a turn and merging a discussion are both two-phase: `begin_*`
//! validates and updates local state synchronously, the caller performs the
//! backend call, and `complete_*` applies the result. This lets the owner drop
//! any lock while the call is outstanding.

use crate::models::{DiscussionTurn, FormFields, GenerationParams};
use crate::services::api::{ApiError, MergeEndpoint};
use crate::services::render;
use crate::services::thread::DiscussionThread;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscussionKind {
    Chapter,
    SynopsisBuilder,
    Division,
}

impl DiscussionKind {
    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug {
            "chapter" => Some(DiscussionKind::Chapter),
            "synopsis" => Some(DiscussionKind::SynopsisBuilder),
            "division" => Some(DiscussionKind::Division),
            _ => None,
        }
    }

    pub fn slug(self) -> &'static str {
        match self {
            DiscussionKind::Chapter => "chapter",
            DiscussionKind::SynopsisBuilder => "synopsis",
            DiscussionKind::Division => "division",
        }
    }

    pub fn config(self) -> DiscussionConfig {
        match self {
            DiscussionKind::Chapter => DiscussionConfig {
                kind: self,
                reference_field: "chapter_content",
                merge: MergeEndpoint::ChapterSummary,
                merge_reference_field: "original_content",
                confirm_before_apply: true,
                use_notes: false,
                failed_turn: FailedTurnPolicy::KeepUnanswered,
                placeholder: "הדיון ריק. שאל שאלה כדי להתחיל.",
                empty_merge_notice: "לא ניתן לסכם דיון ריק.",
            },
            DiscussionKind::SynopsisBuilder => DiscussionConfig {
                kind: self,
                reference_field: "current_draft",
                merge: MergeEndpoint::SynopsisUpdate,
                merge_reference_field: "current_draft",
                confirm_before_apply: false,
                use_notes: true,
                failed_turn: FailedTurnPolicy::KeepUnanswered,
                placeholder: "התחל שיחה לבניית התקציר...",
                empty_merge_notice: "לא ניתן לעדכן מטיוטה ריקה.",
            },
            DiscussionKind::Division => DiscussionConfig {
                kind: self,
                reference_field: "original_division",
                merge: MergeEndpoint::DivisionUpdate,
                merge_reference_field: "original_division",
                confirm_before_apply: true,
                use_notes: false,
                failed_turn: FailedTurnPolicy::KeepUnanswered,
                placeholder: "התחל דיון לשיפור החלוקה...",
                empty_merge_notice: "לא ניתן לעדכן מחלוקה ריקה.",
            },
        }
    }
}

/// What happens to the tentatively appended user turn when its send fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedTurnPolicy {
    /// The user turn stays in the thread without an answer.
    KeepUnanswered,
    /// The user turn is removed from the thread; the transcript still shows it.
    RollBack,
}

impl FailedTurnPolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "keep" => Some(FailedTurnPolicy::KeepUnanswered),
            "rollback" => Some(FailedTurnPolicy::RollBack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiscussionConfig {
    pub kind: DiscussionKind,
    /// Form field carrying the reference text on every turn.
    pub reference_field: &'static str,
    pub merge: MergeEndpoint,
    /// Form field carrying the reference text on the merge call.
    pub merge_reference_field: &'static str,
    pub confirm_before_apply: bool,
    pub use_notes: bool,
    pub failed_turn: FailedTurnPolicy,
    pub placeholder: &'static str,
    pub empty_merge_notice: &'static str,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DiscussionError {
    #[error("message is empty")]
    EmptyInput,
    #[error("cannot summarize an empty discussion")]
    EmptyDiscussion,
    #[error("a request is already in flight")]
    Busy,
    #[error("no discussion is open")]
    NotOpen,
    #[error("no merged text is awaiting confirmation")]
    NothingToConfirm,
}

const ABANDONED_TURN: &str = "הבקשה בוטלה לפני שהתקבלה תשובה.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Sending,
}

/// Something shown in the transcript. Error entries are never part of the thread.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEntry {
    Turn(DiscussionTurn),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscussionContext {
    /// Changes on every open; results for an older id are stale.
    pub id: Uuid,
    pub subject_title: String,
    pub original_text: String,
    /// Variant-specific fields sent with every call, e.g. the full synopsis.
    pub extra_fields: FormFields,
    pub thread: DiscussionThread,
}

#[derive(Debug)]
pub struct PendingTurn {
    context_id: Uuid,
    pub form: FormFields,
}

#[derive(Debug)]
pub struct PendingMerge {
    context_id: Uuid,
    pub endpoint: MergeEndpoint,
    pub form: FormFields,
}

impl PendingTurn {
    pub fn context_id(&self) -> Uuid {
        self.context_id
    }
}

impl PendingMerge {
    pub fn context_id(&self) -> Uuid {
        self.context_id
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Answered(String),
    Failed(String),
    /// The discussion was re-opened while the call was outstanding.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Write the text into the hosting document now.
    Apply(String),
    /// Show the text and wait for [`DiscussionController::confirm`].
    AwaitingConfirmation(String),
    Failed(String),
    Stale,
}

pub struct DiscussionController {
    config: DiscussionConfig,
    context: Option<DiscussionContext>,
    state: ControllerState,
    merging: bool,
    transcript: Vec<TranscriptEntry>,
    pending_merge: Option<String>,
}

impl DiscussionController {
    pub fn new(kind: DiscussionKind) -> Self {
        Self::with_config(kind.config())
    }

    pub fn with_failed_turn(mut self, policy: FailedTurnPolicy) -> Self {
        self.config.failed_turn = policy;
        self
    }

    pub fn with_config(config: DiscussionConfig) -> Self {
        DiscussionController {
            config,
            context: None,
            state: ControllerState::Idle,
            merging: false,
            transcript: Vec::new(),
            pending_merge: None,
        }
    }

    pub fn context(&self) -> Option<&DiscussionContext> {
        self.context.as_ref()
    }

    /// Starts a fresh discussion, discarding any previous one.
    pub fn open(
        &mut self,
        subject_title: impl Into<String>,
        original_text: impl Into<String>,
        extra_fields: FormFields,
    ) {
        self.resume(subject_title, original_text, extra_fields, Vec::new());
    }

    /// Starts a discussion from a previously saved thread.
    pub fn resume(
        &mut self,
        subject_title: impl Into<String>,
        original_text: impl Into<String>,
        extra_fields: FormFields,
        turns: Vec<DiscussionTurn>,
    ) {
        // The previous thread's buffer is reused; its turns are not.
        let mut thread = self
            .context
            .take()
            .map(|previous| previous.thread)
            .unwrap_or_default();
        thread.reset();
        for turn in turns {
            thread.append(turn);
        }

        let context = DiscussionContext {
            id: Uuid::new_v4(),
            subject_title: subject_title.into(),
            original_text: original_text.into(),
            extra_fields,
            thread,
        };
        tracing::info!(
            kind = self.config.kind.slug(),
            id = %context.id,
            subject = %context.subject_title,
            turns = context.thread.len(),
            "Discussion opened"
        );

        self.transcript = context
            .thread
            .turns()
            .iter()
            .cloned()
            .map(TranscriptEntry::Turn)
            .collect();
        self.context = Some(context);
        self.state = ControllerState::Idle;
        self.merging = false;
        self.pending_merge = None;
    }

    pub fn close(&mut self) {
        if let Some(context) = self.context.take() {
            tracing::info!(kind = self.config.kind.slug(), id = %context.id, "Discussion closed");
        }
        self.transcript.clear();
        self.state = ControllerState::Idle;
        self.merging = false;
        self.pending_merge = None;
    }

    /// Replaces the reference text. Only explicit apply actions call this.
    pub fn rebase(&mut self, text: impl Into<String>) -> Result<(), DiscussionError> {
        let context = self.context.as_mut().ok_or(DiscussionError::NotOpen)?;
        context.original_text = text.into();
        Ok(())
    }

    /// Appends the user turn, renders it and builds the backend request.
    pub fn begin_turn(
        &mut self,
        user_text: &str,
        params: &GenerationParams,
    ) -> Result<PendingTurn, DiscussionError> {
        let context = self.context.as_mut().ok_or(DiscussionError::NotOpen)?;
        let user_text = user_text.trim();
        if user_text.is_empty() {
            return Err(DiscussionError::EmptyInput);
        }
        if self.state == ControllerState::Sending {
            return Err(DiscussionError::Busy);
        }

        let turn = DiscussionTurn::user(user_text);
        context.thread.append(turn.clone());
        self.transcript.push(TranscriptEntry::Turn(turn));
        self.state = ControllerState::Sending;

        let mut form: FormFields = vec![
            ("text".to_string(), user_text.to_string()),
            (
                self.config.reference_field.to_string(),
                context.original_text.clone(),
            ),
        ];
        form.extend(context.extra_fields.iter().cloned());
        form.extend([
            (
                "discussion_thread".to_string(),
                context.thread.to_transport_form(),
            ),
            ("temperature".to_string(), params.temperature.to_string()),
            ("persona".to_string(), params.persona.clone()),
            ("mode".to_string(), "brainstorm".to_string()),
            ("write_kind".to_string(), "chat".to_string()),
            (
                "use_notes".to_string(),
                if self.config.use_notes { "1" } else { "0" }.to_string(),
            ),
            ("use_history".to_string(), "0".to_string()),
        ]);

        tracing::debug!(
            kind = self.config.kind.slug(),
            turns = context.thread.len(),
            "Sending discussion turn"
        );
        Ok(PendingTurn {
            context_id: context.id,
            form,
        })
    }

    pub fn complete_turn(
        &mut self,
        pending: PendingTurn,
        result: Result<String, ApiError>,
    ) -> TurnOutcome {
        let Some(context) = self
            .context
            .as_mut()
            .filter(|context| context.id == pending.context_id)
        else {
            tracing::warn!(
                kind = self.config.kind.slug(),
                "Dropping answer for a discussion that is no longer open"
            );
            return TurnOutcome::Stale;
        };

        self.state = ControllerState::Idle;
        match result {
            Ok(answer) => {
                let turn = DiscussionTurn::assistant(answer.clone());
                context.thread.append(turn.clone());
                self.transcript.push(TranscriptEntry::Turn(turn));
                TurnOutcome::Answered(answer)
            }
            Err(e) => {
                tracing::error!(kind = self.config.kind.slug(), "Discussion turn failed: {e}");
                let message = e.user_message();
                self.transcript.push(TranscriptEntry::Error(message.clone()));
                if self.config.failed_turn == FailedTurnPolicy::RollBack {
                    context.thread.pop_last_user();
                }
                TurnOutcome::Failed(message)
            }
        }
    }

    /// Releases a turn whose answer will never arrive, e.g. when the caller went away.
    /// The user turn is treated as failed.
    pub fn abandon_turn(&mut self, context_id: Uuid) {
        let Some(context) = self
            .context
            .as_mut()
            .filter(|context| context.id == context_id)
        else {
            return;
        };
        if self.state != ControllerState::Sending {
            return;
        }

        tracing::warn!(
            kind = self.config.kind.slug(),
            id = %context_id,
            "Discussion turn abandoned before its answer arrived"
        );
        self.state = ControllerState::Idle;
        self.transcript
            .push(TranscriptEntry::Error(ABANDONED_TURN.to_string()));
        if self.config.failed_turn == FailedTurnPolicy::RollBack {
            context.thread.pop_last_user();
        }
    }

    pub fn begin_merge(&mut self) -> Result<PendingMerge, DiscussionError> {
        let context = self.context.as_ref().ok_or(DiscussionError::NotOpen)?;
        if context.thread.is_empty() {
            return Err(DiscussionError::EmptyDiscussion);
        }
        if self.merging {
            return Err(DiscussionError::Busy);
        }
        self.merging = true;

        let mut form: FormFields = vec![
            (
                self.config.merge_reference_field.to_string(),
                context.original_text.clone(),
            ),
            (
                "discussion_thread".to_string(),
                context.thread.to_transport_form(),
            ),
        ];
        form.extend(context.extra_fields.iter().cloned());

        tracing::debug!(
            kind = self.config.kind.slug(),
            turns = context.thread.len(),
            "Requesting discussion merge"
        );
        Ok(PendingMerge {
            context_id: context.id,
            endpoint: self.config.merge,
            form,
        })
    }

    pub fn complete_merge(
        &mut self,
        pending: PendingMerge,
        result: Result<String, ApiError>,
    ) -> MergeOutcome {
        let is_current = self
            .context
            .as_ref()
            .is_some_and(|context| context.id == pending.context_id);
        if !is_current {
            tracing::warn!(
                kind = self.config.kind.slug(),
                "Dropping merge result for a discussion that is no longer open"
            );
            return MergeOutcome::Stale;
        }

        self.merging = false;
        match result {
            Ok(merged) if self.config.confirm_before_apply => {
                self.pending_merge = Some(merged.clone());
                MergeOutcome::AwaitingConfirmation(merged)
            }
            Ok(merged) => MergeOutcome::Apply(merged),
            Err(e) => {
                tracing::error!(kind = self.config.kind.slug(), "Discussion merge failed: {e}");
                MergeOutcome::Failed(e.user_message())
            }
        }
    }

    /// Releases a merge whose result will never arrive.
    pub fn abandon_merge(&mut self, context_id: Uuid) {
        let is_current = self
            .context
            .as_ref()
            .is_some_and(|context| context.id == context_id);
        if is_current && self.merging {
            tracing::warn!(
                kind = self.config.kind.slug(),
                id = %context_id,
                "Discussion merge abandoned before its result arrived"
            );
            self.merging = false;
        }
    }

    /// Hands out the merged text the user just accepted.
    pub fn confirm(&mut self) -> Result<String, DiscussionError> {
        self.pending_merge
            .take()
            .ok_or(DiscussionError::NothingToConfirm)
    }

    pub fn reject(&mut self) {
        self.pending_merge = None;
    }

    /// Reference text and serialized thread, as stored by the draft endpoint.
    pub fn draft_payload(&self) -> Result<(String, String), DiscussionError> {
        let context = self.context.as_ref().ok_or(DiscussionError::NotOpen)?;
        Ok((
            context.original_text.clone(),
            context.thread.to_transport_form(),
        ))
    }

    pub fn transcript_html(&self) -> String {
        render::render_transcript(&self.transcript, self.config.placeholder)
    }

    /// User-facing text for a rejected action.
    pub fn explain(&self, error: &DiscussionError) -> &'static str {
        match error {
            DiscussionError::EmptyInput => "יש לכתוב הודעה לפני השליחה.",
            DiscussionError::EmptyDiscussion => self.config.empty_merge_notice,
            DiscussionError::Busy => "הבקשה הקודמת עדיין בטיפול.",
            DiscussionError::NotOpen => "אין דיון פתוח.",
            DiscussionError::NothingToConfirm => "אין עדכון שממתין לאישור.",
        }
    }
}
