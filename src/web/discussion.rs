use super::{
    AppState, BUILDER_AREA, DIVISION_AREA, Fragment, FragmentResult, SYNOPSIS_AREA,
    SharedWorkspace, lock,
};
use crate::models::FormFields;
use crate::services::discussion::{DiscussionKind, MergeOutcome, TurnOutcome};
use crate::services::render;
use crate::services::workspace::{Applied, ProjectWorkspace};
use axum::{
    Form,
    extract::{Path, State},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

/// Every discussion action reads from this one form; unused fields stay empty.
/// `synopsis`, `division` and `draft` carry the page's editors so the workspace
/// sees what the user sees.
#[derive(Debug, Default, Deserialize)]
pub struct DiscussionForm {
    title: Option<String>,
    content: Option<String>,
    text: Option<String>,
    temperature: Option<String>,
    persona: Option<String>,
    synopsis: Option<String>,
    division: Option<String>,
    draft: Option<String>,
}

impl DiscussionForm {
    fn sync_editors(&self, workspace: &mut ProjectWorkspace) {
        if let Some(synopsis) = &self.synopsis {
            workspace.synopsis_text = synopsis.clone();
        }
        if let Some(division) = &self.division {
            workspace.division_text = division.clone();
        }
        if let Some(draft) = &self.draft {
            workspace.set_draft_text(draft);
        }
    }
}

pub async fn discussion_action(
    State(state): State<AppState>,
    Path((project_id, slug, action)): Path<(u64, String, String)>,
    Form(form): Form<DiscussionForm>,
) -> Response {
    let Some(kind) = DiscussionKind::from_slug(&slug) else {
        return Fragment::not_found("סוג דיון לא מוכר.").into_response();
    };
    let builder = kind == DiscussionKind::SynopsisBuilder;

    let result = match action.as_str() {
        "open" if builder => open_builder(&state, project_id, form).await,
        "open" => open(&state, project_id, kind, form),
        "send" => send(&state, project_id, kind, form).await,
        "summarize" => summarize(&state, project_id, kind, form).await,
        "confirm" => confirm(&state, project_id, kind, form),
        "reject" => reject(&state, project_id, kind),
        "close" => close(&state, project_id, kind),
        "save" if builder => save_draft(&state, project_id, form).await,
        "transfer" if builder => transfer_draft(&state, project_id, form),
        _ => Err(Fragment::not_found("פעולה לא מוכרת.")),
    };
    result.into_response()
}

#[derive(Debug, Clone, Copy)]
enum Call {
    Turn,
    Merge,
}

/// Frees the controller when a request is dropped (client gone) between
/// `begin_*` and `complete_*`. Must be disarmed before the workspace is locked
/// to apply the result.
struct InFlight {
    workspace: SharedWorkspace,
    kind: DiscussionKind,
    context_id: Uuid,
    call: Call,
    armed: bool,
}

impl InFlight {
    fn new(workspace: &SharedWorkspace, kind: DiscussionKind, context_id: Uuid, call: Call) -> Self {
        InFlight {
            workspace: workspace.clone(),
            kind,
            context_id,
            call,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut workspace = lock(&self.workspace);
        let controller = workspace.controller_mut(self.kind);
        match self.call {
            Call::Turn => controller.abandon_turn(self.context_id),
            Call::Merge => controller.abandon_merge(self.context_id),
        }
    }
}

fn panel(workspace: &ProjectWorkspace, kind: DiscussionKind) -> String {
    let controller = workspace.controller(kind);
    let title = controller
        .context()
        .map(|context| context.subject_title.as_str())
        .unwrap_or_default();
    render::discussion_panel(title, &controller.transcript_html())
}

fn open(
    state: &AppState,
    project_id: u64,
    kind: DiscussionKind,
    form: DiscussionForm,
) -> FragmentResult {
    let workspace = state.workspace(project_id);
    let mut workspace = lock(&workspace);
    form.sync_editors(&mut workspace);

    match kind {
        DiscussionKind::Chapter => {
            let title = form
                .title
                .as_deref()
                .map(str::trim)
                .filter(|title| !title.is_empty())
                .ok_or_else(|| Fragment::rejected("חסרה כותרת פרק."))?
                .to_string();
            let full_synopsis = vec![(
                "full_synopsis".to_string(),
                workspace.synopsis_text.clone(),
            )];
            workspace.controller_mut(kind).open(
                title,
                form.content.unwrap_or_default(),
                full_synopsis,
            );
        }
        DiscussionKind::Division => {
            let division = workspace.division_text.clone();
            workspace
                .controller_mut(kind)
                .open("חלוקה לפרקים", division, FormFields::new());
        }
        DiscussionKind::SynopsisBuilder => {
            return Err(Fragment::rejected("פעולה לא נתמכת."));
        }
    }

    Ok(Html(panel(&workspace, kind)))
}

/// Resumes the saved draft and its thread; a failed load starts over from the synopsis.
async fn open_builder(state: &AppState, project_id: u64, form: DiscussionForm) -> FragmentResult {
    let loaded = state.backend.load_draft(project_id).await;

    let workspace = state.workspace(project_id);
    let mut workspace = lock(&workspace);
    if let Some(synopsis) = &form.synopsis {
        workspace.synopsis_text = synopsis.clone();
    }

    let kind = DiscussionKind::SynopsisBuilder;
    let (draft, turns, warning) = match loaded {
        Ok(saved) => {
            let draft = if saved.draft_text.is_empty() {
                workspace.synopsis_text.clone()
            } else {
                saved.draft_text
            };
            (draft, saved.discussion, None)
        }
        Err(e) => {
            tracing::warn!(project_id, "Could not load synopsis draft: {e}");
            (
                workspace.synopsis_text.clone(),
                Vec::new(),
                Some(render::error_notice("שגיאה בטעינת טיוטה. מתחילים מחדש.")),
            )
        }
    };

    workspace.draft_text = draft.clone();
    workspace
        .controller_mut(kind)
        .resume("טיוטת תקציר", draft, FormFields::new(), turns);

    Ok(Html(format!(
        "{}{}{}",
        warning.unwrap_or_default(),
        panel(&workspace, kind),
        render::buffer_update(BUILDER_AREA, &workspace.draft_text)
    )))
}

async fn send(
    state: &AppState,
    project_id: u64,
    kind: DiscussionKind,
    form: DiscussionForm,
) -> FragmentResult {
    let workspace = state.workspace(project_id);
    let params = state.generation_params(form.temperature.as_deref(), form.persona.as_deref());

    let pending = {
        let mut workspace = lock(&workspace);
        form.sync_editors(&mut workspace);
        let controller = workspace.controller_mut(kind);
        controller
            .begin_turn(form.text.as_deref().unwrap_or_default(), &params)
            .map_err(|e| Fragment::rejected(controller.explain(&e)))?
    };

    let in_flight = InFlight::new(&workspace, kind, pending.context_id(), Call::Turn);
    let result = state.backend.ask(project_id, pending.form.clone()).await;
    in_flight.disarm();

    let mut workspace = lock(&workspace);
    let controller = workspace.controller_mut(kind);
    match controller.complete_turn(pending, result) {
        TurnOutcome::Stale => Err(Fragment::stale()),
        TurnOutcome::Answered(_) | TurnOutcome::Failed(_) => Ok(Html(controller.transcript_html())),
    }
}

async fn summarize(
    state: &AppState,
    project_id: u64,
    kind: DiscussionKind,
    form: DiscussionForm,
) -> FragmentResult {
    let workspace = state.workspace(project_id);

    let pending = {
        let mut workspace = lock(&workspace);
        form.sync_editors(&mut workspace);
        let controller = workspace.controller_mut(kind);
        controller
            .begin_merge()
            .map_err(|e| Fragment::rejected(controller.explain(&e)))?
    };

    let in_flight = InFlight::new(&workspace, kind, pending.context_id(), Call::Merge);
    let result = state
        .backend
        .merge_discussion(project_id, pending.endpoint, pending.form.clone())
        .await;
    in_flight.disarm();

    let mut workspace = lock(&workspace);
    match workspace.controller_mut(kind).complete_merge(pending, result) {
        MergeOutcome::Apply(merged) => {
            let applied = workspace.apply_merged(kind, &merged);
            Ok(Html(applied_fragment(&workspace, applied, &merged)))
        }
        MergeOutcome::AwaitingConfirmation(merged) => {
            Ok(Html(render::merge_proposal(kind.slug(), &merged)))
        }
        MergeOutcome::Failed(message) => Err(Fragment::upstream("שגיאה בעדכון", &message)),
        MergeOutcome::Stale => Err(Fragment::stale()),
    }
}

/// Writes the accepted merge into its document and closes the discussion.
fn confirm(
    state: &AppState,
    project_id: u64,
    kind: DiscussionKind,
    form: DiscussionForm,
) -> FragmentResult {
    let workspace = state.workspace(project_id);
    let mut workspace = lock(&workspace);
    form.sync_editors(&mut workspace);

    let controller = workspace.controller_mut(kind);
    let merged = controller
        .confirm()
        .map_err(|e| Fragment::rejected(controller.explain(&e)))?;

    let applied = workspace.apply_merged(kind, &merged);
    workspace.controller_mut(kind).close();
    Ok(Html(applied_fragment(&workspace, applied, &merged)))
}

fn reject(state: &AppState, project_id: u64, kind: DiscussionKind) -> FragmentResult {
    let workspace = state.workspace(project_id);
    lock(&workspace).controller_mut(kind).reject();
    Ok(Html(render::notice("העדכון בוטל.")))
}

fn close(state: &AppState, project_id: u64, kind: DiscussionKind) -> FragmentResult {
    let workspace = state.workspace(project_id);
    lock(&workspace).controller_mut(kind).close();
    Ok(Html(String::new()))
}

fn applied_fragment(workspace: &ProjectWorkspace, applied: Applied, merged: &str) -> String {
    match applied {
        Applied::Synopsis => format!(
            "{}{}",
            render::notice("כרטיסיית הפרק עודכנה. לחץ 'שמור תקציר' כדי לשמור."),
            render::buffer_update(SYNOPSIS_AREA, &workspace.synopsis_text)
        ),
        Applied::ChapterNotFound => format!(
            "{}{}",
            render::error_notice(
                "לא ניתן למצוא את תוכן הפרק המקורי בתקציר. העתק את הטקסט המעודכן ידנית."
            ),
            render::render_answer(merged)
        ),
        Applied::Division => format!(
            "{}{}",
            render::notice("החלוקה עודכנה על סמך הדיון."),
            render::buffer_update(DIVISION_AREA, &workspace.division_text)
        ),
        Applied::Draft => format!(
            "{}{}",
            render::notice("טיוטת התקציר עודכנה על סמך הדיון."),
            render::buffer_update(BUILDER_AREA, &workspace.draft_text)
        ),
    }
}

async fn save_draft(state: &AppState, project_id: u64, form: DiscussionForm) -> FragmentResult {
    let workspace = state.workspace(project_id);
    let (draft_text, thread) = {
        let mut workspace = lock(&workspace);
        form.sync_editors(&mut workspace);
        let controller = workspace.controller(DiscussionKind::SynopsisBuilder);
        controller
            .draft_payload()
            .map_err(|e| Fragment::rejected(controller.explain(&e)))?
    };

    state
        .backend
        .save_draft(project_id, draft_text, thread)
        .await
        .map_err(|e| Fragment::backend("שגיאה בשמירת הטיוטה", &e))?;
    tracing::info!(project_id, "Synopsis draft saved");
    Ok(Html(render::notice("הטיוטה נשמרה!")))
}

fn transfer_draft(state: &AppState, project_id: u64, form: DiscussionForm) -> FragmentResult {
    let workspace = state.workspace(project_id);
    let mut workspace = lock(&workspace);
    form.sync_editors(&mut workspace);
    workspace.transfer_draft();
    Ok(Html(format!(
        "{}{}",
        render::notice("הטיוטה הועברה לעורך התקציר. לחץ 'שמור תקציר' כדי לשמור."),
        render::buffer_update(SYNOPSIS_AREA, &workspace.synopsis_text)
    )))
}
