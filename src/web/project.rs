use super::{AppState, DIVISION_AREA, Fragment, FragmentResult, SYNOPSIS_AREA, lock};
use crate::models::{DiscussionTurn, FormFields, ProjectKind};
use crate::services::render;
use crate::services::segmenter::{segment_chapters, segment_scenes};
use axum::{
    Form,
    extract::{Path, Query, State},
    response::Html,
};
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
pub struct TextForm {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
pub struct DivideForm {
    #[serde(default)]
    text: String,
    words_per_chapter_min: Option<String>,
    words_per_chapter_max: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TitleForm {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
pub struct OutlineForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
pub struct SceneForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
pub struct AskForm {
    #[serde(default)]
    text: String,
    mode: Option<String>,
    write_kind: Option<String>,
    temperature: Option<String>,
    persona: Option<String>,
    use_notes: Option<String>,
    use_history: Option<String>,
}

const NO_ANSWER: &str = "לא התקבלה תשובה מהמודל.";

pub async fn load_synopsis(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
) -> FragmentResult {
    let text = state
        .backend
        .get_synopsis(project_id)
        .await
        .map_err(|e| Fragment::backend("שגיאה בטעינת התקציר", &e))?;

    let workspace = state.workspace(project_id);
    lock(&workspace).synopsis_text = text.clone();
    Ok(Html(render::buffer_update(SYNOPSIS_AREA, &text)))
}

pub async fn save_synopsis(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
    Form(form): Form<TextForm>,
) -> FragmentResult {
    let workspace = state.workspace(project_id);
    lock(&workspace).synopsis_text = form.text.clone();

    state
        .backend
        .save_synopsis(project_id, form.text)
        .await
        .map_err(|e| Fragment::backend("שגיאה בשמירת התקציר", &e))?;
    tracing::info!(project_id, "Synopsis saved");
    Ok(Html(render::notice("התקציר נשמר.")))
}

pub async fn synopsis_history(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
) -> FragmentResult {
    let versions = state
        .backend
        .synopsis_history(project_id)
        .await
        .map_err(|e| Fragment::backend("שגיאה בטעינת ההיסטוריה", &e))?;
    Ok(Html(render::render_synopsis_history(&versions)))
}

/// Chapter cards from the backend parser, marking chapters with a saved outline.
pub async fn synopsis_cards(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
    Form(form): Form<TextForm>,
) -> FragmentResult {
    if form.text.trim().is_empty() {
        return Err(Fragment::rejected("התקציר ריק."));
    }

    let workspace = state.workspace(project_id);
    let kind = {
        let mut workspace = lock(&workspace);
        workspace.synopsis_text = form.text.clone();
        workspace.session.kind()
    };

    let (chapters, titles) = tokio::join!(
        state.backend.parse_synopsis(project_id, form.text),
        state.backend.list_outlines(project_id),
    );
    let chapters = chapters.map_err(|e| Fragment::backend("שגיאה בעיבוד הפרקים", &e))?;
    let saved: HashSet<String> = titles
        .map_err(|e| Fragment::backend("שגיאה בעיבוד הפרקים", &e))?
        .into_iter()
        .collect();

    tracing::debug!(project_id, chapters = chapters.len(), "Rendering chapter cards");
    Ok(Html(render::render_chapter_cards(&chapters, &saved, kind)))
}

pub async fn divide_synopsis(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
    Form(form): Form<DivideForm>,
) -> FragmentResult {
    if form.text.trim().is_empty() {
        return Err(Fragment::rejected("התקציר ריק."));
    }

    let workspace = state.workspace(project_id);
    let kind = {
        let mut workspace = lock(&workspace);
        workspace.synopsis_text = form.text.clone();
        workspace.session.kind()
    };

    let mut request: FormFields = vec![
        ("mode".to_string(), "write".to_string()),
        ("write_kind".to_string(), "divide_synopsis".to_string()),
        ("synopsis_text_content".to_string(), form.text),
    ];
    if kind == ProjectKind::Prose {
        request.push((
            "words_per_chapter_min".to_string(),
            form.words_per_chapter_min.unwrap_or_default(),
        ));
        request.push((
            "words_per_chapter_max".to_string(),
            form.words_per_chapter_max.unwrap_or_default(),
        ));
    }

    let answer = state
        .backend
        .ask(project_id, request)
        .await
        .map_err(|e| Fragment::backend("שגיאה בחלוקת התקציר", &e))?;
    let division = if answer.trim().is_empty() {
        NO_ANSWER.to_string()
    } else {
        answer
    };

    let chapter_count = segment_chapters(&division).len();
    tracing::info!(project_id, chapter_count, "Synopsis divided");
    lock(&workspace).division_text = division.clone();

    Ok(Html(format!(
        "{}{}",
        render::notice(&format!("התקבלה חלוקה ל-{chapter_count} פרקים.")),
        render::buffer_update(DIVISION_AREA, &division)
    )))
}

pub async fn accept_division(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
) -> Html<String> {
    let workspace = state.workspace(project_id);
    let mut workspace = lock(&workspace);
    workspace.accept_division();
    Html(format!(
        "{}{}",
        render::notice("החלוקה הועתקה לעורך. לחץ 'שמור תקציר' כדי לשמור."),
        render::buffer_update(SYNOPSIS_AREA, &workspace.synopsis_text)
    ))
}

/// Prose chapters come back as an outline; comic chapters as finished text.
pub async fn write_chapter(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
    Form(form): Form<TitleForm>,
) -> FragmentResult {
    let title = form.title.trim().to_string();
    if title.is_empty() {
        return Err(Fragment::rejected("חסרה כותרת פרק."));
    }

    let workspace = state.workspace(project_id);
    let kind = lock(&workspace).session.kind();

    let request: FormFields = vec![
        ("text".to_string(), title.clone()),
        ("mode".to_string(), "write".to_string()),
        ("write_kind".to_string(), "breakdown_chapter".to_string()),
        ("use_notes".to_string(), "1".to_string()),
        ("use_history".to_string(), "0".to_string()),
    ];
    let answer = state
        .backend
        .ask(project_id, request)
        .await
        .map_err(|e| Fragment::backend("שגיאה בכתיבת הפרק", &e))?;

    Ok(Html(match kind {
        ProjectKind::Prose => render::outline_panel(&title, &answer, &segment_scenes(&answer)),
        ProjectKind::Comic => render::render_answer(&answer),
    }))
}

pub async fn load_outline(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
    Query(query): Query<TitleForm>,
) -> FragmentResult {
    let outline = state
        .backend
        .get_outline(project_id, query.title.clone())
        .await
        .map_err(|e| Fragment::backend("שגיאה בטעינת המתווה", &e))?;
    Ok(Html(render::outline_panel(
        &query.title,
        &outline,
        &segment_scenes(&outline),
    )))
}

pub async fn save_outline(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
    Form(form): Form<OutlineForm>,
) -> FragmentResult {
    if form.title.trim().is_empty() {
        return Err(Fragment::rejected("חסרה כותרת פרק."));
    }
    state
        .backend
        .save_outline(project_id, form.title, form.text)
        .await
        .map_err(|e| Fragment::backend("שגיאה בשמירת המתווה", &e))?;
    Ok(Html(render::notice("המתווה נשמר בהצלחה!")))
}

pub async fn outline_scenes(Form(form): Form<TextForm>) -> Html<String> {
    Html(render::render_scene_cards(&segment_scenes(&form.text)))
}

pub async fn write_scene(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
    Form(form): Form<SceneForm>,
) -> FragmentResult {
    let title = form.title.trim().to_string();
    if title.is_empty() {
        return Err(Fragment::rejected("חסרה כותרת סצנה."));
    }

    let draft = state
        .backend
        .write_scene(project_id, title, form.content)
        .await
        .map_err(|e| Fragment::backend("שגיאה בכתיבת הסצנה", &e))?;
    Ok(Html(render::render_answer(&draft)))
}

pub async fn attach_file(
    State(state): State<AppState>,
    Path((project_id, source, file_id)): Path<(u64, String, String)>,
) -> FragmentResult {
    let workspace = state.workspace(project_id);
    let mut workspace = lock(&workspace);
    let session = &mut workspace.session;

    let added = match source.as_str() {
        "temp" => session.attach_temp(file_id),
        "library" => {
            let id = file_id
                .parse::<i64>()
                .map_err(|_| Fragment::rejected("מזהה קובץ לא תקין."))?;
            session.attach_library(id)
        }
        _ => return Err(Fragment::not_found("מקור קובץ לא מוכר.")),
    };
    if !added {
        tracing::debug!(project_id, "Attachment already present");
    }

    let count = session.temp_file_ids().len() + session.library_file_ids().len();
    Ok(Html(render::notice(&format!("{count} קבצים מצורפים לשאלה הבאה."))))
}

pub async fn clear_attachments(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
) -> Html<String> {
    let workspace = state.workspace(project_id);
    lock(&workspace).session.clear_attachments();
    Html(String::new())
}

/// The main question box; attached files travel with the question and are
/// detached once it has been answered. Files attached meanwhile stay.
pub async fn ask(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
    Form(form): Form<AskForm>,
) -> FragmentResult {
    let workspace = state.workspace(project_id);
    let params = state.generation_params(form.temperature.as_deref(), form.persona.as_deref());

    let (request, sent_temp, sent_library) = {
        let workspace = lock(&workspace);
        if form.text.trim().is_empty() && !workspace.session.has_attachments() {
            return Err(Fragment::rejected("יש לכתוב שאלה או לצרף קובץ."));
        }

        let mut request: FormFields = vec![
            ("text".to_string(), form.text.clone()),
            (
                "mode".to_string(),
                form.mode.unwrap_or_else(|| "brainstorm".to_string()),
            ),
            (
                "write_kind".to_string(),
                form.write_kind.unwrap_or_else(|| "chat".to_string()),
            ),
            ("temperature".to_string(), params.temperature.to_string()),
            ("persona".to_string(), params.persona),
            (
                "use_notes".to_string(),
                form.use_notes.unwrap_or_else(|| "1".to_string()),
            ),
            (
                "use_history".to_string(),
                form.use_history.unwrap_or_else(|| "1".to_string()),
            ),
        ];
        request.extend(workspace.session.attachment_fields());
        (
            request,
            workspace.session.temp_file_ids().to_vec(),
            workspace.session.library_file_ids().to_vec(),
        )
    };

    let answer = state
        .backend
        .ask(project_id, request)
        .await
        .map_err(|e| Fragment::backend("שגיאה בשליחת השאלה", &e))?;
    lock(&workspace)
        .session
        .detach(&sent_temp, &sent_library);

    let answer = if answer.trim().is_empty() {
        NO_ANSWER.to_string()
    } else {
        answer
    };
    Ok(Html(format!(
        "{}{}",
        render::render_turn(&DiscussionTurn::user(form.text)),
        render::render_turn(&DiscussionTurn::assistant(answer))
    )))
}
