//! HTML fragments for chapter/scene cards and discussion transcripts.
//!
//! Every function here is pure: the same input always yields the same markup.
//! Per-card identity travels in `data-*` attributes so click handlers can be
//! re-attached after any re-render.

use crate::models::{ChapterRecord, DiscussionTurn, ProjectKind, Role, SceneRecord, SynopsisVersion};
use crate::services::discussion::TranscriptEntry;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use std::collections::HashSet;

pub const NO_CHAPTERS: &str = "לא נמצאו פרקים בתקציר. ודא שהכותרות בפורמט 'פרק X:'.";
pub const NO_SCENES: &str = "לא נמצאו סצנות תקינות במתווה. ודא שהפורמט הוא **סצנה X: כותרת**.";

pub fn notice(message: &str) -> String {
    format!(r#"<div class="muted">{}</div>"#, text(message))
}

pub fn error_notice(message: &str) -> String {
    format!(r#"<div class="muted error">{}</div>"#, text(message))
}

fn write_button_label(kind: ProjectKind) -> &'static str {
    match kind {
        ProjectKind::Prose => "📜 כתוב מתווה לפרק",
        ProjectKind::Comic => "✍️ כתוב את הפרק",
    }
}

/// Chapter cards; `saved_outlines` holds titles that get a "view outline" button.
pub fn render_chapter_cards(
    chapters: &[ChapterRecord],
    saved_outlines: &HashSet<String>,
    kind: ProjectKind,
) -> String {
    if chapters.is_empty() {
        return notice(NO_CHAPTERS);
    }

    chapters
        .iter()
        .map(|chapter| {
            let title_attr = attr(&chapter.title);
            let content_attr = attr(&chapter.content);
            let outline_button = if saved_outlines.contains(&chapter.title) {
                format!(
                    r#"<button class="linklike view-outline-btn" data-chapter-title="{title_attr}">👁️ הצג מתווה שמור</button>"#
                )
            } else {
                String::new()
            };

            format!(
                r#"<div class="chapter-card">
  <h5>{title}</h5>
  <div class="small muted" style="white-space: pre-wrap;">{content}</div>
  <div class="btnrow">
    <button class="linklike write-chapter-btn" data-content="{content_attr}" data-chapter-title="{title_attr}">{label}</button>
    <button class="linklike discuss-chapter-btn" data-content="{content_attr}" data-chapter-title="{title_attr}">💬 דיון</button>
    {outline_button}
  </div>
</div>"#,
                title = text(&chapter.title),
                content = text(&chapter.content),
                label = write_button_label(kind),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_scene_cards(scenes: &[SceneRecord]) -> String {
    if scenes.is_empty() {
        return notice(NO_SCENES);
    }

    scenes
        .iter()
        .map(|scene| {
            let card_id = attr(&scene.card_id);
            let title_attr = attr(&scene.title);
            format!(
                r#"<div class="outline-card">
  <h5>{title}</h5>
  <div class="small muted" style="white-space: pre-wrap;" id="{card_id}">{content}</div>
  <div class="btnrow">
    <button class="linklike write-scene-btn" data-card-id="{card_id}" data-scene-title="{title_attr}">✍️ כתוב טיוטה לסצנה</button>
  </div>
</div>"#,
                title = text(&scene.title),
                content = text(&scene.content),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_turn(turn: &DiscussionTurn) -> String {
    let side = match turn.role {
        Role::User => "q",
        Role::Assistant => "a",
    };
    format!(
        r#"<div class="turn {side}"><div class="bubble">{}</div></div>"#,
        text(&turn.content)
    )
}

pub fn render_error_turn(message: &str) -> String {
    format!(
        r#"<div class="turn a"><div class="bubble" style="color:red;">שגיאה: {}</div></div>"#,
        text(message)
    )
}

/// The whole transcript, or `placeholder` when nothing has been said yet.
pub fn render_transcript(entries: &[TranscriptEntry], placeholder: &str) -> String {
    if entries.is_empty() {
        return notice(placeholder);
    }
    entries
        .iter()
        .map(|entry| match entry {
            TranscriptEntry::Turn(turn) => render_turn(turn),
            TranscriptEntry::Error(message) => render_error_turn(message),
        })
        .collect()
}

/// Heading plus transcript, the body of a discussion modal.
pub fn discussion_panel(title: &str, transcript_html: &str) -> String {
    format!(
        r#"<h4 class="discussion-title">דיון על: {}</h4>
<div class="thread">{transcript_html}</div>"#,
        text(title)
    )
}

/// Merged text offered for confirmation before it replaces anything.
pub fn merge_proposal(kind_slug: &str, merged: &str) -> String {
    format!(
        r#"<div class="merge-proposal" data-kind="{kind}">
  <div class="small muted">המודל מציע את העדכון הבא. האם להעתיק אותו לעורך?</div>
  <div class="box" style="white-space: pre-wrap;">{merged}</div>
  <div class="btnrow">
    <button class="confirm-merge-btn" data-kind="{kind}">אישור</button>
    <button class="linklike reject-merge-btn" data-kind="{kind}">ביטול</button>
  </div>
</div>"#,
        kind = attr(kind_slug),
        merged = text(merged),
    )
}

/// Scene cards for one chapter's outline, with the raw text kept for saving.
pub fn outline_panel(chapter_title: &str, outline_text: &str, scenes: &[SceneRecord]) -> String {
    let title_attr = attr(chapter_title);
    format!(
        r#"<div class="outline-panel" data-chapter-title="{title_attr}">
<h4>מתווה: {title}</h4>
{cards}
<textarea hidden class="outline-source">{source}</textarea>
<button class="save-outline-btn" data-chapter-title="{title_attr}">💾 שמור מתווה</button>
</div>"#,
        title = text(chapter_title),
        cards = render_scene_cards(scenes),
        source = text(outline_text),
    )
}

/// Tells the page to overwrite the editor `target` with `value`.
pub fn buffer_update(target: &str, value: &str) -> String {
    format!(
        r#"<textarea hidden class="buffer-update" data-target="{}">{}</textarea>"#,
        attr(target),
        text(value)
    )
}

pub fn render_synopsis_history(versions: &[SynopsisVersion]) -> String {
    if versions.is_empty() {
        return notice("אין היסטוריית גרסאות.");
    }
    versions
        .iter()
        .map(|version| {
            format!(
                r#"<div class="li">
  <div class="rowflex" style="justify-content: space-between;">
    <strong>גרסה מתאריך {created}</strong>
    <button class="linklike restore-synopsis-btn">שחזר</button>
  </div>
  <div class="box" style="margin-top:4px;">{body}</div>
</div>"#,
                created = text(&version.created_at),
                body = text(&version.text),
            )
        })
        .collect()
}

/// Free model output shown as-is, line breaks preserved.
pub fn render_answer(answer: &str) -> String {
    format!(
        r#"<div class="box">{}</div>"#,
        text(answer).replace('\n', "<br>")
    )
}
