//! HTTP surface: the page shell plus one fragment route per user action.
//!
//! Handlers never hold a workspace lock across a backend call. They lock,
//! run the synchronous half of an operation, unlock, await the backend and
//! lock again to apply the result.

mod discussion;
mod page;
mod project;

use crate::config::Config;
use crate::models::{GenerationParams, ProjectKind};
use crate::services::api::{ApiError, WriterBackend};
use crate::services::render;
use crate::services::workspace::ProjectWorkspace;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use lru::LruCache;
use serde::Deserialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Editor ids in the page shell that fragments may overwrite.
pub const SYNOPSIS_AREA: &str = "synopsisArea";
pub const DIVISION_AREA: &str = "divisionResultArea";
pub const BUILDER_AREA: &str = "synopsisBuilderArea";

type SharedWorkspace = Arc<Mutex<ProjectWorkspace>>;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn WriterBackend>,
    pub config: Arc<Config>,
    /// Least recently used projects are dropped once `config.max_projects` is reached.
    workspaces: Arc<Mutex<LruCache<u64, SharedWorkspace>>>,
}

impl AppState {
    pub fn new(backend: Arc<dyn WriterBackend>, config: Config) -> Self {
        AppState {
            backend,
            workspaces: Arc::new(Mutex::new(LruCache::new(config.max_projects))),
            config: Arc::new(config),
        }
    }

    /// The project's workspace, created on first use.
    fn workspace(&self, project_id: u64) -> SharedWorkspace {
        let mut workspaces = self
            .workspaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(workspace) = workspaces.get(&project_id) {
            return workspace.clone();
        }

        tracing::info!(project_id, "Creating project workspace");
        let workspace = Arc::new(Mutex::new(ProjectWorkspace::new(
            project_id,
            ProjectKind::Prose,
            self.config.failed_turn,
        )));
        if let Some((evicted, _)) = workspaces.push(project_id, workspace.clone()) {
            tracing::info!(project_id = evicted, "Dropping least recently used workspace");
        }
        workspace
    }

    fn generation_params(&self, temperature: Option<&str>, persona: Option<&str>) -> GenerationParams {
        let defaults = &self.config.generation;
        GenerationParams {
            temperature: temperature
                .and_then(|raw| raw.trim().parse().ok())
                .unwrap_or(defaults.temperature),
            persona: persona
                .map(str::trim)
                .filter(|persona| !persona.is_empty())
                .map_or_else(|| defaults.persona.clone(), str::to_string),
        }
    }
}

fn lock(workspace: &Mutex<ProjectWorkspace>) -> MutexGuard<'_, ProjectWorkspace> {
    workspace.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A failed action, rendered as an inline notice.
#[derive(Debug)]
pub struct Fragment {
    status: StatusCode,
    message: String,
}

impl Fragment {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Fragment {
            status,
            message: message.into(),
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// The discussion changed while a call was outstanding.
    fn stale() -> Self {
        Self::new(StatusCode::CONFLICT, "הדיון נסגר או נפתח מחדש לפני שהתקבלה תשובה.")
    }

    fn upstream(context: &str, message: &str) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, format!("{context}: {message}"))
    }

    fn backend(context: &str, error: &ApiError) -> Self {
        tracing::error!("{context}: {error}");
        Self::upstream(context, &error.user_message())
    }
}

impl IntoResponse for Fragment {
    fn into_response(self) -> Response {
        (self.status, Html(render::error_notice(&self.message))).into_response()
    }
}

type FragmentResult = Result<Html<String>, Fragment>;

#[derive(Debug, Deserialize)]
struct PageQuery {
    kind: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/project/:project_id", get(project_page))
        .route(
            "/project/:project_id/synopsis",
            get(project::load_synopsis).post(project::save_synopsis),
        )
        .route(
            "/project/:project_id/synopsis/history",
            get(project::synopsis_history),
        )
        .route("/project/:project_id/synopsis/cards", post(project::synopsis_cards))
        .route("/project/:project_id/synopsis/divide", post(project::divide_synopsis))
        .route("/project/:project_id/division/accept", post(project::accept_division))
        .route("/project/:project_id/chapters/write", post(project::write_chapter))
        .route(
            "/project/:project_id/outline",
            get(project::load_outline).post(project::save_outline),
        )
        .route("/project/:project_id/outline/scenes", post(project::outline_scenes))
        .route("/project/:project_id/scenes/write", post(project::write_scene))
        .route(
            "/project/:project_id/discussion/:kind/:action",
            post(discussion::discussion_action),
        )
        .route(
            "/project/:project_id/attachments/clear",
            post(project::clear_attachments),
        )
        .route(
            "/project/:project_id/attachments/:source/:file_id",
            post(project::attach_file),
        )
        .route("/project/:project_id/ask", post(project::ask))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(page::INDEX)
}

async fn health_check() -> &'static str {
    "OK"
}

/// The project page; `kind` is the backend's project-kind label.
async fn project_page(
    State(state): State<AppState>,
    Path(project_id): Path<u64>,
    Query(query): Query<PageQuery>,
) -> Html<String> {
    let workspace = state.workspace(project_id);
    let kind = {
        let mut workspace = lock(&workspace);
        if let Some(label) = query.kind.as_deref() {
            workspace.session.set_kind(ProjectKind::from_label(label));
        }
        workspace.session.kind()
    };
    Html(page::project_page(project_id, kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChapterRecord, DiscussionTurn, SynopsisDraft};
    use crate::services::api::{ApiClient, MergeEndpoint, MockWriterBackend};
    use axum::body::Body;
    use http::Request;
    use serde_json::json;
    use std::num::NonZeroUsize;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app(backend: MockWriterBackend) -> AppState {
        AppState::new(Arc::new(backend), Config::from_lookup(|_| None))
    }

    async fn post_form(state: &AppState, uri: &str, fields: &[(&str, &str)]) -> (StatusCode, String) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(serde_urlencoded::to_string(fields).unwrap()))
            .unwrap();
        send(state, request).await
    }

    async fn get_page(state: &AppState, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        send(state, request).await
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, String) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn chapter_records() -> Vec<ChapterRecord> {
        vec![
            ChapterRecord {
                title: "פרק 1: התחלה".to_string(),
                content: "תוכן א".to_string(),
            },
            ChapterRecord {
                title: "פרק 2: סוף".to_string(),
                content: "תוכן ב".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn health_check_works() {
        let state = app(MockWriterBackend::new());
        let (status, body) = get_page(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn project_page_records_kind() {
        let state = app(MockWriterBackend::new());
        let (status, body) = get_page(&state, "/project/3?kind=%D7%A7%D7%95%D7%9E%D7%99%D7%A7%D7%A1").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"data-project-id="3""#));
        assert!(body.contains(r#"data-project-kind="comic""#));

        let workspace = state.workspace(3);
        assert_eq!(lock(&workspace).session.kind(), ProjectKind::Comic);
    }

    #[tokio::test]
    async fn empty_synopsis_is_rejected_without_backend_calls() {
        let mut backend = MockWriterBackend::new();
        backend.expect_parse_synopsis().never();
        backend.expect_list_outlines().never();
        let state = app(backend);

        let (status, body) =
            post_form(&state, "/project/1/synopsis/cards", &[("text", "  \n ")]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("התקציר ריק."));
    }

    #[tokio::test]
    async fn synopsis_cards_mark_saved_outlines() {
        let mut backend = MockWriterBackend::new();
        backend
            .expect_parse_synopsis()
            .times(1)
            .returning(|_, _| Ok(chapter_records()));
        backend
            .expect_list_outlines()
            .times(1)
            .returning(|_| Ok(vec!["פרק 2: סוף".to_string()]));
        let state = app(backend);

        let (status, body) = post_form(
            &state,
            "/project/1/synopsis/cards",
            &[("text", "פרק 1: התחלה\nתוכן א\nפרק 2: סוף\nתוכן ב")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.matches("chapter-card").count(), 2);
        assert_eq!(body.matches("view-outline-btn").count(), 1);
    }

    #[tokio::test]
    async fn outline_list_failure_fails_the_whole_render() {
        let mut backend = MockWriterBackend::new();
        backend
            .expect_parse_synopsis()
            .returning(|_, _| Ok(chapter_records()));
        backend.expect_list_outlines().returning(|_| {
            Err(ApiError::Status {
                status: 500,
                message: "db down".to_string(),
            })
        });
        let state = app(backend);

        let (status, body) =
            post_form(&state, "/project/1/synopsis/cards", &[("text", "פרק 1: א")]).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body.contains("db down"));
    }

    #[tokio::test]
    async fn outline_scenes_are_segmented_locally() {
        let state = app(MockWriterBackend::new());
        let (status, body) = post_form(
            &state,
            "/project/1/outline/scenes",
            &[("text", "**סצנה 1: פתיחה**\nא\n**סצנה 2: סוף**\nב")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.matches("outline-card").count(), 2);
    }

    #[tokio::test]
    async fn prose_chapter_write_renders_scene_cards() {
        let mut backend = MockWriterBackend::new();
        backend
            .expect_ask()
            .times(1)
            .withf(|_, form| {
                form.contains(&("write_kind".to_string(), "breakdown_chapter".to_string()))
                    && form.contains(&("text".to_string(), "פרק 1: התחלה".to_string()))
            })
            .returning(|_, _| Ok("**סצנה 1: פתיחה**\nא".to_string()));
        let state = app(backend);

        let (status, body) = post_form(
            &state,
            "/project/1/chapters/write",
            &[("title", "פרק 1: התחלה")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("outline-card"));
        assert!(body.contains("save-outline-btn"));
    }

    #[tokio::test]
    async fn chapter_discussion_send_and_confirm() {
        let mut backend = MockWriterBackend::new();
        backend
            .expect_ask()
            .times(1)
            .returning(|_, _| Ok("תשובה".to_string()));
        backend
            .expect_merge_discussion()
            .times(1)
            .withf(|_, endpoint, _| *endpoint == MergeEndpoint::ChapterSummary)
            .returning(|_, _, _| Ok("תוכן חדש".to_string()));
        let state = app(backend);

        let (status, body) = post_form(
            &state,
            "/project/1/discussion/chapter/open",
            &[
                ("title", "פרק 1: התחלה"),
                ("content", "תוכן א"),
                ("synopsis", "פרק 1: התחלה\nתוכן א\nפרק 2: סוף\nתוכן ב"),
            ],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("הדיון ריק."));

        let (status, body) = post_form(
            &state,
            "/project/1/discussion/chapter/send",
            &[("text", "מה חסר?")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.find("מה חסר?").unwrap() < body.find("תשובה").unwrap());

        let (status, body) =
            post_form(&state, "/project/1/discussion/chapter/summarize", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("merge-proposal"));

        let (status, body) = post_form(&state, "/project/1/discussion/chapter/confirm", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"data-target="synopsisArea""#));
        assert!(body.contains("תוכן חדש\nפרק 2: סוף"));
    }

    #[tokio::test]
    async fn summarize_empty_discussion_is_rejected() {
        let mut backend = MockWriterBackend::new();
        backend.expect_merge_discussion().never();
        let state = app(backend);

        post_form(
            &state,
            "/project/1/discussion/division/open",
            &[("division", "פרק 1: א")],
        )
        .await;
        let (status, body) =
            post_form(&state, "/project/1/discussion/division/summarize", &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("לא ניתן לעדכן מחלוקה ריקה."));
    }

    #[tokio::test]
    async fn failed_turn_is_shown_inline() {
        let mut backend = MockWriterBackend::new();
        backend.expect_ask().returning(|_, _| {
            Err(ApiError::Status {
                status: 500,
                message: "timeout".to_string(),
            })
        });
        let state = app(backend);

        post_form(&state, "/project/1/discussion/division/open", &[]).await;
        let (status, body) = post_form(
            &state,
            "/project/1/discussion/division/send",
            &[("text", "קצר יותר")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("שגיאה: timeout"));
    }

    #[tokio::test]
    async fn dropped_send_does_not_leave_discussion_busy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ask/1"))
            .and(body_string_contains("text=first"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"answer": "late"}))
                    .set_delay(Duration::from_secs(30)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/ask/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"answer": "on time"})))
            .mount(&server)
            .await;
        let state = AppState::new(
            Arc::new(ApiClient::new(server.uri())),
            Config::from_lookup(|_| None),
        );

        post_form(&state, "/project/1/discussion/division/open", &[]).await;
        let dropped = tokio::time::timeout(
            Duration::from_millis(200),
            post_form(&state, "/project/1/discussion/division/send", &[("text", "first")]),
        )
        .await;
        assert!(dropped.is_err());

        let (status, body) = post_form(
            &state,
            "/project/1/discussion/division/send",
            &[("text", "second")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("הבקשה בוטלה"));
        assert!(body.contains("on time"));
    }

    #[test]
    fn least_recently_used_workspace_is_dropped() {
        let config = Config {
            max_projects: NonZeroUsize::new(2).unwrap(),
            ..Config::from_lookup(|_| None)
        };
        let state = AppState::new(Arc::new(MockWriterBackend::new()), config);

        lock(&state.workspace(1)).session.set_kind(ProjectKind::Comic);
        state.workspace(2);
        state.workspace(1);
        state.workspace(3);

        {
            let workspaces = state.workspaces.lock().unwrap();
            assert_eq!(workspaces.len(), 2);
            assert!(workspaces.contains(&1));
            assert!(!workspaces.contains(&2));
        }
        assert_eq!(lock(&state.workspace(1)).session.kind(), ProjectKind::Comic);
    }

    #[tokio::test]
    async fn scene_write_renders_draft() {
        let mut backend = MockWriterBackend::new();
        backend
            .expect_write_scene()
            .times(1)
            .withf(|_, title, description| title == "סצנה 1: פתיחה" && description == "א")
            .returning(|_, _, _| Ok("טיוטת סצנה".to_string()));
        let state = app(backend);

        let (status, body) = post_form(
            &state,
            "/project/1/scenes/write",
            &[("title", "סצנה 1: פתיחה"), ("content", "א")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("טיוטת סצנה"));

        let (status, _) = post_form(&state, "/project/1/scenes/write", &[("title", " ")]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn builder_open_falls_back_to_synopsis() {
        let mut backend = MockWriterBackend::new();
        backend.expect_load_draft().returning(|_| {
            Err(ApiError::Status {
                status: 404,
                message: "missing".to_string(),
            })
        });
        let state = app(backend);

        let (status, body) = post_form(
            &state,
            "/project/1/discussion/synopsis/open",
            &[("synopsis", "תקציר נוכחי")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("מתחילים מחדש"));
        assert!(body.contains(r#"data-target="synopsisBuilderArea">תקציר נוכחי"#));
    }

    #[tokio::test]
    async fn builder_update_applies_and_transfers() {
        let mut backend = MockWriterBackend::new();
        backend.expect_load_draft().returning(|_| {
            Ok(SynopsisDraft {
                draft_text: "טיוטה".to_string(),
                discussion: vec![DiscussionTurn::user("הוסף דמות")],
            })
        });
        backend
            .expect_merge_discussion()
            .withf(|_, endpoint, _| *endpoint == MergeEndpoint::SynopsisUpdate)
            .returning(|_, _, _| Ok("טיוטה חדשה".to_string()));
        let state = app(backend);

        let (_, body) = post_form(&state, "/project/1/discussion/synopsis/open", &[]).await;
        assert!(body.contains("הוסף דמות"));

        let (status, body) =
            post_form(&state, "/project/1/discussion/synopsis/summarize", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"data-target="synopsisBuilderArea">טיוטה חדשה"#));

        let (_, body) = post_form(&state, "/project/1/discussion/synopsis/transfer", &[]).await;
        assert!(body.contains(r#"data-target="synopsisArea">טיוטה חדשה"#));
    }

    #[tokio::test]
    async fn unknown_discussion_kind_is_not_found() {
        let state = app(MockWriterBackend::new());
        let (status, _) = post_form(&state, "/project/1/discussion/review/open", &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = post_form(&state, "/project/1/discussion/chapter/transfer", &[]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ask_sends_attachments_and_clears_them() {
        let mut backend = MockWriterBackend::new();
        backend
            .expect_ask()
            .times(1)
            .withf(|_, form| {
                form.contains(&("temp_file_ids".to_string(), "abc".to_string()))
                    && form.contains(&("library_file_ids".to_string(), "7".to_string()))
            })
            .returning(|_, _| Ok("תשובה".to_string()));
        let state = app(backend);

        post_form(&state, "/project/1/attachments/temp/abc", &[]).await;
        post_form(&state, "/project/1/attachments/library/7", &[]).await;
        let (status, body) = post_form(&state, "/project/1/ask", &[("text", "שאלה")]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("תשובה"));

        let workspace = state.workspace(1);
        assert!(!lock(&workspace).session.has_attachments());
    }

    #[tokio::test]
    async fn library_attachment_requires_numeric_id() {
        let state = app(MockWriterBackend::new());
        let (status, _) = post_form(&state, "/project/1/attachments/library/abc", &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn generation_params_fall_back_to_config() {
        let state = app(MockWriterBackend::new());
        let params = state.generation_params(Some("hot"), Some("  "));
        assert_eq!(params, GenerationParams::default());

        let params = state.generation_params(Some("0.3"), Some("critic"));
        assert_eq!(params.temperature, 0.3);
        assert_eq!(params.persona, "critic");
    }
}
