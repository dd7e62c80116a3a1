use crate::models::{
    ChapterRecord, FormFields, OutlineTitles, ParsedSynopsis, SynopsisDraft, SynopsisHistory,
    SynopsisVersion,
};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success status; `message` comes from the backend's `error` or `answer` field.
    #[error("Server error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("JSON error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Response is missing `{0}`")]
    MissingField(&'static str),
}

impl ApiError {
    /// Text shown to the user next to the failed action.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Backend endpoints that merge a discussion into a single updated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeEndpoint {
    ChapterSummary,
    SynopsisUpdate,
    DivisionUpdate,
}

impl MergeEndpoint {
    fn route(self) -> &'static str {
        match self {
            MergeEndpoint::ChapterSummary => "summarize_chapter_discussion",
            MergeEndpoint::SynopsisUpdate => "update_synopsis_from_discussion",
            MergeEndpoint::DivisionUpdate => "update_division_from_discussion",
        }
    }

    fn result_field(self) -> &'static str {
        match self {
            MergeEndpoint::ChapterSummary => "updated_content",
            MergeEndpoint::SynopsisUpdate => "updated_synopsis",
            MergeEndpoint::DivisionUpdate => "updated_division",
        }
    }
}

/// The remote writing-assistant API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WriterBackend: Send + Sync {
    /// General generation endpoint; returns the model's answer.
    async fn ask(&self, project_id: u64, form: FormFields) -> Result<String, ApiError>;

    async fn merge_discussion(
        &self,
        project_id: u64,
        endpoint: MergeEndpoint,
        form: FormFields,
    ) -> Result<String, ApiError>;

    /// Server-side chapter split; authoritative for chapter cards.
    async fn parse_synopsis(
        &self,
        project_id: u64,
        text: String,
    ) -> Result<Vec<ChapterRecord>, ApiError>;

    /// Titles of chapters that already have a saved outline.
    async fn list_outlines(&self, project_id: u64) -> Result<Vec<String>, ApiError>;

    async fn get_outline(&self, project_id: u64, chapter_title: String)
    -> Result<String, ApiError>;

    async fn save_outline(
        &self,
        project_id: u64,
        chapter_title: String,
        outline_text: String,
    ) -> Result<(), ApiError>;

    /// Prose draft for one scene of a chapter outline.
    async fn write_scene(
        &self,
        project_id: u64,
        scene_title: String,
        scene_description: String,
    ) -> Result<String, ApiError>;

    async fn get_synopsis(&self, project_id: u64) -> Result<String, ApiError>;

    async fn save_synopsis(&self, project_id: u64, text: String) -> Result<(), ApiError>;

    async fn synopsis_history(&self, project_id: u64) -> Result<Vec<SynopsisVersion>, ApiError>;

    async fn load_draft(&self, project_id: u64) -> Result<SynopsisDraft, ApiError>;

    async fn save_draft(
        &self,
        project_id: u64,
        draft_text: String,
        discussion_thread: String,
    ) -> Result<(), ApiError>;
}

pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        ApiClient {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_form(&self, path: &str, form: &[(String, String)]) -> Result<Value, ApiError> {
        tracing::debug!(path, "POST");
        let response = self.client.post(self.url(path)).form(form).send().await?;
        read_json(response).await
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        tracing::debug!(path, "GET");
        let response = self.client.get(self.url(path)).query(query).send().await?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|payload| {
                ["error", "answer"]
                    .iter()
                    .find_map(|key| payload.get(*key).and_then(Value::as_str).map(str::to_string))
            })
            .unwrap_or_else(|| "Server Error".to_string());
        tracing::warn!(status = status.as_u16(), %message, "Backend call failed");
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }

    Ok(serde_json::from_str(&body)?)
}

fn string_field(payload: &Value, field: &'static str) -> Result<String, ApiError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ApiError::MissingField(field))
}

fn fields(pairs: &[(&str, String)]) -> FormFields {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

#[async_trait]
impl WriterBackend for ApiClient {
    async fn ask(&self, project_id: u64, form: FormFields) -> Result<String, ApiError> {
        let payload = self.post_form(&format!("/ask/{project_id}"), &form).await?;
        string_field(&payload, "answer")
    }

    async fn merge_discussion(
        &self,
        project_id: u64,
        endpoint: MergeEndpoint,
        form: FormFields,
    ) -> Result<String, ApiError> {
        let path = format!("/api/project/{project_id}/{}", endpoint.route());
        let payload = self.post_form(&path, &form).await?;
        string_field(&payload, endpoint.result_field())
    }

    async fn parse_synopsis(
        &self,
        project_id: u64,
        text: String,
    ) -> Result<Vec<ChapterRecord>, ApiError> {
        let path = format!("/api/project/{project_id}/parse_synopsis");
        let payload = self.post_form(&path, &fields(&[("text", text)])).await?;
        let parsed: ParsedSynopsis = serde_json::from_value(payload)?;
        Ok(parsed.chapters)
    }

    async fn list_outlines(&self, project_id: u64) -> Result<Vec<String>, ApiError> {
        let path = format!("/api/project/{project_id}/outlines/list");
        let payload = self.get_json(&path, &[]).await?;
        let titles: OutlineTitles = serde_json::from_value(payload)?;
        Ok(titles.titles)
    }

    async fn get_outline(
        &self,
        project_id: u64,
        chapter_title: String,
    ) -> Result<String, ApiError> {
        let path = format!("/api/project/{project_id}/outline");
        let payload = self
            .get_json(&path, &[("chapter_title", chapter_title.as_str())])
            .await?;
        string_field(&payload, "outline_text")
    }

    async fn save_outline(
        &self,
        project_id: u64,
        chapter_title: String,
        outline_text: String,
    ) -> Result<(), ApiError> {
        let path = format!("/api/project/{project_id}/outline");
        let form = fields(&[("chapter_title", chapter_title), ("outline_text", outline_text)]);
        self.post_form(&path, &form).await?;
        Ok(())
    }

    async fn write_scene(
        &self,
        project_id: u64,
        scene_title: String,
        scene_description: String,
    ) -> Result<String, ApiError> {
        let path = format!("/api/project/{project_id}/write_scene");
        let form = fields(&[
            ("scene_title", scene_title),
            ("scene_description", scene_description),
        ]);
        let payload = self.post_form(&path, &form).await?;
        string_field(&payload, "scene_draft")
    }

    async fn get_synopsis(&self, project_id: u64) -> Result<String, ApiError> {
        let payload = self
            .get_json(&format!("/project/{project_id}/synopsis"), &[])
            .await?;
        // A project without a synopsis answers with an empty or missing text.
        Ok(payload
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    async fn save_synopsis(&self, project_id: u64, text: String) -> Result<(), ApiError> {
        let path = format!("/project/{project_id}/synopsis");
        self.post_form(&path, &fields(&[("text", text)])).await?;
        Ok(())
    }

    async fn synopsis_history(&self, project_id: u64) -> Result<Vec<SynopsisVersion>, ApiError> {
        let path = format!("/api/project/{project_id}/synopsis_history");
        let payload = self.get_json(&path, &[]).await?;
        let history: SynopsisHistory = serde_json::from_value(payload)?;
        Ok(history.items)
    }

    async fn load_draft(&self, project_id: u64) -> Result<SynopsisDraft, ApiError> {
        let path = format!("/api/project/{project_id}/load_draft");
        let payload = self.get_json(&path, &[]).await?;
        Ok(serde_json::from_value(payload)?)
    }

    async fn save_draft(
        &self,
        project_id: u64,
        draft_text: String,
        discussion_thread: String,
    ) -> Result<(), ApiError> {
        let path = format!("/api/project/{project_id}/save_draft");
        let form = fields(&[
            ("draft_text", draft_text),
            ("discussion_thread", discussion_thread),
        ]);
        self.post_form(&path, &form).await?;
        Ok(())
    }
}
