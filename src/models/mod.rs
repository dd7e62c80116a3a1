use serde::{Deserialize, Serialize};

/// Form-encoded request body, in the order the backend expects.
pub type FormFields = Vec<(String, String)>;

/// Label the backend uses for prose projects.
pub const PROSE_LABEL: &str = "פרוזה";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRecord {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub title: String,
    pub content: String,
    /// Per-render handle of the card's content element. Not stable across renders.
    pub card_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionTurn {
    pub role: Role,
    pub content: String,
}

impl DiscussionTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Prose,
    Comic,
}

impl ProjectKind {
    /// Anything other than the prose label is treated as a comic project.
    pub fn from_label(label: &str) -> Self {
        if label.trim() == PROSE_LABEL {
            ProjectKind::Prose
        } else {
            ProjectKind::Comic
        }
    }
}

/// Sampling parameters forwarded with every discussion turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub persona: String,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            persona: "partner".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ParsedSynopsis {
    #[serde(default)]
    pub chapters: Vec<ChapterRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OutlineTitles {
    #[serde(default)]
    pub titles: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynopsisDraft {
    #[serde(default)]
    pub draft_text: String,
    #[serde(default)]
    pub discussion: Vec<DiscussionTurn>,
}

/// One saved version of the synopsis, newest first as the backend lists them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SynopsisVersion {
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SynopsisHistory {
    #[serde(default)]
    pub items: Vec<SynopsisVersion>,
}
