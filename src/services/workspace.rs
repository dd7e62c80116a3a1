use crate::models::{FormFields, ProjectKind};
use crate::services::discussion::{DiscussionController, DiscussionKind, FailedTurnPolicy};
use crate::utils::replace_first;

/// Per-project client state: identity plus the files attached to the next question.
#[derive(Debug, Clone)]
pub struct ProjectSession {
    project_id: u64,
    kind: ProjectKind,
    temp_file_ids: Vec<String>,
    library_file_ids: Vec<i64>,
}

impl ProjectSession {
    pub fn new(project_id: u64, kind: ProjectKind) -> Self {
        Self {
            project_id,
            kind,
            temp_file_ids: Vec::new(),
            library_file_ids: Vec::new(),
        }
    }

    pub fn project_id(&self) -> u64 {
        self.project_id
    }

    pub fn kind(&self) -> ProjectKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: ProjectKind) {
        self.kind = kind;
    }

    /// Returns `false` if the id was already attached.
    pub fn attach_temp(&mut self, file_id: impl Into<String>) -> bool {
        let file_id = file_id.into();
        if self.temp_file_ids.contains(&file_id) {
            return false;
        }
        self.temp_file_ids.push(file_id);
        true
    }

    /// Returns `false` if the id was already attached.
    pub fn attach_library(&mut self, file_id: i64) -> bool {
        if self.library_file_ids.contains(&file_id) {
            return false;
        }
        self.library_file_ids.push(file_id);
        true
    }

    pub fn temp_file_ids(&self) -> &[String] {
        &self.temp_file_ids
    }

    pub fn library_file_ids(&self) -> &[i64] {
        &self.library_file_ids
    }

    pub fn has_attachments(&self) -> bool {
        !self.temp_file_ids.is_empty() || !self.library_file_ids.is_empty()
    }

    pub fn clear_attachments(&mut self) {
        self.temp_file_ids.clear();
        self.library_file_ids.clear();
    }

    /// Removes the given files, keeping anything attached after they were read.
    pub fn detach(&mut self, temp: &[String], library: &[i64]) {
        self.temp_file_ids.retain(|id| !temp.contains(id));
        self.library_file_ids.retain(|id| !library.contains(id));
    }

    /// One form field per attached file, the way the `ask` endpoint reads lists.
    pub fn attachment_fields(&self) -> FormFields {
        let temp = self
            .temp_file_ids
            .iter()
            .map(|id| ("temp_file_ids".to_string(), id.clone()));
        let library = self
            .library_file_ids
            .iter()
            .map(|id| ("library_file_ids".to_string(), id.to_string()));
        temp.chain(library).collect()
    }
}

/// Where an accepted merge ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Synopsis,
    /// The chapter's original content no longer occurs in the synopsis.
    ChapterNotFound,
    Division,
    Draft,
}

/// Everything one open project page holds: the editable buffers and one
/// controller per discussion variant.
pub struct ProjectWorkspace {
    pub session: ProjectSession,
    pub synopsis_text: String,
    pub division_text: String,
    pub draft_text: String,
    chapter: DiscussionController,
    builder: DiscussionController,
    division: DiscussionController,
}

impl ProjectWorkspace {
    pub fn new(project_id: u64, kind: ProjectKind, failed_turn: FailedTurnPolicy) -> Self {
        let controller =
            |kind: DiscussionKind| DiscussionController::new(kind).with_failed_turn(failed_turn);
        Self {
            session: ProjectSession::new(project_id, kind),
            synopsis_text: String::new(),
            division_text: String::new(),
            draft_text: String::new(),
            chapter: controller(DiscussionKind::Chapter),
            builder: controller(DiscussionKind::SynopsisBuilder),
            division: controller(DiscussionKind::Division),
        }
    }

    pub fn controller(&self, kind: DiscussionKind) -> &DiscussionController {
        match kind {
            DiscussionKind::Chapter => &self.chapter,
            DiscussionKind::SynopsisBuilder => &self.builder,
            DiscussionKind::Division => &self.division,
        }
    }

    pub fn controller_mut(&mut self, kind: DiscussionKind) -> &mut DiscussionController {
        match kind {
            DiscussionKind::Chapter => &mut self.chapter,
            DiscussionKind::SynopsisBuilder => &mut self.builder,
            DiscussionKind::Division => &mut self.division,
        }
    }

    /// Writes merged discussion output into the document the discussion refines.
    pub fn apply_merged(&mut self, kind: DiscussionKind, merged: &str) -> Applied {
        match kind {
            DiscussionKind::Chapter => {
                let original = self
                    .chapter
                    .context()
                    .map(|context| context.original_text.as_str())
                    .unwrap_or_default();
                match replace_first(&self.synopsis_text, original, merged) {
                    Some(updated) => {
                        self.synopsis_text = updated;
                        Applied::Synopsis
                    }
                    None => {
                        tracing::warn!(
                            project_id = self.session.project_id(),
                            "Chapter content not found in synopsis; nothing replaced"
                        );
                        Applied::ChapterNotFound
                    }
                }
            }
            DiscussionKind::Division => {
                self.division_text = merged.to_string();
                Applied::Division
            }
            DiscussionKind::SynopsisBuilder => {
                self.set_draft_text(merged);
                Applied::Draft
            }
        }
    }

    /// Replaces the builder's draft; an open builder discussion continues from it.
    pub fn set_draft_text(&mut self, text: &str) {
        self.draft_text = text.to_string();
        // Not open is fine: the next open captures the draft anyway.
        let _ = self.builder.rebase(text);
    }

    pub fn transfer_draft(&mut self) {
        self.synopsis_text = self.draft_text.clone();
    }

    pub fn accept_division(&mut self) {
        self.synopsis_text = self.division_text.clone();
    }
}
