use crate::models::{DiscussionTurn, Role};

/// Append-only transcript of one discussion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscussionThread {
    turns: Vec<DiscussionTurn>,
}

impl DiscussionThread {
    pub fn append(&mut self, turn: DiscussionTurn) {
        self.turns.push(turn);
    }

    /// JSON array of `{role, content}` objects, the form the backend's
    /// discussion-aware endpoints parse.
    pub fn to_transport_form(&self) -> String {
        // Serializing plain strings and unit variants cannot fail.
        serde_json::to_string(&self.turns).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn turns(&self) -> &[DiscussionTurn] {
        &self.turns
    }

    pub(crate) fn pop_last_user(&mut self) -> Option<DiscussionTurn> {
        match self.turns.last() {
            Some(turn) if turn.role == Role::User => self.turns.pop(),
            _ => None,
        }
    }
}
