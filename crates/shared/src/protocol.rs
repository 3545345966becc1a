use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BoardId, ColumnId, CommentId, EntryId, ExternalId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSummary {
    pub board_id: BoardId,
    pub external_id: ExternalId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    pub board_id: BoardId,
    pub external_id: ExternalId,
    pub name: String,
    pub columns: Vec<ColumnSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub column_id: ColumnId,
    pub name: String,
    pub order: f64,
    pub entries: Vec<EntrySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub entry_id: EntryId,
    pub content: String,
    pub author_display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gif_url: Option<String>,
    pub upvotes: i64,
    pub order: f64,
    pub comments: Vec<CommentSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentSnapshot {
    pub comment_id: CommentId,
    pub content: String,
    pub author_display_name: String,
    pub upvotes: i64,
    pub order: f64,
}

/// Where a created or moved item lands among its siblings.
///
/// An explicit `order` wins. Otherwise the key is allocated from the
/// neighbour keys `after` (previous sibling) and `before` (next sibling);
/// with neither, the item is appended after the last sibling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Placement {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<f64>,
}

impl Placement {
    pub fn exact(order: f64) -> Self {
        Self {
            order: Some(order),
            ..Self::default()
        }
    }

    pub fn between(after: Option<f64>, before: Option<f64>) -> Self {
        Self {
            order: None,
            after,
            before,
        }
    }

    pub fn is_append(&self) -> bool {
        self.order.is_none() && self.after.is_none() && self.before.is_none()
    }
}

/// Every mutation a board viewer can submit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoardAction {
    Upvote {
        entry_id: EntryId,
    },
    Downvote {
        entry_id: EntryId,
    },
    SortColumn {
        column_id: ColumnId,
    },
    CreateColumn {
        board_id: BoardId,
        name: String,
        #[serde(flatten)]
        placement: Placement,
    },
    UpdateColumn {
        column_id: ColumnId,
        name: String,
    },
    MoveColumn {
        column_id: ColumnId,
        #[serde(flatten)]
        placement: Placement,
    },
    CreateEntry {
        board_id: BoardId,
        column_id: ColumnId,
        content: String,
        #[serde(default)]
        author_display_name: Option<String>,
        #[serde(default)]
        gif_url: Option<String>,
        #[serde(flatten)]
        placement: Placement,
    },
    UpdateEntry {
        entry_id: EntryId,
        content: String,
        #[serde(default)]
        gif_url: Option<String>,
    },
    MoveEntry {
        entry_id: EntryId,
        column_id: ColumnId,
        #[serde(flatten)]
        placement: Placement,
    },
    CreateComment {
        entry_id: EntryId,
        content: String,
        #[serde(default)]
        author_display_name: Option<String>,
        #[serde(flatten)]
        placement: Placement,
    },
    UpdateComment {
        comment_id: CommentId,
        content: String,
    },
    UpvoteComment {
        comment_id: CommentId,
    },
    DownvoteComment {
        comment_id: CommentId,
    },
}

impl BoardAction {
    pub fn kind(&self) -> &'static str {
        match self {
            BoardAction::Upvote { .. } => "upvote",
            BoardAction::Downvote { .. } => "downvote",
            BoardAction::SortColumn { .. } => "sort_column",
            BoardAction::CreateColumn { .. } => "create_column",
            BoardAction::UpdateColumn { .. } => "update_column",
            BoardAction::MoveColumn { .. } => "move_column",
            BoardAction::CreateEntry { .. } => "create_entry",
            BoardAction::UpdateEntry { .. } => "update_entry",
            BoardAction::MoveEntry { .. } => "move_entry",
            BoardAction::CreateComment { .. } => "create_comment",
            BoardAction::UpdateComment { .. } => "update_comment",
            BoardAction::UpvoteComment { .. } => "upvote_comment",
            BoardAction::DownvoteComment { .. } => "downvote_comment",
        }
    }
}

/// "Something changed, refetch now." Carries no board state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardUpdate {
    /// Freshness token; strictly increasing within one process.
    pub sequence: u64,
    pub published_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
