use std::collections::HashMap;

use shared::{
    domain::{ColumnId, EntryId, ExternalId},
    error::ApiError,
    ordering::cmp_siblings,
    protocol::{BoardSnapshot, ColumnSnapshot, CommentSnapshot, EntrySnapshot},
};
use storage::BoardRows;

use crate::{internal, ApiContext};

/// Nested snapshot of a live board. Unknown and soft-deleted boards are
/// both reported as not found.
pub async fn get_board(
    ctx: &ApiContext,
    external_id: &ExternalId,
) -> Result<BoardSnapshot, ApiError> {
    let rows = ctx
        .storage
        .board_rows(external_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::not_found("board not found"))?;
    Ok(assemble_snapshot(rows))
}

/// Groups flat per-level rows into the board tree. Every level is sorted by
/// order key with ties broken by id; rows whose parent is not part of the
/// board are dropped.
pub fn assemble_snapshot(rows: BoardRows) -> BoardSnapshot {
    let BoardRows {
        board,
        mut columns,
        mut entries,
        mut comments,
    } = rows;

    columns.sort_by(|a, b| cmp_siblings(a.order, a.column_id.0, b.order, b.column_id.0));
    entries.sort_by(|a, b| cmp_siblings(a.order, a.entry_id.0, b.order, b.entry_id.0));
    comments.sort_by(|a, b| cmp_siblings(a.order, a.comment_id.0, b.order, b.comment_id.0));

    let mut comments_by_entry: HashMap<EntryId, Vec<CommentSnapshot>> = HashMap::new();
    for comment in comments {
        comments_by_entry
            .entry(comment.entry_id)
            .or_default()
            .push(CommentSnapshot {
                comment_id: comment.comment_id,
                content: comment.content,
                author_display_name: comment.author_display_name,
                upvotes: comment.upvotes,
                order: comment.order,
            });
    }

    let mut entries_by_column: HashMap<ColumnId, Vec<EntrySnapshot>> = HashMap::new();
    for entry in entries {
        let comments = comments_by_entry
            .remove(&entry.entry_id)
            .unwrap_or_default();
        entries_by_column
            .entry(entry.column_id)
            .or_default()
            .push(EntrySnapshot {
                entry_id: entry.entry_id,
                content: entry.content,
                author_display_name: entry.author_display_name,
                gif_url: entry.gif_url,
                upvotes: entry.upvotes,
                order: entry.order,
                comments,
            });
    }

    let columns = columns
        .into_iter()
        .map(|column| ColumnSnapshot {
            entries: entries_by_column
                .remove(&column.column_id)
                .unwrap_or_default(),
            column_id: column.column_id,
            name: column.name,
            order: column.order,
        })
        .collect();

    BoardSnapshot {
        board_id: board.board_id,
        external_id: board.external_id,
        name: board.name,
        columns,
    }
}

#[cfg(test)]
#[path = "tests/aggregate_tests.rs"]
mod tests;
