use shared::{
    domain::{Vote, ANONYMOUS_AUTHOR_DISPLAY_NAME},
    error::ApiError,
    ordering::allocate,
    protocol::{BoardAction, Placement},
};
use storage::{NewComment, NewEntry};
use tracing::debug;

use crate::{internal, ApiContext};

/// Validates and applies one board mutation, then signals every live
/// viewer. Returns the number of rows the mutation touched.
///
/// Actions that name a missing row touch nothing and still succeed. Only
/// creations report a missing parent, since nothing could be inserted.
/// The publish happens strictly after the write has committed.
pub async fn apply_action(ctx: &ApiContext, action: BoardAction) -> Result<u64, ApiError> {
    let kind = action.kind();
    let rows = match action {
        BoardAction::Upvote { entry_id } => ctx
            .storage
            .adjust_entry_votes(entry_id, Vote::Up.delta())
            .await
            .map_err(internal)?,
        BoardAction::Downvote { entry_id } => ctx
            .storage
            .adjust_entry_votes(entry_id, Vote::Down.delta())
            .await
            .map_err(internal)?,
        BoardAction::SortColumn { column_id } => ctx
            .storage
            .sort_column_by_votes(column_id)
            .await
            .map_err(internal)?,
        BoardAction::CreateColumn {
            board_id,
            name,
            placement,
        } => {
            let name = required_text("name", &name)?;
            check_placement(&placement)?;
            let last = if placement.is_append() {
                ctx.storage
                    .last_column_order(board_id)
                    .await
                    .map_err(internal)?
            } else {
                None
            };
            ctx.storage
                .create_column(board_id, &name, resolve_order(placement, last)?)
                .await
                .map_err(internal)?
                .ok_or_else(|| ApiError::not_found("board not found"))?;
            1
        }
        BoardAction::UpdateColumn { column_id, name } => {
            let name = required_text("name", &name)?;
            ctx.storage
                .rename_column(column_id, &name)
                .await
                .map_err(internal)?
        }
        BoardAction::MoveColumn {
            column_id,
            placement,
        } => {
            check_placement(&placement)?;
            let last = if placement.is_append() {
                ctx.storage
                    .last_sibling_column_order(column_id)
                    .await
                    .map_err(internal)?
            } else {
                None
            };
            ctx.storage
                .set_column_order(column_id, resolve_order(placement, last)?)
                .await
                .map_err(internal)?
        }
        BoardAction::CreateEntry {
            board_id,
            column_id,
            content,
            author_display_name,
            gif_url,
            placement,
        } => {
            let content = required_text("content", &content)?;
            check_placement(&placement)?;
            let author_display_name = display_name(author_display_name);
            let gif_url = optional_text(gif_url);
            let last = if placement.is_append() {
                ctx.storage
                    .last_entry_order(column_id)
                    .await
                    .map_err(internal)?
            } else {
                None
            };
            ctx.storage
                .create_entry(NewEntry {
                    board_id,
                    column_id,
                    content: &content,
                    author_display_name: &author_display_name,
                    gif_url: gif_url.as_deref(),
                    order: resolve_order(placement, last)?,
                })
                .await
                .map_err(internal)?
                .ok_or_else(|| ApiError::not_found("column not found on board"))?;
            1
        }
        BoardAction::UpdateEntry {
            entry_id,
            content,
            gif_url,
        } => {
            let content = required_text("content", &content)?;
            let gif_url = optional_text(gif_url);
            ctx.storage
                .update_entry(entry_id, &content, gif_url.as_deref())
                .await
                .map_err(internal)?
        }
        BoardAction::MoveEntry {
            entry_id,
            column_id,
            placement,
        } => {
            check_placement(&placement)?;
            let last = if placement.is_append() {
                ctx.storage
                    .last_entry_order(column_id)
                    .await
                    .map_err(internal)?
            } else {
                None
            };
            ctx.storage
                .move_entry(entry_id, column_id, resolve_order(placement, last)?)
                .await
                .map_err(internal)?
        }
        BoardAction::CreateComment {
            entry_id,
            content,
            author_display_name,
            placement,
        } => {
            let content = required_text("content", &content)?;
            check_placement(&placement)?;
            let author_display_name = display_name(author_display_name);
            let last = if placement.is_append() {
                ctx.storage
                    .last_comment_order(entry_id)
                    .await
                    .map_err(internal)?
            } else {
                None
            };
            ctx.storage
                .create_comment(NewComment {
                    entry_id,
                    content: &content,
                    author_display_name: &author_display_name,
                    order: resolve_order(placement, last)?,
                })
                .await
                .map_err(internal)?
                .ok_or_else(|| ApiError::not_found("entry not found"))?;
            1
        }
        BoardAction::UpdateComment {
            comment_id,
            content,
        } => {
            let content = required_text("content", &content)?;
            ctx.storage
                .update_comment(comment_id, &content)
                .await
                .map_err(internal)?
        }
        BoardAction::UpvoteComment { comment_id } => ctx
            .storage
            .adjust_comment_votes(comment_id, Vote::Up.delta())
            .await
            .map_err(internal)?,
        BoardAction::DownvoteComment { comment_id } => ctx
            .storage
            .adjust_comment_votes(comment_id, Vote::Down.delta())
            .await
            .map_err(internal)?,
    };

    let subscribers = ctx.bus.publish();
    debug!(action = kind, rows, subscribers, "applied board action");
    Ok(rows)
}

/// Explicit order wins, then neighbour midpoint/edge, then append after
/// the current last sibling (`last`), which is `0` for an empty list.
/// A key that is not finite is never stored.
fn resolve_order(placement: Placement, last: Option<f64>) -> Result<f64, ApiError> {
    let order = if let Some(order) = placement.order {
        order
    } else if placement.is_append() {
        allocate(last, None)
    } else {
        allocate(placement.after, placement.before)
    };
    if !order.is_finite() {
        return Err(ApiError::validation("order", "resolved position is out of range"));
    }
    Ok(order)
}

fn check_placement(placement: &Placement) -> Result<(), ApiError> {
    for (field, value) in [
        ("order", placement.order),
        ("after", placement.after),
        ("before", placement.before),
    ] {
        if value.is_some_and(|v| !v.is_finite()) {
            return Err(ApiError::validation(field, format!("{field} must be a finite number")));
        }
    }
    Ok(())
}

pub(crate) fn required_text(field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(field, format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn display_name(value: Option<String>) -> String {
    optional_text(value).unwrap_or_else(|| ANONYMOUS_AUTHOR_DISPLAY_NAME.to_string())
}

#[cfg(test)]
#[path = "tests/actions_tests.rs"]
mod tests;
