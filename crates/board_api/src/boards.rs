use shared::{domain::ExternalId, error::ApiError, protocol::BoardSummary};
use tracing::info;

use crate::{actions::required_text, internal, ApiContext};

/// Persists a new empty board under a freshly generated external id.
pub async fn create_board(ctx: &ApiContext, name: &str) -> Result<ExternalId, ApiError> {
    let name = required_text("name", name)?;
    let external_id = ExternalId::generate();
    let board_id = ctx
        .storage
        .create_board(&external_id, &name)
        .await
        .map_err(internal)?;
    info!(board_id = board_id.0, %external_id, "created board");
    Ok(external_id)
}

pub async fn list_boards(ctx: &ApiContext) -> Result<Vec<BoardSummary>, ApiError> {
    let boards = ctx.storage.list_boards().await.map_err(internal)?;
    Ok(boards
        .into_iter()
        .map(|board| BoardSummary {
            board_id: board.board_id,
            external_id: board.external_id,
            name: board.name,
            created_at: board.created_at,
            updated_at: board.updated_at,
        })
        .collect())
}

pub async fn rename_board(
    ctx: &ApiContext,
    external_id: &ExternalId,
    name: &str,
) -> Result<(), ApiError> {
    let name = required_text("name", name)?;
    let updated = ctx
        .storage
        .rename_board(external_id, &name)
        .await
        .map_err(internal)?;
    if updated == 0 {
        return Err(ApiError::not_found("board not found"));
    }
    ctx.bus.publish();
    Ok(())
}

/// Soft delete. Viewers still holding the board open are signalled so their
/// refetch observes that it is gone.
pub async fn delete_board(ctx: &ApiContext, external_id: &ExternalId) -> Result<(), ApiError> {
    let updated = ctx
        .storage
        .soft_delete_board(external_id)
        .await
        .map_err(internal)?;
    if updated == 0 {
        return Err(ApiError::not_found("board not found"));
    }
    info!(%external_id, "soft-deleted board");
    ctx.bus.publish();
    Ok(())
}

pub async fn board_exists(ctx: &ApiContext, external_id: &ExternalId) -> Result<bool, ApiError> {
    let board = ctx
        .storage
        .find_board(external_id)
        .await
        .map_err(internal)?;
    Ok(board.is_some())
}

#[cfg(test)]
#[path = "tests/boards_tests.rs"]
mod tests;
