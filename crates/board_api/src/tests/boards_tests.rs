use super::*;
use shared::error::ErrorCode;
use storage::Storage;

use crate::UpdateBus;

async fn context() -> ApiContext {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    ApiContext::new(storage, UpdateBus::new())
}

#[tokio::test]
async fn created_boards_are_listed_until_deleted() {
    let ctx = context().await;
    let first = create_board(&ctx, "Sprint 1").await.expect("board");
    let second = create_board(&ctx, " Sprint 2 ").await.expect("board");
    assert_ne!(first, second);

    let boards = list_boards(&ctx).await.expect("list");
    assert_eq!(boards.len(), 2);
    assert!(boards.iter().any(|b| b.name == "Sprint 2"));

    delete_board(&ctx, &first).await.expect("delete");
    let boards = list_boards(&ctx).await.expect("list");
    assert_eq!(boards.len(), 1);
    assert_eq!(boards[0].external_id, second);
    assert!(!board_exists(&ctx, &first).await.expect("exists"));
    assert!(board_exists(&ctx, &second).await.expect("exists"));
}

#[tokio::test]
async fn blank_board_name_is_a_validation_error() {
    let ctx = context().await;
    let err = create_board(&ctx, "   ").await.expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
    assert_eq!(err.field.as_deref(), Some("name"));
    assert!(list_boards(&ctx).await.expect("list").is_empty());
}

#[tokio::test]
async fn deleting_twice_reports_not_found() {
    let ctx = context().await;
    let external_id = create_board(&ctx, "once").await.expect("board");
    delete_board(&ctx, &external_id).await.expect("delete");
    let err = delete_board(&ctx, &external_id)
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn rename_publishes_and_missing_board_is_not_found() {
    let ctx = context().await;
    let external_id = create_board(&ctx, "old").await.expect("board");
    let mut listener = ctx.bus.subscribe();

    rename_board(&ctx, &external_id, "new").await.expect("rename");
    assert!(listener.try_recv().is_some());
    assert_eq!(list_boards(&ctx).await.expect("list")[0].name, "new");

    let err = rename_board(&ctx, &ExternalId::from("nope"), "x")
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn delete_signals_open_viewers() {
    let ctx = context().await;
    let external_id = create_board(&ctx, "watched").await.expect("board");
    let mut viewer = ctx.bus.subscribe();

    delete_board(&ctx, &external_id).await.expect("delete");
    assert!(viewer.try_recv().is_some());
}
