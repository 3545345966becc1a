use anyhow::Result;
use board_api::{apply_action, create_board, delete_board, list_boards, ApiContext, UpdateBus};
use clap::{Parser, Subcommand};
use shared::{
    domain::{ColumnId, ExternalId},
    error::ApiException,
    protocol::BoardAction,
};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://retro.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateBoard { name: String },
    ListBoards,
    DeleteBoard { external_id: String },
    /// Re-rank a column by votes, most upvoted first.
    SortColumn { column_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;
    // Nothing listens on this bus; running servers pick changes up on their next refetch.
    let ctx = ApiContext::new(storage, UpdateBus::new());

    match cli.command {
        Command::CreateBoard { name } => {
            let external_id = create_board(&ctx, &name)
                .await
                .map_err(ApiException::from)?;
            println!("created board external_id={external_id}");
        }
        Command::ListBoards => {
            let boards = list_boards(&ctx).await.map_err(ApiException::from)?;
            for board in boards {
                println!(
                    "{}\t{}\t{}",
                    board.external_id,
                    board.name,
                    board.created_at.to_rfc3339()
                );
            }
        }
        Command::DeleteBoard { external_id } => {
            delete_board(&ctx, &ExternalId::from(external_id.clone()))
                .await
                .map_err(ApiException::from)?;
            println!("deleted board external_id={external_id}");
        }
        Command::SortColumn { column_id } => {
            let rows = apply_action(
                &ctx,
                BoardAction::SortColumn {
                    column_id: ColumnId(column_id),
                },
            )
            .await
            .map_err(ApiException::from)?;
            println!("re-ranked {rows} entries in column_id={column_id}");
        }
    }

    Ok(())
}
