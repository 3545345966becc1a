use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

use shared::domain::{BoardId, ColumnId, CommentId, EntryId, ExternalId};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredBoard {
    pub board_id: BoardId,
    pub external_id: ExternalId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredColumn {
    pub column_id: ColumnId,
    pub board_id: BoardId,
    pub name: String,
    pub order: f64,
}

#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub entry_id: EntryId,
    pub board_id: BoardId,
    pub column_id: ColumnId,
    pub content: String,
    pub author_display_name: String,
    pub gif_url: Option<String>,
    pub upvotes: i64,
    pub order: f64,
}

#[derive(Debug, Clone)]
pub struct StoredComment {
    pub comment_id: CommentId,
    pub board_id: BoardId,
    pub entry_id: EntryId,
    pub content: String,
    pub author_display_name: String,
    pub upvotes: i64,
    pub order: f64,
}

/// Every row of one live board, read inside a single transaction.
#[derive(Debug, Clone)]
pub struct BoardRows {
    pub board: StoredBoard,
    pub columns: Vec<StoredColumn>,
    pub entries: Vec<StoredEntry>,
    pub comments: Vec<StoredComment>,
}

#[derive(Debug, Clone)]
pub struct NewEntry<'a> {
    pub board_id: BoardId,
    pub column_id: ColumnId,
    pub content: &'a str,
    pub author_display_name: &'a str,
    pub gif_url: Option<&'a str>,
    pub order: f64,
}

#[derive(Debug, Clone)]
pub struct NewComment<'a> {
    pub entry_id: EntryId,
    pub content: &'a str,
    pub author_display_name: &'a str,
    pub order: f64,
}

const BOARD_COLUMNS: &str = "id, external_id, name, created_at, updated_at";
const ENTRY_COLUMNS: &str =
    "id, board_id, column_id, content, author_display_name, gif_url, upvotes, sort_order";
const COMMENT_COLUMNS: &str =
    "id, board_id, entry_id, content, author_display_name, upvotes, sort_order";

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    // --- Boards ---

    pub async fn create_board(&self, external_id: &ExternalId, name: &str) -> Result<BoardId> {
        let rec = sqlx::query("INSERT INTO boards (external_id, name) VALUES (?, ?) RETURNING id")
            .bind(external_id.as_str())
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(BoardId(rec.get::<i64, _>(0)))
    }

    /// Boards that have not been soft-deleted, in storage scan order.
    pub async fn list_boards(&self) -> Result<Vec<StoredBoard>> {
        let rows = sqlx::query(&format!(
            "SELECT {BOARD_COLUMNS} FROM boards WHERE deleted_at IS NULL"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(board_from_row).collect())
    }

    pub async fn find_board(&self, external_id: &ExternalId) -> Result<Option<StoredBoard>> {
        let row = sqlx::query(&format!(
            "SELECT {BOARD_COLUMNS} FROM boards WHERE external_id = ? AND deleted_at IS NULL"
        ))
        .bind(external_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(board_from_row))
    }

    pub async fn rename_board(&self, external_id: &ExternalId, name: &str) -> Result<u64> {
        let updated = sqlx::query(
            "UPDATE boards SET name = ?, updated_at = CURRENT_TIMESTAMP
             WHERE external_id = ? AND deleted_at IS NULL",
        )
        .bind(name)
        .bind(external_id.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }

    /// Flags the board as deleted. Its rows stay in place but are no longer
    /// reachable through listings or snapshots.
    pub async fn soft_delete_board(&self, external_id: &ExternalId) -> Result<u64> {
        let updated = sqlx::query(
            "UPDATE boards SET deleted_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP
             WHERE external_id = ? AND deleted_at IS NULL",
        )
        .bind(external_id.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }

    /// Reads the board and all of its columns, entries and comments: one
    /// query per level, all inside one transaction so the levels agree.
    pub async fn board_rows(&self, external_id: &ExternalId) -> Result<Option<BoardRows>> {
        let mut tx = self.pool.begin().await?;

        let Some(board_row) = sqlx::query(&format!(
            "SELECT {BOARD_COLUMNS} FROM boards WHERE external_id = ? AND deleted_at IS NULL"
        ))
        .bind(external_id.as_str())
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };
        let board = board_from_row(&board_row);

        let columns = sqlx::query(
            "SELECT id, board_id, name, sort_order FROM columns WHERE board_id = ?",
        )
        .bind(board.board_id.0)
        .fetch_all(&mut *tx)
        .await
        .context("failed to load board columns")?;

        let entries = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE board_id = ?"
        ))
        .bind(board.board_id.0)
        .fetch_all(&mut *tx)
        .await
        .context("failed to load board entries")?;

        let comments = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE board_id = ?"
        ))
        .bind(board.board_id.0)
        .fetch_all(&mut *tx)
        .await
        .context("failed to load board comments")?;

        tx.commit().await?;

        Ok(Some(BoardRows {
            board,
            columns: columns.iter().map(column_from_row).collect(),
            entries: entries.iter().map(entry_from_row).collect(),
            comments: comments.iter().map(comment_from_row).collect(),
        }))
    }

    // --- Columns ---

    /// Returns `None` when the board is missing or soft-deleted.
    pub async fn create_column(
        &self,
        board_id: BoardId,
        name: &str,
        order: f64,
    ) -> Result<Option<ColumnId>> {
        let rec = sqlx::query(
            "INSERT INTO columns (board_id, name, sort_order)
             SELECT id, ?, ? FROM boards WHERE id = ? AND deleted_at IS NULL
             RETURNING id",
        )
        .bind(name)
        .bind(order)
        .bind(board_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec.map(|r| ColumnId(r.get::<i64, _>(0))))
    }

    pub async fn rename_column(&self, column_id: ColumnId, name: &str) -> Result<u64> {
        let updated = sqlx::query("UPDATE columns SET name = ? WHERE id = ?")
            .bind(name)
            .bind(column_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated)
    }

    pub async fn set_column_order(&self, column_id: ColumnId, order: f64) -> Result<u64> {
        let updated = sqlx::query("UPDATE columns SET sort_order = ? WHERE id = ?")
            .bind(order)
            .bind(column_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated)
    }

    pub async fn last_column_order(&self, board_id: BoardId) -> Result<Option<f64>> {
        let order: Option<f64> =
            sqlx::query_scalar("SELECT MAX(sort_order) FROM columns WHERE board_id = ?")
                .bind(board_id.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(order)
    }

    /// Largest order key among the columns sharing `column_id`'s board.
    pub async fn last_sibling_column_order(&self, column_id: ColumnId) -> Result<Option<f64>> {
        let order: Option<f64> = sqlx::query_scalar(
            "SELECT MAX(sort_order) FROM columns
             WHERE board_id = (SELECT board_id FROM columns WHERE id = ?)",
        )
        .bind(column_id.0)
        .fetch_one(&self.pool)
        .await?;
        Ok(order)
    }

    // --- Entries ---

    /// Returns `None` unless the column exists, belongs to `board_id`, and
    /// that board is live.
    pub async fn create_entry(&self, entry: NewEntry<'_>) -> Result<Option<EntryId>> {
        let rec = sqlx::query(
            "INSERT INTO entries (board_id, column_id, content, author_display_name, gif_url, sort_order)
             SELECT c.board_id, c.id, ?, ?, ?, ?
             FROM columns c
             INNER JOIN boards b ON b.id = c.board_id
             WHERE c.id = ? AND c.board_id = ? AND b.deleted_at IS NULL
             RETURNING id",
        )
        .bind(entry.content)
        .bind(entry.author_display_name)
        .bind(entry.gif_url)
        .bind(entry.order)
        .bind(entry.column_id.0)
        .bind(entry.board_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec.map(|r| EntryId(r.get::<i64, _>(0))))
    }

    pub async fn update_entry(
        &self,
        entry_id: EntryId,
        content: &str,
        gif_url: Option<&str>,
    ) -> Result<u64> {
        let updated = sqlx::query("UPDATE entries SET content = ?, gif_url = ? WHERE id = ?")
            .bind(content)
            .bind(gif_url)
            .bind(entry_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated)
    }

    /// Moves an entry to `column_id` at `order`. Columns of another board
    /// are not valid targets; such a move affects zero rows.
    pub async fn move_entry(
        &self,
        entry_id: EntryId,
        column_id: ColumnId,
        order: f64,
    ) -> Result<u64> {
        let updated = sqlx::query(
            "UPDATE entries SET column_id = ?1, sort_order = ?2
             WHERE id = ?3 AND board_id = (SELECT board_id FROM columns WHERE id = ?1)",
        )
        .bind(column_id.0)
        .bind(order)
        .bind(entry_id.0)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(updated)
    }

    pub async fn last_entry_order(&self, column_id: ColumnId) -> Result<Option<f64>> {
        let order: Option<f64> =
            sqlx::query_scalar("SELECT MAX(sort_order) FROM entries WHERE column_id = ?")
                .bind(column_id.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(order)
    }

    pub async fn column_entries(&self, column_id: ColumnId) -> Result<Vec<StoredEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE column_id = ? ORDER BY sort_order ASC, id ASC"
        ))
        .bind(column_id.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(entry_from_row).collect())
    }

    /// Applies `delta` to the vote counter in a single statement. A missing
    /// entry affects zero rows.
    pub async fn adjust_entry_votes(&self, entry_id: EntryId, delta: i64) -> Result<u64> {
        let updated = sqlx::query("UPDATE entries SET upvotes = upvotes + ? WHERE id = ?")
            .bind(delta)
            .bind(entry_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated)
    }

    /// Replaces the order keys of every entry in the column with its rank
    /// by votes (1 = most votes). Equal vote counts keep their previous
    /// relative order, then fall back to id. The whole column is rewritten
    /// by one statement, so readers see either the old or the new ranking.
    pub async fn sort_column_by_votes(&self, column_id: ColumnId) -> Result<u64> {
        let updated = sqlx::query(
            "UPDATE entries
             SET sort_order = ranked.new_order
             FROM (
                SELECT id,
                       ROW_NUMBER() OVER (ORDER BY upvotes DESC, sort_order ASC, id ASC) AS new_order
                FROM entries
                WHERE column_id = ?1
             ) AS ranked
             WHERE entries.id = ranked.id",
        )
        .bind(column_id.0)
        .execute(&self.pool)
        .await
        .context("failed to re-rank column entries")?
        .rows_affected();
        debug!(column_id = column_id.0, entries = updated, "re-ranked column by votes");
        Ok(updated)
    }

    // --- Comments ---

    /// Returns `None` when the parent entry is missing or its board is
    /// soft-deleted.
    pub async fn create_comment(&self, comment: NewComment<'_>) -> Result<Option<CommentId>> {
        let rec = sqlx::query(
            "INSERT INTO comments (board_id, entry_id, content, author_display_name, sort_order)
             SELECT e.board_id, e.id, ?, ?, ?
             FROM entries e
             INNER JOIN boards b ON b.id = e.board_id
             WHERE e.id = ? AND b.deleted_at IS NULL
             RETURNING id",
        )
        .bind(comment.content)
        .bind(comment.author_display_name)
        .bind(comment.order)
        .bind(comment.entry_id.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec.map(|r| CommentId(r.get::<i64, _>(0))))
    }

    pub async fn update_comment(&self, comment_id: CommentId, content: &str) -> Result<u64> {
        let updated = sqlx::query("UPDATE comments SET content = ? WHERE id = ?")
            .bind(content)
            .bind(comment_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated)
    }

    pub async fn adjust_comment_votes(&self, comment_id: CommentId, delta: i64) -> Result<u64> {
        let updated = sqlx::query("UPDATE comments SET upvotes = upvotes + ? WHERE id = ?")
            .bind(delta)
            .bind(comment_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(updated)
    }

    pub async fn last_comment_order(&self, entry_id: EntryId) -> Result<Option<f64>> {
        let order: Option<f64> =
            sqlx::query_scalar("SELECT MAX(sort_order) FROM comments WHERE entry_id = ?")
                .bind(entry_id.0)
                .fetch_one(&self.pool)
                .await?;
        Ok(order)
    }
}

fn board_from_row(r: &SqliteRow) -> StoredBoard {
    StoredBoard {
        board_id: BoardId(r.get::<i64, _>(0)),
        external_id: ExternalId::from(r.get::<String, _>(1)),
        name: r.get::<String, _>(2),
        created_at: r.get::<DateTime<Utc>, _>(3),
        updated_at: r.get::<DateTime<Utc>, _>(4),
    }
}

fn column_from_row(r: &SqliteRow) -> StoredColumn {
    StoredColumn {
        column_id: ColumnId(r.get::<i64, _>(0)),
        board_id: BoardId(r.get::<i64, _>(1)),
        name: r.get::<String, _>(2),
        order: r.get::<f64, _>(3),
    }
}

fn entry_from_row(r: &SqliteRow) -> StoredEntry {
    StoredEntry {
        entry_id: EntryId(r.get::<i64, _>(0)),
        board_id: BoardId(r.get::<i64, _>(1)),
        column_id: ColumnId(r.get::<i64, _>(2)),
        content: r.get::<String, _>(3),
        author_display_name: r.get::<String, _>(4),
        gif_url: r.get::<Option<String>, _>(5),
        upvotes: r.get::<i64, _>(6),
        order: r.get::<f64, _>(7),
    }
}

fn comment_from_row(r: &SqliteRow) -> StoredComment {
    StoredComment {
        comment_id: CommentId(r.get::<i64, _>(0)),
        board_id: BoardId(r.get::<i64, _>(1)),
        entry_id: EntryId(r.get::<i64, _>(2)),
        content: r.get::<String, _>(3),
        author_display_name: r.get::<String, _>(4),
        upvotes: r.get::<i64, _>(5),
        order: r.get::<f64, _>(6),
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
