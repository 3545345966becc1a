use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use board_api::{
    apply_action, board_exists, create_board, delete_board, get_board, list_boards,
    rename_board, ApiContext, UpdateBus,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use shared::{
    domain::ExternalId,
    error::{ApiError, ErrorCode},
    protocol::{BoardAction, BoardSnapshot, BoardSummary, BoardUpdate},
};
use storage::Storage;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, prepare_database_url};

const BOARD_UPDATE_EVENT: &str = "board-update";

#[derive(Clone)]
struct AppState {
    api: ApiContext,
    sse_keep_alive: Duration,
}

#[derive(Debug, Deserialize)]
struct CreateBoardRequest {
    name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CreateBoardResponse {
    external_id: ExternalId,
}

#[derive(Debug, Deserialize)]
struct RenameBoardRequest {
    name: String,
}

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = load_settings();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext::new(storage, UpdateBus::new()),
        sse_keep_alive: Duration::from_secs(settings.sse_keep_alive_seconds.max(1)),
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/boards", get(http_list_boards).post(http_create_board))
        .route(
            "/boards/:external_id",
            get(http_get_board)
                .patch(http_rename_board)
                .delete(http_delete_board),
        )
        .route("/boards/:external_id/subscribe", get(http_subscribe))
        .route("/actions", post(http_apply_action))
        .with_state(state)
}

fn error_response(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(message = %err.message, "request failed");
    }
    (status, Json(err))
}

/// Body-shape rejections become the same validation error as bad field values.
fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, HttpError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| error_response(ApiError::validation("body", rejection.body_text())))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|e| error_response(ApiError::internal(e.to_string())))?;
    Ok("ok")
}

async fn http_list_boards(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BoardSummary>>, HttpError> {
    let boards = list_boards(&state.api).await.map_err(error_response)?;
    Ok(Json(boards))
}

async fn http_create_board(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateBoardRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateBoardResponse>), HttpError> {
    let req = parse_body(payload)?;
    let external_id = create_board(&state.api, &req.name)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(CreateBoardResponse { external_id })))
}

async fn http_get_board(
    State(state): State<Arc<AppState>>,
    Path(external_id): Path<String>,
) -> Result<Json<BoardSnapshot>, HttpError> {
    let snapshot = get_board(&state.api, &ExternalId::from(external_id))
        .await
        .map_err(error_response)?;
    Ok(Json(snapshot))
}

async fn http_rename_board(
    State(state): State<Arc<AppState>>,
    Path(external_id): Path<String>,
    payload: Result<Json<RenameBoardRequest>, JsonRejection>,
) -> Result<StatusCode, HttpError> {
    let req = parse_body(payload)?;
    rename_board(&state.api, &ExternalId::from(external_id), &req.name)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_delete_board(
    State(state): State<Arc<AppState>>,
    Path(external_id): Path<String>,
) -> Result<StatusCode, HttpError> {
    delete_board(&state.api, &ExternalId::from(external_id))
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_apply_action(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BoardAction>, JsonRejection>,
) -> Result<StatusCode, HttpError> {
    let action = parse_body(payload)?;
    apply_action(&state.api, action)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Holds one bus subscription open for as long as the client stays
/// connected. Each event only carries a freshness token; clients refetch the
/// snapshot when they see one.
async fn http_subscribe(
    State(state): State<Arc<AppState>>,
    Path(external_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, HttpError> {
    let external_id = ExternalId::from(external_id);
    if !board_exists(&state.api, &external_id)
        .await
        .map_err(error_response)?
    {
        return Err(error_response(ApiError::not_found("board not found")));
    }

    let subscription = state.api.bus.subscribe();
    debug!(%external_id, subscription = subscription.id().0, "viewer subscribed");

    let events = subscription.map(|update| Ok(update_event(update)));
    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(state.sse_keep_alive)))
}

fn update_event(update: BoardUpdate) -> Event {
    Event::default()
        .event(BOARD_UPDATE_EVENT)
        .id(update.sequence.to_string())
        .data(update.published_at.to_rfc3339())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
