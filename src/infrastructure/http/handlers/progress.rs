//! Progress Handler - 轮询任务快照

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};

use crate::application::{GetProgressQuery, TaskSnapshot};
use crate::infrastructure::http::dto::ApiResponse;
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<TaskSnapshot>>, ApiError> {
    let snapshot = state
        .dispatcher
        .services()
        .get_progress_handler
        .handle(GetProgressQuery { task_id })
        .await?;

    Ok(Json(ApiResponse::success(snapshot)))
}
