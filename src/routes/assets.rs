use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};

use crate::{
    error::{AppError, AppResult},
    AppState,
};

/// Serves an object from the blob store. Keys that would escape the store
/// root are treated as missing.
pub async fn serve_asset(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let data = match state.blobs.get(&key).await {
        Ok(Some(data)) => data,
        Ok(None) => return Err(AppError::not_found("Asset", key)),
        Err(e) => {
            tracing::debug!("Asset {} not served: {}", key, e);
            return Err(AppError::not_found("Asset", key));
        }
    };
    let content_type = mime_guess::from_path(&key)
        .first_raw()
        .unwrap_or("application/octet-stream");
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=86400"),
        ],
        data,
    ))
}
