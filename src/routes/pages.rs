use std::path::PathBuf;

use axum::{
    extract::State,
    http::Uri,
    response::{Html, IntoResponse, Redirect, Response},
};

use crate::{
    error::AppError,
    middleware::auth::MaybeAdmin,
    services::gate::{decide, GateDecision, Page},
    AppState,
};

/// Page entry points. Each load is checked against the session before any
/// content is sent, so protected pages never flash for signed-out visitors.
pub async fn serve_page(
    State(state): State<AppState>,
    MaybeAdmin(session): MaybeAdmin,
    uri: Uri,
) -> Response {
    let Some(page) = Page::from_path(uri.path()) else {
        return AppError::not_found("Page", uri.path()).into_response();
    };

    match decide(session.is_some(), page) {
        GateDecision::Redirect(target) => Redirect::to(target.path()).into_response(),
        GateDecision::Reveal => {
            let file = PathBuf::from(&state.config.static_dir).join(page.file_name());
            match tokio::fs::read_to_string(&file).await {
                Ok(html) => Html(html).into_response(),
                Err(e) => {
                    tracing::error!("Cannot read page {}: {}", file.display(), e);
                    AppError::not_found("Page", page.path()).into_response()
                }
            }
        }
    }
}
