use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;

use crate::{
    error::{AppError, AppResult},
    middleware::{
        auth::{clear_session_cookie, session_cookie, MaybeAdmin},
        rate_limit::{check_rate_limit, login_key},
    },
    models::{
        admin::AdminProfile,
        auth::{AdminSession, ClientAuthConfig, FederatedLoginRequest, LoginRequest, LoginResponse},
    },
    AppState,
};

/// Window of the per-email login rate limit.
const LOGIN_WINDOW_SECS: u64 = 15 * 60;

fn signed_in(response: LoginResponse, ttl_secs: u64) -> Response {
    (
        [(header::SET_COOKIE, session_cookie(&response.token, ttl_secs))],
        Json(response),
    )
        .into_response()
}

fn login_failed(e: AppError) -> AppError {
    match e {
        AppError::InvalidCredentials | AppError::Unauthorized(_) => {
            AppError::Unauthorized(format!("Login Failed: {e}"))
        }
        AppError::Validation(msg) => AppError::Validation(format!("Login Failed: {msg}")),
        other => other,
    }
}

pub async fn login(
    State(mut state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Response> {
    check_rate_limit(
        &mut state.redis,
        &login_key(&body.email),
        state.config.login_rate_limit,
        LOGIN_WINDOW_SECS,
    )
    .await?;

    let response = state
        .auth
        .login(&body.email, &body.password)
        .await
        .map_err(login_failed)?;
    Ok(signed_in(response, state.auth.token_ttl_seconds()))
}

pub async fn federated_login(
    State(state): State<AppState>,
    Json(body): Json<FederatedLoginRequest>,
) -> AppResult<Response> {
    let response = state.auth.federated_login(&body.id_token).await?;
    Ok(signed_in(response, state.auth.token_ttl_seconds()))
}

/// Always succeeds; there is no server-side session to revoke.
pub async fn logout(MaybeAdmin(admin): MaybeAdmin) -> impl IntoResponse {
    if let Some(admin) = admin {
        info!("Platform admin {} signed out", admin.email);
    }
    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(json!({ "success": true })),
    )
}

pub async fn me(admin: AdminSession) -> Json<AdminProfile> {
    Json(AdminProfile {
        email: admin.email,
        display_name: admin.display_name,
    })
}

/// Public; the login page reads it before any session exists.
pub async fn client_config(State(state): State<AppState>) -> Json<ClientAuthConfig> {
    Json(state.auth.client_config())
}
