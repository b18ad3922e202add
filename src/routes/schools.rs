use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::{
    error::{AppError, AppResult},
    models::{
        auth::AdminSession,
        school::{
            DeleteConfirmation, RegisterSchoolInput, Registration, School, SchoolSnapshot,
            UpdateSchoolRequest,
        },
    },
    services::assets::AssetUpload,
    AppState,
};

fn bad_form(e: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("Invalid registration form: {e}"))
}

pub async fn list_schools(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> AppResult<Json<SchoolSnapshot>> {
    let schools = state.schools.list().await?;
    Ok(Json(SchoolSnapshot::new(schools)))
}

/// Multipart registration form. Text fields carry the school details, an
/// optional `logo` file field carries the logo.
pub async fn create_school(
    State(state): State<AppState>,
    admin: AdminSession,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<Registration>)> {
    let mut input = RegisterSchoolInput::default();
    let mut logo = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or("").to_string();
        if name == "logo" {
            let filename = field.file_name().unwrap_or("").to_string();
            let content_type = field.content_type().unwrap_or("").to_string();
            let bytes = field.bytes().await.map_err(bad_form)?;
            // An untouched file input still submits an empty part.
            if !(filename.is_empty() && bytes.is_empty()) {
                logo = Some(AssetUpload {
                    filename,
                    content_type,
                    bytes,
                });
            }
            continue;
        }

        let value = field.text().await.map_err(bad_form)?;
        match name.as_str() {
            "schoolName" => input.school_name = value,
            "city" => input.city = value,
            "adminName" => input.admin_name = value,
            "adminEmail" => input.admin_email = value,
            "planKey" | "planTier" => input.plan_key = value,
            "phoneNumber" => input.phone = Some(value),
            "schoolAddress" => input.address = Some(value),
            "schoolType" => input.school_type = Some(value),
            other => debug!("Ignoring unknown registration field {}", other),
        }
    }

    let registration = state.schools.create(input, logo).await?;
    tracing::info!(
        "School {} registered by {}",
        registration.school_id,
        admin.email
    );
    Ok((StatusCode::CREATED, Json(registration)))
}

pub async fn get_school(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
) -> AppResult<Json<School>> {
    Ok(Json(state.schools.get(&id).await?))
}

pub async fn update_school(
    State(state): State<AppState>,
    _admin: AdminSession,
    Path(id): Path<String>,
    Json(body): Json<UpdateSchoolRequest>,
) -> AppResult<Json<School>> {
    Ok(Json(state.schools.update(&id, body).await?))
}

/// `DELETE /api/schools/{id}?confirm={id}`
pub async fn delete_school(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(id): Path<String>,
    Query(params): Query<DeleteConfirmation>,
) -> AppResult<Json<Value>> {
    state.schools.delete(&id, params.confirm.as_deref()).await?;
    tracing::warn!("School {} permanently deleted by {}", id, admin.email);
    Ok(Json(json!({ "success": true })))
}
