use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    error::AppResult,
    models::{
        auth::AdminSession,
        plan::{PlanCatalogMap, PlanUpdateOutcome, UpdatePlanRequest},
    },
    AppState,
};

pub async fn list_plans(
    State(state): State<AppState>,
    _admin: AdminSession,
) -> AppResult<Json<PlanCatalogMap>> {
    Ok(Json(state.plans.fetch_plans().await?))
}

pub async fn update_plan(
    State(state): State<AppState>,
    admin: AdminSession,
    Path(key): Path<String>,
    Json(body): Json<UpdatePlanRequest>,
) -> AppResult<Json<PlanUpdateOutcome>> {
    tracing::info!("Plan {} edited by {}", key, admin.email);
    let outcome = state
        .plans
        .update_plan(&key, body.limits, body.features.into(), body.propagate_to_schools)
        .await?;
    Ok(Json(outcome))
}
