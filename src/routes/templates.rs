use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::contracts::templates::{self, TemplateInput, TemplatePatch};
use crate::error::{AppError, AppResult};
use crate::models::ContractTemplate;
use crate::state::AppState;

pub async fn list_templates(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ContractTemplate>>> {
    let mut conn = state.db()?;
    Ok(Json(templates::list_templates(&mut *conn, user.company_id)?))
}

pub async fn create_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<TemplateInput>,
) -> AppResult<(StatusCode, Json<ContractTemplate>)> {
    let mut conn = state.db()?;
    let template = templates::create_template(&mut *conn, user.company_id, payload)?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn get_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(template_id): Path<Uuid>,
) -> AppResult<Json<ContractTemplate>> {
    let mut conn = state.db()?;
    templates::get_template(&mut *conn, user.company_id, template_id)?
        .map(Json)
        .ok_or_else(AppError::not_found)
}

pub async fn update_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(template_id): Path<Uuid>,
    Json(patch): Json<TemplatePatch>,
) -> AppResult<Json<ContractTemplate>> {
    let mut conn = state.db()?;
    let template = templates::update_template(&mut *conn, user.company_id, template_id, patch)?;
    Ok(Json(template))
}

pub async fn delete_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(template_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let mut conn = state.db()?;
    templates::delete_template(&mut *conn, user.company_id, template_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn seed_templates(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Value>> {
    let mut conn = state.db()?;
    let inserted = templates::seed_default_templates(&mut *conn, user.company_id)?;
    Ok(Json(json!({ "inserted": inserted })))
}
