use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::contracts::{self, ContractError, ContractInput, ContractStatus, MergeData, SignerInput};
use crate::error::{AppError, AppResult};
use crate::models::{Contract, ContractEvent, ContractSigner, ContractVersion};
use crate::routes::retry_on_conflict;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct InsertTemplateRequest {
    pub template_id: Uuid,
}

#[derive(Deserialize)]
pub struct VersionRequest {
    pub body: String,
    #[serde(default)]
    pub merge_data: MergeData,
}

#[derive(Deserialize, Default)]
pub struct RenderRequest {
    #[serde(default)]
    pub merge_data: MergeData,
}

#[derive(Serialize)]
pub struct RenderResponse {
    pub body: String,
}

#[derive(Serialize)]
pub struct SendResponse {
    pub notified: Vec<Uuid>,
}

pub async fn list_contracts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<Contract>>> {
    let mut conn = state.db()?;
    Ok(Json(contracts::list_contracts(&mut *conn, user.company_id)?))
}

pub async fn create_contract(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ContractInput>,
) -> AppResult<(StatusCode, Json<Contract>)> {
    let mut conn = state.db()?;
    let contract = contracts::create_contract(&mut *conn, user.company_id, payload, user.user_id)?;
    Ok((StatusCode::CREATED, Json(contract)))
}

pub async fn get_contract(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
) -> AppResult<Json<Contract>> {
    let mut conn = state.db()?;
    contracts::get_contract(&mut *conn, user.company_id, contract_id)?
        .map(Json)
        .ok_or_else(AppError::not_found)
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<StatusRequest>,
) -> AppResult<Json<Contract>> {
    let next: ContractStatus = payload
        .status
        .parse()
        .map_err(ContractError::from)?;
    let mut conn = state.db()?;
    let updated = retry_on_conflict(|| {
        contracts::update_status(&mut *conn, user.company_id, contract_id, next, user.actor())
    })?;
    if !updated {
        return Err(AppError::not_found());
    }
    contracts::get_contract(&mut *conn, user.company_id, contract_id)?
        .map(Json)
        .ok_or_else(AppError::not_found)
}

pub async fn insert_template(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<InsertTemplateRequest>,
) -> AppResult<(StatusCode, Json<ContractVersion>)> {
    let mut conn = state.db()?;
    let version = contracts::insert_template_into_contract(
        &mut *conn,
        user.company_id,
        contract_id,
        payload.template_id,
        user.actor(),
    )?;
    Ok((StatusCode::CREATED, Json(version)))
}

pub async fn list_versions(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
) -> AppResult<Json<Vec<ContractVersion>>> {
    let mut conn = state.db()?;
    contracts::list_contract_versions(&mut *conn, user.company_id, contract_id)?
        .map(Json)
        .ok_or_else(AppError::not_found)
}

pub async fn create_version(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<VersionRequest>,
) -> AppResult<(StatusCode, Json<ContractVersion>)> {
    let mut conn = state.db()?;
    let version = contracts::update_contract_body(
        &mut *conn,
        user.company_id,
        contract_id,
        &payload.body,
        payload.merge_data,
        user.actor(),
    )?;
    Ok((StatusCode::CREATED, Json(version)))
}

pub async fn render(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
    payload: Option<Json<RenderRequest>>,
) -> AppResult<Json<RenderResponse>> {
    let Json(payload) = payload.unwrap_or_default();
    let mut conn = state.db()?;
    let body = contracts::render_contract(
        &mut *conn,
        user.company_id,
        contract_id,
        &payload.merge_data,
    )?;
    Ok(Json(RenderResponse { body }))
}

pub async fn list_signers(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
) -> AppResult<Json<Vec<ContractSigner>>> {
    let mut conn = state.db()?;
    contracts::list_contract_signers(&mut *conn, user.company_id, contract_id)?
        .map(Json)
        .ok_or_else(AppError::not_found)
}

pub async fn add_signer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
    Json(payload): Json<SignerInput>,
) -> AppResult<(StatusCode, Json<ContractSigner>)> {
    let mut conn = state.db()?;
    let signer = contracts::add_contract_signer(
        &mut *conn,
        user.company_id,
        contract_id,
        payload,
        user.actor(),
    )?;
    Ok((StatusCode::CREATED, Json(signer)))
}

pub async fn send(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
) -> AppResult<Json<SendResponse>> {
    let mut conn = state.db()?;
    let notified = contracts::send_contract(
        &mut *conn,
        user.company_id,
        contract_id,
        user.actor(),
        &state.config.public_base_url,
    )?;
    Ok(Json(SendResponse { notified }))
}

pub async fn list_events(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(contract_id): Path<Uuid>,
) -> AppResult<Json<Vec<ContractEvent>>> {
    let mut conn = state.db()?;
    contracts::list_contract_events(&mut *conn, user.company_id, contract_id)?
        .map(Json)
        .ok_or_else(AppError::not_found)
}
