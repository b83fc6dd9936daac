//! Public magic-link endpoints. The token in the path is the only
//! credential; no bearer JWT is involved.

use axum::{
    extract::{Path, State},
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::contracts::{self, SignatureData, SigningReceipt, SigningSession};
use crate::error::AppResult;
use crate::routes::retry_on_conflict;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CompleteSigningRequest {
    pub code: String,
    pub signature: SignatureData,
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .or_else(|| headers.get("x-real-ip").and_then(|value| value.to_str().ok()))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

pub async fn open_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<SigningSession>> {
    let mut conn = state.db()?;
    Ok(Json(contracts::open_session(&mut *conn, &token)?))
}

pub async fn request_otp(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut conn = state.db()?;
    contracts::request_otp(&mut *conn, &token)?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "sent" }))))
}

pub async fn complete_signing(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CompleteSigningRequest>,
) -> AppResult<Json<SigningReceipt>> {
    let ip = client_ip(&headers);
    let agent = user_agent(&headers);
    let mut conn = state.db()?;
    let receipt = retry_on_conflict(|| {
        contracts::complete_signing(
            &mut *conn,
            &token,
            &payload.code,
            &payload.signature,
            ip.as_deref(),
            agent.as_deref(),
        )
    })?;
    Ok(Json(receipt))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn takes_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("196.25.1.1, 10.0.0.2"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("196.25.1.1"));
    }

    #[test]
    fn falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("41.0.0.9"));
        assert_eq!(client_ip(&headers).as_deref(), Some("41.0.0.9"));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
