use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use ld_infra::types::{DesiredState, LinodeId, ObservedState};

use crate::dto::UpdateInstanceRequest;
use crate::error::ApiError;
use crate::state::AppState;

fn parse_id(raw: &str) -> Result<LinodeId, ApiError> {
    raw.parse::<LinodeId>()
        .map_err(|_| ApiError::BadRequest(format!("invalid linode id: {raw}")))
}

pub async fn create_instance(
    State(state): State<AppState>,
    Json(desired): Json<DesiredState>,
) -> Result<(StatusCode, Json<ObservedState>), ApiError> {
    let observed = state.orchestrator.provision(&desired).await?;
    tracing::info!(linode_id = %observed.linode_id, "instance provisioned");
    Ok((StatusCode::CREATED, Json(observed)))
}

pub async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ObservedState>, ApiError> {
    let linode_id = parse_id(&id)?;
    Ok(Json(state.orchestrator.read(linode_id).await?))
}

pub async fn update_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateInstanceRequest>,
) -> Result<Json<ObservedState>, ApiError> {
    let linode_id = parse_id(&id)?;
    let observed = state
        .orchestrator
        .update(linode_id, &req.desired, req.stored_credentials)
        .await?;
    Ok(Json(observed))
}

pub async fn delete_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let linode_id = parse_id(&id)?;
    state.orchestrator.destroy(linode_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
