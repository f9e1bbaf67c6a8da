use super::dto::{ParticipantAddDto, ParticipantDeleteDto};
use super::{param_bool_or, param_page, param_size, ApiError, AppState, QueryParams};
use crate::commands::{ParticipantAdd, ParticipantDelete};
use crate::pagination;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use murmur_events::AdditionalData;

#[utoipa::path(
    put,
    path = "/chat/{id}/participant",
    tag = "participant",
    params(("id" = i64, Path, description = "Chat id")),
    request_body = ParticipantAddDto,
    responses((status = 200, description = "Participants added"))
)]
pub(super) async fn add_participants(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Json(body): Json<ParticipantAddDto>,
) -> Result<StatusCode, ApiError> {
    let command = ParticipantAdd {
        additional_data: AdditionalData::now(),
        chat_id,
        participant_ids: body.participant_ids,
    };
    command
        .handle(state.bus.as_ref(), &state.projection)
        .await
        .map_err(|err| ApiError::from_command("add participants", err))?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    delete,
    path = "/chat/{id}/participant",
    tag = "participant",
    params(("id" = i64, Path, description = "Chat id")),
    request_body = ParticipantDeleteDto,
    responses((status = 200, description = "Participants removed"))
)]
pub(super) async fn delete_participants(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Json(body): Json<ParticipantDeleteDto>,
) -> Result<StatusCode, ApiError> {
    let command = ParticipantDelete {
        additional_data: AdditionalData::now(),
        chat_id,
        participant_ids: body.participant_ids,
    };
    command
        .handle(state.bus.as_ref(), &state.projection)
        .await
        .map_err(|err| ApiError::from_command("delete participants", err))?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/chat/{id}/participants",
    tag = "participant",
    params(
        ("id" = i64, Path, description = "Chat id"),
        ("page" = Option<i64>, Query, description = "Zero-based page"),
        ("size" = Option<i32>, Query, description = "Page size, default 20, max 100"),
        ("reverse" = Option<bool>, Query, description = "Newest joiners first")
    ),
    responses((status = 200, description = "Participant ids in join order", body = [i64]))
)]
pub(super) async fn get_participants(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Vec<i64>>, ApiError> {
    let size = param_size(&params);
    let page = param_page(&params);
    let reverse = param_bool_or(&params, "reverse", false);

    let participants = state
        .queries
        .get_participants(chat_id, size, pagination::offset(page, size), reverse)
        .await
        .map_err(|err| ApiError::internal("get participants", &err))?;
    Ok(Json(participants))
}
