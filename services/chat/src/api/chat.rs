use super::dto::{ChatCreateDto, ChatEditDto, IdResponse};
use super::{
    param_bool, param_bool_or, param_i64, param_size, param_time, user_id, ApiError, AppState,
    QueryParams,
};
use crate::commands::{ChatCreate, ChatDelete, ChatEdit, ChatPin};
use crate::queries::{ChatPageCursor, ChatViewDto};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use murmur_events::AdditionalData;

#[utoipa::path(
    post,
    path = "/chat",
    tag = "chat",
    request_body = ChatCreateDto,
    responses((status = 200, description = "Chat created", body = IdResponse))
)]
pub(super) async fn create_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatCreateDto>,
) -> Result<Json<IdResponse>, ApiError> {
    let caller = user_id(&headers)?;
    let participant_ids = with_caller(body.participant_ids, caller);

    let command = ChatCreate {
        additional_data: AdditionalData::now(),
        title: body.title,
        participant_ids,
    };
    let chat_id = command
        .handle(state.bus.as_ref(), &state.pool)
        .await
        .map_err(|err| ApiError::from_command("create chat", err))?;

    Ok(Json(IdResponse { id: chat_id }))
}

#[utoipa::path(
    put,
    path = "/chat",
    tag = "chat",
    request_body = ChatEditDto,
    responses((status = 200, description = "Chat edited"))
)]
pub(super) async fn edit_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatEditDto>,
) -> Result<StatusCode, ApiError> {
    let command = ChatEdit {
        additional_data: AdditionalData::now(),
        chat_id: body.id,
        title: body.title,
        participant_ids_to_add: body.participant_ids,
        blog: body.blog,
    };
    command
        .handle(state.bus.as_ref(), &state.projection)
        .await
        .map_err(|err| ApiError::from_command("edit chat", err))?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    delete,
    path = "/chat/{id}",
    tag = "chat",
    params(("id" = i64, Path, description = "Chat id")),
    responses((status = 200, description = "Chat deleted"))
)]
pub(super) async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let command = ChatDelete {
        additional_data: AdditionalData::now(),
        chat_id,
    };
    command
        .handle(state.bus.as_ref(), &state.projection)
        .await
        .map_err(|err| ApiError::from_command("delete chat", err))?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    put,
    path = "/chat/{id}/pin",
    tag = "chat",
    params(
        ("id" = i64, Path, description = "Chat id"),
        ("pin" = bool, Query, description = "Desired pin state")
    ),
    responses((status = 200, description = "Pin state recorded"))
)]
pub(super) async fn pin_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Query(params): Query<QueryParams>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let caller = user_id(&headers)?;
    let pin = param_bool_or(&params, "pin", false);

    let command = ChatPin {
        additional_data: AdditionalData::now(),
        chat_id,
        participant_id: caller,
        pin,
    };
    command
        .handle(state.bus.as_ref())
        .await
        .map_err(|err| ApiError::from_command("pin chat", err))?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/chat/search",
    tag = "chat",
    params(
        ("size" = Option<i32>, Query, description = "Page size, default 20, max 100"),
        ("pinned" = Option<bool>, Query, description = "Keyset cursor: pinned"),
        ("lastUpdateDateTime" = Option<String>, Query, description = "Keyset cursor: RFC 3339 activity timestamp"),
        ("id" = Option<i64>, Query, description = "Keyset cursor: chat id"),
        ("includeStartingFrom" = Option<bool>, Query, description = "Include the cursor row itself"),
        ("reverse" = Option<bool>, Query, description = "Ascending instead of descending")
    ),
    responses((status = 200, description = "The caller's chat list", body = [ChatViewDto]))
)]
pub(super) async fn search_chats(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
    headers: HeaderMap,
) -> Result<Json<Vec<ChatViewDto>>, ApiError> {
    let caller = user_id(&headers)?;
    let size = param_size(&params);
    let reverse = param_bool_or(&params, "reverse", false);
    let include_starting_from = param_bool_or(&params, "includeStartingFrom", false);

    // The three cursor components travel together or not at all.
    let cursor = match (
        param_bool(&params, "pinned"),
        param_time(&params, "lastUpdateDateTime"),
        param_i64(&params, "id"),
    ) {
        (Some(pinned), Some(last_update_date_time), Some(id)) => Some(ChatPageCursor {
            pinned,
            last_update_date_time,
            id,
        }),
        _ => None,
    };

    let chats = state
        .queries
        .get_chats(caller, size, cursor, include_starting_from, reverse)
        .await
        .map_err(|err| ApiError::internal("search chats", &err))?;
    Ok(Json(chats))
}

/// The caller is always a participant of the chat they create.
fn with_caller(mut participant_ids: Vec<i64>, caller: i64) -> Vec<i64> {
    if !participant_ids.contains(&caller) {
        participant_ids.push(caller);
    }
    participant_ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_caller_becomes_the_sole_participant() {
        assert_eq!(with_caller(vec![], 7), vec![7]);
    }

    #[test]
    fn caller_is_not_duplicated() {
        assert_eq!(with_caller(vec![7, 9], 7), vec![7, 9]);
        assert_eq!(with_caller(vec![9], 7), vec![9, 7]);
    }
}
