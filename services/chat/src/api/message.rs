use super::dto::{IdResponse, MessageCreateDto, MessageEditDto};
use super::{param_bool_or, param_i64, param_size, user_id, ApiError, AppState, QueryParams};
use crate::commands::{MakeMessageBlogPost, MessageCreate, MessageDelete, MessageEdit, MessageRead};
use crate::queries::MessageViewDto;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use murmur_events::AdditionalData;

#[utoipa::path(
    post,
    path = "/chat/{id}/message",
    tag = "message",
    params(("id" = i64, Path, description = "Chat id")),
    request_body = MessageCreateDto,
    responses(
        (status = 200, description = "Message created", body = IdResponse),
        (status = 418, description = "Chat not projected yet; retry after it becomes visible")
    )
)]
pub(super) async fn create_message(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<MessageCreateDto>,
) -> Result<Json<IdResponse>, ApiError> {
    let caller = user_id(&headers)?;

    let command = MessageCreate {
        additional_data: AdditionalData::now(),
        chat_id,
        owner_id: caller,
        content: body.content,
    };
    let message_id = command
        .handle(state.bus.as_ref(), &state.pool, &state.projection)
        .await
        .map_err(|err| ApiError::from_command("create message", err))?;
    Ok(Json(IdResponse { id: message_id }))
}

#[utoipa::path(
    put,
    path = "/chat/{id}/message",
    tag = "message",
    params(("id" = i64, Path, description = "Chat id")),
    request_body = MessageEditDto,
    responses((status = 200, description = "Message edited"))
)]
pub(super) async fn edit_message(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<MessageEditDto>,
) -> Result<StatusCode, ApiError> {
    let caller = user_id(&headers)?;

    let command = MessageEdit {
        additional_data: AdditionalData::now(),
        chat_id,
        message_id: body.id,
        content: body.content,
    };
    command
        .handle(state.bus.as_ref(), &state.projection, caller)
        .await
        .map_err(|err| ApiError::from_command("edit message", err))?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    delete,
    path = "/chat/{id}/message/{messageId}",
    tag = "message",
    params(
        ("id" = i64, Path, description = "Chat id"),
        ("messageId" = i64, Path, description = "Message id")
    ),
    responses((status = 200, description = "Message deleted"))
)]
pub(super) async fn delete_message(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(i64, i64)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let caller = user_id(&headers)?;

    let command = MessageDelete {
        additional_data: AdditionalData::now(),
        chat_id,
        message_id,
    };
    command
        .handle(state.bus.as_ref(), &state.projection, caller)
        .await
        .map_err(|err| ApiError::from_command("delete message", err))?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    put,
    path = "/chat/{id}/message/{messageId}/read",
    tag = "message",
    params(
        ("id" = i64, Path, description = "Chat id"),
        ("messageId" = i64, Path, description = "Message id to mark read up to")
    ),
    responses((status = 200, description = "Watermark advanced (or left untouched)"))
)]
pub(super) async fn read_message(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(i64, i64)>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let caller = user_id(&headers)?;

    let command = MessageRead {
        additional_data: AdditionalData::now(),
        chat_id,
        message_id,
        participant_id: caller,
    };
    command
        .handle(state.bus.as_ref(), &state.projection)
        .await
        .map_err(|err| ApiError::from_command("read message", err))?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    put,
    path = "/chat/{id}/message/{messageId}/blog-post",
    tag = "message",
    params(
        ("id" = i64, Path, description = "Chat id"),
        ("messageId" = i64, Path, description = "Message to promote")
    ),
    responses((status = 200, description = "Message promoted to blog post"))
)]
pub(super) async fn make_blog_post(
    State(state): State<AppState>,
    Path((chat_id, message_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let command = MakeMessageBlogPost {
        additional_data: AdditionalData::now(),
        chat_id,
        message_id,
    };
    command
        .handle(state.bus.as_ref())
        .await
        .map_err(|err| ApiError::from_command("make blog post", err))?;
    Ok(StatusCode::OK)
}

#[utoipa::path(
    get,
    path = "/chat/{id}/message/search",
    tag = "message",
    params(
        ("id" = i64, Path, description = "Chat id"),
        ("size" = Option<i32>, Query, description = "Page size, default 20, max 100"),
        ("startingFromItemId" = Option<i64>, Query, description = "Keyset cursor: message id"),
        ("includeStartingFrom" = Option<bool>, Query, description = "Include the cursor row itself"),
        ("reverse" = Option<bool>, Query, description = "Newest first")
    ),
    responses((status = 200, description = "Message feed page", body = [MessageViewDto]))
)]
pub(super) async fn search_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<i64>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Vec<MessageViewDto>>, ApiError> {
    let size = param_size(&params);
    let reverse = param_bool_or(&params, "reverse", false);
    let include_starting_from = param_bool_or(&params, "includeStartingFrom", false);
    let starting_from_item_id = param_i64(&params, "startingFromItemId");

    let messages = state
        .queries
        .get_messages(
            chat_id,
            size,
            starting_from_item_id,
            include_starting_from,
            reverse,
        )
        .await
        .map_err(|err| ApiError::internal("search messages", &err))?;
    Ok(Json(messages))
}
