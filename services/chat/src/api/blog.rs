use super::{param_bool_or, param_page, param_size, ApiError, AppState, QueryParams};
use crate::pagination;
use crate::queries::{BlogViewDto, CommentViewDto};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

#[utoipa::path(
    get,
    path = "/blog/search",
    tag = "blog",
    params(
        ("page" = Option<i64>, Query, description = "Zero-based page"),
        ("size" = Option<i32>, Query, description = "Page size, default 20, max 100"),
        ("reverse" = Option<bool>, Query, description = "Newest first")
    ),
    responses((status = 200, description = "Blog index page", body = [BlogViewDto]))
)]
pub(super) async fn search_blogs(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Vec<BlogViewDto>>, ApiError> {
    let size = param_size(&params);
    let page = param_page(&params);
    let reverse = param_bool_or(&params, "reverse", false);

    let blogs = state
        .queries
        .get_blogs(size, pagination::offset(page, size), reverse)
        .await
        .map_err(|err| ApiError::internal("search blogs", &err))?;
    Ok(Json(blogs))
}

#[utoipa::path(
    get,
    path = "/blog/{id}",
    tag = "blog",
    params(("id" = i64, Path, description = "Blog id (the chat id)")),
    responses(
        (status = 200, description = "The blog post", body = BlogDto),
        (status = 204, description = "No such blog")
    )
)]
pub(super) async fn get_blog(
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
) -> Result<axum::response::Response, ApiError> {
    let blog = state
        .queries
        .get_blog(blog_id)
        .await
        .map_err(|err| ApiError::internal("get blog", &err))?;

    Ok(match blog {
        Some(blog) => Json(blog).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

#[utoipa::path(
    get,
    path = "/blog/{id}/comment/search",
    tag = "blog",
    params(
        ("id" = i64, Path, description = "Blog id (the chat id)"),
        ("page" = Option<i64>, Query, description = "Zero-based page"),
        ("size" = Option<i32>, Query, description = "Page size, default 20, max 100"),
        ("reverse" = Option<bool>, Query, description = "Newest first")
    ),
    responses((status = 200, description = "Comments: messages after the blog post", body = [CommentViewDto]))
)]
pub(super) async fn search_comments(
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
    Query(params): Query<QueryParams>,
) -> Result<Json<Vec<CommentViewDto>>, ApiError> {
    let size = param_size(&params);
    let page = param_page(&params);
    let reverse = param_bool_or(&params, "reverse", false);

    let comments = state
        .queries
        .get_comments(blog_id, size, pagination::offset(page, size), reverse)
        .await
        .map_err(|err| ApiError::internal("search comments", &err))?;
    Ok(Json(comments))
}
