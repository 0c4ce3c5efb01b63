use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use postbridge_core::{AuthorStat, NewPost, Post, SortOrder};
use postbridge_service::PostService;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Format of the `Date` field in responses.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Deserialize)]
pub struct ListPostsQuery {
    sort: Option<String>,
}

/// Fields are optional so a missing one yields a 400 with an error body.
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    author: Option<String>,
    title: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostResponse {
    pub id: String,
    pub author: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "Date")]
    pub date: String,
}

impl From<Post> for PostResponse {
    fn from(post: Post) -> Self {
        Self {
            id: post.id.into_inner(),
            author: post.author,
            title: post.title,
            content: post.content,
            date: post.created_at.format(DATE_FORMAT).to_string(),
        }
    }
}

#[tracing::instrument(skip_all, fields(sort = ?query.sort))]
pub async fn list_posts(
    State(service): State<Arc<PostService>>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    let order = SortOrder::from_query(query.sort.as_deref());
    let posts = service.list_posts(order).await?;
    Ok(Json(posts.into_iter().map(PostResponse::from).collect()))
}

#[tracing::instrument(skip_all)]
pub async fn create_post(
    State(service): State<Arc<PostService>>,
    Json(req): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    let (Some(title), Some(content)) = (req.title, req.content) else {
        return Err(ApiError::bad_request("title and content are required"));
    };

    let post = service
        .create_post(NewPost::new(req.author.as_deref(), title, content))
        .await?;

    Ok((StatusCode::CREATED, Json(post.into())))
}

pub async fn author_stats(
    State(service): State<Arc<PostService>>,
) -> Result<Json<Vec<AuthorStat>>, ApiError> {
    Ok(Json(service.author_stats().await?))
}
