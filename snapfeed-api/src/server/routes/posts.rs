use crate::server::{
    Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json,
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use snapfeed_common::model::{
    Id,
    post::{PartialPost, Post, PostContent, PostMarker},
};
use snapfeed_db::Repository;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_posts)
        .typed_post(create_post)
        .typed_get(get_post)
}

#[derive(TypedPath)]
#[typed_path("/api/posts")]
struct PostsPath;

async fn get_posts(
    PostsPath: PostsPath,
    _user: AuthenticatedUser,
    State(repository): State<Arc<dyn Repository>>,
) -> Result<Json<Vec<Post>>> {
    let posts = repository.fetch_posts().await?;

    Ok(Json(posts))
}

async fn create_post(
    PostsPath: PostsPath,
    user: AuthenticatedUser,
    State(repository): State<Arc<dyn Repository>>,
    Json(content): Json<PostContent>,
) -> Result<(StatusCode, Json<PartialPost>)> {
    let post = repository.create_post(user.user_id(), &content).await?;

    Ok((StatusCode::CREATED, Json(post)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/posts/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

async fn get_post(
    PostPath { id }: PostPath,
    _user: AuthenticatedUser,
    State(repository): State<Arc<dyn Repository>>,
) -> Result<Json<Post>> {
    let post = repository
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(post))
}
