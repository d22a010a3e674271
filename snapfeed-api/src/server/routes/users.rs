use crate::server::{
    Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use snapfeed_common::model::{
    Id,
    post::PartialPost,
    user::{User, UserMarker},
};
use snapfeed_db::Repository;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_user)
        .typed_get(get_user_posts)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users/{id}", rejection(ServerError))]
struct UserPath {
    id: Id<UserMarker>,
}

async fn get_user(
    UserPath { id }: UserPath,
    _user: AuthenticatedUser,
    State(repository): State<Arc<dyn Repository>>,
) -> Result<Json<User>> {
    let user = repository
        .fetch_user(id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    Ok(Json(user))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/api/users/{id}/posts", rejection(ServerError))]
struct UserPostsPath {
    id: Id<UserMarker>,
}

async fn get_user_posts(
    UserPostsPath { id }: UserPostsPath,
    _user: AuthenticatedUser,
    State(repository): State<Arc<dyn Repository>>,
) -> Result<Json<Vec<PartialPost>>> {
    let posts = repository
        .fetch_user_posts(id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    Ok(Json(posts))
}
