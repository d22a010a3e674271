use crate::server::{
    Result, ServerError, ServerRouter, auth::AuthenticatedUser, json::Json,
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use snapfeed_common::model::comment::{Comment, NewComment};
use snapfeed_db::Repository;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_post(create_comment)
}

#[derive(TypedPath)]
#[typed_path("/api/comments")]
struct CommentsPath;

async fn create_comment(
    CommentsPath: CommentsPath,
    user: AuthenticatedUser,
    State(repository): State<Arc<dyn Repository>>,
    Json(comment): Json<NewComment>,
) -> Result<(StatusCode, Json<Comment>)> {
    let comment = repository
        .create_comment(user.user_id(), &comment)
        .await?
        .ok_or(ServerError::PostByIdNotFound(comment.post_id))?;

    Ok((StatusCode::CREATED, Json(comment)))
}
