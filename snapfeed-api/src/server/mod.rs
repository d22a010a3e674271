use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use json::Json;
use serde::{Deserialize, Serialize};
use snapfeed_common::model::{
    Id,
    article::ArticleMarker,
    auth::{AuthKeys, AuthTokenError, PasswordHashError},
    post::PostMarker,
    user::UserMarker,
};
use snapfeed_db::{DbError, Repository};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

mod auth;
mod json;
mod routes;

pub use auth::AuthenticatedUser;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub repository: Arc<dyn Repository>,
    pub auth_keys: Arc<AuthKeys>,
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error(transparent)]
    AuthToken(#[from] AuthTokenError),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("User with id {0} was not found.")]
    UserByIdNotFound(Id<UserMarker>),
    #[error("Article with id {0} was not found.")]
    ArticleByIdNotFound(Id<ArticleMarker>),
}

impl ServerError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::UserByIdNotFound(_)
            | ServerError::ArticleByIdNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidAuthorizationHeader(_)
            | ServerError::AuthToken(AuthTokenError::Verify(_)) => StatusCode::UNAUTHORIZED,
            ServerError::PathRejection(_)
            | ServerError::JsonRejection(_)
            | ServerError::InvalidCredentials => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_)
            | ServerError::AuthToken(AuthTokenError::Sign(_) | AuthTokenError::ExpiryOutOfRange)
            | ServerError::PasswordHash(_)
            | ServerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            status: status.as_u16(),
            message: self.to_string(),
        };
        (status, Json(error_response)).into_response()
    }
}
