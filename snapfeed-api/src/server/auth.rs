use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use snapfeed_common::model::{Id, auth::AuthKeys, user::UserMarker};
use std::sync::Arc;
use tracing::debug;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The user a request was authenticated as, from its bearer token.
///
/// Taking this as a handler argument makes the route require authentication.
/// Verification only needs the signing key, so a rejected request never
/// touches the repository.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct AuthenticatedUser {
    id: Id<UserMarker>,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(self) -> Id<UserMarker> {
        self.id
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthKeys>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = AuthorizationHeader::from_request_parts(parts, state)
            .await
            .map_err(ServerError::InvalidAuthorizationHeader)?;

        let claims = Arc::<AuthKeys>::from_ref(state).verify(header.token())?;
        debug!(user_id = %claims.sub, "Authenticated request");

        Ok(Self { id: claims.sub })
    }
}
