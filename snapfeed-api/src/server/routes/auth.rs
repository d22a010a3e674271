use crate::server::{Result, ServerError, ServerRouter, json::Json};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use snapfeed_common::model::{
    auth::{AuthKeys, LoginRequest, LoginResponse, PasswordHash},
    user::{CreateUser, RegisterUser, User},
};
use snapfeed_db::Repository;
use std::sync::Arc;
use tracing::{debug, info};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(register)
        .typed_post(login)
}

#[derive(TypedPath)]
#[typed_path("/api/register")]
struct RegisterPath;

async fn register(
    RegisterPath: RegisterPath,
    State(repository): State<Arc<dyn Repository>>,
    Json(register): Json<RegisterUser>,
) -> Result<(StatusCode, Json<User>)> {
    let password_hash = PasswordHash::hash(&register.password)?;

    let user = repository
        .create_user(&CreateUser {
            username: register.username,
            email: register.email,
            password_hash,
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, "Registered user");
    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(TypedPath)]
#[typed_path("/api/login")]
struct LoginPath;

/// Unknown email and wrong password are answered identically, and both pay
/// for one password verification.
async fn login(
    LoginPath: LoginPath,
    State(repository): State<Arc<dyn Repository>>,
    State(auth_keys): State<Arc<AuthKeys>>,
    Json(login): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let Some(credentials) = repository.fetch_user_credentials(&login.email).await? else {
        PasswordHash::verify_unknown_account(&login.password)?;
        debug!("Login for unknown email");
        return Err(ServerError::InvalidCredentials);
    };

    if !credentials.password_hash.verify(&login.password)? {
        debug!(user_id = %credentials.user.id, "Login with wrong password");
        return Err(ServerError::InvalidCredentials);
    }

    let token = auth_keys.issue(credentials.user.id)?;

    info!(user_id = %credentials.user.id, "User logged in");
    Ok(Json(LoginResponse { token }))
}
