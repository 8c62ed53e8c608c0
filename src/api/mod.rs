// REST API endpoints for the identity service

mod error;
pub mod middleware;

#[cfg(test)]
mod integration_tests;

use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{State, rejection::JsonRejection},
    response::Json,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};

pub use error::ApiError;

use crate::auth::{
    AuthContext, AuthEvent, AuthHooks, AuthMethod, Identity, IdentityStore, TokenIssuer,
    verify_password,
};
use crate::db::schema::{AdminRecord, UserRecord};

/// Every route under this prefix is subject to header auth.
pub const API_PREFIX: &str = "/api/";
pub const HEALTH_PATH: &str = "/api/health";
pub const ADMIN_AUTH_PATH: &str = "/api/admins/auth-with-password";
pub const USER_AUTH_PATH: &str = "/api/collections/users/auth-with-password";
pub const ME_PATH: &str = "/api/me";

/// Shared collaborators of the native endpoints.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IdentityStore>,
    pub tokens: Arc<dyn TokenIssuer>,
    pub hooks: Arc<AuthHooks>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        tokens: Arc<dyn TokenIssuer>,
        hooks: Arc<AuthHooks>,
    ) -> Self {
        Self {
            store,
            tokens,
            hooks,
        }
    }
}

/// Native routes: health and the two password logins.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(HEALTH_PATH, get(health_check))
        .route(ADMIN_AUTH_PATH, post(admin_auth_with_password))
        .route(USER_AUTH_PATH, post(user_auth_with_password))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct PasswordLogin {
    /// Email, or for users also the username
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub password: String,
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn admin_auth_with_password(
    State(state): State<AppState>,
    payload: Result<Json<PasswordLogin>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(login) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let admin = state
        .store
        .find_admin_by_email(&login.identity)
        .await
        .map_err(ApiError::internal)?
        .ok_or(ApiError::AuthenticationFailed)?;

    if !verify_password(&admin.password_hash, &login.password) {
        return Err(ApiError::AuthenticationFailed);
    }

    admin_auth_response(&state, admin, AuthMethod::Password)
        .await
        .map_err(ApiError::internal)
}

async fn user_auth_with_password(
    State(state): State<AppState>,
    payload: Result<Json<PasswordLogin>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(login) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let found = if login.identity.contains('@') {
        state.store.find_user_by_email(&login.identity).await
    } else {
        state.store.find_user_by_username(&login.identity).await
    };
    let user = found
        .map_err(ApiError::internal)?
        .ok_or(ApiError::AuthenticationFailed)?;

    if !verify_password(&user.password_hash, &login.password) {
        return Err(ApiError::AuthenticationFailed);
    }

    user_auth_response(&state, user, AuthMethod::Password)
        .await
        .map_err(ApiError::internal)
}

/// Issue an admin token and build the login success body.
///
/// Listeners are notified before the body is returned.
pub(crate) async fn admin_auth_response(
    state: &AppState,
    admin: AdminRecord,
    method: AuthMethod,
) -> anyhow::Result<Json<Value>> {
    let token = state.tokens.issue_admin_token(&admin)?;
    let body = json!({ "token": token, "admin": admin });

    state
        .hooks
        .notify(&AuthEvent {
            identity: Identity::Admin(admin),
            token,
            method,
        })
        .await;

    Ok(Json(body))
}

/// Issue a user token and build the login success body.
pub(crate) async fn user_auth_response(
    state: &AppState,
    user: UserRecord,
    method: AuthMethod,
) -> anyhow::Result<Json<Value>> {
    let token = state.tokens.issue_user_token(&user)?;
    let body = json!({ "token": token, "record": user });

    state
        .hooks
        .notify(&AuthEvent {
            identity: Identity::User(user),
            token,
            method,
        })
        .await;

    Ok(Json(body))
}

/// Report the bound admin, else the bound user, else `null`.
pub(crate) async fn me(ctx: Option<Extension<AuthContext>>) -> Json<Option<Identity>> {
    Json(ctx.and_then(|Extension(ctx)| ctx.primary()))
}
