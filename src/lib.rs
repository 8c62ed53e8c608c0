// Core modules
mod config;
mod db;
mod types;
mod utils;
pub mod api;
pub mod auth;
pub mod server;

// Re-export key types and functions
pub use api::{AppState, ApiError};
pub use auth::{
    AuditLogListener, AuthContext, AuthHooks, Identity, IdentityStore, JwtTokenIssuer,
    SurrealIdentityStore, TokenIssuer,
};
pub use config::{HeaderAuthConfig, TokenConfig};
pub use db::schema::{AdminRecord, NewAdmin, NewUser, UserRecord};
pub use db::{DatabaseConfig, Db, create_connection, ensure_schema};
pub use server::{HeaderAuth, build_app, serve};
pub use types::{RecordKey, TokenKey, Username};

use std::sync::Arc;
use anyhow::Result;

/// Convenience function to wire the store, token issuer and audit hooks.
///
/// Connects to the database, applies the schema and returns an [`AppState`]
/// ready for [`build_app`].
pub async fn create_state(db_config: DatabaseConfig, token_config: TokenConfig) -> Result<AppState> {
    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;

    let store = Arc::new(SurrealIdentityStore::new(db));
    let hooks = AuthHooks::new().register(AuditLogListener::new(store.clone()));

    Ok(AppState::new(
        store,
        Arc::new(JwtTokenIssuer::new(token_config)),
        Arc::new(hooks),
    ))
}
