//! HTTP server assembly and header auth installation.

use std::sync::Arc;

use anyhow::Result;
use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::middleware::{HeaderAuthState, header_auth, intercept_login, token_auth};
use crate::api::{AppState, ME_PATH, create_router, me};
use crate::auth::IdentityResolver;
use crate::config::HeaderAuthConfig;

/// Installs proxy header authentication onto a router.
pub struct HeaderAuth {
    config: Arc<HeaderAuthConfig>,
    me_endpoint: bool,
}

impl HeaderAuth {
    pub fn new(config: HeaderAuthConfig) -> Self {
        Self {
            config: Arc::new(config),
            me_endpoint: true,
        }
    }

    /// Skip registering `GET /api/me`.
    pub fn without_me_endpoint(mut self) -> Self {
        self.me_endpoint = false;
        self
    }

    /// Layer header auth onto `router`.
    ///
    /// An invalid configuration returns `router` untouched. Otherwise the
    /// header resolver runs first, then the login interceptor, then the
    /// routes.
    pub fn install(self, router: Router, state: &AppState) -> Router {
        if !self.config.is_valid() {
            tracing::info!("Header auth disabled: email and name headers are not configured");
            return router;
        }
        if self.config.has_overrides() {
            tracing::warn!("Header auth is using forced identity values; do not use this in production");
        }

        let resolver = Arc::new(IdentityResolver::new(
            state.store.clone(),
            state.hooks.clone(),
            self.config.clone(),
        ));
        let header_state = HeaderAuthState {
            app: state.clone(),
            resolver,
            config: self.config.clone(),
        };

        let router = if self.me_endpoint {
            router.route(ME_PATH, get(me))
        } else {
            router
        };

        tracing::info!(
            email_header = %self.config.email_header,
            name_header = %self.config.name_header,
            admin_login = self.config.admin_login,
            auto_create_user = self.config.auto_create_user,
            "Header auth enabled"
        );

        router
            .layer(from_fn_with_state(header_state.clone(), intercept_login))
            .layer(from_fn_with_state(header_state, header_auth))
    }
}

/// Build the full application: native routes, header auth, token auth.
///
/// Bearer tokens are bound first, header identities are merged on top.
pub fn build_app(state: AppState, header_auth_config: HeaderAuthConfig) -> Router {
    let router = create_router(state.clone());
    let router = HeaderAuth::new(header_auth_config).install(router, &state);

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(from_fn_with_state(state, token_auth)),
    )
}

/// Serve `app` on `bind`, e.g. `127.0.0.1:8090`.
pub async fn serve(bind: &str, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Header auth server listening on http://{}", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
