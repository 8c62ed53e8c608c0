//! Request middleware: bearer tokens, proxy header auth, login interception.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::{ADMIN_AUTH_PATH, API_PREFIX, AppState, USER_AUTH_PATH, admin_auth_response, user_auth_response};
use crate::auth::{AuthContext, AuthMethod, ExtractedIdentity, IdentityResolver, TokenType, peek_claims};
use crate::config::HeaderAuthConfig;

/// Identities bound by header auth on this request.
///
/// Kept apart from [`AuthContext`] so the login interceptor only short-circuits
/// for header-derived identities, not for bearer tokens.
#[derive(Debug, Clone, Default)]
pub struct HeaderIdentity(pub AuthContext);

/// State shared by the header auth middleware.
#[derive(Clone)]
pub struct HeaderAuthState {
    pub app: AppState,
    pub resolver: Arc<IdentityResolver>,
    pub config: Arc<HeaderAuthConfig>,
}

/// Merge `ctx` into the request's [`AuthContext`], creating it if absent.
pub fn bind_context(req: &mut Request, ctx: AuthContext) {
    let extensions = req.extensions_mut();
    if let Some(existing) = extensions.get_mut::<AuthContext>() {
        existing.merge(ctx);
    } else {
        extensions.insert(ctx);
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

async fn authenticate_token(state: &AppState, token: &str) -> AuthContext {
    let Ok(claims) = peek_claims(token) else {
        debug!("Ignoring malformed bearer token");
        return AuthContext::default();
    };
    let id = claims.record_key();

    match claims.token_type {
        TokenType::Admin => match state.store.find_admin_by_id(&id).await {
            Ok(Some(admin)) if state.tokens.verify_admin_token(token, &admin).is_ok() => {
                AuthContext::new(Some(admin), None)
            }
            Ok(_) => AuthContext::default(),
            Err(e) => {
                warn!("Admin token lookup failed: {}", e);
                AuthContext::default()
            }
        },
        TokenType::AuthRecord => match state.store.find_user_by_id(&id).await {
            Ok(Some(user)) if state.tokens.verify_user_token(token, &user).is_ok() => {
                AuthContext::new(None, Some(user))
            }
            Ok(_) => AuthContext::default(),
            Err(e) => {
                warn!("User token lookup failed: {}", e);
                AuthContext::default()
            }
        },
    }
}

/// Bind the identity of a valid `Authorization` token. Invalid tokens are ignored.
pub async fn token_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    // Owned so no borrow of the request is held across the lookup
    let token = bearer_token(req.headers()).map(str::to_owned);
    let ctx = match token {
        Some(token) => authenticate_token(&state, &token).await,
        None => AuthContext::default(),
    };
    bind_context(&mut req, ctx);
    next.run(req).await
}

/// Resolve proxy headers into identities before any route handler runs.
pub async fn header_auth(
    State(state): State<HeaderAuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.uri().path().starts_with(API_PREFIX) {
        let extracted = ExtractedIdentity::from_headers(req.headers(), &state.config);
        if extracted.has_email() {
            let ctx = state.resolver.resolve(&extracted).await;
            debug!(
                email = %extracted.email,
                admin = ctx.admin().is_some(),
                user = ctx.user().is_some(),
                "Resolved header identity"
            );
            req.extensions_mut().insert(HeaderIdentity(ctx.clone()));
            bind_context(&mut req, ctx);
        }
    }
    next.run(req).await
}

/// Answer the password login routes with a token for the header identity.
///
/// Falls through to the password handler when no matching identity is bound
/// or the token cannot be issued.
pub async fn intercept_login(
    State(state): State<HeaderAuthState>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() != Method::POST {
        return next.run(req).await;
    }
    let Some(HeaderIdentity(ctx)) = req.extensions().get::<HeaderIdentity>().cloned() else {
        return next.run(req).await;
    };

    let path = req.uri().path().to_owned();
    let issued = if path == ADMIN_AUTH_PATH {
        match ctx.admin() {
            Some(admin) => admin_auth_response(&state.app, admin.clone(), AuthMethod::Header).await,
            None => return next.run(req).await,
        }
    } else if path == USER_AUTH_PATH {
        match ctx.user() {
            Some(user) => user_auth_response(&state.app, user.clone(), AuthMethod::Header).await,
            None => return next.run(req).await,
        }
    } else {
        return next.run(req).await;
    };

    match issued {
        Ok(body) => body.into_response(),
        Err(e) => {
            warn!("Header login token issuance failed, using password login: {}", e);
            next.run(req).await
        }
    }
}
