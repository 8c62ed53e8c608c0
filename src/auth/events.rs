//! Post-authentication notifications.
//!
//! Password login and the header-auth override both announce issued tokens
//! through [`AuthHooks`], so listeners see the same event whichever path ran.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use super::context::Identity;
use super::user_store::SurrealIdentityStore;
use crate::db::schema::{AuditAction, AuditLogCreate, UserRecord};

/// How the caller proved who they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    Password,
    Header,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Header => "header",
        }
    }
}

/// A session token was issued.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub identity: Identity,
    pub token: String,
    pub method: AuthMethod,
}

#[async_trait]
pub trait AuthListener: Send + Sync {
    /// Called after a token is issued and before the response is sent.
    async fn on_auth(&self, event: &AuthEvent) -> Result<()>;

    /// Called after header auth creates a user record.
    async fn on_user_provisioned(&self, _user: &UserRecord) -> Result<()> {
        Ok(())
    }
}

/// Ordered listener list.
///
/// Listener errors are logged and never change the response.
#[derive(Default)]
pub struct AuthHooks {
    listeners: Vec<Arc<dyn AuthListener>>,
}

impl AuthHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener; listeners run in registration order.
    pub fn register(mut self, listener: impl AuthListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub async fn notify(&self, event: &AuthEvent) {
        for listener in &self.listeners {
            if let Err(e) = listener.on_auth(event).await {
                warn!(
                    subject = event.identity.id(),
                    method = event.method.as_str(),
                    "Auth listener failed: {}",
                    e
                );
            }
        }
    }

    pub async fn notify_provisioned(&self, user: &UserRecord) {
        for listener in &self.listeners {
            if let Err(e) = listener.on_user_provisioned(user).await {
                warn!(email = %user.email, "Provisioning listener failed: {}", e);
            }
        }
    }
}

/// Records every auth event in the `audit_log` table.
pub struct AuditLogListener {
    store: Arc<SurrealIdentityStore>,
}

impl AuditLogListener {
    pub fn new(store: Arc<SurrealIdentityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuthListener for AuditLogListener {
    async fn on_auth(&self, event: &AuthEvent) -> Result<()> {
        let action = match event.identity {
            Identity::Admin(_) => AuditAction::AdminLogin,
            Identity::User(_) => AuditAction::UserLogin,
        };
        debug!(subject = event.identity.id(), "Writing {} audit entry", action.as_str());

        self.store
            .audit_log(AuditLogCreate {
                action,
                subject_type: event.identity.kind().to_string(),
                subject_id: event.identity.id().to_string(),
                details: Some(json!({
                    "method": event.method.as_str(),
                    "email": event.identity.email(),
                })),
            })
            .await
    }

    async fn on_user_provisioned(&self, user: &UserRecord) -> Result<()> {
        self.store
            .audit_log(AuditLogCreate {
                action: AuditAction::UserProvisioned,
                subject_type: "user".to_string(),
                subject_id: user.id.to_string(),
                details: Some(json!({ "email": user.email, "username": user.username })),
            })
            .await
    }
}
