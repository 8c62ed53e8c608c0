//! Maps an extracted header identity to stored admin and user records.

use std::sync::Arc;

use tracing::{debug, warn};

use super::context::AuthContext;
use super::events::AuthHooks;
use super::extractor::ExtractedIdentity;
use super::provisioner::UserProvisioner;
use super::user_store::IdentityStore;
use crate::config::HeaderAuthConfig;
use crate::db::schema::{AdminRecord, UserRecord};

/// Resolves header identities against the identity store.
///
/// Admin and user lookups are independent: a request whose email matches
/// both gets both bound. Resolution never fails; store errors degrade to
/// "no identity".
pub struct IdentityResolver {
    store: Arc<dyn IdentityStore>,
    provisioner: UserProvisioner,
    config: Arc<HeaderAuthConfig>,
}

impl IdentityResolver {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        hooks: Arc<AuthHooks>,
        config: Arc<HeaderAuthConfig>,
    ) -> Self {
        let provisioner = UserProvisioner::new(store.clone(), hooks);
        Self {
            store,
            provisioner,
            config,
        }
    }

    pub async fn resolve(&self, extracted: &ExtractedIdentity) -> AuthContext {
        if !extracted.has_email() {
            return AuthContext::default();
        }

        let admin = if self.config.admin_login {
            self.find_admin(&extracted.email).await
        } else {
            None
        };
        let user = self.find_or_provision_user(extracted).await;

        AuthContext::new(admin, user)
    }

    async fn find_admin(&self, email: &str) -> Option<AdminRecord> {
        match self.store.find_admin_by_email(email).await {
            Ok(admin) => admin,
            Err(e) => {
                warn!(email, "Admin lookup failed: {}", e);
                None
            }
        }
    }

    async fn find_or_provision_user(&self, extracted: &ExtractedIdentity) -> Option<UserRecord> {
        let existing = match self.store.find_user_by_email(&extracted.email).await {
            Ok(existing) => existing,
            Err(e) => {
                // A failed lookup must not lead to a duplicate create
                warn!(email = %extracted.email, "User lookup failed: {}", e);
                return None;
            }
        };

        match existing {
            Some(user) if self.config.auto_create_user => {
                Some(self.provisioner.refresh(user, extracted).await)
            }
            Some(user) => Some(user),
            None if self.config.auto_create_user => self.provisioner.provision(extracted).await,
            None => {
                debug!(email = %extracted.email, "No user matches header email");
                None
            }
        }
    }
}
