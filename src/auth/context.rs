//! Request-scoped identity.

use serde::Serialize;

use crate::db::schema::{AdminRecord, UserRecord};

/// A resolved caller identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Identity {
    Admin(AdminRecord),
    User(UserRecord),
}

impl Identity {
    /// Table name of the underlying record.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Admin(_) => "admin",
            Self::User(_) => "user",
        }
    }

    /// Record key of the underlying record.
    pub fn id(&self) -> &str {
        match self {
            Self::Admin(admin) => admin.id.as_str(),
            Self::User(user) => user.id.as_str(),
        }
    }

    /// Email of the underlying record.
    pub fn email(&self) -> &str {
        match self {
            Self::Admin(admin) => &admin.email,
            Self::User(user) => &user.email,
        }
    }
}

/// Identities bound to the current request.
///
/// Stored as a request extension. An admin and a user may both be present;
/// handlers pick whichever they need. Created per request and dropped with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthContext {
    admin: Option<AdminRecord>,
    user: Option<UserRecord>,
}

impl AuthContext {
    /// Create a context from optional identities.
    pub fn new(admin: Option<AdminRecord>, user: Option<UserRecord>) -> Self {
        Self { admin, user }
    }

    /// Get the bound administrator, if any.
    pub fn admin(&self) -> Option<&AdminRecord> {
        self.admin.as_ref()
    }

    /// Get the bound user, if any.
    pub fn user(&self) -> Option<&UserRecord> {
        self.user.as_ref()
    }

    /// Check if no identity is bound.
    pub fn is_anonymous(&self) -> bool {
        self.admin.is_none() && self.user.is_none()
    }

    /// The admin if bound, otherwise the user.
    pub fn primary(&self) -> Option<Identity> {
        self.admin
            .clone()
            .map(Identity::Admin)
            .or_else(|| self.user.clone().map(Identity::User))
    }

    /// Fold another context into this one.
    ///
    /// Identities present in `other` replace ours; absent ones never clear
    /// what is already bound.
    pub fn merge(&mut self, other: AuthContext) {
        if let Some(admin) = other.admin {
            self.admin = Some(admin);
        }
        if let Some(user) = other.user {
            self.user = Some(user);
        }
    }
}
