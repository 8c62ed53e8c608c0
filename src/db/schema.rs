use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::types::{RecordKey, TokenKey, Username};

/// Persisted administrator record.
///
/// Administrators are never created by header auth, only looked up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminRecord {
    /// Key of the `admin` record
    pub id: RecordKey,
    /// Lower-cased, unique email
    pub email: String,
    /// Avatar index shown by admin UIs
    #[serde(default)]
    pub avatar: i64,
    /// Token signing key component
    #[serde(default, skip_serializing)]
    pub token_key: TokenKey,
    /// Argon2 PHC string
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    pub created: String,
    pub updated: String,
}

/// Persisted user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Key of the `user` record
    pub id: RecordKey,
    /// Lower-cased, unique email
    pub email: String,
    #[serde(default)]
    pub email_visibility: bool,
    /// Whether the email is known to belong to the user
    #[serde(default)]
    pub verified: bool,
    /// Unique handle
    pub username: Username,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Extra fields populated from mapped headers
    #[serde(default)]
    pub profile: BTreeMap<String, String>,
    /// Token signing key component
    #[serde(default, skip_serializing)]
    pub token_key: TokenKey,
    /// Argon2 PHC string, empty for users that only ever log in via headers
    #[serde(default, skip_serializing)]
    pub password_hash: String,
    pub created: String,
    pub updated: String,
}

/// Payload for creating a new user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewUser {
    pub email: String,
    pub verified: bool,
    pub username: Username,
    pub name: String,
    pub profile: BTreeMap<String, String>,
    pub token_key: TokenKey,
    pub password_hash: String,
}

/// Payload for creating a new administrator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewAdmin {
    pub email: String,
    pub token_key: TokenKey,
    pub password_hash: String,
}

/// Audit log action types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Admin received a session token
    AdminLogin,
    /// User received a session token
    UserLogin,
    /// User record was created by header auth
    UserProvisioned,
}

impl AuditAction {
    pub fn as_str(&self) -> &str {
        match self {
            Self::AdminLogin => "admin_login",
            Self::UserLogin => "user_login",
            Self::UserProvisioned => "user_provisioned",
        }
    }
}

/// Persisted audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogRecord {
    /// The action that was performed
    pub action: String,
    /// Table of the subject (`admin` or `user`)
    pub subject_type: String,
    /// Key of the subject record
    pub subject_id: String,
    /// Additional context
    pub details: Option<Value>,
}

/// Payload for creating an audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogCreate {
    pub action: AuditAction,
    pub subject_type: String,
    pub subject_id: String,
    pub details: Option<Value>,
}
