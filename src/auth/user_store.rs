//! Identity storage: administrator and user records.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;

use crate::db::Db;
use crate::db::schema::{AdminRecord, AuditLogCreate, AuditLogRecord, NewAdmin, NewUser, UserRecord};
use crate::types::{RecordKey, Username};
use crate::utils::{USERNAME_SUFFIX_ALPHABET, random_string_with_alphabet};

/// Number of suffixed candidates tried before falling back to a long suffix.
const USERNAME_SUGGEST_ATTEMPTS: usize = 10;

const ADMIN_FIELDS: &str =
    "record::id(id) AS id, email, avatar, token_key, password_hash, created, updated";

const USER_FIELDS: &str = "record::id(id) AS id, email, email_visibility, verified, username, \
     name, profile, token_key, password_hash, created, updated";

/// The system of record for administrators and users.
///
/// Header auth only ever reads admins; users may be created and renamed.
/// Uniqueness of emails and usernames is enforced here, not by callers.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_admin_by_email(&self, email: &str) -> Result<Option<AdminRecord>>;

    async fn find_admin_by_id(&self, id: &RecordKey) -> Result<Option<AdminRecord>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_user_by_id(&self, id: &RecordKey) -> Result<Option<UserRecord>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    /// Return `base` or a variant of it that no user currently holds.
    async fn suggest_unique_username(&self, base: &str) -> Result<Username>;

    /// Persist a new user. Fails if the email or username is taken.
    async fn create_user(&self, user: &NewUser) -> Result<UserRecord>;

    /// Change a user's display name.
    async fn update_user_name(&self, id: &RecordKey, name: &str) -> Result<()>;

    /// Persist a new administrator. Fails if the email is taken.
    async fn create_admin(&self, admin: &NewAdmin) -> Result<AdminRecord>;
}

/// Emails are compared and stored trimmed and lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// SurrealDB-backed identity store.
pub struct SurrealIdentityStore {
    db: Db,
}

impl SurrealIdentityStore {
    /// Create a new store over an initialised database.
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Get reference to the database.
    pub fn db(&self) -> &Db {
        &self.db
    }

    async fn select_one<T>(&self, query: String, key: &'static str, value: String) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut res = self.db.query(query).bind((key, value)).await?;
        let rows: Vec<T> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    /// Write an audit log entry.
    pub async fn audit_log(&self, entry: AuditLogCreate) -> Result<()> {
        let query = r#"
            CREATE audit_log CONTENT {
                action: $action,
                subject_type: $subject_type,
                subject_id: $subject_id,
                details: $details
            } RETURN NONE
        "#;

        self.db
            .query(query)
            .bind(("action", entry.action.as_str().to_string()))
            .bind(("subject_type", entry.subject_type))
            .bind(("subject_id", entry.subject_id))
            .bind(("details", entry.details))
            .await?
            .check()?;

        Ok(())
    }

    /// Get audit log entries for a subject, newest first.
    pub async fn audit_log_for(&self, subject_id: &str, limit: u32) -> Result<Vec<AuditLogRecord>> {
        let query = r#"
            SELECT action, subject_type, subject_id, details, created_at FROM audit_log
            WHERE subject_id = $subject_id
            ORDER BY created_at DESC
            LIMIT $limit
        "#;

        let mut res = self
            .db
            .query(query)
            .bind(("subject_id", subject_id.to_string()))
            .bind(("limit", limit))
            .await?;

        let logs: Vec<AuditLogRecord> = res.take(0)?;
        Ok(logs)
    }
}

#[async_trait]
impl IdentityStore for SurrealIdentityStore {
    async fn find_admin_by_email(&self, email: &str) -> Result<Option<AdminRecord>> {
        let query = format!("SELECT {ADMIN_FIELDS} FROM admin WHERE email = $email LIMIT 1");
        self.select_one(query, "email", normalize_email(email)).await
    }

    async fn find_admin_by_id(&self, id: &RecordKey) -> Result<Option<AdminRecord>> {
        let query = format!("SELECT {ADMIN_FIELDS} FROM type::thing('admin', $id)");
        self.select_one(query, "id", id.to_string()).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_FIELDS} FROM user WHERE email = $email LIMIT 1");
        self.select_one(query, "email", normalize_email(email)).await
    }

    async fn find_user_by_id(&self, id: &RecordKey) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_FIELDS} FROM type::thing('user', $id)");
        self.select_one(query, "id", id.to_string()).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_FIELDS} FROM user WHERE username = $username LIMIT 1");
        self.select_one(query, "username", username.to_string()).await
    }

    async fn suggest_unique_username(&self, base: &str) -> Result<Username> {
        let mut candidate = base.to_string();

        for attempt in 0..USERNAME_SUGGEST_ATTEMPTS {
            if self.find_user_by_username(&candidate).await?.is_none() {
                return Ok(Username::new(candidate));
            }
            candidate = format!(
                "{base}{}",
                random_string_with_alphabet(3 + attempt, USERNAME_SUFFIX_ALPHABET)
            );
        }

        Ok(Username::new(format!(
            "{base}{}",
            random_string_with_alphabet(USERNAME_SUGGEST_ATTEMPTS + 5, USERNAME_SUFFIX_ALPHABET)
        )))
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserRecord> {
        let id = RecordKey::new(uuid::Uuid::new_v4().simple().to_string());
        let now = Utc::now().to_rfc3339();

        let query = r#"
            CREATE type::thing('user', $id) CONTENT {
                email: $email,
                email_visibility: false,
                verified: $verified,
                username: $username,
                name: $name,
                profile: $profile,
                token_key: $token_key,
                password_hash: $password_hash,
                created: $now,
                updated: $now
            } RETURN NONE
        "#;

        self.db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("email", normalize_email(&user.email)))
            .bind(("verified", user.verified))
            .bind(("username", user.username.to_string()))
            .bind(("name", user.name.clone()))
            .bind(("profile", user.profile.clone()))
            .bind(("token_key", user.token_key.to_string()))
            .bind(("password_hash", user.password_hash.clone()))
            .bind(("now", now))
            .await?
            .check()?;

        self.find_user_by_id(&id)
            .await?
            .ok_or_else(|| anyhow!("user {} missing after create", id))
    }

    async fn update_user_name(&self, id: &RecordKey, name: &str) -> Result<()> {
        let query = r#"
            UPDATE type::thing('user', $id) SET
                name = $name,
                updated = $now
            RETURN NONE
        "#;

        self.db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("name", name.to_string()))
            .bind(("now", Utc::now().to_rfc3339()))
            .await?
            .check()?;

        Ok(())
    }

    async fn create_admin(&self, admin: &NewAdmin) -> Result<AdminRecord> {
        let id = RecordKey::new(uuid::Uuid::new_v4().simple().to_string());
        let now = Utc::now().to_rfc3339();

        let query = r#"
            CREATE type::thing('admin', $id) CONTENT {
                email: $email,
                avatar: 0,
                token_key: $token_key,
                password_hash: $password_hash,
                created: $now,
                updated: $now
            } RETURN NONE
        "#;

        self.db
            .query(query)
            .bind(("id", id.to_string()))
            .bind(("email", normalize_email(&admin.email)))
            .bind(("token_key", admin.token_key.to_string()))
            .bind(("password_hash", admin.password_hash.clone()))
            .bind(("now", now))
            .await?
            .check()?;

        self.find_admin_by_id(&id)
            .await?
            .ok_or_else(|| anyhow!("admin {} missing after create", id))
    }
}
