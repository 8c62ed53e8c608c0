use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("HEADER_AUTH_DB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("HEADER_AUTH_DB_NAMESPACE")
                .unwrap_or_else(|_| "header_auth".to_string()),
            database: env::var("HEADER_AUTH_DB_DATABASE")
                .unwrap_or_else(|_| "identity".to_string()),
            username: env::var("HEADER_AUTH_DB_USERNAME").ok(),
            password: env::var("HEADER_AUTH_DB_PASSWORD").ok(),
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

/// Define the identity tables and their uniqueness constraints.
///
/// Emails are stored lower-cased, so the unique index on `email` makes them
/// unique case-insensitively. Safe to run on every startup.
pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Administrators
        "DEFINE TABLE IF NOT EXISTS admin SCHEMAFULL;
         DEFINE FIELD IF NOT EXISTS email ON TABLE admin TYPE string;
         DEFINE FIELD IF NOT EXISTS avatar ON TABLE admin TYPE int DEFAULT 0;
         DEFINE FIELD IF NOT EXISTS token_key ON TABLE admin TYPE string;
         DEFINE FIELD IF NOT EXISTS password_hash ON TABLE admin TYPE string;
         DEFINE FIELD IF NOT EXISTS created ON TABLE admin TYPE string;
         DEFINE FIELD IF NOT EXISTS updated ON TABLE admin TYPE string;
         DEFINE INDEX IF NOT EXISTS admin_email ON TABLE admin COLUMNS email UNIQUE;",

        // Users; `profile` holds the extra provisioned fields
        "DEFINE TABLE IF NOT EXISTS user SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS email ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS email_visibility ON TABLE user TYPE bool DEFAULT false;
         DEFINE FIELD IF NOT EXISTS verified ON TABLE user TYPE bool DEFAULT false;
         DEFINE FIELD IF NOT EXISTS username ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS name ON TABLE user TYPE string DEFAULT '';
         DEFINE FIELD IF NOT EXISTS profile ON TABLE user TYPE object DEFAULT {};
         DEFINE FIELD IF NOT EXISTS token_key ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS password_hash ON TABLE user TYPE string DEFAULT '';
         DEFINE FIELD IF NOT EXISTS created ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS updated ON TABLE user TYPE string;
         DEFINE INDEX IF NOT EXISTS user_email ON TABLE user COLUMNS email UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_username ON TABLE user COLUMNS username UNIQUE;",

        // Auth audit trail
        "DEFINE TABLE IF NOT EXISTS audit_log SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE audit_log VALUE time::now();
         DEFINE INDEX IF NOT EXISTS audit_log_subject ON TABLE audit_log COLUMNS subject_id;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}
