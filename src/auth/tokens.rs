//! Session token issuance and verification.
//!
//! Tokens are HS256 JWTs. The signing key of each token is the subject
//! record's `token_key` followed by the application secret, so rotating a
//! record's key revokes every token issued for it without touching others.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Result, anyhow, bail};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::TokenConfig;
use crate::db::schema::{AdminRecord, UserRecord};
use crate::types::{RecordKey, TokenKey};
use crate::utils::random_string;

/// Collection id embedded in user tokens.
pub const USERS_COLLECTION: &str = "users";

/// Length of freshly generated record token keys.
pub const TOKEN_KEY_LENGTH: usize = 50;

/// Generate a fresh per-record token key.
pub fn generate_token_key() -> TokenKey {
    TokenKey::new(random_string(TOKEN_KEY_LENGTH))
}

/// Kind of subject a token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "authRecord")]
    AuthRecord,
}

/// JWT claims carried by every session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Record key of the subject
    pub id: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    #[serde(rename = "collectionId", default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

impl TokenClaims {
    /// Record key of the subject.
    pub fn record_key(&self) -> RecordKey {
        RecordKey::new(self.id.clone())
    }
}

/// Issues session tokens for resolved identities.
///
/// Password login and header auth share one issuer, so the tokens they
/// hand out are indistinguishable.
pub trait TokenIssuer: Send + Sync {
    fn issue_admin_token(&self, admin: &AdminRecord) -> Result<String>;

    fn issue_user_token(&self, user: &UserRecord) -> Result<String>;

    fn verify_admin_token(&self, token: &str, admin: &AdminRecord) -> Result<TokenClaims>;

    fn verify_user_token(&self, token: &str, user: &UserRecord) -> Result<TokenClaims>;
}

/// Read a token's claims without checking its signature.
///
/// Only used to find which record to load before verifying.
pub fn peek_claims(token: &str) -> Result<TokenClaims> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| anyhow!("malformed token"))?;
    let bytes = URL_SAFE_NO_PAD.decode(payload)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// HS256 token issuer.
pub struct JwtTokenIssuer {
    config: TokenConfig,
}

impl JwtTokenIssuer {
    pub fn new(config: TokenConfig) -> Self {
        Self { config }
    }

    fn signing_key(&self, token_key: &TokenKey) -> Vec<u8> {
        format!("{}{}", token_key, self.config.secret).into_bytes()
    }

    fn issue(&self, claims: &TokenClaims, token_key: &TokenKey) -> Result<String> {
        if token_key.is_empty() {
            bail!("record {} has no token key", claims.id);
        }
        let key = EncodingKey::from_secret(&self.signing_key(token_key));
        Ok(encode(&Header::new(Algorithm::HS256), claims, &key)?)
    }

    fn verify(
        &self,
        token: &str,
        token_key: &TokenKey,
        id: &RecordKey,
        expected: TokenType,
    ) -> Result<TokenClaims> {
        let key = DecodingKey::from_secret(&self.signing_key(token_key));
        let claims = decode::<TokenClaims>(token, &key, &Validation::new(Algorithm::HS256))?.claims;

        if claims.token_type != expected {
            bail!("unexpected token type {:?}", claims.token_type);
        }
        if claims.id != id.as_str() {
            bail!("token subject mismatch");
        }
        Ok(claims)
    }
}

fn expires_in(ttl_seconds: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    now + ttl_seconds
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue_admin_token(&self, admin: &AdminRecord) -> Result<String> {
        let claims = TokenClaims {
            id: admin.id.to_string(),
            token_type: TokenType::Admin,
            collection_id: None,
            exp: expires_in(self.config.admin_token_ttl_seconds),
        };
        self.issue(&claims, &admin.token_key)
    }

    fn issue_user_token(&self, user: &UserRecord) -> Result<String> {
        let claims = TokenClaims {
            id: user.id.to_string(),
            token_type: TokenType::AuthRecord,
            collection_id: Some(USERS_COLLECTION.to_string()),
            exp: expires_in(self.config.user_token_ttl_seconds),
        };
        self.issue(&claims, &user.token_key)
    }

    fn verify_admin_token(&self, token: &str, admin: &AdminRecord) -> Result<TokenClaims> {
        self.verify(token, &admin.token_key, &admin.id, TokenType::Admin)
    }

    fn verify_user_token(&self, token: &str, user: &UserRecord) -> Result<TokenClaims> {
        self.verify(token, &user.token_key, &user.id, TokenType::AuthRecord)
    }
}
