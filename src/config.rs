use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;

/// Target field that the forced username override writes to.
pub const USERNAME_FIELD: &str = "username";

/// Header auth configuration.
///
/// Built once at startup and shared read-only by every request. When
/// [`HeaderAuthConfig::is_valid`] is false the feature is not installed at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderAuthConfig {
    /// Header carrying the caller's email address
    #[serde(default)]
    pub email_header: String,
    /// Header carrying the caller's display name
    #[serde(default)]
    pub name_header: String,
    /// Look up administrators by the header email as well as users
    #[serde(default)]
    pub admin_login: bool,
    /// Create a user record when none matches the header email
    #[serde(default)]
    pub auto_create_user: bool,
    /// Target user field -> source header, applied when provisioning
    #[serde(default)]
    pub auto_create_field_mapping: BTreeMap<String, String>,
    /// Dev only: replaces the header email unconditionally
    #[serde(default)]
    pub force_email: String,
    /// Dev only: replaces the header name unconditionally
    #[serde(default)]
    pub force_name: String,
    /// Dev only: replaces the mapped username unconditionally
    #[serde(default)]
    pub force_username: String,
}

impl HeaderAuthConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Flags are true for any non-empty value. `HEADER_AUTH_FIELDS` holds
    /// extra `field=Header` pairs separated by commas.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).unwrap_or_default();
        let flag = |key: &str| !get(key).is_empty();

        let mut mapping = parse_field_mapping(&get("HEADER_AUTH_FIELDS"));
        let username_header = get("HEADER_AUTH_USERNAME");
        if !username_header.is_empty() {
            mapping.insert(USERNAME_FIELD.to_string(), username_header);
        }

        Self {
            email_header: get("HEADER_AUTH_EMAIL"),
            name_header: get("HEADER_AUTH_NAME"),
            admin_login: flag("HEADER_AUTH_ADMIN_LOGIN"),
            auto_create_user: flag("AUTO_CREATE_USER"),
            auto_create_field_mapping: mapping,
            force_email: get("FORCE_EMAIL"),
            force_name: get("FORCE_NAME"),
            force_username: get("FORCE_USERNAME"),
        }
    }

    /// Whether the configuration is complete enough to install header auth.
    ///
    /// Either both headers are named, or both dev overrides are set.
    pub fn is_valid(&self) -> bool {
        if !self.email_header.is_empty() && !self.name_header.is_empty() {
            return true;
        }

        !self.force_email.is_empty() && !self.force_name.is_empty()
    }

    /// Whether any dev-only override is in effect.
    pub fn has_overrides(&self) -> bool {
        !self.force_email.is_empty() || !self.force_name.is_empty() || !self.force_username.is_empty()
    }
}

fn parse_field_mapping(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (field, header) = pair.split_once('=')?;
            let (field, header) = (field.trim(), header.trim());
            if field.is_empty() || header.is_empty() {
                return None;
            }
            Some((field.to_string(), header.to_string()))
        })
        .collect()
}

/// Session token settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Application secret mixed with each record's token key
    pub secret: String,
    /// Lifetime of admin tokens in seconds
    pub admin_token_ttl_seconds: u64,
    /// Lifetime of user tokens in seconds
    pub user_token_ttl_seconds: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: env::var("HEADER_AUTH_TOKEN_SECRET").unwrap_or_default(),
            admin_token_ttl_seconds: 14 * 24 * 3600,
            user_token_ttl_seconds: 14 * 24 * 3600,
        }
    }
}
