//! Identity attributes extracted from proxy-injected headers.

use std::collections::BTreeMap;

use http::HeaderMap;

use crate::config::{HeaderAuthConfig, USERNAME_FIELD};

/// Candidate identity attributes for one request.
///
/// Missing headers show up as empty strings; this is never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedIdentity {
    pub email: String,
    pub name: String,
    /// Target field -> header value, from the field mapping
    pub fields: BTreeMap<String, String>,
}

impl ExtractedIdentity {
    /// Extract identity attributes from request headers.
    ///
    /// Dev-only overrides in `config` replace header values unconditionally.
    pub fn from_headers(headers: &HeaderMap, config: &HeaderAuthConfig) -> Self {
        let email = forced_or(&config.force_email, || header_value(headers, &config.email_header));
        let name = forced_or(&config.force_name, || header_value(headers, &config.name_header));

        let mut fields: BTreeMap<String, String> = config
            .auto_create_field_mapping
            .iter()
            .map(|(field, header)| (field.clone(), header_value(headers, header)))
            .collect();

        if !config.force_username.is_empty() {
            fields.insert(USERNAME_FIELD.to_string(), config.force_username.clone());
        }

        Self { email, name, fields }
    }

    /// Whether the request asserted an identity at all.
    pub fn has_email(&self) -> bool {
        !self.email.is_empty()
    }

    /// Mapped username, if one was supplied and non-empty.
    pub fn username(&self) -> Option<&str> {
        self.fields
            .get(USERNAME_FIELD)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

fn forced_or(forced: &str, header: impl FnOnce() -> String) -> String {
    if forced.is_empty() {
        header()
    } else {
        forced.to_string()
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}
