//! Authentication: proxy header identities and native session tokens.
//!
//! A trusted reverse proxy asserts the caller's email (and name) in request
//! headers. This module turns those headers into stored identities:
//!
//! - **Extraction**: [`ExtractedIdentity::from_headers`] reads the configured
//!   headers, applying any forced dev-only values
//! - **Resolution**: [`IdentityResolver`] looks up the admin and user records
//!   for the email
//! - **Provisioning**: [`UserProvisioner`] creates a verified user when none
//!   exists and auto-creation is enabled
//!
//! Tokens issued for header identities come from the same [`TokenIssuer`] as
//! password logins, and both paths announce them through [`AuthHooks`].
//!
//! ## Failure model
//!
//! Nothing in here turns a store failure into a request error. A failed
//! lookup or create simply leaves the identity unbound, so the request
//! proceeds as anonymous.
//!
//! ## Usage
//!
//! ```ignore
//! let resolver = IdentityResolver::new(store, hooks, Arc::new(config.clone()));
//! let extracted = ExtractedIdentity::from_headers(req.headers(), &config);
//! let ctx = resolver.resolve(&extracted).await;
//! if let Some(identity) = ctx.primary() {
//!     println!("{} {}", identity.kind(), identity.email());
//! }
//! ```

mod context;
mod events;
mod extractor;
mod password;
mod provisioner;
mod resolver;
mod tokens;
mod user_store;

pub use context::{AuthContext, Identity};
pub use events::{AuditLogListener, AuthEvent, AuthHooks, AuthListener, AuthMethod};
pub use extractor::ExtractedIdentity;
pub use password::{hash_password, verify_password};
pub use provisioner::{GENERATED_USERNAME_PREFIX, UserProvisioner};
pub use resolver::IdentityResolver;
pub use tokens::{
    JwtTokenIssuer, TOKEN_KEY_LENGTH, TokenClaims, TokenIssuer, TokenType, USERS_COLLECTION,
    generate_token_key, peek_claims,
};
pub use user_store::{IdentityStore, SurrealIdentityStore, normalize_email};
