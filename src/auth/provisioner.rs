//! Auto-provisioning of user records for header-authenticated callers.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::events::AuthHooks;
use super::extractor::ExtractedIdentity;
use super::tokens::generate_token_key;
use super::user_store::IdentityStore;
use crate::config::USERNAME_FIELD;
use crate::db::schema::{NewUser, UserRecord};
use crate::types::Username;
use crate::utils::{USERNAME_SUFFIX_ALPHABET, random_string_with_alphabet};

/// Prefix of generated usernames.
pub const GENERATED_USERNAME_PREFIX: &str = "users";

/// Length of the random part of a generated username base.
const GENERATED_USERNAME_SUFFIX_LEN: usize = 5;

/// Mapped fields that are never written from headers.
const PROTECTED_FIELDS: &[&str] = &["email", "verified", "token_key", "password_hash", "id"];

/// Creates and refreshes user records from extracted header identities.
///
/// Every failure is logged and swallowed; callers only ever see whether a
/// record came back.
pub struct UserProvisioner {
    store: Arc<dyn IdentityStore>,
    hooks: Arc<AuthHooks>,
}

impl UserProvisioner {
    pub fn new(store: Arc<dyn IdentityStore>, hooks: Arc<AuthHooks>) -> Self {
        Self { store, hooks }
    }

    /// Create a verified user for `extracted`.
    ///
    /// Returns `None` if persisting fails. When the create loses a race to a
    /// concurrent request for the same email, the winner's record is returned.
    pub async fn provision(&self, extracted: &ExtractedIdentity) -> Option<UserRecord> {
        let mut new_user = NewUser {
            email: extracted.email.clone(),
            verified: true,
            name: extracted.name.clone(),
            token_key: generate_token_key(),
            ..Default::default()
        };

        for (field, value) in &extracted.fields {
            if value.is_empty() || PROTECTED_FIELDS.contains(&field.as_str()) {
                continue;
            }
            match field.as_str() {
                USERNAME_FIELD => new_user.username = Username::new(value.clone()),
                "name" => new_user.name = value.clone(),
                _ => {
                    new_user.profile.insert(field.clone(), value.clone());
                }
            }
        }

        if new_user.username.is_empty() {
            let base = format!(
                "{GENERATED_USERNAME_PREFIX}{}",
                random_string_with_alphabet(GENERATED_USERNAME_SUFFIX_LEN, USERNAME_SUFFIX_ALPHABET)
            );
            new_user.username = match self.store.suggest_unique_username(&base).await {
                Ok(username) => username,
                Err(e) => {
                    warn!(email = %extracted.email, "Username suggestion failed, using base: {}", e);
                    Username::new(base)
                }
            };
        }

        match self.store.create_user(&new_user).await {
            Ok(user) => {
                info!(
                    email = %user.email,
                    username = %user.username,
                    "Provisioned user from proxy headers"
                );
                self.hooks.notify_provisioned(&user).await;
                Some(user)
            }
            Err(e) => self.recover_lost_create(extracted, e).await,
        }
    }

    /// A failed create may mean a concurrent request created the same email
    /// first; bind that record if it is there now.
    async fn recover_lost_create(
        &self,
        extracted: &ExtractedIdentity,
        err: anyhow::Error,
    ) -> Option<UserRecord> {
        match self.store.find_user_by_email(&extracted.email).await {
            Ok(Some(user)) => {
                debug!(email = %user.email, "User created concurrently, binding existing record");
                Some(user)
            }
            _ => {
                error!(email = %extracted.email, "Failed to provision user: {}", err);
                None
            }
        }
    }

    /// Bring an existing user's display name in line with the header.
    ///
    /// The record is returned even when the update cannot be persisted.
    pub async fn refresh(&self, mut user: UserRecord, extracted: &ExtractedIdentity) -> UserRecord {
        if extracted.name.is_empty() || extracted.name == user.name {
            return user;
        }

        match self.store.update_user_name(&user.id, &extracted.name).await {
            Ok(()) => {
                info!(email = %user.email, "Updated user name from proxy headers");
                user.name = extracted.name.clone();
            }
            Err(e) => {
                warn!(email = %user.email, "Failed to update user name: {}", e);
            }
        }
        user
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::auth::events::test_support::RecordingListener;
    use crate::auth::user_store::test_support::{InstrumentedStore, setup_test_store};

    fn extracted(email: &str, name: &str) -> ExtractedIdentity {
        ExtractedIdentity {
            email: email.to_string(),
            name: name.to_string(),
            fields: BTreeMap::new(),
        }
    }

    async fn provisioner() -> (UserProvisioner, Arc<InstrumentedStore>) {
        let store = Arc::new(InstrumentedStore::new(setup_test_store().await));
        let provisioner = UserProvisioner::new(store.clone(), Arc::new(AuthHooks::new()));
        (provisioner, store)
    }

    #[tokio::test]
    async fn test_provision_creates_verified_user() {
        let (provisioner, store) = provisioner().await;

        let user = provisioner.provision(&extracted("a@x.com", "Ann")).await.unwrap();
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.name, "Ann");
        assert!(user.verified);
        assert!(!user.token_key.is_empty());
        assert!(user.username.as_str().starts_with(GENERATED_USERNAME_PREFIX));
        assert_eq!(
            user.username.as_str().len(),
            GENERATED_USERNAME_PREFIX.len() + GENERATED_USERNAME_SUFFIX_LEN
        );
        assert_eq!(store.creates(), 1);
    }

    #[tokio::test]
    async fn test_provision_applies_mapped_fields() {
        let (provisioner, _store) = provisioner().await;
        let mut identity = extracted("a@x.com", "Ann");
        identity.fields = BTreeMap::from([
            (USERNAME_FIELD.to_string(), "ann".to_string()),
            ("department".to_string(), "R&D".to_string()),
            ("team".to_string(), String::new()),
            ("email".to_string(), "evil@x.com".to_string()),
        ]);

        let user = provisioner.provision(&identity).await.unwrap();
        assert_eq!(user.username.as_str(), "ann");
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.profile.get("department").map(String::as_str), Some("R&D"));
        assert!(!user.profile.contains_key("team"));
        assert!(!user.profile.contains_key("email"));
    }

    #[tokio::test]
    async fn test_provision_duplicate_email_binds_existing() {
        let (provisioner, store) = provisioner().await;

        let first = provisioner.provision(&extracted("a@x.com", "Ann")).await.unwrap();
        let second = provisioner.provision(&extracted("A@x.com", "Ann")).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.creates(), 2);
    }

    #[tokio::test]
    async fn test_provision_failure_returns_none() {
        let (provisioner, store) = provisioner().await;
        store.fail_creates.store(true, Ordering::SeqCst);

        assert!(provisioner.provision(&extracted("a@x.com", "Ann")).await.is_none());
        assert!(store.inner.find_user_by_email("a@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provision_notifies_listeners() {
        let store = setup_test_store().await;
        let recorder = RecordingListener::default();
        let hooks = Arc::new(AuthHooks::new().register(recorder.clone()));
        let provisioner = UserProvisioner::new(store, hooks);

        provisioner.provision(&extracted("a@x.com", "Ann")).await.unwrap();
        assert_eq!(recorder.provisioned(), vec!["a@x.com".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_renames_user() {
        let (provisioner, store) = provisioner().await;
        let user = provisioner.provision(&extracted("a@x.com", "Ann")).await.unwrap();

        let refreshed = provisioner.refresh(user.clone(), &extracted("a@x.com", "Annie")).await;
        assert_eq!(refreshed.name, "Annie");
        assert_eq!(store.updates(), 1);

        let stored = store.inner.find_user_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.name, "Annie");
    }

    #[tokio::test]
    async fn test_refresh_skips_same_or_empty_name() {
        let (provisioner, store) = provisioner().await;
        let user = provisioner.provision(&extracted("a@x.com", "Ann")).await.unwrap();

        provisioner.refresh(user.clone(), &extracted("a@x.com", "Ann")).await;
        provisioner.refresh(user, &extracted("a@x.com", "")).await;
        assert_eq!(store.updates(), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_record() {
        let (provisioner, store) = provisioner().await;
        let user = provisioner.provision(&extracted("a@x.com", "Ann")).await.unwrap();
        store.fail_updates.store(true, Ordering::SeqCst);

        let refreshed = provisioner.refresh(user.clone(), &extracted("a@x.com", "Annie")).await;
        assert_eq!(refreshed.id, user.id);
        assert_eq!(refreshed.name, "Ann");
    }
}
