//! Router-level tests for header auth on top of the native endpoints.
//!
//! Tests drive the full application, normally built by `build_app`, with an
//! in-memory store wrapped to count calls and inject failures.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header::AUTHORIZATION, header::CONTENT_TYPE},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use super::{ADMIN_AUTH_PATH, AppState, HEALTH_PATH, ME_PATH, USER_AUTH_PATH, create_router};
use crate::auth::test_support::{FailingListener, InstrumentedStore, RecordingListener, setup_test_store};
use crate::auth::{
    AuthHooks, AuthMethod, IdentityStore, JwtTokenIssuer, TokenIssuer, generate_token_key,
    hash_password,
};
use crate::config::{HeaderAuthConfig, TokenConfig};
use crate::db::schema::{AdminRecord, NewAdmin, NewUser, UserRecord};
use crate::server::{HeaderAuth, build_app};
use crate::types::{TokenKey, Username};

const EMAIL_HEADER: &str = "X-Forwarded-Email";
const NAME_HEADER: &str = "X-Forwarded-User";

struct TestApp {
    router: Router,
    store: Arc<InstrumentedStore>,
    tokens: Arc<JwtTokenIssuer>,
    recorder: RecordingListener,
}

impl TestApp {
    async fn new(config: HeaderAuthConfig) -> Self {
        Self::with_hooks(config, AuthHooks::new()).await
    }

    async fn with_hooks(config: HeaderAuthConfig, hooks: AuthHooks) -> Self {
        Self::build(config, hooks, build_app).await
    }

    async fn build(
        config: HeaderAuthConfig,
        hooks: AuthHooks,
        app: fn(AppState, HeaderAuthConfig) -> Router,
    ) -> Self {
        let store = Arc::new(InstrumentedStore::new(setup_test_store().await));
        let tokens = Arc::new(JwtTokenIssuer::new(TokenConfig {
            secret: "test-secret".to_string(),
            admin_token_ttl_seconds: 3600,
            user_token_ttl_seconds: 3600,
        }));
        let recorder = RecordingListener::default();
        let hooks = Arc::new(hooks.register(recorder.clone()));

        let state = AppState::new(store.clone(), tokens.clone(), hooks);
        Self {
            router: app(state, config),
            store,
            tokens,
            recorder,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn seed_user(&self, email: &str, username: &str, password: &str) -> UserRecord {
        self.store
            .inner
            .create_user(&NewUser {
                email: email.to_string(),
                verified: true,
                username: Username::new(username),
                name: "Seeded".to_string(),
                token_key: generate_token_key(),
                password_hash: hash_password(password).unwrap(),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    async fn seed_admin(&self, email: &str, password: &str) -> AdminRecord {
        self.store
            .inner
            .create_admin(&NewAdmin {
                email: email.to_string(),
                token_key: generate_token_key(),
                password_hash: hash_password(password).unwrap(),
            })
            .await
            .unwrap()
    }
}

fn header_config() -> HeaderAuthConfig {
    HeaderAuthConfig {
        email_header: EMAIL_HEADER.to_string(),
        name_header: NAME_HEADER.to_string(),
        ..Default::default()
    }
}

fn auto_create_config() -> HeaderAuthConfig {
    HeaderAuthConfig {
        auto_create_user: true,
        ..header_config()
    }
}

fn get(path: &str, headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(path: &str, headers: &[(&str, &str)], body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn test_invalid_config_leaves_native_flow_untouched() {
    let app = TestApp::new(HeaderAuthConfig {
        email_header: EMAIL_HEADER.to_string(),
        auto_create_user: true,
        admin_login: true,
        ..Default::default()
    })
    .await;
    let user = app.seed_user("ann@x.com", "ann", "hunter22").await;

    let (status, body) = app
        .send(post_json(
            USER_AUTH_PATH,
            &[(EMAIL_HEADER, "other@x.com")],
            Some(json!({ "identity": "ann@x.com", "password": "hunter22" })),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["email"], "ann@x.com");
    let token = body["token"].as_str().unwrap();
    assert!(app.tokens.verify_user_token(token, &user).is_ok());

    // Only the native password lookup ran and nothing was provisioned
    assert_eq!(app.store.lookups(), 1);
    assert_eq!(app.store.creates(), 0);

    let (status, _) = app.send(get(ME_PATH, &[(EMAIL_HEADER, "ann@x.com")])).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_no_email_header_means_no_lookups() {
    let app = TestApp::new(HeaderAuthConfig {
        admin_login: true,
        ..auto_create_config()
    })
    .await;

    let (status, _) = app.send(get(HEALTH_PATH, &[(NAME_HEADER, "Ann")])).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send(get(ME_PATH, &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    assert_eq!(app.store.lookups(), 0);
    assert_eq!(app.store.creates(), 0);
}

#[tokio::test]
async fn test_new_user_is_provisioned_and_reported() {
    let app = TestApp::new(auto_create_config()).await;

    let (status, body) = app
        .send(get(ME_PATH, &[(EMAIL_HEADER, "a@x.com"), (NAME_HEADER, "Ann")]))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "a@x.com");
    assert_eq!(body["name"], "Ann");
    assert_eq!(body["verified"], true);
    assert!(!body["username"].as_str().unwrap().is_empty());
    assert!(body.get("token_key").is_none());

    let stored = app.store.inner.find_user_by_email("a@x.com").await.unwrap().unwrap();
    assert!(stored.verified);
    assert_eq!(stored.id.as_str(), body["id"].as_str().unwrap());
    assert_eq!(app.recorder.provisioned(), vec!["a@x.com".to_string()]);
}

#[tokio::test]
async fn test_repeat_requests_reuse_record() {
    let app = TestApp::new(auto_create_config()).await;
    let headers = [(EMAIL_HEADER, "a@x.com"), (NAME_HEADER, "Ann")];

    let (_, first) = app.send(get(ME_PATH, &headers)).await;
    let (_, second) = app.send(get(ME_PATH, &headers)).await;

    assert_eq!(first["id"], second["id"]);
    assert_eq!(app.store.creates(), 1);
}

#[tokio::test]
async fn test_no_auto_create_binds_nothing() {
    let app = TestApp::new(header_config()).await;

    let (status, body) = app
        .send(get(ME_PATH, &[(EMAIL_HEADER, "a@x.com"), (NAME_HEADER, "Ann")]))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
    assert_eq!(app.store.creates(), 0);
    assert!(app.store.inner.find_user_by_email("a@x.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_admin_shortcut_without_password() {
    let app = TestApp::new(HeaderAuthConfig {
        admin_login: true,
        ..header_config()
    })
    .await;
    let admin = app.seed_admin("root@x.com", "s3cret-pass").await;

    let (status, body) = app
        .send(post_json(ADMIN_AUTH_PATH, &[(EMAIL_HEADER, "root@x.com")], None))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["admin"]["email"], "root@x.com");
    assert_eq!(body["admin"]["id"], admin.id.as_str());
    let token = body["token"].as_str().unwrap();
    assert!(app.tokens.verify_admin_token(token, &admin).is_ok());

    assert_eq!(
        app.recorder.events(),
        vec![("root@x.com".to_string(), AuthMethod::Header)]
    );
}

#[tokio::test]
async fn test_admin_shortcut_requires_admin_login() {
    let app = TestApp::new(header_config()).await;
    app.seed_admin("root@x.com", "s3cret-pass").await;

    let (status, body) = app
        .send(post_json(ADMIN_AUTH_PATH, &[(EMAIL_HEADER, "root@x.com")], None))
        .await;

    // Falls through to the password handler, which rejects the empty body
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn test_me_prefers_admin() {
    let app = TestApp::new(HeaderAuthConfig {
        admin_login: true,
        ..auto_create_config()
    })
    .await;
    let admin = app.seed_admin("root@x.com", "s3cret-pass").await;

    let (_, body) = app
        .send(get(ME_PATH, &[(EMAIL_HEADER, "root@x.com"), (NAME_HEADER, "Root")]))
        .await;

    assert_eq!(body["id"], admin.id.as_str());
    assert!(body.get("username").is_none());
    // The user was still resolved independently
    assert!(app.store.inner.find_user_by_email("root@x.com").await.unwrap().is_some());
}

#[tokio::test]
async fn test_me_endpoint_can_be_skipped() {
    let app = TestApp::build(auto_create_config(), AuthHooks::new(), |state, config| {
        HeaderAuth::new(config)
            .without_me_endpoint()
            .install(create_router(state.clone()), &state)
    })
    .await;
    let headers = [(EMAIL_HEADER, "a@x.com"), (NAME_HEADER, "Ann")];

    let (status, _) = app.send(get(ME_PATH, &headers)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // Header auth itself is still installed
    let (status, body) = app
        .send(post_json(
            USER_AUTH_PATH,
            &headers,
            Some(json!({ "identity": "a@x.com", "password": "" })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["email"], "a@x.com");
}

#[tokio::test]
async fn test_user_shortcut_issues_valid_token() {
    let app = TestApp::new(auto_create_config()).await;

    let (status, body) = app
        .send(post_json(
            USER_AUTH_PATH,
            &[(EMAIL_HEADER, "a@x.com"), (NAME_HEADER, "Ann")],
            Some(json!({ "identity": "a@x.com", "password": "" })),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["email"], "a@x.com");

    let user = app.store.inner.find_user_by_email("a@x.com").await.unwrap().unwrap();
    let token = body["token"].as_str().unwrap();
    assert!(app.tokens.verify_user_token(token, &user).is_ok());

    // The issued token authenticates later requests on its own
    let (status, me) = app
        .send(get(ME_PATH, &[(AUTHORIZATION.as_str(), &format!("Bearer {token}"))]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"], user.id.as_str());
}

#[tokio::test]
async fn test_forced_email_wins_over_header() {
    let app = TestApp::new(HeaderAuthConfig {
        force_email: "f@x.com".to_string(),
        force_name: "Forced".to_string(),
        ..auto_create_config()
    })
    .await;

    let (_, body) = app
        .send(get(ME_PATH, &[(EMAIL_HEADER, "a@x.com"), (NAME_HEADER, "Ann")]))
        .await;

    assert_eq!(body["email"], "f@x.com");
    assert_eq!(body["name"], "Forced");
    assert!(app.store.inner.find_user_by_email("a@x.com").await.unwrap().is_none());
}

#[tokio::test]
async fn test_forced_values_alone_make_config_valid() {
    let app = TestApp::new(HeaderAuthConfig {
        force_email: "f@x.com".to_string(),
        force_name: "Forced".to_string(),
        force_username: "forced".to_string(),
        auto_create_user: true,
        ..Default::default()
    })
    .await;

    let (status, body) = app.send(get(ME_PATH, &[])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "f@x.com");
    assert_eq!(body["username"], "forced");
}

#[tokio::test]
async fn test_failed_create_degrades_to_anonymous() {
    let app = TestApp::new(auto_create_config()).await;
    app.store.fail_creates.store(true, Ordering::SeqCst);

    let (status, body) = app
        .send(get(ME_PATH, &[(EMAIL_HEADER, "a@x.com"), (NAME_HEADER, "Ann")]))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
    assert_eq!(app.store.creates(), 1);
}

#[tokio::test]
async fn test_failed_lookup_degrades_to_anonymous() {
    let app = TestApp::new(HeaderAuthConfig {
        admin_login: true,
        ..auto_create_config()
    })
    .await;
    app.store.fail_lookups.store(true, Ordering::SeqCst);

    let (status, body) = app
        .send(get(ME_PATH, &[(EMAIL_HEADER, "a@x.com"), (NAME_HEADER, "Ann")]))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
    assert_eq!(app.store.creates(), 0);
}

#[tokio::test]
async fn test_token_failure_falls_back_to_password_login() {
    let app = TestApp::new(header_config()).await;
    app.store
        .inner
        .create_user(&NewUser {
            email: "a@x.com".to_string(),
            username: Username::new("ann"),
            token_key: TokenKey::default(),
            password_hash: hash_password("hunter22").unwrap(),
            ..Default::default()
        })
        .await
        .unwrap();

    let (status, body) = app
        .send(post_json(
            USER_AUTH_PATH,
            &[(EMAIL_HEADER, "a@x.com")],
            Some(json!({ "identity": "a@x.com", "password": "wrong" })),
        ))
        .await;

    // The native handler ran and judged the password
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Failed to authenticate.");
    assert!(app.recorder.events().is_empty());
}

#[tokio::test]
async fn test_failing_listener_does_not_block_login() {
    let app = TestApp::with_hooks(
        HeaderAuthConfig {
            admin_login: true,
            ..header_config()
        },
        AuthHooks::new().register(FailingListener),
    )
    .await;
    app.seed_admin("root@x.com", "s3cret-pass").await;

    let (status, body) = app
        .send(post_json(ADMIN_AUTH_PATH, &[(EMAIL_HEADER, "root@x.com")], None))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
    assert_eq!(app.recorder.events().len(), 1);
}

#[tokio::test]
async fn test_native_login_by_username_and_wrong_password() {
    let app = TestApp::new(auto_create_config()).await;
    app.seed_user("ann@x.com", "ann", "hunter22").await;

    let (status, body) = app
        .send(post_json(
            USER_AUTH_PATH,
            &[],
            Some(json!({ "identity": "ann", "password": "hunter22" })),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record"]["username"], "ann");
    assert_eq!(
        app.recorder.events(),
        vec![("ann@x.com".to_string(), AuthMethod::Password)]
    );

    let (status, body) = app
        .send(post_json(
            USER_AUTH_PATH,
            &[],
            Some(json!({ "identity": "ann", "password": "nope" })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_native_admin_login_with_password() {
    let app = TestApp::new(header_config()).await;
    let admin = app.seed_admin("root@x.com", "s3cret-pass").await;

    let (status, body) = app
        .send(post_json(
            ADMIN_AUTH_PATH,
            &[],
            Some(json!({ "identity": "root@x.com", "password": "s3cret-pass" })),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap();
    assert!(app.tokens.verify_admin_token(token, &admin).is_ok());
}

#[tokio::test]
async fn test_invalid_bearer_token_is_anonymous() {
    let app = TestApp::new(header_config()).await;

    let (status, body) = app
        .send(get(ME_PATH, &[(AUTHORIZATION.as_str(), "Bearer not.a.token")]))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);
}
