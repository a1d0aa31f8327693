use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use donation_backend::{
    AppState,
    config::Config,
    database::{MemoryStore, NewUser, Store},
    lookups::Lookups,
    models::Role,
    router::build_router,
    services::{MailError, MailMessage, Mailer},
    utils::hash_password,
};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tower::ServiceExt;

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<MailMessage>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        self.sent.lock().await.push(message);
        Ok(())
    }
}

struct TestApp {
    router: Router,
    store: Arc<dyn Store>,
    mailer: Arc<RecordingMailer>,
}

impl TestApp {
    async fn new() -> Self {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let lookups = Lookups::load(store.as_ref()).await.expect("load lookups");
        let config = Config {
            bcrypt_cost: 4,
            logistics_simulation: false,
            ..Config::default()
        };
        let mailer = Arc::new(RecordingMailer::default());
        let state = AppState::new(store.clone(), config, lookups, mailer.clone());
        Self {
            router: build_router(state),
            store,
            mailer,
        }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    async fn seed_user(&self, username: &str, password: Option<&str>, role: Role) {
        let mut tx = self.store.begin().await.expect("begin");
        tx.insert_user(NewUser {
            email: format!("{}@example.com", username),
            username: username.to_string(),
            password_hash: password.map(|p| hash_password(p, 4).expect("hash")),
            google_id: password.is_none().then(|| format!("google-{}", username)),
            role_id: role.id(),
            profile_url: None,
        })
        .await
        .expect("insert user");
        tx.commit().await.expect("commit");
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["resp_data"]["token"]
            .as_str()
            .expect("token")
            .to_string()
    }
}

async fn register_donor(app: &TestApp) -> String {
    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "email": "donor@example.com",
                "username": "donor",
                "password": "secret123"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
    assert_eq!(body["code"], 0);
    assert_eq!(body["resp_data"]["role_id"], 1);
    assert!(body["resp_data"].get("password_hash").is_none());
    app.login("donor@example.com", "secret123").await
}

#[tokio::test]
async fn donation_lifecycle_end_to_end() {
    let app = TestApp::new().await;
    let donor = register_donor(&app).await;
    app.seed_user("staff", Some("staffpass"), Role::CharityStaff)
        .await;
    app.seed_user("admin", Some("adminpass"), Role::Administrator)
        .await;
    let staff = app.login("staff@example.com", "staffpass").await;
    let admin = app.login("admin@example.com", "adminpass").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/add-donation",
            Some(&donor),
            Some(json!({
                "title": "Striped shirt",
                "category_id": 1,
                "size_id": 2,
                "images": ["shirt-front.jpg", "shirt-back.jpg"]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let donation = &body["resp_data"];
    assert_eq!(donation["status_id"], 1);
    assert_eq!(donation["weight"], 0.3);
    assert_eq!(donation["co2_saved"], 2.7);
    assert_eq!(donation["photo_url"], "shirt-front.jpg");
    let id = donation["donation_id"].as_i64().expect("donation id");

    let (status, body) = app
        .call(Method::GET, "/api/staff-donations", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["count"], 0);

    let (status, body) = app
        .call(Method::GET, "/api/staff-donations", Some(&staff), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 1003);

    let uri = format!("/api/update-donation-status?donationId={}", id);
    let (status, body) = app
        .call(Method::PATCH, &uri, Some(&staff), Some(json!({ "status_id": 3 })))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["resp_data"]["status_name"], "Received at Charity");

    let (_, body) = app
        .call(Method::GET, "/api/staff-donations", Some(&admin), None)
        .await;
    assert_eq!(body["resp_data"]["count"], 1);
    assert_eq!(body["resp_data"]["items"][0]["donation_id"], id);

    let (status, body) = app
        .call(Method::PATCH, &uri, Some(&staff), Some(json!({ "status_id": 2 })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 1006);

    let (_, body) = app
        .call(Method::GET, "/api/fetch-notifications", Some(&donor), None)
        .await;
    assert_eq!(body["resp_data"]["count"], 1);
    let notification_id = body["resp_data"]["items"][0]["notification_id"]
        .as_i64()
        .expect("notification id");

    let (status, _) = app
        .call(
            Method::PATCH,
            &format!("/api/update-notification?notificationId={}", notification_id),
            Some(&donor),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app
        .call(Method::GET, "/api/fetch-notifications", Some(&donor), None)
        .await;
    assert_eq!(body["resp_data"]["count"], 0);

    let (_, body) = app
        .call(
            Method::GET,
            &format!("/api/donation-images?donationId={}", id),
            Some(&donor),
            None,
        )
        .await;
    assert_eq!(body["resp_data"]["count"], 2);

    let (_, body) = app
        .call(Method::GET, "/api/fetch-donationcount", Some(&donor), None)
        .await;
    assert_eq!(body["resp_data"]["total_donations"], 1);

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/delete-donation?donationId={}", id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app
        .call(Method::GET, "/api/fetch-donations", Some(&donor), None)
        .await;
    assert_eq!(body["resp_data"]["count"], 0);
}

#[tokio::test]
async fn guard_rejects_missing_bad_and_wrong_role_tokens() {
    let app = TestApp::new().await;
    let donor = register_donor(&app).await;

    let (status, body) = app
        .call(Method::GET, "/api/fetch-donations", None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], 1002);

    let (status, body) = app
        .call(Method::GET, "/api/fetch-donations", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["msg"], "Invalid or expired token");

    let (status, body) = app
        .call(Method::GET, "/api/staff-donations", Some(&donor), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], 1003);

    let (status, _) = app
        .call(Method::GET, "/api/fetch-users", Some(&donor), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn donors_cannot_probe_other_donations() {
    let app = TestApp::new().await;
    let donor = register_donor(&app).await;
    app.seed_user("other", Some("otherpass"), Role::Donor).await;
    let other = app.login("other@example.com", "otherpass").await;

    let (_, body) = app
        .call(
            Method::POST,
            "/api/add-donation",
            Some(&donor),
            Some(json!({ "title": "Parka", "category_id": 3, "size_id": 3 })),
        )
        .await;
    assert_eq!(body["resp_data"]["weight"], 1.2);
    assert_eq!(body["resp_data"]["co2_saved"], 10.8);
    let id = body["resp_data"]["donation_id"].as_i64().expect("id");

    for probe in [id, id + 1000] {
        let (status, _) = app
            .call(
                Method::GET,
                &format!("/api/fetch-donation?donationId={}", probe),
                Some(&other),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let (status, body) = app
        .call(Method::GET, "/api/fetch-donation", Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1000);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let app = TestApp::new().await;
    register_donor(&app).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "donor@example.com", "username": "fresh", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["msg"], "Email already registered");

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "fresh@example.com", "username": "donor", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["msg"], "Username already taken");

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({ "email": "fresh@example.com", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn external_only_account_gets_distinct_login_error() {
    let app = TestApp::new().await;
    app.seed_user("gina", None, Role::Donor).await;

    let (status, external) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "gina@example.com", "password": "whatever" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    register_donor(&app).await;
    let (status, wrong) = app
        .call(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "donor@example.com", "password": "wrongpass" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_ne!(external["msg"], wrong["msg"]);
}

#[tokio::test]
async fn password_reset_via_mailed_token() {
    let app = TestApp::new().await;
    register_donor(&app).await;

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/forgot-password",
            None,
            Some(json!({ "email": "donor@example.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let token = {
        let sent = app.mailer.sent.lock().await;
        assert_eq!(sent.len(), 1);
        let body = &sent[0].body;
        let start = body.find("token=").expect("link in mail") + "token=".len();
        body[start..start + 64].to_string()
    };

    let (status, _) = app
        .call(
            Method::POST,
            "/api/auth/reset-password",
            None,
            Some(json!({ "token": token, "new_password": "changed123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    app.login("donor@example.com", "changed123").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/reset-password",
            None,
            Some(json!({ "token": token, "new_password": "again1234" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["msg"], "Invalid or expired reset token");
}

#[tokio::test]
async fn public_endpoints_need_no_token() {
    let app = TestApp::new().await;

    let (status, body) = app.call(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["status"], "ok");

    let (status, body) = app
        .call(Method::GET, "/api/donation-options", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["categories"][2]["name"], "Outerwear");
    assert_eq!(body["resp_data"]["statuses"].as_array().map(Vec::len), Some(5));

    let (status, _) = app.call(Method::GET, "/api/auth/google", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_manages_users_in_batches() {
    let app = TestApp::new().await;
    app.seed_user("admin", Some("adminpass"), Role::Administrator)
        .await;
    let admin = app.login("admin@example.com", "adminpass").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/create-users",
            Some(&admin),
            Some(json!({ "users": [
                { "email": "s1@example.com", "username": "staff1", "password": "staffpass", "role_id": 2 },
                { "email": "d1@example.com", "username": "donor1", "password": "donorpass" }
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["resp_data"]["items"][1]["role_id"], 1);
    let staff_id = body["resp_data"]["items"][0]["user_id"].as_i64().expect("id");

    let (status, _) = app
        .call(
            Method::PUT,
            "/api/update-users",
            Some(&admin),
            Some(json!({ "users": [{ "user_id": staff_id, "username": "donor1" }] })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .call(
            Method::DELETE,
            "/api/delete-users",
            Some(&admin),
            Some(json!({ "user_ids": [staff_id] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["deleted"], 1);

    let (_, body) = app
        .call(Method::GET, "/api/fetch-users", Some(&admin), None)
        .await;
    assert_eq!(body["resp_data"]["count"], 2);
}
