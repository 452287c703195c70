use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde_json::{Value, json};
use tower::ServiceExt;

use token_authority::api::create_router;
use token_authority::issuer::{Claims, FixedClock, TOKEN_TTL_SECONDS};
use token_authority::keys::JwkSet;
use token_authority::types::KeyId;
use token_authority::{
    DatabaseConfig, HashCost, KeySet, PasswordHasher, SurrealCredentialStore, TokenIssuer,
    create_connection, ensure_schema,
};

const PRIVATE_PEM: &[u8] = include_bytes!("fixtures/signing.pem");
const PUBLIC_PEM: &[u8] = include_bytes!("fixtures/signing.pub.pem");

struct TestApp {
    router: Router,
    issued_at: DateTime<Utc>,
}

impl TestApp {
    async fn new() -> Self {
        let config = DatabaseConfig {
            url: "memory".to_string(),
            ..Default::default()
        };
        let db = create_connection(config).await.unwrap();
        ensure_schema(&db).await.unwrap();

        let keys = KeySet::from_pem(KeyId::new("test-key"), PRIVATE_PEM, PUBLIC_PEM).unwrap();
        let hasher = PasswordHasher::new(HashCost {
            memory_kib: 64,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();

        // Truncate to whole seconds so it matches the claim precision.
        let issued_at = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
        let issuer = TokenIssuer::new(
            Arc::new(SurrealCredentialStore::new(db)),
            Arc::new(keys),
            "test-authority",
        )
        .with_hasher(hasher)
        .with_clock(Arc::new(FixedClock(issued_at)));

        Self {
            router: create_router(Arc::new(issuer)),
            issued_at,
        }
    }

    async fn call(&self, path: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let (status, bytes) = self.call(path, &body.to_string()).await;
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn create_project(&self, id: &str) -> String {
        let (status, body) = self
            .post(
                "/create_project",
                json!({"projectName": "Demo", "projectId": id}),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["data"]["secret"].as_str().unwrap().to_string()
    }

    async fn register(
        &self,
        project: &str,
        secret: &str,
        username: &str,
        password: &str,
    ) -> (StatusCode, Value) {
        self.post(
            "/register",
            json!({
                "username": username,
                "userPass": password,
                "projectId": project,
                "projectSecret": secret,
            }),
        )
        .await
    }

    async fn fetch_token(
        &self,
        project: &str,
        secret: &str,
        username: &str,
        password: &str,
    ) -> (StatusCode, Value) {
        self.post(
            "/fetch_token",
            json!({
                "username": username,
                "userPass": password,
                "projectId": project,
                "projectSecret": secret,
            }),
        )
        .await
    }
}

#[tokio::test]
async fn test_create_project() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post(
            "/create_project",
            json!({"projectName": "Demo", "projectId": "p1"}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["projectId"], "p1");
    assert_eq!(body["data"]["projectName"], "Demo");

    let secret = body["data"]["secret"].as_str().unwrap();
    assert_eq!(secret.len(), 32);
    assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
}

#[tokio::test]
async fn test_create_project_twice() {
    let app = TestApp::new().await;
    app.create_project("p1").await;

    let (status, body) = app
        .post(
            "/create_project",
            json!({"projectName": "Other", "projectId": "p1"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 3);
    assert_eq!(body["msg"], "project already exists");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_validation_failure_uses_code_one() {
    let app = TestApp::new().await;
    let (status, body) = app
        .post(
            "/create_project",
            json!({"projectName": "Demo", "projectId": "abcdefghijklmnopq"}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1);
    assert_eq!(body["msg"], "projectId must be between 1 and 16 characters");
}

#[tokio::test]
async fn test_malformed_json() {
    let app = TestApp::new().await;
    let (status, bytes) = app.call("/register", "{not json").await;
    let body: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 1);
}

#[tokio::test]
async fn test_register() {
    let app = TestApp::new().await;
    let secret = app.create_project("p1").await;

    let (status, body) = app.register("p1", &secret, "alice", "secret1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"msg": "ok", "code": 0}));
}

#[tokio::test]
async fn test_register_twice() {
    let app = TestApp::new().await;
    let secret = app.create_project("p1").await;
    app.register("p1", &secret, "alice", "secret1").await;

    let (status, body) = app.register("p1", &secret, "alice", "secret2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 3);
    assert_eq!(body["msg"], "user already exists");
}

#[tokio::test]
async fn test_register_wrong_secret() {
    let app = TestApp::new().await;
    app.create_project("p1").await;

    let (status, body) = app.register("p1", "not-the-secret", "alice", "secret1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 3);
    assert_eq!(body["msg"], "invalid project credentials");

    let (_, unknown) = app.register("ghost", "whatever", "alice", "secret1").await;
    assert_eq!(unknown, body);
}

#[tokio::test]
async fn test_fetch_token() {
    let app = TestApp::new().await;
    let secret = app.create_project("p1").await;
    app.register("p1", &secret, "alice", "secret1").await;

    let (status, body) = app.fetch_token("p1", &secret, "alice", "secret1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["code"], 0);
    let token = body["data"]["token"].as_str().unwrap();

    let header = decode_header(token).unwrap();
    assert_eq!(header.alg, Algorithm::RS256);
    assert_eq!(header.kid.as_deref(), Some("test-key"));

    // Verify using only what /jwk publishes.
    let (status, jwk_bytes) = app.call("/jwk", "").await;
    assert_eq!(status, StatusCode::OK);
    let set: JwkSet = serde_json::from_slice(&jwk_bytes).unwrap();
    let jwk = set.find("test-key").unwrap();

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&["p1"]);
    validation.set_issuer(&["test-authority"]);
    let claims = decode::<Claims>(token, &jwk.decoding_key().unwrap(), &validation)
        .unwrap()
        .claims;

    assert_eq!(claims.aud, "p1");
    assert_eq!(claims.iss, "test-authority");
    assert!(!claims.sub.is_empty());
    assert_ne!(claims.sub, "alice");
    assert_eq!(claims.iat, app.issued_at.timestamp());
    assert_eq!(claims.exp, app.issued_at.timestamp() + TOKEN_TTL_SECONDS);
}

#[tokio::test]
async fn test_fetch_token_wrong_password() {
    let app = TestApp::new().await;
    let secret = app.create_project("p1").await;
    app.register("p1", &secret, "alice", "secret1").await;

    let (status, body) = app.fetch_token("p1", &secret, "alice", "secret2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 3);
    assert!(body.get("data").is_none());

    let (_, unknown_user) = app.fetch_token("p1", &secret, "bob", "secret1").await;
    assert_eq!(unknown_user, body);
}

#[tokio::test]
async fn test_same_subject_across_tokens() {
    let app = TestApp::new().await;
    let secret = app.create_project("p1").await;
    app.register("p1", &secret, "alice", "secret1").await;

    let (_, first) = app.fetch_token("p1", &secret, "alice", "secret1").await;
    let (_, second) = app.fetch_token("p1", &secret, "alice", "secret1").await;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&["p1"]);
    let keys = KeySet::from_pem(KeyId::new("test-key"), PRIVATE_PEM, PUBLIC_PEM).unwrap();
    let subject = |body: &Value| {
        let claims: Claims = keys
            .verify(body["data"]["token"].as_str().unwrap(), &validation)
            .unwrap();
        claims.sub
    };
    assert_eq!(subject(&first), subject(&second));
}

#[tokio::test]
async fn test_refresh_token_not_supported() {
    let app = TestApp::new().await;
    let secret = app.create_project("p1").await;

    let (status, body) = app
        .post(
            "/refresh_token",
            json!({"projectId": "p1", "projectSecret": secret, "refreshToken": "abc"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 3);
    assert_eq!(body["msg"], "refresh tokens are not supported");
}

#[tokio::test]
async fn test_jwk_document() {
    let app = TestApp::new().await;
    let (status, bytes) = app.call("/jwk", "").await;
    assert_eq!(status, StatusCode::OK);

    let doc: Value = serde_json::from_slice(&bytes).unwrap();
    let key = &doc["keys"][0];
    assert_eq!(key["kty"], "RSA");
    assert_eq!(key["alg"], "RS256");
    assert_eq!(key["kid"], "test-key");
    assert!(key.get("d").is_none());

    let (_, again) = app.call("/jwk", "").await;
    assert_eq!(bytes, again);
}

#[tokio::test]
async fn test_unknown_path() {
    let app = TestApp::new().await;
    let (status, _) = app.call("/nope", "{}").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new().await;
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
}
