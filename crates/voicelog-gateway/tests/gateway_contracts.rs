use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::Engine;
use http_body_util::BodyExt;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use wiremock::matchers::{body_partial_json, header as wm_header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voicelog_auth::prelude::JwkConfig;
use voicelog_gateway::config::{AuthConfig, CorsConfig, GatewayConfig, UpstreamConfig};
use voicelog_gateway::{app, AppState};
use voicelog_storage::prelude::AllowListEntry;
use voicelog_types::prelude::DomainId;

const ISSUER: &str = "https://issuer.test";
const AUDIENCE: &str = "voicelog";
const SECRET: &str = "contract-secret";
const LOCALHOST: &str = "http://localhost:5173";

fn jwk() -> JwkConfig {
    JwkConfig {
        kid: "hs-contract".into(),
        alg: Some("HS256".into()),
        kty: "oct".into(),
        n: None,
        e: None,
        k: Some(base64::engine::general_purpose::URL_SAFE.encode(SECRET)),
    }
}

fn test_config(dify_endpoint: &str) -> GatewayConfig {
    GatewayConfig {
        auth: AuthConfig {
            issuer: ISSUER.into(),
            audience: vec![AUDIENCE.into()],
            jwks_uri: None,
            static_keys: vec![jwk()],
            algorithms: vec!["HS256".into()],
        },
        cors: CorsConfig::default(),
        dify: UpstreamConfig {
            api_key: Some("wf-key".into()),
            endpoint: Some(dify_endpoint.into()),
            ..UpstreamConfig::default()
        },
        ..GatewayConfig::default()
    }
}

fn mint_token(sub: &str, email: &str) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let header = Header {
        alg: Algorithm::HS256,
        kid: Some("hs-contract".into()),
        ..Header::default()
    };
    let claims = json!({
        "sub": sub,
        "email": email,
        "name": "Alex",
        "iss": ISSUER,
        "aud": AUDIENCE,
        "exp": now + 600,
        "iat": now,
    });
    encode(&header, &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn state_for(server: &MockServer) -> AppState {
    let config = test_config(&format!("{}/v1/workflows/run", server.uri()));
    AppState::new(&config).unwrap()
}

fn post(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::ORIGIN, LOCALHOST)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::ORIGIN, LOCALHOST);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let server = MockServer::start().await;
    let router = app(state_for(&server).await);

    let response = router.oneshot(get("/api/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn preflight_reflects_allowed_origin() {
    let server = MockServer::start().await;
    let router = app(state_for(&server).await);

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/dify/send")
        .header(header::ORIGIN, LOCALHOST)
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        LOCALHOST
    );
}

#[tokio::test]
async fn preflight_withholds_origin_header_when_disallowed() {
    let server = MockServer::start().await;
    let router = app(state_for(&server).await);

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/api/dify/send")
        .header(header::ORIGIN, "https://evil.example")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn post_from_unknown_origin_is_forbidden() {
    let server = MockServer::start().await;
    let router = app(state_for(&server).await);

    let request = Request::builder()
        .method("POST")
        .uri("/api/dify/send")
        .header(header::ORIGIN, "https://evil.example")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn post_without_token_is_unauthenticated() {
    let server = MockServer::start().await;
    let router = app(state_for(&server).await);

    let response = router
        .oneshot(post(
            "/api/dify/send",
            None,
            json!({"department": "Ops", "rating": "4", "details": "x"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn wrong_method_is_rejected() {
    let server = MockServer::start().await;
    let router = app(state_for(&server).await);

    let token = mint_token("user-1", "alex@example.com");
    let response = router
        .oneshot(get("/api/dify/send", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn dify_send_end_to_end() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/workflows/run"))
        .and(wm_header("authorization", "Bearer wf-key"))
        .and(body_partial_json(json!({
            "inputs": {"name": "Ops", "feeling": "4", "what": "Shipped the release"},
            "response_mode": "blocking",
            "user": "user-1",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "outputs": {"output": "Good work"},
                "conversation_id": "c1",
                "message_id": "m1",
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let router = app(state_for(&server).await);
    let token = mint_token("user-1", "alex@example.com");

    let response = router
        .oneshot(post(
            "/api/dify/send",
            Some(&token),
            json!({"department": "Ops", "rating": "4", "details": "Shipped the release"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["text"], "Good work");
    assert_eq!(body["message"], "Good work");
    assert_eq!(body["conversationId"], "c1");
    assert_eq!(body["messageId"], "m1");
}

#[tokio::test]
async fn dify_send_rejects_missing_fields_without_upstream_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let router = app(state_for(&server).await);
    let token = mint_token("user-1", "alex@example.com");

    let response = router
        .oneshot(post(
            "/api/dify/send",
            Some(&token),
            json!({"department": "Ops", "rating": "4"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logs_roundtrip_counts_days() {
    let server = MockServer::start().await;
    let router = app(state_for(&server).await);
    let token = mint_token("user-7", "pat@example.com");

    let response = router
        .clone()
        .oneshot(post(
            "/api/logs",
            Some(&token),
            json!({
                "department": "Ops",
                "moodScore": 4,
                "moodReason": "Shipped the release",
                "llmFeeling": "energized",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert!(body["id"].as_str().is_some());

    let response = router
        .clone()
        .oneshot(get("/api/logs", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["days"], 1);
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);
    assert_eq!(body["entries"][0]["mood_score"], 4);

    let response = router
        .oneshot(get("/api/logs/calendar", Some(&token)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["days"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn logs_reject_out_of_range_score() {
    let server = MockServer::start().await;
    let router = app(state_for(&server).await);
    let token = mint_token("user-7", "pat@example.com");

    let response = router
        .oneshot(post(
            "/api/logs",
            Some(&token),
            json!({"department": "Ops", "moodScore": 9, "moodReason": "x"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn access_check_consults_allow_list() {
    let server = MockServer::start().await;
    let state = state_for(&server).await;
    state
        .allowlist()
        .add_users(
            &DomainId("acme".into()),
            vec![AllowListEntry {
                email: "Alex@Example.com".into(),
                name: "Alex".into(),
            }],
        )
        .await
        .unwrap();
    let router = app(state);

    let token = mint_token("user-1", "alex@example.com");
    let response = router
        .clone()
        .oneshot(post(
            "/api/access/check",
            Some(&token),
            json!({"domainId": "acme"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["user"]["name"], "Alex");

    let response = router
        .oneshot(post(
            "/api/access/check",
            Some(&token),
            json!({"domainId": "other"}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["allowed"], false);
}

#[tokio::test]
async fn domain_user_admin_roundtrip() {
    let server = MockServer::start().await;
    let router = app(state_for(&server).await);
    let token = mint_token("admin-1", "admin@example.com");

    let response = router
        .clone()
        .oneshot(post(
            "/api/domains/acme/users",
            Some(&token),
            json!({"users": [
                {"email": "a@acme.com", "name": "A"},
                {"email": "A@ACME.COM", "name": "dup"},
            ]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["added"], 1);
    assert_eq!(body["total"], 1);

    let response = router
        .clone()
        .oneshot(get("/api/domains/acme/users", Some(&token)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["users"].as_array().unwrap().len(), 1);

    let request = Request::builder()
        .method("DELETE")
        .uri("/api/domains/acme/users")
        .header(header::ORIGIN, LOCALHOST)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {token}"));
    let response = router
        .oneshot(
            request
                .body(Body::from(json!({"emails": ["a@acme.com"]}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["removed"], 1);
    assert_eq!(body["total"], 0);
}
