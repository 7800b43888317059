//! STS token manager, token exchanger and GCE credential fetcher against mocked
//! HTTP endpoints.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use meshguard::credentials::{CredFetcher, GceCredFetcher, GCE};
use meshguard::secrets::SecretString;
use meshguard::tokens::{
    StsRequestParameters, StsResponseParameters, StsTokenExchanger, StsTokenManager, TokenError,
    TokenExchanger, TokenManager, JWT_TOKEN_TYPE,
};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sts_response(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "issued_token_type": "urn:ietf:params:oauth:token-type:access_token",
        "token_type": "Bearer",
        "expires_in": 3600,
    })
}

async fn sts_server(access_token: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/token"))
        .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Atoken-exchange"))
        .and(body_string_contains("subject_token=k8s-jwt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(sts_response(access_token)))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn sts_exchange_returns_response_and_records_status() {
    let server = sts_server("access-123").await;
    let manager = StsTokenManager::new(&format!("{}/v1/token", server.uri())).unwrap();

    let request = StsRequestParameters::token_exchange("k8s-jwt", JWT_TOKEN_TYPE);
    let body = manager.generate_token(&request).await.unwrap();
    let response: StsResponseParameters = serde_json::from_slice(&body).unwrap();
    assert_eq!(response.access_token, "access-123");
    assert_eq!(response.expires_in, 3600);

    let dump: Value = serde_json::from_slice(&manager.dump_token_status().await.unwrap()).unwrap();
    let tokens = dump["tokens"].as_array().unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0]["token_type"], "urn:ietf:params:oauth:token-type:access_token");
    assert!(tokens[0]["expire_time"].is_string());
}

#[tokio::test]
async fn sts_error_status_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .expect(1)
        .mount(&server)
        .await;
    let manager = StsTokenManager::new(&server.uri()).unwrap();

    let request = StsRequestParameters::token_exchange("k8s-jwt", JWT_TOKEN_TYPE);
    let err = manager.generate_token(&request).await.unwrap_err();
    match &err {
        TokenError::Status { status, body } => {
            assert_eq!(*status, 503);
            assert_eq!(body, "try later");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
async fn sts_out_of_range_lifetime_is_rejected() {
    let server = MockServer::start().await;
    let mut body = sts_response("access-huge");
    body["expires_in"] = json!(i64::MAX);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;
    let manager = StsTokenManager::new(&server.uri()).unwrap();

    let request = StsRequestParameters::token_exchange("k8s-jwt", JWT_TOKEN_TYPE);
    let err = manager.generate_token(&request).await.unwrap_err();
    assert!(matches!(err, TokenError::InvalidResponse { .. }), "unexpected error: {err}");

    let dump: Value = serde_json::from_slice(&manager.dump_token_status().await.unwrap()).unwrap();
    assert!(dump["tokens"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn exchanger_extracts_access_token() {
    let server = sts_server("access-xyz").await;
    let manager = Arc::new(StsTokenManager::new(&format!("{}/v1/token", server.uri())).unwrap());
    let exchanger = StsTokenExchanger::new(manager).with_audience("istio-ca");

    let token = exchanger.exchange_token(&SecretString::new("k8s-jwt")).await.unwrap();
    assert_eq!(token.expose_secret(), "access-xyz");

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(body.contains("audience=istio-ca"));
}

fn identity_token(exp_offset_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#);
    let exp = chrono::Utc::now().timestamp() + exp_offset_secs;
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"aud":"cluster.local","exp":{}}}"#, exp));
    format!("{}.{}.sig", header, payload)
}

async fn metadata_server(token: &str, expected_calls: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/computeMetadata/v1/instance/service-accounts/default/identity"))
        .and(header("Metadata-Flavor", "Google"))
        .and(query_param("audience", "cluster.local"))
        .and(query_param("format", "full"))
        .respond_with(ResponseTemplate::new(200).set_body_string(token))
        .expect(expected_calls)
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn gce_fetcher_caches_fresh_tokens() {
    let token = identity_token(3600);
    let server = metadata_server(&token, 1).await;
    let fetcher = GceCredFetcher::new("cluster.local", GCE).with_base_url(server.uri());

    let first = fetcher.get_platform_credential().await.unwrap();
    let second = fetcher.get_platform_credential().await.unwrap();
    assert_eq!(first.expose_secret(), token);
    assert_eq!(first, second);
    assert_eq!(fetcher.get_type(), GCE);
}

#[tokio::test]
async fn gce_fetcher_refreshes_near_expiry_and_after_stop() {
    // Expires inside the refresh window, so every call goes to the server
    let server = metadata_server(&identity_token(60), 3).await;
    let fetcher = GceCredFetcher::new("cluster.local", GCE).with_base_url(server.uri());

    fetcher.get_platform_credential().await.unwrap();
    fetcher.get_platform_credential().await.unwrap();
    fetcher.stop();
    fetcher.get_platform_credential().await.unwrap();
}

#[tokio::test]
async fn gce_fetcher_reports_metadata_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let fetcher = GceCredFetcher::new("cluster.local", GCE).with_base_url(server.uri());

    let err = fetcher.get_platform_credential().await.unwrap_err();
    assert!(matches!(err, TokenError::Status { status: 404, .. }));
}
