use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde_json::json;
use starberry_auth::oauth2::{
    AuthorizationCodeAuth, ClientCredentialsAuth, ClientResponse, ImplicitAuth, InMemoryHttpClient,
    OAuth2Config, TokenCache,
};
use starberry_auth::prelude::*;
use starberry_auth::session::FixedSession;
use starberry_auth::store::TokenStore;
use starberry_auth::url_encoding::parse_query;
use starberry_auth::{HttpReqCtx, Token};

const AUTHORIZE: &str = "https://auth.local/authorize";
const TOKEN: &str = "https://auth.local/token";
const CALLBACK: &str = "https://app.local/callback";

async fn echo_token(mut ctx: HttpReqCtx) -> HttpReqCtx {
    let body = match ctx.token() {
        Some(token) => format!("{} {} {}", token.access_token, token.scope, ctx.request.target()),
        None => "none".to_string(),
    };
    ctx.response = text_response(body);
    ctx
}

fn config(client: &InMemoryHttpClient) -> OAuth2Config {
    OAuth2Config::new("client1", TOKEN)
        .client_secret("secret")
        .scopes(["read", "write"])
        .http_client(client.clone())
}

fn token_response(access: &str, refresh: Option<&str>, expires_in: i64) -> ClientResponse {
    ClientResponse::json(
        200,
        &json!({
            "access_token": access,
            "token_type": "Bearer",
            "refresh_token": refresh,
            "expires_in": expires_in,
            "scope": "read write",
        }),
    )
}

fn query_of(location: &str) -> Vec<(String, String)> {
    location.split_once('?').map(|(_, q)| parse_query(q)).unwrap_or_default()
}

fn query_value(pairs: &[(String, String)], name: &str) -> Option<String> {
    pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v.clone())
}

fn access_validator(token: &str) -> bool {
    token.starts_with("ACCESS")
}

#[tokio::test]
async fn test_authorization_code_redirect_then_callback() {
    let client = InMemoryHttpClient::with_default(token_response("ACCESS123", Some("REFRESH456"), 3600));
    let pipeline = Pipeline::new(echo_token)
        .layer(AuthorizationCodeAuth::new(config(&client), AUTHORIZE, CALLBACK, access_validator).into_layer());

    let ctx = pipeline.run(HttpReqCtx::new(get_request("/dashboard"))).await;
    assert_eq!(ctx.response.status, StatusCode::FOUND);
    let location = ctx.response.location().unwrap().to_string();
    assert!(location.starts_with("https://auth.local/authorize?"));
    let params = query_of(&location);
    assert_eq!(query_value(&params, "response_type").as_deref(), Some("code"));
    assert_eq!(query_value(&params, "client_id").as_deref(), Some("client1"));
    assert_eq!(query_value(&params, "redirect_uri").as_deref(), Some(CALLBACK));
    assert_eq!(query_value(&params, "scope").as_deref(), Some("read write"));
    let state = query_value(&params, "state").unwrap();
    assert_eq!(state.len(), 43);

    let callback = format!("/callback?code=CODEXYZ&state={}&keep=1", state);
    let ctx = pipeline.run(HttpReqCtx::new(get_request(callback))).await;
    assert_eq!(ctx.response.status, StatusCode::OK);
    assert_eq!(ctx.response.body_str(), "ACCESS123 read write /callback?keep=1");

    let exchange = client.requests_to(TOKEN);
    assert_eq!(exchange.len(), 1);
    assert_eq!(exchange[0].form_value("grant_type").as_deref(), Some("authorization_code"));
    assert_eq!(exchange[0].form_value("code").as_deref(), Some("CODEXYZ"));
    assert_eq!(exchange[0].form_value("redirect_uri").as_deref(), Some(CALLBACK));
    assert_eq!(exchange[0].form_value("client_secret").as_deref(), Some("secret"));
}

#[tokio::test]
async fn test_authorization_code_unknown_state_is_bad_request() {
    let client = InMemoryHttpClient::with_default(token_response("ACCESS123", None, 3600));
    let pipeline = Pipeline::new(echo_token).layer(
        AuthorizationCodeAuth::new(config(&client), AUTHORIZE, CALLBACK, access_validator)
            .into_layer()
            .on_unauthorized(|_: &HttpReqCtx, _: &AuthError| return_status(StatusCode::FORBIDDEN)),
    );
    let ctx = pipeline
        .run(HttpReqCtx::new(get_request("/callback?code=CODEXYZ&state=forged")))
        .await;
    assert_eq!(ctx.response.status, StatusCode::BAD_REQUEST);
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn test_authorization_code_state_is_single_use() {
    let client = InMemoryHttpClient::with_default(token_response("ACCESS123", None, 3600));
    let pipeline = Pipeline::new(echo_token)
        .layer(AuthorizationCodeAuth::new(config(&client), AUTHORIZE, CALLBACK, access_validator).into_layer());
    let ctx = pipeline.run(HttpReqCtx::new(get_request("/"))).await;
    let state = query_value(&query_of(ctx.response.location().unwrap()), "state").unwrap();
    let callback = format!("/callback?code=C&state={}", state);

    let first = pipeline.run(HttpReqCtx::new(get_request(callback.clone()))).await;
    assert_eq!(first.response.status, StatusCode::OK);
    let replay = pipeline.run(HttpReqCtx::new(get_request(callback))).await;
    assert_eq!(replay.response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_authorization_code_with_pkce() {
    let client = InMemoryHttpClient::with_default(token_response("ACCESS123", None, 3600));
    let pipeline = Pipeline::new(echo_token).layer(
        AuthorizationCodeAuth::new(config(&client), AUTHORIZE, CALLBACK, access_validator)
            .pkce(true)
            .into_layer(),
    );
    let ctx = pipeline.run(HttpReqCtx::new(get_request("/"))).await;
    let params = query_of(ctx.response.location().unwrap());
    assert_eq!(query_value(&params, "code_challenge_method").as_deref(), Some("S256"));
    let challenge = query_value(&params, "code_challenge").unwrap();
    let state = query_value(&params, "state").unwrap();

    pipeline
        .run(HttpReqCtx::new(get_request(format!("/callback?code=C&state={}", state))))
        .await;
    let verifier = client.requests_to(TOKEN)[0].form_value("code_verifier").unwrap();
    assert_eq!(starberry_auth::crypto::pkce_code_challenge(&verifier), challenge);
}

#[tokio::test]
async fn test_authorization_code_caches_token_per_session() {
    let client = InMemoryHttpClient::with_default(token_response("ACCESS123", None, 3600));
    let store = InMemoryTokenStore::new();
    let pipeline = Pipeline::new(echo_token).layer(
        AuthorizationCodeAuth::new(config(&client), AUTHORIZE, CALLBACK, access_validator)
            .token_store(store.clone(), CookieSession::new("sid"))
            .into_layer(),
    );
    let ctx = pipeline
        .run(HttpReqCtx::new(get_request("/").with_header("Cookie", "sid=s1")))
        .await;
    let state = query_value(&query_of(ctx.response.location().unwrap()), "state").unwrap();
    let callback = get_request(format!("/callback?code=C&state={}", state)).with_header("Cookie", "sid=s1");
    pipeline.run(HttpReqCtx::new(callback)).await;
    assert_eq!(store.len(), 1);

    let ctx = pipeline
        .run(HttpReqCtx::new(get_request("/next").with_header("Cookie", "sid=s1")))
        .await;
    assert_eq!(ctx.response.status, StatusCode::OK);
    assert_eq!(ctx.response.body_str(), "ACCESS123 read write /next");

    let other = pipeline
        .run(HttpReqCtx::new(get_request("/next").with_header("Cookie", "sid=s2")))
        .await;
    assert_eq!(other.response.status, StatusCode::FOUND);
}

#[tokio::test]
async fn test_authorization_code_accepts_valid_bearer() {
    let client = InMemoryHttpClient::new();
    let pipeline = Pipeline::new(echo_token)
        .layer(AuthorizationCodeAuth::new(config(&client), AUTHORIZE, CALLBACK, access_validator).into_layer());
    let ctx = pipeline
        .run(HttpReqCtx::new(get_request("/").with_header("Authorization", "Bearer ACCESS-direct")))
        .await;
    assert_eq!(ctx.response.status, StatusCode::OK);

    let ctx = pipeline
        .run(HttpReqCtx::new(get_request("/").with_header("Authorization", "Bearer junk")))
        .await;
    assert_eq!(ctx.response.status, StatusCode::FOUND);
}

#[tokio::test]
async fn test_authorization_code_exchange_failure() {
    let client = InMemoryHttpClient::with_default(ClientResponse::json(
        400,
        &json!({"error": "invalid_grant", "error_description": "code expired"}),
    ));
    let pipeline = Pipeline::new(echo_token)
        .layer(AuthorizationCodeAuth::new(config(&client), AUTHORIZE, CALLBACK, access_validator).into_layer());
    let ctx = pipeline.run(HttpReqCtx::new(get_request("/"))).await;
    let state = query_value(&query_of(ctx.response.location().unwrap()), "state").unwrap();
    let ctx = pipeline
        .run(HttpReqCtx::new(get_request(format!("/callback?code=C&state={}", state))))
        .await;
    assert_eq!(ctx.response.status, StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = serde_json::from_slice(&ctx.response.body).unwrap();
    assert_eq!(body["error"], "token_exchange_failed");
    assert!(body["error_description"].as_str().unwrap().contains("invalid_grant"));
}

#[tokio::test(start_paused = true)]
async fn test_token_endpoint_timeout_is_exchange_failure() {
    let client = InMemoryHttpClient::with_default(token_response("ACCESS123", None, 3600))
        .with_latency(StdDuration::from_secs(30));
    let config = config(&client).timeout(StdDuration::from_secs(2));
    let pipeline = Pipeline::new(echo_token)
        .layer(AuthorizationCodeAuth::new(config, AUTHORIZE, CALLBACK, access_validator).into_layer());
    let ctx = pipeline.run(HttpReqCtx::new(get_request("/"))).await;
    let state = query_value(&query_of(ctx.response.location().unwrap()), "state").unwrap();
    let ctx = pipeline
        .run(HttpReqCtx::new(get_request(format!("/callback?code=C&state={}", state))))
        .await;
    assert_eq!(ctx.response.status, StatusCode::UNAUTHORIZED);
    assert!(ctx.response.body_str().contains("request timed out"));
}

#[tokio::test]
async fn test_implicit_redirects_with_token_response_type() {
    let client = InMemoryHttpClient::new();
    let pipeline = Pipeline::new(echo_token)
        .layer(ImplicitAuth::new(config(&client), AUTHORIZE, CALLBACK, access_validator).into_layer());
    let ctx = pipeline.run(HttpReqCtx::new(get_request("/"))).await;
    assert_eq!(ctx.response.status, StatusCode::FOUND);
    let params = query_of(ctx.response.location().unwrap());
    assert_eq!(query_value(&params, "response_type").as_deref(), Some("token"));
    assert!(query_value(&params, "state").is_some());
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn test_implicit_query_token_with_issued_state() {
    let client = InMemoryHttpClient::new();
    let pipeline = Pipeline::new(echo_token)
        .layer(ImplicitAuth::new(config(&client), AUTHORIZE, CALLBACK, access_validator).into_layer());
    let ctx = pipeline.run(HttpReqCtx::new(get_request("/"))).await;
    let state = query_value(&query_of(ctx.response.location().unwrap()), "state").unwrap();

    let target = format!(
        "/app?access_token=ACCESS9&token_type=Bearer&expires_in=3600&scope=read&state={}&page=2",
        state
    );
    let ctx = pipeline.run(HttpReqCtx::new(get_request(target))).await;
    assert_eq!(ctx.response.status, StatusCode::OK);
    assert_eq!(ctx.response.body_str(), "ACCESS9 read /app?page=2");

    let forged = pipeline
        .run(HttpReqCtx::new(get_request("/app?access_token=ACCESS9&state=forged")))
        .await;
    assert_eq!(forged.response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_implicit_accepts_bearer_header() {
    let client = InMemoryHttpClient::new();
    let pipeline = Pipeline::new(echo_token)
        .layer(ImplicitAuth::new(config(&client), AUTHORIZE, CALLBACK, access_validator).into_layer());
    let ctx = pipeline
        .run(HttpReqCtx::new(get_request("/").with_header("Authorization", "Bearer ACCESS1")))
        .await;
    assert_eq!(ctx.response.status, StatusCode::OK);
}

fn client_credentials_pipeline(client: &InMemoryHttpClient, store: &InMemoryTokenStore, fetch: bool) -> Pipeline {
    Pipeline::new(echo_token).layer(
        ClientCredentialsAuth::new(config(client), access_validator, store.clone(), HeaderSession::new("X-Client-Id"))
            .fetch_on_miss(fetch)
            .into_layer(),
    )
}

#[tokio::test]
async fn test_client_credentials_requires_session_key() {
    let client = InMemoryHttpClient::new();
    let pipeline = client_credentials_pipeline(&client, &InMemoryTokenStore::new(), true);
    let ctx = pipeline.run(HttpReqCtx::new(get_request("/"))).await;
    assert_eq!(ctx.response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_client_credentials_cache_miss_denied_by_default() {
    let client = InMemoryHttpClient::with_default(token_response("ACCESS1", None, 3600));
    let pipeline = client_credentials_pipeline(&client, &InMemoryTokenStore::new(), false);
    let ctx = pipeline
        .run(HttpReqCtx::new(get_request("/").with_header("X-Client-Id", "svc")))
        .await;
    assert_eq!(ctx.response.status, StatusCode::UNAUTHORIZED);
    assert!(client.requests().is_empty());
}

#[tokio::test]
async fn test_client_credentials_fetches_once_then_uses_cache() {
    let client = InMemoryHttpClient::with_default(token_response("ACCESS1", None, 3600));
    let store = InMemoryTokenStore::new();
    let pipeline = client_credentials_pipeline(&client, &store, true);
    for _ in 0..3 {
        let ctx = pipeline
            .run(HttpReqCtx::new(get_request("/").with_header("X-Client-Id", "svc")))
            .await;
        assert_eq!(ctx.response.status, StatusCode::OK);
    }
    let calls = client.requests_to(TOKEN);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].form_value("grant_type").as_deref(), Some("client_credentials"));
    assert_eq!(calls[0].form_value("scope").as_deref(), Some("read write"));
    assert_eq!(store.len(), 1);
}

fn stale_token(access: &str, refresh: &str) -> Token {
    let mut token = Token::bearer(access);
    token.refresh_token = Some(refresh.to_string());
    token.expires_in = 60;
    token.stamp(Utc::now());
    token
}

#[tokio::test]
async fn test_stale_token_is_refreshed_before_use() {
    let client = InMemoryHttpClient::with_default(token_response("ACCESS-new", None, 3600));
    let store = InMemoryTokenStore::new();
    store.save("svc", stale_token("ACCESS-old", "R1")).await.unwrap();
    let pipeline = client_credentials_pipeline(&client, &store, false);

    let ctx = pipeline
        .run(HttpReqCtx::new(get_request("/").with_header("X-Client-Id", "svc")))
        .await;
    assert_eq!(ctx.response.status, StatusCode::OK);
    assert!(ctx.response.body_str().starts_with("ACCESS-new "));

    let refresh = client.requests_to(TOKEN);
    assert_eq!(refresh.len(), 1);
    assert_eq!(refresh[0].form_value("grant_type").as_deref(), Some("refresh_token"));
    assert_eq!(refresh[0].form_value("refresh_token").as_deref(), Some("R1"));

    let saved = store.get("svc").await.unwrap().unwrap();
    assert_eq!(saved.access_token, "ACCESS-new");
    assert_eq!(saved.refresh_token.as_deref(), Some("R1"));
}

#[tokio::test]
async fn test_concurrent_refreshes_are_coalesced() {
    let client = InMemoryHttpClient::with_default(token_response("ACCESS-new", Some("R2"), 3600))
        .with_latency(StdDuration::from_millis(50));
    let store = InMemoryTokenStore::new();
    store.save("svc", stale_token("ACCESS-old", "R1")).await.unwrap();
    let pipeline = client_credentials_pipeline(&client, &store, false);

    let request = || HttpReqCtx::new(get_request("/").with_header("X-Client-Id", "svc"));
    let (a, b, c) = tokio::join!(pipeline.run(request()), pipeline.run(request()), pipeline.run(request()));
    for ctx in [a, b, c] {
        assert_eq!(ctx.response.status, StatusCode::OK);
        assert!(ctx.response.body_str().starts_with("ACCESS-new "));
    }
    assert_eq!(client.requests_to(TOKEN).len(), 1);
}

#[tokio::test]
async fn test_shared_cache_coalesces_across_layers() {
    let client = InMemoryHttpClient::with_default(token_response("ACCESS-new", Some("R2"), 3600))
        .with_latency(StdDuration::from_millis(50));
    let store = InMemoryTokenStore::new();
    store.save("svc", stale_token("ACCESS-old", "R1")).await.unwrap();
    let cache = TokenCache::from_shared(Arc::new(store.clone()), Arc::new(FixedSession("svc".into())));

    let layer = |cache: TokenCache| {
        ClientCredentialsAuth::new(config(&client), access_validator, store.clone(), FixedSession("svc".into()))
            .token_cache(cache)
            .into_layer()
    };
    let first = Pipeline::new(echo_token).layer(layer(cache.clone()));
    let second = Pipeline::new(echo_token).layer(layer(cache.clone()));

    let (a, b) = tokio::join!(
        first.run(HttpReqCtx::new(get_request("/"))),
        second.run(HttpReqCtx::new(get_request("/")))
    );
    assert_eq!(a.response.status, StatusCode::OK);
    assert_eq!(b.response.status, StatusCode::OK);
    assert_eq!(client.requests_to(TOKEN).len(), 1);
    assert_eq!(cache.coordinator().in_flight(), 0);
}

#[tokio::test]
async fn test_expired_token_without_refresh_token_is_absent() {
    let client = InMemoryHttpClient::with_default(token_response("ACCESS-new", None, 3600));
    let store = InMemoryTokenStore::new();
    let mut expired = Token::bearer("ACCESS-old");
    expired.expires_in = 60;
    expired.stamp(Utc::now() - Duration::hours(1));
    store.save("svc", expired).await.unwrap();

    let denied = client_credentials_pipeline(&client, &store, false)
        .run(HttpReqCtx::new(get_request("/").with_header("X-Client-Id", "svc")))
        .await;
    assert_eq!(denied.response.status, StatusCode::UNAUTHORIZED);

    let fetched = client_credentials_pipeline(&client, &store, true)
        .run(HttpReqCtx::new(get_request("/").with_header("X-Client-Id", "svc")))
        .await;
    assert_eq!(fetched.response.status, StatusCode::OK);
    assert!(fetched.response.body_str().starts_with("ACCESS-new "));
}

#[tokio::test]
async fn test_failed_refresh_denies_and_keeps_stored_token() {
    let client = InMemoryHttpClient::with_default(ClientResponse::json(400, &json!({ "error": "invalid_grant" })));
    let store = InMemoryTokenStore::new();
    store.save("svc", stale_token("ACCESS-old", "R1")).await.unwrap();
    let pipeline = client_credentials_pipeline(&client, &store, false);

    let ctx = pipeline
        .run(HttpReqCtx::new(get_request("/").with_header("X-Client-Id", "svc")))
        .await;
    assert_eq!(ctx.response.status, StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = serde_json::from_slice(&ctx.response.body).unwrap();
    assert_eq!(body["error"], "token_exchange_failed");
    assert_eq!(client.requests_to(TOKEN).len(), 1);

    let kept = store.get("svc").await.unwrap().unwrap();
    assert_eq!(kept.access_token, "ACCESS-old");
}

#[tokio::test]
async fn test_unbounded_expires_in_does_not_crash_the_request() {
    let client = InMemoryHttpClient::with_default(ClientResponse::json(
        200,
        &json!({ "access_token": "ACCESS-forever", "expires_in": i64::MAX, "scope": "read" }),
    ));
    let store = InMemoryTokenStore::new();
    let pipeline = client_credentials_pipeline(&client, &store, true);

    let ctx = pipeline
        .run(HttpReqCtx::new(get_request("/").with_header("X-Client-Id", "svc")))
        .await;
    assert_eq!(ctx.response.status, StatusCode::OK);
    let saved = store.get("svc").await.unwrap().unwrap();
    assert_eq!(saved.expires_in, i64::MAX);
    assert!(saved.expires_at.is_none());
}
