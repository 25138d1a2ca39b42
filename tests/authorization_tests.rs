mod common;

use std::collections::HashMap;

use common::{TestContext, user_payload};
use serde_json::json;
use tessera::authorization::{Authorizer, RequestAccessor};
use tessera::session::SessionOptions;

#[derive(Default)]
struct FakeRequest {
    method: String,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

impl FakeRequest {
    fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            ..Default::default()
        }
    }

    fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }
}

impl RequestAccessor for FakeRequest {
    fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name).cloned()
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }

    fn method(&self) -> &str {
        &self.method
    }
}

fn authorizer(ctx: &TestContext) -> Authorizer {
    Authorizer::new(ctx.store.clone(), ctx.codec.clone(), ctx.config.clone())
}

#[tokio::test]
async fn bearer_header_authenticates_without_csrf() {
    let ctx = TestContext::new();
    let mut session = ctx.session(SessionOptions {
        payload: user_payload(1),
        ..Default::default()
    });
    let tokens = session.login().await.unwrap();

    let request =
        FakeRequest::new("POST").with_header("Authorization", &format!("Bearer {}", tokens.access));
    let authenticated = authorizer(&ctx)
        .authenticate_access_request(&request)
        .await
        .unwrap();
    assert_eq!(authenticated.claims.get("user_id"), Some(&json!(1)));

    // a bare token without the Bearer prefix works too
    let request = FakeRequest::new("POST").with_header("Authorization", &tokens.access);
    authorizer(&ctx)
        .authenticate_access_request(&request)
        .await
        .unwrap();
}

#[tokio::test]
async fn cookie_auth_enforces_csrf_on_state_changing_methods() {
    let ctx = TestContext::new();
    let mut session = ctx.session(SessionOptions::default());
    let tokens = session.login().await.unwrap();
    let auth = authorizer(&ctx);

    // safe method: no csrf needed
    let request = FakeRequest::new("GET").with_cookie("jwt_access", &tokens.access);
    auth.authenticate_access_request(&request).await.unwrap();

    // unsafe method without csrf header fails
    let request = FakeRequest::new("POST").with_cookie("jwt_access", &tokens.access);
    let err = auth.authenticate_access_request(&request).await.unwrap_err();
    assert!(err.is_unauthorized());

    // wrong csrf fails
    let request = FakeRequest::new("POST")
        .with_cookie("jwt_access", &tokens.access)
        .with_header("X-CSRF-Token", "wrong");
    let err = auth.authenticate_access_request(&request).await.unwrap_err();
    assert!(err.is_unauthorized());

    // the issued masked csrf passes
    let request = FakeRequest::new("POST")
        .with_cookie("jwt_access", &tokens.access)
        .with_header("X-CSRF-Token", &tokens.csrf);
    auth.authenticate_access_request(&request).await.unwrap();
}

#[tokio::test]
async fn header_resolution_wins_over_cookies() {
    let ctx = TestContext::new();
    let mut session = ctx.session(SessionOptions::default());
    let tokens = session.login().await.unwrap();

    // header present: cookieless path, so no csrf required even on POST
    let request = FakeRequest::new("POST")
        .with_header("Authorization", &format!("Bearer {}", tokens.access))
        .with_cookie("jwt_access", &tokens.access);
    authorizer(&ctx)
        .authenticate_access_request(&request)
        .await
        .unwrap();
}

#[tokio::test]
async fn refresh_tokens_resolve_from_their_own_header_and_cookie() {
    let ctx = TestContext::new();
    let mut session = ctx.session(SessionOptions::default());
    let tokens = session.login().await.unwrap();
    let auth = authorizer(&ctx);

    let request = FakeRequest::new("POST")
        .with_header("X-Refresh-Token", &format!("Bearer {}", tokens.refresh));
    auth.authenticate_refresh_request(&request).await.unwrap();

    let request = FakeRequest::new("POST")
        .with_cookie("jwt_refresh", &tokens.refresh)
        .with_header("X-CSRF-Token", &tokens.csrf);
    auth.authenticate_refresh_request(&request).await.unwrap();
}

#[tokio::test]
async fn missing_and_revoked_tokens_are_rejected() {
    let ctx = TestContext::new();
    let mut session = ctx.session(SessionOptions::default());
    let tokens = session.login().await.unwrap();
    let auth = authorizer(&ctx);

    let request = FakeRequest::new("GET");
    let err = auth.authenticate_access_request(&request).await.unwrap_err();
    assert!(err.is_unauthorized());

    // a flushed session no longer authenticates even though the signature
    // is still valid
    session.flush_by_token(&tokens.refresh).await.unwrap();
    let request =
        FakeRequest::new("GET").with_header("Authorization", &format!("Bearer {}", tokens.access));
    let err = auth.authenticate_access_request(&request).await.unwrap_err();
    assert!(err.is_unauthorized());
}
