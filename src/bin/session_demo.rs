//! Walks through the full token lifecycle against the in-memory store:
//! login, CSRF validation, refresh rotation and flush.
//!
//! `$ cargo run --bin session_demo`

use std::sync::Arc;

use serde_json::json;
use tessera::codec::{JwtCodec, SigningAlgorithm};
use tessera::domain_model::{Claims, TokenType};
use tessera::infra_memory::MemoryTokenStore;
use tessera::logger::*;
use tessera::session::{Session, SessionOptions};
use tessera::settings::SessionsConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _logger = Logger::new_bootstrap();

    let store = Arc::new(MemoryTokenStore::new());
    let codec = Arc::new(JwtCodec::hmac(
        SigningAlgorithm::HS256,
        "65994c7b523a3232e7aba54d8cbf",
    )?);
    let config = Arc::new(SessionsConfig::default());

    let mut payload = Claims::new();
    payload.insert("user_id".to_string(), json!(1));

    let mut session = Session::new(
        store.clone(),
        codec.clone(),
        config.clone(),
        SessionOptions {
            payload,
            refresh_by_access_allowed: true,
            ..Default::default()
        },
    );

    let tokens = session.login().await?;
    info!(access = %tokens.access, "logged in");
    info!(csrf = %tokens.csrf, expires = %tokens.access_expires_at, "csrf + expiry");

    let exists = session
        .session_exists(&tokens.access, TokenType::Access)
        .await?;
    info!(exists, "access session present in store");

    let csrf_ok = session
        .valid_csrf(&tokens.access, &tokens.csrf, TokenType::Access)
        .await?;
    info!(csrf_ok, "masked csrf validates");

    let refreshed = session.refresh(&tokens.refresh, None).await?;
    info!(access = %refreshed.access, "rotated access token");

    let old_gone = !session
        .session_exists(&tokens.access, TokenType::Access)
        .await?;
    info!(old_gone, "previous access token destroyed");

    session.flush_by_token(&tokens.refresh).await?;
    let refresh_gone = !session
        .session_exists(&tokens.refresh, TokenType::Refresh)
        .await?;
    info!(refresh_gone, "session flushed");

    Ok(())
}
