use std::sync::Arc;

use serde_json::json;
use tessera::codec::{JwtCodec, SigningAlgorithm};
use tessera::domain_model::Claims;
use tessera::domain_port::TokenStore;
use tessera::infra_memory::MemoryTokenStore;
use tessera::session::{Session, SessionOptions};
use tessera::settings::SessionsConfig;

pub const TEST_SECRET: &str = "65994c7b523a3232e7aba54d8cbf";

pub struct TestContext {
    pub store: Arc<dyn TokenStore>,
    pub codec: Arc<JwtCodec>,
    pub config: Arc<SessionsConfig>,
}

impl TestContext {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryTokenStore::new()),
            codec: Arc::new(JwtCodec::hmac(SigningAlgorithm::HS256, TEST_SECRET).unwrap()),
            config: Arc::new(SessionsConfig::default()),
        }
    }

    pub fn session(&self, options: SessionOptions) -> Session {
        Session::new(
            self.store.clone(),
            self.codec.clone(),
            self.config.clone(),
            options,
        )
    }
}

pub fn user_payload(user_id: u64) -> Claims {
    let mut claims = Claims::new();
    claims.insert("user_id".to_string(), json!(user_id));
    claims
}
