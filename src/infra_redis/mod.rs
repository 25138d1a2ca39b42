mod redis_token_store;

pub use redis_token_store::*;
