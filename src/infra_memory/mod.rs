mod memory_token_store;

pub use memory_token_store::*;
