pub mod logger;
pub mod settings;

pub mod authorization;
pub mod codec;
pub mod domain_model;
pub mod domain_port;
pub mod infra_memory;
pub mod infra_redis;
pub mod session;
