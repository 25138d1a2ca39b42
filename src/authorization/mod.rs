mod authorizer;

pub use authorizer::*;
