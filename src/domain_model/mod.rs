mod access_token;
mod claims;
mod csrf;
mod error;
mod refresh_token;

pub use access_token::*;
pub use claims::*;
pub use csrf::*;
pub use error::*;
pub use refresh_token::*;
