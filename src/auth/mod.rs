mod credential;
mod middleware;

pub use credential::{CredentialHasher, parse_token};
pub use middleware::{ClientId, RequireUser};
