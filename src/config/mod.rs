mod server;

pub use server::{RateLimits, ServerConfig};
