pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod token_bucket;
pub mod upstream;
pub mod validation;

pub use config::{Config, LimiterConfig, UpstreamConfig};
pub use error::{ProxyError, Result};
pub use rate_limiter::{RateLimitDecision, RateLimiter, SweepHandle};
pub use server::{create_app, Server};
