#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Used by the integration tests under tests/
#[cfg(test)]
use http_body_util as _;
#[cfg(test)]
use mockall as _;
#[cfg(test)]
use tower as _;

// Used by main.rs binary
use dotenvy as _;

pub mod bootstrap;
pub mod cli;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod routes;
pub mod state;
pub mod ws_link;

// Re-export primary types
pub use bootstrap::{CorsConfig, HubContext, ServerConfig, bootstrap, init_logging, start_server};
pub use cli::Cli;
pub use error::HttpError;
pub use registry::SessionRegistry;
pub use routes::create_router;
pub use state::AppState;
