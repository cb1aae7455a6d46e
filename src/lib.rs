//! Mirage - Controllable HTTP Response Simulator
//!
//! An echo server whose responses are shaped by request headers (or
//! process-level defaults), for testing how clients cope with slow, failing
//! and flaky upstreams:
//!
//! - **Delays**: fixed, jittered, uniform random, exponential backoff and
//!   latency ranges, capped at five minutes
//! - **Faults**: forced status codes, named simulated errors, a stalling
//!   timeout and probabilistic chaos
//! - **Scenarios**: scripted per-path response sequences that loop
//! - **History & replay**: a bounded record of inbound requests that can be
//!   re-issued against this server or another target
//! - **Observability**: Prometheus metrics and structured logging
//!
//! # Quick Start
//!
//! ```no_run
//! use mirage::{config, AppState, Server};
//!
//! #[tokio::main]
//! async fn main() -> mirage::Result<()> {
//!     let env = config::EnvSource::process();
//!     let config = config::load_effective(None, &env)?;
//!     let server = Server::bind(AppState::from_env(config, &env)?).await?;
//!     server.run().await
//! }
//! ```
//!
//! # Directives
//!
//! ```text
//! curl -H 'X-Echo-Delay: 200ms' http://localhost:8080/anything
//! curl -H 'X-Echo-Error: unavailable' http://localhost:8080/anything
//! curl -H 'X-Echo-Chaos: 25' http://localhost:8080/anything
//! ```

pub mod admin;
pub mod chaos;
pub mod config;
pub mod delay;
pub mod directive;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod pipeline;
pub mod render;
pub mod replay;
pub mod rng;
pub mod scenario;
pub mod server;
pub mod state;

pub use config::Config;
pub use error::{MirageError, Result};
pub use server::{App, Server};
pub use state::AppState;

/// Mirage version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Mirage name
pub const NAME: &str = env!("CARGO_PKG_NAME");
