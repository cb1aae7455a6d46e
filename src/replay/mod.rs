//! Request history and replay
//!
//! Provides:
//! - A bounded, FIFO-evicting buffer of recorded inbound requests
//! - Replay of a recorded request, either against this server's own
//!   responder or against an external target URL

mod executor;
mod history;

pub use executor::{LocalResponder, ReplayRequest, Replayer, REPLAY_TIMEOUT};
pub use history::{HistoryStore, RequestRecord};
