//! Ingestion transports
//!
//! Exactly one transport runs per process. It owns the health record and
//! dispatches every applied update to the exporter set.

pub mod pull;
pub mod push;

pub use pull::{PullError, PullReceiver, SessionOutcome};
pub use push::{parse_payload, HdsRequest, PushError, PushReceiver};
