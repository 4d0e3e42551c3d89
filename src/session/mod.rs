//! Live transcription session management
//!
//! This module provides the `SessionController` state machine that owns one
//! connection's pipeline:
//! - Audio frame buffering and incremental transcription
//! - Transcript aggregation and threshold-triggered dispatch
//! - In-dispatch-order merging of background post-processing results
//! - Incremental checkpointing to the session store
//! - Drain-and-flush on disconnect

mod config;
mod controller;

pub use config::SessionConfig;
pub use controller::{SessionController, SessionState, SessionSummary};
