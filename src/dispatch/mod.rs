pub mod processor;
pub mod worker;

pub use processor::{is_noop_reply, PostProcessor, ProcessOutcome, ProcessedResult, ProcessedStyle};
pub use worker::WorkerPool;
