use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::dispatch::WorkerPool;
use crate::registry::BackendRegistry;
use crate::store::{SessionStore, TranscriptArchive};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Pipeline settings applied to every new session.
    pub pipeline: PipelineConfig,

    /// Backend capability table built at startup.
    pub registry: Arc<BackendRegistry>,

    /// Keyed checkpoint store for live sessions.
    pub store: Arc<dyn SessionStore>,

    /// Durable archive receiving finalized transcripts.
    pub archive: Arc<dyn TranscriptArchive>,

    /// Post-processing pool shared across all sessions.
    pub workers: WorkerPool,
}

impl AppState {
    pub fn new(
        pipeline: PipelineConfig,
        registry: Arc<BackendRegistry>,
        store: Arc<dyn SessionStore>,
        archive: Arc<dyn TranscriptArchive>,
    ) -> Self {
        let workers = WorkerPool::new(pipeline.worker_pool_size);
        Self {
            pipeline,
            registry,
            store,
            archive,
            workers,
        }
    }
}
