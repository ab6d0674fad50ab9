//! Service layer: storage adapter, task engine, ingestion pipeline, NOOS
//! algorithm, parameter store, and reports — wired together by `EngineState`.

pub mod algorithm;
pub mod ingestion;
pub mod parameters;
pub mod reports;
pub mod storage;
pub mod tasks;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::service::storage::Storage;
use crate::service::tasks::TaskEngine;

/// Everything a wire-layer handler needs, grounded on the teacher's
/// `service::State<A, C, S>` shape (one struct bundling the catalog store
/// and cross-cutting collaborators), narrowed here to a single storage trait
/// object and the task engine.
#[derive(Clone)]
pub struct EngineState<S: Storage> {
    pub storage: Arc<S>,
    pub tasks: Arc<TaskEngine<S>>,
    pub config: Arc<EngineConfig>,
}

impl<S: Storage> std::fmt::Debug for EngineState<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineState").finish_non_exhaustive()
    }
}

impl<S: Storage> EngineState<S> {
    pub fn new(storage: Arc<S>, config: Arc<EngineConfig>) -> Self {
        let tasks = Arc::new(TaskEngine::new(Arc::clone(&storage), Arc::clone(&config)));
        Self {
            storage,
            tasks,
            config,
        }
    }
}
