use std::sync::Arc;

use crate::config::Config;
use crate::documents::store::ResumeCollectionStore;
use crate::matches::cache::MatchCache;
use crate::pipeline::coordinator::PipelineCoordinator;
use crate::progress::ProgressChannel;
use crate::remote::RemoteProcessor;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub remote: Arc<dyn RemoteProcessor>,
    pub coordinator: Arc<PipelineCoordinator>,
    pub store: Arc<ResumeCollectionStore>,
    /// Raw match lists per document; views are recomputed from here.
    pub matches: Arc<MatchCache>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        config: Config,
        remote: Arc<dyn RemoteProcessor>,
        progress: Arc<dyn ProgressChannel>,
    ) -> Self {
        let store = Arc::new(ResumeCollectionStore::new(Arc::clone(&remote)));
        let coordinator = Arc::new(PipelineCoordinator::new(
            Arc::clone(&remote),
            progress,
            Arc::clone(&store),
            config.pipeline_settings(),
        ));

        Self {
            remote,
            coordinator,
            store,
            matches: Arc::new(MatchCache::new(config.match_cache_capacity)),
            config,
        }
    }
}
