use std::sync::Arc;

use crate::{
    config::Config,
    db::{create_redis_client, RedisSessionStore, SessionStore, SessionWriterHandle},
    services::{
        discovery::{DiscoveryProvider, TmdbDiscovery},
        intent::{IntentExtractor, OpenAiIntentExtractor},
        pipeline::DiscoverPipeline,
    },
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DiscoverPipeline>,
}

impl AppState {
    /// Assembles state from explicit collaborators (used directly by tests)
    pub fn new(
        intent: Arc<dyn IntentExtractor>,
        discovery: Arc<dyn DiscoveryProvider>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            pipeline: Arc::new(DiscoverPipeline::new(intent, discovery, sessions)),
        }
    }

    /// Builds production collaborators from config and restores any live
    /// saved session into memory
    pub async fn initialize(config: &Config) -> anyhow::Result<(Self, SessionWriterHandle)> {
        let redis_client = create_redis_client(&config.redis_url)?;
        let (sessions, writer_handle) = RedisSessionStore::new(redis_client);

        let intent = OpenAiIntentExtractor::new(
            config.openai_api_key.clone(),
            config.openai_api_url.clone(),
            config.openai_model.clone(),
        );
        let discovery =
            TmdbDiscovery::new(config.tmdb_read_token.clone(), config.tmdb_api_url.clone());

        let state = Self::new(Arc::new(intent), Arc::new(discovery), Arc::new(sessions));
        state.pipeline.restore().await;

        Ok((state, writer_handle))
    }
}
