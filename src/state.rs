use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::events::ListingEvents;
use crate::services::embedding_provider::EmbeddingProvider;
use crate::store::Store;
use crate::tutoring::personalization::PersonalizationWriter;
use crate::tutoring::rating::RatingAggregator;
use crate::tutoring::subjects::SubjectRegistry;

/// Shared handles injected into every handler. All collaborators are built once in
/// `main` (or a test harness) and passed in here.
#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    registry: SubjectRegistry,
    aggregator: RatingAggregator,
    personalizer: PersonalizationWriter,
    events: ListingEvents,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn EmbeddingProvider>,
        events: ListingEvents,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        let registry = SubjectRegistry::new(store.clone(), embedder);
        let aggregator = RatingAggregator::new(store.clone());
        let personalizer = PersonalizationWriter::new(store.clone(), registry.clone());

        Self {
            store,
            registry,
            aggregator,
            personalizer,
            events,
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_handle(&self) -> Arc<Store> {
        self.store.clone()
    }

    pub fn subjects(&self) -> &SubjectRegistry {
        &self.registry
    }

    pub fn ratings(&self) -> &RatingAggregator {
        &self.aggregator
    }

    pub fn personalizer(&self) -> &PersonalizationWriter {
        &self.personalizer
    }

    pub fn events(&self) -> &ListingEvents {
        &self.events
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use crate::services::embedding_provider::MockEmbeddingProvider;

    use super::*;

    fn build_state(name: &str) -> (tempfile::TempDir, AppState, broadcast::Sender<()>) {
        let cfg = Config::from_env();
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(Store::open(tmp.path().join(name).to_str().unwrap()).unwrap());
        let (tx, _) = broadcast::channel(4);
        let state = AppState::new(
            store,
            Arc::new(MockEmbeddingProvider::new(8)),
            ListingEvents::default(),
            &cfg,
            tx.clone(),
        );
        (tmp, state, tx)
    }

    #[tokio::test]
    async fn shutdown_receiver_can_clone() {
        let (_tmp, state, tx) = build_state("state_shutdown.sled");

        let mut rx1 = state.shutdown_rx();
        let mut rx2 = state.shutdown_rx();
        tx.send(()).unwrap();
        rx1.recv().await.unwrap();
        rx2.recv().await.unwrap();
    }

    #[tokio::test]
    async fn services_share_one_store() {
        let (_tmp, state, _tx) = build_state("state_shared.sled");
        state
            .subjects()
            .ensure_embedded("Math")
            .await
            .expect("mock embedding");
        assert!(state.store().has_subject("Math").unwrap());
    }
}
