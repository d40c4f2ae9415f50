use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::directory::{FallbackDirectory, IndexedDirectory, ScanDirectory};
use crate::engine::dispatcher::Dispatcher;
use crate::geo::index::GridIndex;
use crate::notify::{Notifier, TracingNotifier};
use crate::observability::metrics::Metrics;
use crate::store::MemoryStore;

pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub index: Option<Arc<GridIndex>>,
    pub dispatcher: Arc<Dispatcher>,
    pub clock: Arc<dyn Clock>,
    pub ready_tx: mpsc::Sender<Uuid>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config) -> (Self, mpsc::Receiver<Uuid>) {
        Self::with_parts(config, Arc::new(SystemClock), Arc::new(TracingNotifier))
    }

    pub fn with_parts(
        config: &Config,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> (Self, mpsc::Receiver<Uuid>) {
        let (ready_tx, ready_rx) = mpsc::channel(config.order_queue_size);
        let metrics = Metrics::new();

        let index = config
            .geo_index_enabled
            .then(|| Arc::new(GridIndex::new()));
        let store = Arc::new(MemoryStore::new(index.clone()));

        let directory = FallbackDirectory::new(
            index
                .clone()
                .map(|index| IndexedDirectory::new(index, store.clone())),
            ScanDirectory::new(store.clone()),
            metrics.clone(),
        );

        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            Arc::new(directory),
            notifier,
            clock.clone(),
            config.dispatch.clone(),
            metrics.clone(),
            config.event_buffer_size,
        ));

        (
            Self {
                store,
                index,
                dispatcher,
                clock,
                ready_tx,
                metrics,
            },
            ready_rx,
        )
    }
}
