use std::sync::Arc;

use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::drain::{Drain, DrainParts};
use crate::{
    analysis::SnapshotAnalyzer,
    causality::CausalityResolver,
    config::{Config, ConfigStore, JsonFileStore, MemoryStore, ShutdownConfiguration},
    error::DrainError,
    events::Bus,
    state::WorkerStates,
    subscribers::{Subscribe, SubscriberSet},
    substrate::Substrate,
    watcher::IdleDrainWatcher,
};

/// Builder for constructing a [`Drain`].
pub struct DrainBuilder {
    cfg: Config,
    substrate: Arc<dyn Substrate>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    store: Option<Arc<dyn ConfigStore>>,
}

impl DrainBuilder {
    /// Creates a new builder over `substrate` with the given configuration.
    pub fn new(cfg: Config, substrate: Arc<dyn Substrate>) -> Self {
        Self {
            cfg,
            substrate,
            subscribers: Vec::new(),
            store: None,
        }
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive drain events through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Overrides where shutdown settings are persisted.
    ///
    /// Without it, `Config::config_path` selects a [`JsonFileStore`]; with no
    /// path either, settings are kept in a volatile [`MemoryStore`].
    pub fn with_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Loads the settings and wires every component.
    ///
    /// Must be called inside a tokio runtime; background analysis and settle
    /// timers are spawned onto it.
    pub fn build(self) -> Result<Arc<Drain>, DrainError> {
        let store: Arc<dyn ConfigStore> = match (self.store, &self.cfg.config_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(JsonFileStore::new(path)),
            (None, None) => Arc::new(MemoryStore::new()),
        };
        let config = Arc::new(ShutdownConfiguration::load(store)?);

        let runtime = Handle::current();
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let runtime_token = CancellationToken::new();

        let resolver = CausalityResolver::new(self.substrate);
        let analyzer = SnapshotAnalyzer::new(
            resolver.clone(),
            Arc::clone(&config),
            bus.clone(),
            runtime.clone(),
        );
        let workers = Arc::new(WorkerStates::new());
        let watcher = IdleDrainWatcher::new(
            resolver.clone(),
            Arc::clone(&workers),
            analyzer.clone(),
            bus.clone(),
            self.cfg.settle_delay,
            runtime,
            runtime_token.clone(),
        );

        let drain = Arc::new(Drain::new_internal(DrainParts {
            cfg: self.cfg,
            bus,
            subs,
            config,
            resolver,
            analyzer,
            workers,
            watcher,
            runtime_token,
        }));
        drain.subscriber_listener();
        Ok(drain)
    }
}
