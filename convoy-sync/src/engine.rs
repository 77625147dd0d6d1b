//! Process-wide wiring of the sync components.
//!
//! One `SyncEngine` per process owns what outlives a screen: the task
//! supervisor, the event bus, the preference store and the shared
//! acknowledgment sequencer. Screens ask it for resolvers and aggregators.

use std::sync::Arc;

use convoy_core::{ConfigError, MessageFolder, SyncConfig};
use convoy_storage::{CollectionDeleter, PreferenceStore, RemoteStore};

use crate::ack::AckSequencer;
use crate::events::SyncEvents;
use crate::groups::GroupResolver;
use crate::pagination::{FormTemplatePrefetcher, MessageAggregator, StoreTemplatePrefetcher};
use crate::staleness::StalenessGate;
use crate::supervisor::TaskSupervisor;
use crate::trash::TrashMover;

pub struct SyncEngine<S: RemoteStore> {
    store: Arc<S>,
    prefs: Arc<dyn PreferenceStore>,
    config: SyncConfig,
    supervisor: TaskSupervisor,
    events: SyncEvents,
    prefetcher: Arc<dyn FormTemplatePrefetcher>,
    acks: AckSequencer<S>,
}

impl<S: RemoteStore> SyncEngine<S> {
    pub fn new(
        store: Arc<S>,
        prefs: Arc<dyn PreferenceStore>,
        config: SyncConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let events = SyncEvents::new(config.event_channel_capacity);
        let acks = AckSequencer::new(Arc::clone(&store), &config, events.clone());
        Ok(Self {
            prefetcher: Arc::new(StoreTemplatePrefetcher::new(Arc::clone(&store))),
            store,
            prefs,
            config,
            supervisor: TaskSupervisor::new(),
            events,
            acks,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn events(&self) -> &SyncEvents {
        &self.events
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    pub fn group_resolver(&self) -> GroupResolver<S> {
        GroupResolver::new(Arc::clone(&self.store))
    }

    pub fn staleness_gate(&self) -> StalenessGate<S> {
        StalenessGate::new(
            Arc::clone(&self.store),
            Arc::clone(&self.prefs),
            self.supervisor.clone(),
            self.events.clone(),
        )
    }

    /// A fresh aggregator for one screen session. Must be called inside a
    /// tokio runtime.
    pub fn aggregator(&self, folder: MessageFolder) -> MessageAggregator<S> {
        MessageAggregator::new(
            Arc::clone(&self.store),
            folder,
            &self.config,
            Some(Arc::clone(&self.prefetcher)),
        )
    }

    /// Shared so in-flight dedupe spans every entry point.
    pub fn acks(&self) -> &AckSequencer<S> {
        &self.acks
    }

    pub fn trash_mover(&self, deleter: Arc<dyn CollectionDeleter>) -> TrashMover<S> {
        TrashMover::new(Arc::clone(&self.store), deleter, self.events.clone())
    }

    /// Cancel background work. Aggregators are stopped by dropping them.
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }
}
