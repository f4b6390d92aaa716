//! # Node Container
//!
//! Owns what the services share: the broker, the collaborator stores and
//! the configuration. Each component gets its own connection to the broker.

pub mod config;

pub use config::{ConfigError, NodeConfig};

use crate::adapters::{InMemoryStudyOffice, InMemoryUserDirectory, StudyOffice, UserDirectory};
use shared_bus::{BackoffPolicy, ConnectionManager, InMemoryBroker};
use std::sync::Arc;

pub struct NodeContainer {
    pub config: NodeConfig,
    pub broker: InMemoryBroker,
    pub users: Arc<dyn UserDirectory>,
    pub office: Arc<dyn StudyOffice>,
}

impl NodeContainer {
    /// Container over a fresh broker and in-memory stores.
    pub fn new(config: NodeConfig) -> Self {
        let (users, office) = if config.seed_data {
            (InMemoryUserDirectory::seeded(), InMemoryStudyOffice::seeded())
        } else {
            (InMemoryUserDirectory::new(), InMemoryStudyOffice::new())
        };
        Self::with_collaborators(config, InMemoryBroker::new(), Arc::new(users), Arc::new(office))
    }

    /// Container over caller-provided broker and stores.
    pub fn with_collaborators(
        config: NodeConfig,
        broker: InMemoryBroker,
        users: Arc<dyn UserDirectory>,
        office: Arc<dyn StudyOffice>,
    ) -> Self {
        Self {
            config,
            broker,
            users,
            office,
        }
    }

    /// A new managed connection to the broker.
    pub fn connection(&self, backoff: &BackoffPolicy) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(
            Arc::new(self.broker.connector()),
            backoff.clone(),
        ))
    }
}
