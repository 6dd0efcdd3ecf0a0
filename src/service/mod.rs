//! Write and read use cases for each entity kind.
//!
//! A write use case persists the primary record, reconciles the secondary indexes one step at
//! a time and appends to the change log. The first failing step ends the use case with its
//! error; whatever was already written stays written. Every index step checks before it
//! writes, and the entity's saved revision only advances once the whole use case went
//! through, so running a failed use case again converges.

mod missions;
mod tasks;

pub use missions::MissionService;
pub use tasks::TaskService;

use crate::changelog::ChangeLog;
use crate::config::StoreConfig;
use crate::rest::RestClient;

/// The services sharing one client and change log.
#[derive(Clone)]
pub struct Services {
    pub missions: MissionService,
    pub tasks: TaskService,
    pub changelog: ChangeLog,
}

impl Services {
    #[must_use]
    pub fn new(client: RestClient, config: &StoreConfig) -> Self {
        let changelog = ChangeLog::new(client.clone(), config.tracked_collections.clone());
        Self {
            missions: MissionService::new(client.clone(), changelog.clone()),
            tasks: TaskService::new(client, changelog.clone()),
            changelog,
        }
    }
}
