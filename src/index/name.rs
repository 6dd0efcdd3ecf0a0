//! Name to id lookups for one collection, stored at `<collection>_names/<name>`.
//!
//! Uniqueness is best effort. Checking a name and claiming it are two round trips, so two
//! clients can both see a name as free and both claim it; the later write wins.

use serde_derive::{Deserialize, Serialize};

use crate::entity::Named;
use crate::error::StoreError;
use crate::log::{debug, trace};
use crate::path::{Query, ResourcePath};
use crate::rest::RestClient;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameLookup {
    pub name: String,
    pub target_id: String,
}

impl NameLookup {
    #[must_use]
    pub fn new(name: &str, target_id: &str) -> Self {
        Self {
            name: name.to_string(),
            target_id: target_id.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct NameIndex {
    client: RestClient,
    root: ResourcePath,
}

impl NameIndex {
    #[must_use]
    pub fn new(client: RestClient, collection: &str) -> Self {
        Self {
            client,
            root: ResourcePath::collection(&format!("{collection}_names")),
        }
    }

    #[must_use]
    pub fn for_entity<E: Named>(client: RestClient) -> Self {
        Self::new(client, E::COLLECTION)
    }

    #[must_use]
    pub fn path_for(&self, name: &str) -> ResourcePath {
        self.root.child(name)
    }

    /// # Errors
    /// Transport failures.
    pub async fn check_if_name_exists(&self, name: &str) -> Result<bool, StoreError> {
        self.client
            .exists(&self.path_for(name), &Query::shallow())
            .await
    }

    /// # Errors
    /// Transport failures, or a lookup record that does not decode.
    pub async fn get(&self, name: &str) -> Result<Option<NameLookup>, StoreError> {
        self.client.get(&self.path_for(name)).await
    }

    /// Points `lookup.name` at `lookup.target_id`. Writes only if the name is free or
    /// points somewhere else.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn create_or_update(&self, lookup: &NameLookup) -> Result<(), StoreError> {
        if let Some(existing) = self.get(&lookup.name).await? {
            if existing.target_id == lookup.target_id {
                trace!("name {} already points at {}", lookup.name, lookup.target_id);
                return Ok(());
            }
            debug!(
                "name {} moves from {} to {}",
                lookup.name, existing.target_id, lookup.target_id
            );
        }
        self.client.put(&self.path_for(&lookup.name), lookup).await
    }

    /// Moves a target from `old_name` to `lookup.name`. The new lookup is written before the
    /// old one is deleted, so a failure part way leaves the new name claimed.
    ///
    /// # Errors
    /// Transport failures from either step.
    pub async fn recreate_lookup(&self, old_name: &str, lookup: &NameLookup) -> Result<(), StoreError> {
        self.create_or_update(lookup).await?;
        if old_name != lookup.name {
            self.remove(old_name, &lookup.target_id).await?;
        }
        Ok(())
    }

    /// Deletes the lookup at `name` if it still points at `target_id`. Returns whether it
    /// was deleted.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn remove(&self, name: &str, target_id: &str) -> Result<bool, StoreError> {
        match self.get(name).await? {
            Some(existing) if existing.target_id == target_id => {
                self.client.transport().delete(&self.path_for(name)).await?;
                Ok(true)
            }
            Some(existing) => {
                debug!(
                    "name {} belongs to {}, not {}; left in place",
                    name, existing.target_id, target_id
                );
                Ok(false)
            }
            None => Ok(false),
        }
    }
}
