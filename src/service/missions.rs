use crate::changelog::{ChangeAction, ChangeLog};
use crate::entity::{now_millis, Entity, Mission, Named, Shareable};
use crate::error::StoreError;
use crate::index::{AssociationIndex, NameIndex, NameLookup, PartitionIndex};
use crate::log::{debug, info, warn};
use crate::rest::RestClient;
use crate::store::EntityStore;

#[derive(Clone)]
pub struct MissionService {
    store: EntityStore<Mission>,
    names: NameIndex,
    partitions: PartitionIndex<Mission>,
    tasks: AssociationIndex,
    changelog: ChangeLog,
}

impl MissionService {
    #[must_use]
    pub fn new(client: RestClient, changelog: ChangeLog) -> Self {
        let store = EntityStore::new(client.clone());
        Self {
            names: NameIndex::for_entity::<Mission>(client.clone()),
            partitions: PartitionIndex::new(store.clone()),
            tasks: AssociationIndex::task_missions(client),
            store,
            changelog,
        }
    }

    #[must_use]
    pub fn store(&self) -> &EntityStore<Mission> {
        &self.store
    }

    #[must_use]
    pub fn names(&self) -> &NameIndex {
        &self.names
    }

    #[must_use]
    pub fn partitions(&self) -> &PartitionIndex<Mission> {
        &self.partitions
    }

    /// The id of the mission currently holding `name`, if any.
    ///
    /// A lookup whose mission is gone or has since been renamed is stale: it counts as free
    /// and is removed on a best-effort basis.
    ///
    /// # Errors
    /// Transport failures while reading the lookup or the mission.
    pub async fn name_owner(&self, name: &str) -> Result<Option<String>, StoreError> {
        let Some(lookup) = self.names.get(name).await? else {
            return Ok(None);
        };
        let live = match self.store.get(&lookup.target_id).await? {
            Some(mission) => mission.name == name,
            None => false,
        };
        if live {
            return Ok(Some(lookup.target_id));
        }
        warn!("name {} points at {} which no longer carries it", name, lookup.target_id);
        if let Err(e) = self.names.remove(name, &lookup.target_id).await {
            debug!("could not remove stale name {}: {}", name, e);
        }
        Ok(None)
    }

    /// # Errors
    /// See `name_owner`.
    pub async fn name_taken(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.name_owner(name).await?.is_some())
    }

    async fn ensure_name_free(&self, name: &str, own_id: Option<&str>) -> Result<(), StoreError> {
        match self.name_owner(name).await? {
            Some(owner) if Some(owner.as_str()) != own_id => {
                Err(StoreError::DuplicateName(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Stores a new mission, indexes its name and partition, and records the addition.
    /// Returns the new id, which is also set on `mission`.
    ///
    /// A mission whose earlier create failed part way already carries its id; calling this
    /// again with it rewrites that record and finishes the remaining steps.
    ///
    /// # Errors
    /// `StoreError::DuplicateName` if another mission holds the name; otherwise the first
    /// failing step.
    pub async fn create(&self, mission: &mut Mission) -> Result<String, StoreError> {
        let earlier = mission.id().map(str::to_string);
        self.ensure_name_free(&mission.name, earlier.as_deref()).await?;
        mission.touch(now_millis());
        let id = match earlier {
            Some(id) => {
                debug!("finishing the create of mission {}", id);
                self.store.put(mission).await?;
                id
            }
            None => self.store.create(mission).await?,
        };
        self.names
            .create_or_update(&NameLookup::new(&mission.name, &id))
            .await?;
        self.partitions
            .create_or_update(&mission.placement(), &id)
            .await?;
        self.changelog.append(&*mission, ChangeAction::Add).await?;
        mission.remember_saved();
        info!("created mission {} ({})", id, mission.name);
        Ok(id)
    }

    /// Saves an edited mission and moves its name and partition entries if they changed.
    ///
    /// # Errors
    /// `StoreError::NotFound` for a mission that was never loaded or saved,
    /// `StoreError::DuplicateName` for a new name held by another mission; otherwise the
    /// first failing step.
    pub async fn update(&self, mut mission: Mission) -> Result<Mission, StoreError> {
        let id = mission.require_id()?.to_string();
        let (Some(saved_name), Some(saved_placement)) = (
            mission.saved_name().map(str::to_string),
            mission.saved_placement().cloned(),
        ) else {
            return Err(StoreError::NotFound(format!(
                "mission {id} has no saved revision; load it before updating"
            )));
        };

        let renamed = saved_name != mission.name;
        if renamed {
            self.ensure_name_free(&mission.name, Some(&id)).await?;
        }
        mission.touch(now_millis());
        self.store.put(&mut mission).await?;

        if renamed {
            debug!("mission {} renamed from {} to {}", id, saved_name, mission.name);
        }
        self.names
            .recreate_lookup(&saved_name, &NameLookup::new(&mission.name, &id))
            .await?;
        self.partitions
            .recreate_lookup(&id, &mission.placement(), &saved_placement)
            .await?;
        self.changelog.append(&mission, ChangeAction::Update).await?;
        mission.remember_saved();
        Ok(mission)
    }

    /// Deletes the mission, its name and partition entries, and its links to tasks.
    ///
    /// # Errors
    /// The first failing step.
    pub async fn delete(&self, mut mission: Mission) -> Result<(), StoreError> {
        let id = mission.require_id()?.to_string();
        let name = mission
            .saved_name()
            .map_or_else(|| mission.name.clone(), str::to_string);
        let placement = mission
            .saved_placement()
            .cloned()
            .unwrap_or_else(|| mission.placement());

        if !self.store.delete(&id).await? {
            debug!("mission {} was already gone", id);
        }
        self.names.remove(&name, &id).await?;
        self.partitions.remove(&placement, &id).await?;
        let unlinked = self.tasks.remove_all_edges_for_b(&id).await?;
        mission.touch(now_millis());
        self.changelog.append(&mission, ChangeAction::Delete).await?;
        info!("deleted mission {} and {} task links", id, unlinked.len());
        Ok(())
    }

    /// # Errors
    /// Transport failures.
    pub async fn get(&self, id: &str) -> Result<Option<Mission>, StoreError> {
        self.store.get(id).await
    }

    /// # Errors
    /// Transport failures.
    pub async fn list_public(&self, city_id: &str) -> Result<Vec<Mission>, StoreError> {
        self.partitions.get_public(city_id).await
    }

    /// # Errors
    /// Transport failures.
    pub async fn list_private(
        &self,
        city_id: &str,
        owner_id: &str,
    ) -> Result<Vec<Mission>, StoreError> {
        self.partitions.get_private(city_id, owner_id).await
    }
}
