//! Buckets of ids grouped by city, visibility and owner, so a city's public entities and a
//! user's private ones can be listed without a query engine.
//!
//! Public buckets live at `<collection>_partitions/public/<city>`, private ones at
//! `<collection>_partitions/private/<city>/<owner>`. Each holds a JSON array of ids. Listing is
//! index-then-join: read the bucket, then load each entity by id.

use indexmap::IndexSet;

use super::{add_id, read_ids, remove_id};
use crate::entity::{Access, Placement, Shareable};
use crate::error::StoreError;
use crate::log::{debug, warn};
use crate::path::ResourcePath;
use crate::store::EntityStore;

#[derive(Clone)]
pub struct PartitionIndex<E: Shareable> {
    store: EntityStore<E>,
    root: ResourcePath,
}

/// The bucket an entity occupied before an edit. City and access are compared separately
/// since one edit can change both.
#[must_use]
pub fn previous_placement(current: &Placement, saved: &Placement) -> Placement {
    let mut previous = current.clone();
    if saved.access != current.access {
        previous.access = current.access.flipped();
    }
    if saved.city_id != current.city_id {
        previous.city_id.clone_from(&saved.city_id);
    }
    if saved.owner_id != current.owner_id {
        previous.owner_id.clone_from(&saved.owner_id);
    }
    previous
}

impl<E: Shareable> PartitionIndex<E> {
    #[must_use]
    pub fn new(store: EntityStore<E>) -> Self {
        Self {
            store,
            root: ResourcePath::collection(&format!("{}_partitions", E::COLLECTION)),
        }
    }

    #[must_use]
    pub fn bucket_path(&self, placement: &Placement) -> ResourcePath {
        let bucket = self
            .root
            .child(placement.access.path_segment())
            .child(&placement.city_id);
        match placement.access {
            Access::Public => bucket,
            Access::Private => bucket.child(&placement.owner_id),
        }
    }

    /// # Errors
    /// Transport failures.
    pub async fn ids_at(&self, placement: &Placement) -> Result<IndexSet<String>, StoreError> {
        read_ids(self.store.client(), &self.bucket_path(placement)).await
    }

    /// # Errors
    /// Transport failures, or an entity that does not decode.
    pub async fn get_public(&self, city_id: &str) -> Result<Vec<E>, StoreError> {
        self.resolve(&Placement {
            city_id: city_id.to_string(),
            access: Access::Public,
            owner_id: String::new(),
        })
        .await
    }

    /// # Errors
    /// Transport failures, or an entity that does not decode.
    pub async fn get_private(&self, city_id: &str, owner_id: &str) -> Result<Vec<E>, StoreError> {
        self.resolve(&Placement {
            city_id: city_id.to_string(),
            access: Access::Private,
            owner_id: owner_id.to_string(),
        })
        .await
    }

    async fn resolve(&self, placement: &Placement) -> Result<Vec<E>, StoreError> {
        let ids = self.ids_at(placement).await?;
        let mut entities = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.store.get(id).await? {
                Some(entity) => entities.push(entity),
                None => warn!(
                    "{} lists {} but the record is gone",
                    self.bucket_path(placement),
                    id
                ),
            }
        }
        Ok(entities)
    }

    /// Adds `target_id` to the bucket for `placement`, creating the bucket if needed.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn create_or_update(
        &self,
        placement: &Placement,
        target_id: &str,
    ) -> Result<(), StoreError> {
        add_id(self.store.client(), &self.bucket_path(placement), target_id).await?;
        Ok(())
    }

    /// Removes `target_id` from the bucket for `placement`; an emptied bucket is deleted.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn remove(&self, placement: &Placement, target_id: &str) -> Result<(), StoreError> {
        remove_id(self.store.client(), &self.bucket_path(placement), target_id).await?;
        Ok(())
    }

    /// Moves `target_id` from the bucket it occupied at `saved` to the one for `current`.
    /// The new bucket is written first; if that fails the id is still in the old one.
    ///
    /// # Errors
    /// Transport failures from either step.
    pub async fn recreate_lookup(
        &self,
        target_id: &str,
        current: &Placement,
        saved: &Placement,
    ) -> Result<(), StoreError> {
        self.create_or_update(current, target_id).await?;
        let previous = previous_placement(current, saved);
        if self.bucket_path(&previous) == self.bucket_path(current) {
            return Ok(());
        }
        debug!(
            "moving {} from {} to {}",
            target_id,
            self.bucket_path(&previous),
            self.bucket_path(current)
        );
        self.remove(&previous, target_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, Mission};
    use crate::rest::RestClient;
    use crate::transport::{FaultOp, MemoryTransport};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn placement(city: &str, access: Access, owner: &str) -> Placement {
        Placement {
            city_id: city.to_string(),
            access,
            owner_id: owner.to_string(),
        }
    }

    fn index() -> (Arc<MemoryTransport>, PartitionIndex<Mission>) {
        let transport = Arc::new(MemoryTransport::new());
        let store = EntityStore::new(RestClient::new(transport.clone()));
        (transport, PartitionIndex::new(store))
    }

    #[test]
    fn bucket_paths() {
        let (_, index) = index();
        assert_eq!(
            index
                .bucket_path(&placement("C1", Access::Public, "u1"))
                .to_string(),
            "/missions_partitions/public/C1"
        );
        assert_eq!(
            index
                .bucket_path(&placement("C1", Access::Private, "u1"))
                .to_string(),
            "/missions_partitions/private/C1/u1"
        );
    }

    #[test]
    fn previous_placement_flips_each_field_independently() {
        let saved = placement("C1", Access::Private, "u1");
        let moved = placement("C2", Access::Public, "u1");
        assert_eq!(previous_placement(&moved, &saved), saved);

        let city_only = placement("C2", Access::Private, "u1");
        assert_eq!(previous_placement(&city_only, &saved), saved);

        let access_only = placement("C1", Access::Public, "u1");
        assert_eq!(previous_placement(&access_only, &saved), saved);
    }

    #[tokio::test]
    async fn index_then_join_skips_missing_records() {
        let (_, index) = index();
        let mut mission = Mission::new("Alpha", "u1", "C1", Access::Public);
        let id = index.store.create(&mut mission).await.unwrap();
        let public = mission.placement();
        index.create_or_update(&public, &id).await.unwrap();
        index.create_or_update(&public, &id).await.unwrap();
        index.create_or_update(&public, "gone").await.unwrap();

        assert_eq!(index.ids_at(&public).await.unwrap().len(), 2);
        let listed = index.get_public("C1").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id(), Some(id.as_str()));
        assert!(index.get_private("C1", "u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn move_between_buckets() {
        let (transport, index) = index();
        let saved = placement("C1", Access::Private, "u1");
        let current = placement("C2", Access::Public, "u1");
        index.create_or_update(&saved, "E1").await.unwrap();
        index.create_or_update(&saved, "E2").await.unwrap();

        index.recreate_lookup("E1", &current, &saved).await.unwrap();
        assert_eq!(transport.peek(&index.bucket_path(&saved)), json!(["E2"]));
        assert_eq!(transport.peek(&index.bucket_path(&current)), json!(["E1"]));

        index.recreate_lookup("E2", &current, &saved).await.unwrap();
        assert_eq!(transport.peek(&index.bucket_path(&saved)), Value::Null);
    }

    #[tokio::test]
    async fn failed_add_keeps_the_old_bucket() {
        let (transport, index) = index();
        let saved = placement("C1", Access::Private, "u1");
        let current = placement("C2", Access::Public, "u1");
        index.create_or_update(&saved, "E1").await.unwrap();

        transport.fail_next(
            FaultOp::Put,
            &index.bucket_path(&current),
            StoreError::ConnectionFailed("dropped".into()),
        );
        assert!(index.recreate_lookup("E1", &current, &saved).await.is_err());
        assert!(index.ids_at(&saved).await.unwrap().contains("E1"));

        index.recreate_lookup("E1", &current, &saved).await.unwrap();
        assert!(!index.ids_at(&saved).await.unwrap().contains("E1"));
        assert!(index.ids_at(&current).await.unwrap().contains("E1"));
    }
}
