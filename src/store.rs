//! CRUD access to one entity collection.
//!
//! `create` is append-then-rewrite: the append gets the backend to assign an id, and the
//! record is then written again at `<collection>/<id>` with the id inside it. If the rewrite
//! fails the appended record stays behind without its id field; nothing compensates for it.
//!
//! Loading marks an entity's revision; writing does not. The use cases in `service` mark it
//! once every index step after the write has gone through, so a use case that failed halfway
//! sees the same diff when it is retried.

use std::marker::PhantomData;

use crate::entity::Entity;
use crate::error::StoreError;
use crate::log::{trace, warn};
use crate::path::{Query, ResourcePath};
use crate::rest::RestClient;

#[derive(Clone)]
pub struct EntityStore<E: Entity> {
    client: RestClient,
    collection: ResourcePath,
    _phantom: PhantomData<E>,
}

impl<E: Entity> EntityStore<E> {
    #[must_use]
    pub fn new(client: RestClient) -> Self {
        Self {
            client,
            collection: ResourcePath::collection(E::COLLECTION),
            _phantom: PhantomData,
        }
    }

    #[must_use]
    pub fn client(&self) -> &RestClient {
        &self.client
    }

    #[must_use]
    pub fn path_for(&self, id: &str) -> ResourcePath {
        self.collection.child(id)
    }

    /// Stores a new entity and assigns its id. Returns the id.
    ///
    /// # Errors
    /// Transport failures from either the append or the rewrite.
    pub async fn create(&self, entity: &mut E) -> Result<String, StoreError> {
        let id = self.client.append(&self.collection, entity).await?;
        entity.set_id(id.clone());
        trace!("{} assigned id {}", E::COLLECTION, id);
        if let Err(e) = self.client.put(&self.path_for(&id), entity).await {
            warn!(
                "{} {} was appended but could not be rewritten: {}",
                E::COLLECTION,
                id,
                e
            );
            return Err(e);
        }
        Ok(id)
    }

    /// # Errors
    /// Transport failures, or a record that does not decode.
    pub async fn get(&self, id: &str) -> Result<Option<E>, StoreError> {
        let entity: Option<E> = self.client.get(&self.path_for(id)).await?;
        Ok(entity.map(|mut entity| {
            // Records whose rewrite never happened carry no id field.
            if entity.id().is_none() {
                entity.set_id(id.to_string());
            }
            entity.remember_saved();
            entity
        }))
    }

    /// Lists the collection, filtered by `query`.
    ///
    /// # Errors
    /// Transport failures, or a record that does not decode.
    pub async fn list(&self, query: &Query) -> Result<Vec<E>, StoreError> {
        let children: Vec<(String, E)> = self.client.list(&self.collection, query).await?;
        Ok(children
            .into_iter()
            .map(|(key, mut entity)| {
                if entity.id().is_none() {
                    entity.set_id(key);
                }
                entity.remember_saved();
                entity
            })
            .collect())
    }

    /// Writes the entity over its existing record.
    ///
    /// # Errors
    /// `StoreError::MissingId` for an entity that was never created; transport failures.
    pub async fn put(&self, entity: &mut E) -> Result<(), StoreError> {
        let path = self.path_for(entity.require_id()?);
        self.client.put(&path, entity).await
    }

    /// Deletes the record. Returns whether it existed.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.client.delete(&self.path_for(id)).await
    }

    /// # Errors
    /// Transport failures.
    pub async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        self.client
            .exists(&self.path_for(id), &Query::shallow())
            .await
    }
}
