//! Append-only record of mutations, read by clients doing incremental sync.
//!
//! Entries are appended under `changelog/<collection>` with backend-assigned keys and are never
//! rewritten. `prune_before` deletes old entries one at a time; if it stops part way the rest
//! are picked up by the next prune, and readers never depend on the log alone.

use serde_derive::{Deserialize, Serialize};
use std::time::Duration;

use crate::entity::{now_millis, Entity, Timestamp};
use crate::error::StoreError;
use crate::log::{debug, info, trace};
use crate::path::{Query, ResourcePath};
use crate::rest::RestClient;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Add,
    Update,
    Delete,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub target_id: String,
    pub action: ChangeAction,
    pub timestamp: Timestamp,
}

#[derive(Clone)]
pub struct ChangeLog {
    client: RestClient,
    root: ResourcePath,
    tracked: Vec<String>,
}

impl ChangeLog {
    /// A change log pruning the given collections.
    #[must_use]
    pub fn new<I, S>(client: RestClient, tracked_collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client,
            root: ResourcePath::collection("changelog"),
            tracked: tracked_collections.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn tracked_collections(&self) -> &[String] {
        &self.tracked
    }

    fn path_for(&self, path_parts: &[&str]) -> ResourcePath {
        path_parts
            .iter()
            .fold(self.root.clone(), |path, part| path.child(part))
    }

    /// Records `action` against `entity`, stamped with the entity's timestamp.
    ///
    /// # Errors
    /// `StoreError::MissingId` for an entity without an id; transport failures.
    pub async fn append<E: Entity>(
        &self,
        entity: &E,
        action: ChangeAction,
    ) -> Result<ChangeLogEntry, StoreError> {
        let entry = ChangeLogEntry {
            target_id: entity.require_id()?.to_string(),
            action,
            timestamp: entity.timestamp(),
        };
        self.append_entry(E::COLLECTION, &entry).await?;
        Ok(entry)
    }

    /// Appends a prepared entry under `collection`. Returns the key it was stored at.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn append_entry(
        &self,
        collection: &str,
        entry: &ChangeLogEntry,
    ) -> Result<String, StoreError> {
        trace!(
            "changelog {} {:?} {} at {}",
            collection,
            entry.action,
            entry.target_id,
            entry.timestamp
        );
        self.client.append(&self.path_for(&[collection]), entry).await
    }

    /// Entries at or after `timestamp` under `changelog/<path_parts..>`, oldest first.
    ///
    /// # Errors
    /// Transport failures, or an entry that does not decode.
    pub async fn read_since(
        &self,
        timestamp: Timestamp,
        path_parts: &[&str],
    ) -> Result<Vec<ChangeLogEntry>, StoreError> {
        let query = Query::new().order_by("timestamp").start_at(timestamp);
        let entries: Vec<(String, ChangeLogEntry)> =
            self.client.list(&self.path_for(path_parts), &query).await?;
        Ok(entries.into_iter().map(|(_, entry)| entry).collect())
    }

    /// Deletes entries at or before `timestamp` in every tracked collection. Returns how many
    /// were deleted.
    ///
    /// # Errors
    /// Transport failures; entries deleted before the failure stay deleted.
    pub async fn prune_before(&self, timestamp: Timestamp) -> Result<usize, StoreError> {
        let query = Query::new().order_by("timestamp").end_at(timestamp);
        let mut pruned = 0;
        for collection in &self.tracked {
            let path = self.path_for(&[collection]);
            let stale: Vec<(String, ChangeLogEntry)> = self.client.list(&path, &query).await?;
            debug!("pruning {} entries from {}", stale.len(), path);
            for (key, _) in stale {
                self.client.transport().delete(&path.child(&key)).await?;
                pruned += 1;
            }
        }
        info!("pruned {} change log entries up to {}", pruned, timestamp);
        Ok(pruned)
    }

    /// Prunes everything older than `retention`.
    ///
    /// # Errors
    /// See `prune_before`.
    pub async fn prune_older_than(&self, retention: Duration) -> Result<usize, StoreError> {
        let retention = Timestamp::try_from(retention.as_millis()).unwrap_or(Timestamp::MAX);
        self.prune_before(now_millis().saturating_sub(retention))
            .await
    }
}
