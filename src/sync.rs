//! Brings a `ListCache` up to date from the change log.
//!
//! Only the entries since the cache's `last_sync` are read. Entries are collapsed to the
//! newest one per target, then each target is either refetched or dropped from the cache.
//! The log is a hint, not the source of truth: a target whose record is gone is removed even
//! if its newest entry says otherwise.

use indexmap::IndexMap;

use crate::cache::{CacheChange, ListCache};
use crate::changelog::{ChangeAction, ChangeLog, ChangeLogEntry};
use crate::entity::Shareable;
use crate::error::StoreError;
use crate::log::{debug, info};
use crate::store::EntityStore;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entities fetched and placed in the cache.
    pub refreshed: usize,
    /// Ids dropped from the cache, whether deleted or no longer visible to its owner.
    pub removed: usize,
}

#[derive(Clone)]
pub struct CacheSync<E: Shareable> {
    store: EntityStore<E>,
    changelog: ChangeLog,
}

/// The newest entry for each target, in the order targets last changed.
fn latest_per_target(entries: Vec<ChangeLogEntry>) -> Vec<ChangeLogEntry> {
    let mut latest: IndexMap<String, ChangeLogEntry> = IndexMap::new();
    for entry in entries {
        let newer = latest
            .get(&entry.target_id)
            .is_none_or(|seen| seen.timestamp <= entry.timestamp);
        if newer {
            latest.shift_remove(&entry.target_id);
            latest.insert(entry.target_id.clone(), entry);
        }
    }
    latest.into_values().collect()
}

impl<E: Shareable> CacheSync<E> {
    #[must_use]
    pub fn new(store: EntityStore<E>, changelog: ChangeLog) -> Self {
        Self { store, changelog }
    }

    /// # Errors
    /// Transport failures. The cache keeps every change applied before the failure, and
    /// `last_sync` only advances once all entries are applied.
    pub async fn sync(&self, cache: &mut ListCache<E>) -> Result<SyncReport, StoreError> {
        let entries = self
            .changelog
            .read_since(cache.last_sync, &[E::COLLECTION])
            .await?;
        let newest = entries.iter().map(|entry| entry.timestamp).max();
        debug!(
            "{} change log entries for {} since {}",
            entries.len(),
            E::COLLECTION,
            cache.last_sync
        );

        let mut report = SyncReport::default();
        for entry in latest_per_target(entries) {
            let current = match entry.action {
                ChangeAction::Delete => None,
                ChangeAction::Add | ChangeAction::Update => self.store.get(&entry.target_id).await?,
            };
            match current {
                Some(entity) => match cache.upsert(entity) {
                    CacheChange::Placed => report.refreshed += 1,
                    CacheChange::Dropped => report.removed += 1,
                    CacheChange::Unchanged => {}
                },
                None => {
                    if cache.remove(&entry.target_id) {
                        report.removed += 1;
                    }
                }
            }
        }

        if let Some(newest) = newest {
            cache.last_sync = cache.last_sync.max(newest);
        }
        info!(
            "synced {}: {} refreshed, {} removed",
            E::COLLECTION,
            report.refreshed,
            report.removed
        );
        Ok(report)
    }
}
