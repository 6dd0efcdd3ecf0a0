use serde_json::{json, Value};

use crate::cache::{ListCache, SnapshotCache};
use crate::entity::{Mission, Timestamp};
use crate::error::StoreError;
use crate::service::Services;
use crate::sync::CacheSync;

pub(super) async fn changes(
    services: Services,
    collection: String,
    since: Timestamp,
) -> Result<Value, StoreError> {
    let entries = services
        .changelog
        .read_since(since, &[collection.as_str()])
        .await?;
    Ok(serde_json::to_value(entries)?)
}

pub(super) async fn prune(
    services: Services,
    before: Option<Timestamp>,
    retention: std::time::Duration,
) -> Result<Value, StoreError> {
    let pruned = match before {
        Some(before) => services.changelog.prune_before(before).await?,
        None => services.changelog.prune_older_than(retention).await?,
    };
    Ok(json!({ "pruned": pruned }))
}

pub(super) async fn name_exists(services: Services, name: String) -> Result<Value, StoreError> {
    let owner = services.missions.name_owner(&name).await?;
    Ok(json!({
        "name": name,
        "exists": owner.is_some(),
        "target_id": owner,
    }))
}

pub(super) async fn missions(
    services: Services,
    city: String,
    owner: Option<String>,
) -> Result<Value, StoreError> {
    let missions = match owner {
        Some(owner) => services.missions.list_private(&city, &owner).await?,
        None => services.missions.list_public(&city).await?,
    };
    Ok(serde_json::to_value(missions)?)
}

/// Brings `owner`'s mission snapshot up to date from the change log and saves it.
pub(super) async fn sync(
    services: Services,
    snapshots: SnapshotCache,
    owner: String,
) -> Result<Value, StoreError> {
    let mut cache = ListCache::<Mission>::restore(&snapshots, &owner)?;
    let report = CacheSync::new(services.missions.store().clone(), services.changelog.clone())
        .sync(&mut cache)
        .await?;
    cache.persist(&snapshots)?;
    Ok(json!({
        "refreshed": report.refreshed,
        "removed": report.removed,
        "public": cache.public.len(),
        "private": cache.private.len(),
        "last_sync": cache.last_sync,
    }))
}
