//! A many-to-many relation kept as two reverse maps, one per side.
//!
//! Side A lives at `<a_root>/<a id>` and lists B ids; side B at `<b_root>/<b id>` listing A
//! ids. Every edge is written through `link`/`unlink`, which update the B side first and then
//! the A side. A failure between the two leaves a one-sided edge that the next rewrite of the
//! same edge repairs.

use indexmap::IndexSet;

use super::{add_id, read_ids, remove_id};
use crate::error::StoreError;
use crate::log::trace;
use crate::path::ResourcePath;
use crate::rest::RestClient;

/// The edges to add and remove to get from one set of B ids to another.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EdgeChanges {
    pub added: IndexSet<String>,
    pub removed: IndexSet<String>,
}

#[must_use]
pub fn symmetric_difference(
    previous: &IndexSet<String>,
    current: &IndexSet<String>,
) -> EdgeChanges {
    EdgeChanges {
        added: current.difference(previous).cloned().collect(),
        removed: previous.difference(current).cloned().collect(),
    }
}

#[derive(Clone)]
pub struct AssociationIndex {
    client: RestClient,
    a_root: ResourcePath,
    b_root: ResourcePath,
}

impl AssociationIndex {
    #[must_use]
    pub fn new(client: RestClient, a_collection: &str, b_collection: &str) -> Self {
        Self {
            client,
            a_root: ResourcePath::collection(a_collection),
            b_root: ResourcePath::collection(b_collection),
        }
    }

    /// Tasks on side A, missions on side B.
    #[must_use]
    pub fn task_missions(client: RestClient) -> Self {
        Self::new(client, "task_missions", "mission_tasks")
    }

    #[must_use]
    pub fn a_path(&self, a_id: &str) -> ResourcePath {
        self.a_root.child(a_id)
    }

    #[must_use]
    pub fn b_path(&self, b_id: &str) -> ResourcePath {
        self.b_root.child(b_id)
    }

    /// The B ids linked to `a_id`.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn a_side(&self, a_id: &str) -> Result<IndexSet<String>, StoreError> {
        read_ids(&self.client, &self.a_path(a_id)).await
    }

    /// The A ids linked to `b_id`.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn b_side(&self, b_id: &str) -> Result<IndexSet<String>, StoreError> {
        read_ids(&self.client, &self.b_path(b_id)).await
    }

    /// Adds the edge on both sides.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn link(&self, a_id: &str, b_id: &str) -> Result<(), StoreError> {
        add_id(&self.client, &self.b_path(b_id), a_id).await?;
        add_id(&self.client, &self.a_path(a_id), b_id).await?;
        Ok(())
    }

    /// Removes the edge from both sides.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn unlink(&self, a_id: &str, b_id: &str) -> Result<(), StoreError> {
        remove_id(&self.client, &self.b_path(b_id), a_id).await?;
        remove_id(&self.client, &self.a_path(a_id), b_id).await?;
        Ok(())
    }

    /// # Errors
    /// Transport failures; edges before the failing one stay written.
    pub async fn add_edges(&self, a_id: &str, b_ids: &IndexSet<String>) -> Result<(), StoreError> {
        for b_id in b_ids {
            self.link(a_id, b_id).await?;
        }
        Ok(())
    }

    /// Brings `a_id`'s edges from `previous_b_ids` to `new_b_ids`: removed edges first, then
    /// every edge of the new set is (re)added.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn update_edges(
        &self,
        previous_b_ids: &IndexSet<String>,
        a_id: &str,
        new_b_ids: &IndexSet<String>,
    ) -> Result<EdgeChanges, StoreError> {
        let changes = symmetric_difference(previous_b_ids, new_b_ids);
        trace!(
            "{}: {} edges added, {} removed",
            a_id,
            changes.added.len(),
            changes.removed.len()
        );
        for b_id in &changes.removed {
            self.unlink(a_id, b_id).await?;
        }
        self.add_edges(a_id, new_b_ids).await?;
        Ok(changes)
    }

    /// Removes every edge of `a_id` to `b_ids`, then drops `a_id`'s own record.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn remove_all_edges_for(
        &self,
        a_id: &str,
        b_ids: &IndexSet<String>,
    ) -> Result<(), StoreError> {
        for b_id in b_ids {
            remove_id(&self.client, &self.b_path(b_id), a_id).await?;
        }
        self.client.delete(&self.a_path(a_id)).await?;
        Ok(())
    }

    /// Removes every edge of `b_id`, then drops `b_id`'s own record. Returns the A ids that
    /// were linked.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn remove_all_edges_for_b(&self, b_id: &str) -> Result<IndexSet<String>, StoreError> {
        let a_ids = self.b_side(b_id).await?;
        for a_id in &a_ids {
            remove_id(&self.client, &self.a_path(a_id), b_id).await?;
        }
        self.client.delete(&self.b_path(b_id)).await?;
        Ok(a_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{FaultOp, MemoryTransport};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn set(ids: &[&str]) -> IndexSet<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    fn index() -> (Arc<MemoryTransport>, AssociationIndex) {
        let transport = Arc::new(MemoryTransport::new());
        let index = AssociationIndex::task_missions(RestClient::new(transport.clone()));
        (transport, index)
    }

    #[test]
    fn symmetric_difference_splits_added_and_removed() {
        let changes = symmetric_difference(&set(&["M1", "M2"]), &set(&["M2", "M3"]));
        assert_eq!(changes.added, set(&["M3"]));
        assert_eq!(changes.removed, set(&["M1"]));
        assert_eq!(
            symmetric_difference(&set(&["M1"]), &set(&["M1"])),
            EdgeChanges::default()
        );
    }

    #[tokio::test]
    async fn edges_are_written_on_both_sides() {
        let (_, index) = index();
        index.add_edges("T1", &set(&["M1", "M2"])).await.unwrap();
        assert_eq!(index.a_side("T1").await.unwrap(), set(&["M1", "M2"]));
        assert!(index.b_side("M1").await.unwrap().contains("T1"));
        assert!(index.b_side("M2").await.unwrap().contains("T1"));

        index
            .remove_all_edges_for("T1", &set(&["M1", "M2"]))
            .await
            .unwrap();
        assert!(index.a_side("T1").await.unwrap().is_empty());
        assert!(index.b_side("M1").await.unwrap().is_empty());
        assert!(index.b_side("M2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_edges_moves_links() {
        let (transport, index) = index();
        index.add_edges("T1", &set(&["M1", "M2"])).await.unwrap();
        index.add_edges("T2", &set(&["M1"])).await.unwrap();

        let changes = index
            .update_edges(&set(&["M1", "M2"]), "T1", &set(&["M2", "M3"]))
            .await
            .unwrap();
        assert_eq!(changes.removed, set(&["M1"]));
        assert_eq!(index.a_side("T1").await.unwrap(), set(&["M2", "M3"]));
        assert_eq!(transport.peek(&index.b_path("M1")), json!(["T2"]));
        assert!(index.b_side("M3").await.unwrap().contains("T1"));
    }

    #[tokio::test]
    async fn removing_a_b_record_unlinks_every_a() {
        let (transport, index) = index();
        index.add_edges("T1", &set(&["M1", "M2"])).await.unwrap();
        index.add_edges("T2", &set(&["M1"])).await.unwrap();

        let unlinked = index.remove_all_edges_for_b("M1").await.unwrap();
        assert_eq!(unlinked, set(&["T1", "T2"]));
        assert_eq!(index.a_side("T1").await.unwrap(), set(&["M2"]));
        assert_eq!(transport.peek(&index.a_path("T2")), Value::Null);
        assert_eq!(transport.peek(&index.b_path("M1")), Value::Null);
    }

    #[tokio::test]
    async fn one_sided_edge_is_repaired_by_relinking() {
        let (transport, index) = index();
        transport.fail_next(
            FaultOp::Put,
            &index.a_path("T1"),
            StoreError::ConnectionFailed("dropped".into()),
        );
        assert!(index.link("T1", "M1").await.is_err());
        assert!(index.b_side("M1").await.unwrap().contains("T1"));
        assert!(index.a_side("T1").await.unwrap().is_empty());

        index.link("T1", "M1").await.unwrap();
        assert_eq!(index.a_side("T1").await.unwrap(), set(&["M1"]));
    }
}
