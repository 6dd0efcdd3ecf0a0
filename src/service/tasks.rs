use indexmap::IndexSet;

use crate::changelog::{ChangeAction, ChangeLog};
use crate::entity::{now_millis, Entity, Task};
use crate::error::StoreError;
use crate::index::AssociationIndex;
use crate::log::{info, warn};
use crate::rest::RestClient;
use crate::store::EntityStore;

#[derive(Clone)]
pub struct TaskService {
    store: EntityStore<Task>,
    missions: AssociationIndex,
    changelog: ChangeLog,
}

impl TaskService {
    #[must_use]
    pub fn new(client: RestClient, changelog: ChangeLog) -> Self {
        Self {
            store: EntityStore::new(client.clone()),
            missions: AssociationIndex::task_missions(client),
            changelog,
        }
    }

    #[must_use]
    pub fn store(&self) -> &EntityStore<Task> {
        &self.store
    }

    #[must_use]
    pub fn associations(&self) -> &AssociationIndex {
        &self.missions
    }

    /// Stores a new task and links it to its missions. Returns the new id, which is also set
    /// on `task`. Calling it again after a failure finishes the same task.
    ///
    /// # Errors
    /// The first failing step.
    pub async fn create(&self, task: &mut Task) -> Result<String, StoreError> {
        task.touch(now_millis());
        let id = match task.id().map(str::to_string) {
            Some(id) => {
                self.store.put(task).await?;
                id
            }
            None => self.store.create(task).await?,
        };
        self.missions.add_edges(&id, &task.mission_ids).await?;
        self.changelog.append(&*task, ChangeAction::Add).await?;
        task.remember_saved();
        info!("created task {} in {} missions", id, task.mission_ids.len());
        Ok(id)
    }

    /// Saves an edited task and relinks it to its current missions.
    ///
    /// # Errors
    /// `StoreError::NotFound` for a task that was never loaded or saved; otherwise the first
    /// failing step.
    pub async fn update(&self, mut task: Task) -> Result<Task, StoreError> {
        let id = task.require_id()?.to_string();
        let Some(previous) = task.saved_mission_ids().cloned() else {
            return Err(StoreError::NotFound(format!(
                "task {id} has no saved revision; load it before updating"
            )));
        };
        task.touch(now_millis());
        self.store.put(&mut task).await?;
        self.missions
            .update_edges(&previous, &id, &task.mission_ids)
            .await?;
        self.changelog.append(&task, ChangeAction::Update).await?;
        task.remember_saved();
        Ok(task)
    }

    /// Deletes the task and its links to missions.
    ///
    /// # Errors
    /// The first failing step.
    pub async fn delete(&self, mut task: Task) -> Result<(), StoreError> {
        let id = task.require_id()?.to_string();
        // Links the backend holds plus any the caller knows of.
        let mut linked: IndexSet<String> = self.missions.a_side(&id).await?;
        linked.extend(task.mission_ids.iter().cloned());
        if let Some(saved) = task.saved_mission_ids() {
            linked.extend(saved.iter().cloned());
        }

        self.store.delete(&id).await?;
        self.missions.remove_all_edges_for(&id, &linked).await?;
        task.touch(now_millis());
        self.changelog.append(&task, ChangeAction::Delete).await?;
        info!("deleted task {} and {} mission links", id, linked.len());
        Ok(())
    }

    /// Loads a task with its mission links attached.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn get(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let Some(mut task) = self.store.get(id).await? else {
            return Ok(None);
        };
        task.mission_ids = self.missions.a_side(id).await?;
        task.remember_saved();
        Ok(Some(task))
    }

    /// # Errors
    /// Transport failures.
    pub async fn tasks_for_mission(&self, mission_id: &str) -> Result<Vec<Task>, StoreError> {
        let ids = self.missions.b_side(mission_id).await?;
        let mut tasks = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.get(id).await? {
                Some(task) => tasks.push(task),
                None => warn!("mission {} links task {} which is gone", mission_id, id),
            }
        }
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use std::sync::Arc;

    fn service() -> TaskService {
        let transport = Arc::new(MemoryTransport::new());
        let client = RestClient::new(transport);
        TaskService::new(client.clone(), ChangeLog::new(client, ["tasks"]))
    }

    #[tokio::test]
    async fn get_attaches_mission_links() {
        let service = service();
        let mut task = Task::new("Survey").with_missions(["M1", "M2"]);
        let id = service.create(&mut task).await.unwrap();

        let loaded = service.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.mission_ids, task.mission_ids);
        assert_eq!(loaded.saved_mission_ids(), Some(&task.mission_ids));

        let for_m2 = service.tasks_for_mission("M2").await.unwrap();
        assert_eq!(for_m2.len(), 1);
        assert_eq!(for_m2[0].title, "Survey");
    }

    #[tokio::test]
    async fn update_relinks_missions() {
        let service = service();
        let mut task = Task::new("Survey").with_missions(["M1", "M2"]);
        let id = service.create(&mut task).await.unwrap();
        task.mission_ids = ["M2", "M3"].into_iter().map(String::from).collect();
        service.update(task).await.unwrap();

        assert!(service.tasks_for_mission("M1").await.unwrap().is_empty());
        assert_eq!(service.tasks_for_mission("M3").await.unwrap().len(), 1);
        let entries = service.changelog.read_since(0, &["tasks"]).await.unwrap();
        assert_eq!(entries.last().map(|entry| entry.action), Some(ChangeAction::Update));
        assert_eq!(entries.last().map(|entry| entry.target_id.clone()), Some(id));
    }
}
