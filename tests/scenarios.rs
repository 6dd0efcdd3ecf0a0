use fieldstore::changelog::{ChangeAction, ChangeLog};
use fieldstore::entity::{Access, Mission, Shareable, Task};
use fieldstore::path::ResourcePath;
use fieldstore::rest::RestClient;
use fieldstore::service::{MissionService, TaskService};
use fieldstore::transport::{FaultOp, MemoryTransport};
use fieldstore::StoreError;
use serde_json::Value;
use std::sync::Arc;

struct Fixture {
    transport: Arc<MemoryTransport>,
    missions: MissionService,
    tasks: TaskService,
    changelog: ChangeLog,
}

fn fixture() -> Fixture {
    let transport = Arc::new(MemoryTransport::new());
    let client = RestClient::new(transport.clone());
    let changelog = ChangeLog::new(client.clone(), ["missions", "tasks"]);
    Fixture {
        transport,
        missions: MissionService::new(client.clone(), changelog.clone()),
        tasks: TaskService::new(client, changelog.clone()),
        changelog,
    }
}

fn dropped() -> StoreError {
    StoreError::ConnectionFailed("connection reset".into())
}

#[tokio::test]
async fn rename_and_move_a_mission() {
    let f = fixture();
    let mut created = Mission::new("Alpha", "u1", "C1", Access::Private);
    let id = f.missions.create(&mut created).await.unwrap();
    let old_placement = created.placement();

    let mut edited = f.missions.get(&id).await.unwrap().unwrap();
    edited.name = "Beta".to_string();
    edited.city_id = "C2".to_string();
    edited.access = Access::Public;
    let updated = f.missions.update(edited).await.unwrap();

    assert!(!f.missions.names().check_if_name_exists("Alpha").await.unwrap());
    assert_eq!(
        f.missions.name_owner("Beta").await.unwrap().as_deref(),
        Some(id.as_str())
    );
    assert!(f
        .missions
        .partitions()
        .ids_at(&old_placement)
        .await
        .unwrap()
        .is_empty());
    assert!(f.missions.list_private("C1", "u1").await.unwrap().is_empty());
    let public = f.missions.list_public("C2").await.unwrap();
    assert_eq!(public.len(), 1);
    assert_eq!(public[0].name, "Beta");
    assert_eq!(updated.saved_placement(), Some(&updated.placement()));

    let actions: Vec<ChangeAction> = f
        .changelog
        .read_since(0, &["missions"])
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(actions, vec![ChangeAction::Add, ChangeAction::Update]);
}

#[tokio::test]
async fn deleting_a_task_removes_both_sides_of_its_links() {
    let f = fixture();
    let m1 = f
        .missions
        .create(&mut Mission::new("M one", "u1", "C1", Access::Public))
        .await
        .unwrap();
    let m2 = f
        .missions
        .create(&mut Mission::new("M two", "u1", "C1", Access::Public))
        .await
        .unwrap();
    let task_id = f
        .tasks
        .create(&mut Task::new("T").with_missions([m1.clone(), m2.clone()]))
        .await
        .unwrap();
    assert_eq!(f.tasks.tasks_for_mission(&m1).await.unwrap().len(), 1);

    let loaded = f.tasks.get(&task_id).await.unwrap().unwrap();
    f.tasks.delete(loaded).await.unwrap();

    assert!(f.tasks.get(&task_id).await.unwrap().is_none());
    for mission in [&m1, &m2] {
        assert!(f
            .tasks
            .associations()
            .b_side(mission)
            .await
            .unwrap()
            .is_empty());
    }
    assert_eq!(
        f.transport.peek(&ResourcePath::collection("task_missions")),
        Value::Null
    );
    let deletes = f
        .changelog
        .read_since(0, &["tasks"])
        .await
        .unwrap()
        .into_iter()
        .filter(|entry| entry.action == ChangeAction::Delete)
        .count();
    assert_eq!(deletes, 1);
}

#[tokio::test]
async fn deleting_a_mission_unlinks_its_tasks() {
    let f = fixture();
    let mut mission = Mission::new("Alpha", "u1", "C1", Access::Public);
    let mission_id = f.missions.create(&mut mission).await.unwrap();
    let task_id = f
        .tasks
        .create(&mut Task::new("T").with_missions([mission_id.clone(), "M9".to_string()]))
        .await
        .unwrap();

    f.missions.delete(mission).await.unwrap();

    let reloaded = f.tasks.get(&task_id).await.unwrap().unwrap();
    assert_eq!(reloaded.mission_ids.len(), 1);
    assert!(reloaded.mission_ids.contains("M9"));
    assert!(f.tasks.tasks_for_mission(&mission_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn interrupted_update_converges_when_retried() {
    let f = fixture();
    let mut mission = Mission::new("Alpha", "u1", "C1", Access::Private);
    let id = f.missions.create(&mut mission).await.unwrap();
    mission.name = "Beta".to_string();
    mission.access = Access::Public;

    // The record and the new name go through; the partition move does not.
    f.transport.fail_next(
        FaultOp::Put,
        &ResourcePath::collection("missions_partitions"),
        dropped(),
    );
    let failed = f.missions.update(mission.clone()).await;
    assert!(matches!(failed, Err(ref e) if e.is_connectivity()));
    assert!(f.missions.names().check_if_name_exists("Beta").await.unwrap());
    assert_eq!(f.missions.list_private("C1", "u1").await.unwrap().len(), 1);
    assert!(f.missions.list_public("C1").await.unwrap().is_empty());

    // The caller's copy still carries the revision it was loaded with, so the retry sees
    // the same difference and finishes the job.
    let updated = f.missions.update(mission).await.unwrap();
    assert_eq!(updated.id.as_deref(), Some(id.as_str()));
    assert!(f.missions.list_private("C1", "u1").await.unwrap().is_empty());
    assert_eq!(f.missions.list_public("C1").await.unwrap().len(), 1);
    assert!(!f.missions.names().check_if_name_exists("Alpha").await.unwrap());
    assert_eq!(
        f.missions.name_owner("Beta").await.unwrap().as_deref(),
        Some(id.as_str())
    );
}

#[tokio::test]
async fn interrupted_task_delete_converges_when_retried() {
    let f = fixture();
    let mut task = Task::new("T").with_missions(["M1", "M2", "M3"]);
    let task_id = f.tasks.create(&mut task).await.unwrap();

    f.transport.fail_next(
        FaultOp::Any,
        &f.tasks.associations().b_path("M2"),
        dropped(),
    );
    assert!(f.tasks.delete(task.clone()).await.is_err());
    assert!(f.tasks.get(&task_id).await.unwrap().is_none());

    f.tasks.delete(task).await.unwrap();
    for mission in ["M1", "M2", "M3"] {
        assert!(f.tasks.tasks_for_mission(mission).await.unwrap().is_empty());
    }
    assert_eq!(
        f.transport.peek(&ResourcePath::collection("mission_tasks")),
        Value::Null
    );
}

#[tokio::test]
async fn failed_change_log_append_is_finished_by_a_retry() {
    let f = fixture();
    f.transport
        .fail_next(FaultOp::Append, &ResourcePath::collection("changelog"), dropped());
    let mut mission = Mission::new("Alpha", "u1", "C1", Access::Public);
    let failed = f.missions.create(&mut mission).await;
    assert!(failed.is_err());

    // Everything before the change log entry is in place and the name is held.
    let id = mission.id.clone().unwrap();
    assert_eq!(f.missions.name_owner("Alpha").await.unwrap(), Some(id.clone()));
    assert_eq!(f.missions.list_public("C1").await.unwrap().len(), 1);
    assert!(f
        .changelog
        .read_since(0, &["missions"])
        .await
        .unwrap()
        .is_empty());

    // Creating the same object again finishes it under the same id.
    assert_eq!(f.missions.create(&mut mission).await.unwrap(), id);
    let entries = f.changelog.read_since(0, &["missions"]).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, ChangeAction::Add);
    assert_eq!(entries[0].target_id, id);
    assert_eq!(f.missions.list_public("C1").await.unwrap().len(), 1);
    assert_eq!(
        f.transport
            .peek(&ResourcePath::collection("missions"))
            .as_object()
            .map(serde_json::Map::len),
        Some(1)
    );
}

#[tokio::test]
async fn interrupted_task_create_links_every_mission_when_retried() {
    let f = fixture();
    f.transport.fail_next(
        FaultOp::Any,
        &f.tasks.associations().b_path("M2"),
        dropped(),
    );
    let mut task = Task::new("T").with_missions(["M1", "M2"]);
    assert!(f.tasks.create(&mut task).await.is_err());
    assert!(f.tasks.tasks_for_mission("M2").await.unwrap().is_empty());

    let task_id = f.tasks.create(&mut task).await.unwrap();
    assert_eq!(task.id.as_deref(), Some(task_id.as_str()));
    for mission in ["M1", "M2"] {
        assert_eq!(f.tasks.tasks_for_mission(mission).await.unwrap().len(), 1);
    }
    let adds = f.changelog.read_since(0, &["tasks"]).await.unwrap();
    assert_eq!(adds.len(), 1);
}

#[tokio::test]
async fn task_update_relinks_missions() {
    let f = fixture();
    let task_id = f
        .tasks
        .create(&mut Task::new("T").with_missions(["M1", "M2"]))
        .await
        .unwrap();

    let mut edited = f.tasks.get(&task_id).await.unwrap().unwrap();
    edited.mission_ids.shift_remove("M1");
    edited.mission_ids.insert("M3".to_string());
    let updated = f.tasks.update(edited).await.unwrap();

    assert!(f.tasks.tasks_for_mission("M1").await.unwrap().is_empty());
    assert_eq!(f.tasks.tasks_for_mission("M3").await.unwrap().len(), 1);
    assert_eq!(
        updated.saved_mission_ids().map(|ids| ids.len()),
        Some(2)
    );
    let reloaded = f.tasks.get(&task_id).await.unwrap().unwrap();
    assert!(reloaded.mission_ids.contains("M2"));
    assert!(reloaded.mission_ids.contains("M3"));
}
