mod common;

use common::{start_backend, unreachable_url};
use fieldstore::entity::{Access, Mission, Task};
use fieldstore::operation::{
    AsyncOperation, OperationTracker, PendingResult, RecordingNotifier, CONNECTION_FAILED_MESSAGE,
};
use fieldstore::path::ResourcePath;
use fieldstore::progress::NullIndicator;
use fieldstore::rest::RestClient;
use fieldstore::service::Services;
use fieldstore::transport::HttpTransport;
use fieldstore::config::StoreConfig;
use fieldstore::StoreError;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

fn services(base_url: &str, auth: Option<&str>) -> Services {
    let transport = HttpTransport::new(
        base_url,
        auth.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap();
    Services::new(
        RestClient::new(Arc::new(transport)),
        &StoreConfig::new(base_url),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn mission_lifecycle_over_http() {
    let backend = start_backend(Some("secret"));
    let services = services(&backend.base_url, Some("secret"));

    let id = services
        .missions
        .create(&mut Mission::new("Alpha", "u1", "C1", Access::Public))
        .await
        .unwrap();
    assert_eq!(
        backend
            .tree
            .peek(&ResourcePath::collection("missions_names").child("Alpha")),
        json!({ "name": "Alpha", "target_id": id })
    );

    let listed = services.missions.list_public("C1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "Alpha");

    let mut renamed = services.missions.get(&id).await.unwrap().unwrap();
    renamed.name = "Beta".to_string();
    services.missions.update(renamed).await.unwrap();
    assert!(!services.missions.name_taken("Alpha").await.unwrap());
    assert!(services.missions.name_taken("Beta").await.unwrap());

    let entries = services
        .changelog
        .read_since(0, &["missions"])
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[0].timestamp <= entries[1].timestamp);
}

#[tokio::test(flavor = "multi_thread")]
async fn names_with_reserved_characters_round_trip() {
    let backend = start_backend(None);
    let services = services(&backend.base_url, None);

    let name = "North/South v1.2";
    let id = services
        .missions
        .create(&mut Mission::new(name, "u1", "C1", Access::Private))
        .await
        .unwrap();
    assert_eq!(
        backend
            .tree
            .peek(&ResourcePath::collection("missions_names").child(name)),
        json!({ "name": name, "target_id": id })
    );
    assert_eq!(
        services.missions.name_owner(name).await.unwrap(),
        Some(id.clone())
    );
    assert!(!services.missions.name_taken("North").await.unwrap());
    assert!(backend
        .tree
        .peek(&ResourcePath::collection("missions_names").child("North"))
        .is_null());
    let private = services.missions.list_private("C1", "u1").await.unwrap();
    assert_eq!(private[0].id.as_deref(), Some(id.as_str()));
}

#[tokio::test(flavor = "multi_thread")]
async fn task_links_over_http() {
    let backend = start_backend(None);
    let services = services(&backend.base_url, None);

    let mut task = Task::new("Survey").with_missions(["M1", "M2"]);
    let id = services.tasks.create(&mut task).await.unwrap();
    let for_m2 = services.tasks.tasks_for_mission("M2").await.unwrap();
    assert_eq!(for_m2.len(), 1);
    assert_eq!(for_m2[0].id.as_deref(), Some(id.as_str()));

    services.tasks.delete(task).await.unwrap();
    assert!(services.tasks.tasks_for_mission("M1").await.unwrap().is_empty());
    assert_eq!(
        backend.tree.peek(&ResourcePath::collection("mission_tasks")),
        serde_json::Value::Null
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_credential_is_a_backend_error() {
    let backend = start_backend(Some("secret"));
    let services = services(&backend.base_url, Some("guess"));

    let result = services.missions.get("anything").await;
    match result {
        Err(StoreError::BackendError { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Permission denied");
        }
        other => panic!("expected a backend error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_backend_is_a_connectivity_failure() {
    let services = services(&unreachable_url(), None);
    let result = services.missions.name_taken("Alpha").await;
    assert!(matches!(result, Err(ref e) if e.is_connectivity()));
}

#[test]
fn failed_request_notifies_the_connection_message() {
    let services = services(&unreachable_url(), None);
    let notifier = Arc::new(RecordingNotifier::new());
    let tracker = OperationTracker::new(NullIndicator, notifier.clone());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let failure = Rc::new(RefCell::new(None));
    let failure_in_callback = failure.clone();
    let missions = services.missions.clone();
    let operation = AsyncOperation::new(PendingResult::from_future(async move {
        missions
            .create(&mut Mission::new("Alpha", "u1", "C1", Access::Public))
            .await
    }))
    .indicator("Saving")
    .on_exception(move |e| *failure_in_callback.borrow_mut() = Some(e.is_connectivity()))
    .error_message("Could not save the mission.");
    runtime.block_on(operation.start(&tracker));

    assert_eq!(*failure.borrow(), Some(true));
    assert_eq!(notifier.messages(), vec![CONNECTION_FAILED_MESSAGE.to_string()]);
    assert_eq!(tracker.running(), 0);
}
