//! End-to-end lifecycle tests against the library API: delegate through the
//! dispatcher, observe through the query service, clean up with mark_done.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::oneshot;
use tokio::time::timeout;

use agent_tasks::config::RegistryConfig;
use agent_tasks::error::{TaskError, WorkError};
use agent_tasks::tasks::id::parse_task_id;
use agent_tasks::tasks::{Dispatcher, QueryService, TaskEvent, TaskRecord, TaskStatus, TaskStore};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn setup() -> (Arc<Dispatcher>, QueryService) {
    let store = Arc::new(TaskStore::new(&RegistryConfig::default()));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store)));
    let service = QueryService::new(store, 200);
    (dispatcher, service)
}

/// Poll until the task leaves `running`.
async fn wait_terminal(service: &QueryService, id: &str) -> TaskRecord {
    loop {
        let record = service.get_task(id).await.unwrap();
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ── Scenarios ────────────────────────────────────────────────────────

#[tokio::test]
async fn long_result_is_truncated_then_removed() {
    timeout(TEST_TIMEOUT, async {
        let (dispatcher, service) = setup();

        let id = dispatcher
            .delegate("main", "Coding Agent", async { Ok("x".repeat(5000)) })
            .await
            .unwrap();

        let record = wait_terminal(&service, &id).await;
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(record.agent_name, "Coding Agent");
        assert!(!record.active);
        assert!(record.completed_at.is_some());
        assert_eq!(record.result.as_deref().map(|r| r.chars().count()), Some(4000));

        let removal = service.mark_done(&id, false).await.unwrap();
        assert!(removal.removed);
        assert_eq!(removal.task_id, id);

        let err = service.get_task(&id).await.unwrap_err();
        assert_eq!(err, TaskError::NotFound { id: id.clone() });
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failing_work_records_error_without_result() {
    timeout(TEST_TIMEOUT, async {
        let (dispatcher, service) = setup();

        let id = dispatcher
            .delegate("main", "Analysis Agent", async { Err(WorkError::new("boom")) })
            .await
            .unwrap();

        let record = wait_terminal(&service, &id).await;
        assert_eq!(record.status, TaskStatus::Error);
        assert_eq!(record.error.as_deref(), Some("boom"));
        assert!(record.result.is_none());

        let body = service
            .handle(&json!({"operation": "get_task", "task_id": id}))
            .await;
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "boom");
        assert!(body.get("result").is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_delegations_complete_out_of_order() {
    timeout(TEST_TIMEOUT, async {
        const N: usize = 32;
        let (dispatcher, service) = setup();
        let mut events = service.store().subscribe();

        // Every caller delegates from its own task; the work of task i waits
        // on release i.
        let mut releases = Vec::with_capacity(N);
        let mut callers = Vec::with_capacity(N);
        for i in 0..N {
            let (tx, rx) = oneshot::channel::<()>();
            releases.push(Some(tx));
            let dispatcher = Arc::clone(&dispatcher);
            callers.push(tokio::spawn(async move {
                dispatcher
                    .delegate("worker", "Coding Agent", async move {
                        let _ = rx.await;
                        Ok(format!("result {i}"))
                    })
                    .await
            }));
        }

        let mut ids = Vec::with_capacity(N);
        for caller in callers {
            ids.push(caller.await.unwrap().unwrap());
        }

        let distinct: HashSet<&String> = ids.iter().collect();
        assert_eq!(distinct.len(), N);
        assert_eq!(service.list_tasks(None).await.running, N);
        assert_eq!(service.list_tasks(None).await.count, N);

        // Release in reverse, odd indices first.
        let mut order: Vec<usize> = (0..N).rev().collect();
        order.sort_by_key(|i| i % 2 == 0);
        for i in order {
            if let Some(tx) = releases[i].take() {
                let _ = tx.send(());
            }
        }

        for (i, id) in ids.iter().enumerate() {
            let record = wait_terminal(&service, id).await;
            assert_eq!(record.status, TaskStatus::Completed);
            assert_eq!(record.result, Some(format!("result {i}")));
        }

        // Exactly one Created and one Finished event per task.
        let mut created = HashSet::new();
        let mut finished = HashSet::new();
        while let Ok(event) = events.try_recv() {
            match event {
                TaskEvent::Created { task_id, .. } => {
                    assert!(created.insert(task_id), "task created twice");
                }
                TaskEvent::Finished { task_id, .. } => {
                    assert!(finished.insert(task_id), "task finished twice");
                }
                TaskEvent::Removed { .. } => {}
            }
        }
        assert_eq!(created.len(), N);
        assert_eq!(finished.len(), N);

        let listing = service.list_tasks(None).await;
        assert_eq!(listing.completed, N);
        assert_eq!(listing.running, 0);

        // Supervisors leave the map right after recording their outcome.
        while dispatcher.in_flight().await > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn long_error_is_truncated() {
    timeout(TEST_TIMEOUT, async {
        let (dispatcher, service) = setup();
        let id = dispatcher
            .delegate("main", "Noisy Agent", async {
                Err(WorkError::new("e".repeat(100_000)))
            })
            .await
            .unwrap();

        let record = wait_terminal(&service, &id).await;
        assert_eq!(record.status, TaskStatus::Error);
        assert_eq!(record.error.map(|e| e.chars().count()), Some(4000));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn running_filter_with_global_counts() {
    timeout(TEST_TIMEOUT, async {
        let (dispatcher, service) = setup();
        let (_hold, held) = oneshot::channel::<()>();

        let running = dispatcher
            .delegate("main", "Slow Agent", async move {
                let _ = held.await;
                Ok(String::new())
            })
            .await
            .unwrap();
        let done = dispatcher
            .delegate("main", "Fast Agent", async { Ok("ok".to_string()) })
            .await
            .unwrap();
        let failed = dispatcher
            .delegate("main", "Bad Agent", async { Err(WorkError::new("nope")) })
            .await
            .unwrap();
        wait_terminal(&service, &done).await;
        wait_terminal(&service, &failed).await;

        let listing = service.list_tasks(Some(TaskStatus::Running)).await;
        assert_eq!(listing.count, 1);
        assert_eq!(listing.tasks[0].task_id, running);
        assert_eq!(listing.running, 1);
        assert_eq!(listing.completed, 1);
        assert_eq!(listing.errors, 1);

        let body = service
            .handle(&json!({"operation": "list_tasks", "status_filter": "completed"}))
            .await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["tasks"][0]["task_id"], done.as_str());
        assert_eq!(body["running"], 1);

        // Running work is protected from mark_done unless forced.
        let err = service.mark_done(&running, false).await.unwrap_err();
        assert!(matches!(err, TaskError::InvalidState { .. }));
        assert!(service.mark_done(&running, true).await.unwrap().removed);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ids_carry_source_node() {
    let (dispatcher, service) = setup();
    let id = dispatcher
        .delegate("planner_2", "Coding Agent", async { Ok(String::new()) })
        .await
        .unwrap();

    let (node, suffix) = parse_task_id(&id).unwrap();
    assert_eq!(node, "planner_2");
    assert_eq!(suffix.len(), 8);
    assert_eq!(service.get_task(&id).await.unwrap().source_node_id, "planner_2");
}

#[tokio::test]
async fn shutdown_cancels_in_flight_work() {
    timeout(TEST_TIMEOUT, async {
        let (dispatcher, service) = setup();
        let id = dispatcher
            .delegate("main", "Stuck Agent", std::future::pending::<Result<String, WorkError>>())
            .await
            .unwrap();

        dispatcher.shutdown_and_join().await;

        let record = service.get_task(&id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Cancelled);
        assert_eq!(service.list_tasks(None).await.cancelled, 1);

        let err = dispatcher
            .delegate("main", "Late Agent", async { Ok(String::new()) })
            .await
            .unwrap_err();
        assert_eq!(err, TaskError::ShuttingDown);
    })
    .await
    .expect("test timed out");
}
