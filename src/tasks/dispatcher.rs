//! Delegation dispatcher: runs child work in the background and records its outcome.
//!
//! Each delegation is supervised by one spawned tokio task. The supervisor
//! owns the work's `JoinHandle`, waits for it (or for the host's shutdown
//! signal), and then calls [`complete`] exactly once. `complete` is the only
//! place a dispatcher writes a terminal state into the store.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::model::TaskOutcome;
use super::store::TaskStore;
use crate::error::{TaskError, WorkError};

/// Launches delegated work and tracks it until completion.
pub struct Dispatcher {
    store: Arc<TaskStore>,
    shutdown_tx: watch::Sender<bool>,
    /// Supervisor handles keyed by task id; entries leave when the task finishes.
    supervisors: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl Dispatcher {
    pub fn new(store: Arc<TaskStore>) -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        Self {
            store,
            shutdown_tx,
            supervisors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a `running` task and start `work` in the background.
    ///
    /// Returns as soon as the task id exists; the caller never waits on `work`.
    pub async fn delegate<F>(
        &self,
        source_node_id: &str,
        agent_name: &str,
        work: F,
    ) -> Result<String, TaskError>
    where
        F: Future<Output = Result<String, WorkError>> + Send + 'static,
    {
        // The map lock is held from the shutdown check to the insert:
        // `shutdown_and_join` either sees this supervisor or this call sees
        // the flag. It also keeps the supervisor's own removal from running
        // before its handle is inserted.
        let mut tracked = self.supervisors.lock().await;
        if *self.shutdown_tx.borrow() {
            return Err(TaskError::ShuttingDown);
        }

        let task_id = self.store.create(source_node_id, agent_name).await?;

        let store = Arc::clone(&self.store);
        let supervisors = Arc::clone(&self.supervisors);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let id = task_id.clone();

        let handle = tokio::spawn(async move {
            let outcome = supervise(work, &mut shutdown_rx).await;
            complete(&store, &id, outcome).await;
            supervisors.lock().await.remove(&id);
        });
        tracked.insert(task_id.clone(), handle);
        drop(tracked);

        debug!(task_id = %task_id, agent = %agent_name, "Delegated work spawned");
        Ok(task_id)
    }

    /// Number of delegations whose work has not finished yet.
    pub async fn in_flight(&self) -> usize {
        self.supervisors.lock().await.len()
    }

    /// Signal shutdown without waiting. In-flight work is aborted and recorded
    /// as `cancelled`; new delegations are refused.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signal shutdown and wait until every supervisor has recorded its outcome.
    pub async fn shutdown_and_join(&self) {
        self.request_shutdown();
        let handles: Vec<JoinHandle<()>> = self
            .supervisors
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        let count = handles.len();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Task supervisor ended abnormally");
            }
        }
        info!(cancelled = count, "Dispatcher shut down");
    }
}

/// Run `work` to an outcome, racing it against the shutdown signal.
async fn supervise<F>(work: F, shutdown_rx: &mut watch::Receiver<bool>) -> TaskOutcome
where
    F: Future<Output = Result<String, WorkError>> + Send + 'static,
{
    let mut work = tokio::spawn(work);

    tokio::select! {
        joined = &mut work => match joined {
            Ok(Ok(result)) => TaskOutcome::Completed(result),
            Ok(Err(e)) => TaskOutcome::Failed(e.to_string()),
            Err(e) if e.is_panic() => TaskOutcome::Failed(format!("Delegated work panicked: {e}")),
            Err(_) => TaskOutcome::Cancelled,
        },
        _ = wait_for_shutdown(shutdown_rx) => {
            work.abort();
            TaskOutcome::Cancelled
        }
    }
}

async fn wait_for_shutdown(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            // Dispatcher dropped without signalling: keep the work running.
            std::future::pending::<()>().await;
        }
    }
}

/// Completion callback: the single path from finished work to the store.
async fn complete(store: &TaskStore, task_id: &str, outcome: TaskOutcome) {
    match store.transition(task_id, outcome).await {
        Ok(record) => {
            debug!(task_id = %task_id, status = %record.status, "Completion recorded");
        }
        Err(TaskError::NotFound { .. }) => {
            warn!(task_id = %task_id, "Task was removed before its work finished; outcome dropped");
        }
        Err(e @ TaskError::InvalidTransition { .. }) => {
            error!(task_id = %task_id, error = %e, "Duplicate terminal transition rejected");
        }
        Err(e) => {
            error!(task_id = %task_id, error = %e, "Failed to record task completion");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::model::TaskStatus;
    use std::time::Duration;
    use tokio::sync::oneshot;

    async fn wait_terminal(store: &TaskStore, id: &str) -> TaskStatus {
        for _ in 0..200 {
            let status = store.get(id).await.unwrap().status;
            if status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {id} never finished");
    }

    #[tokio::test]
    async fn delegate_returns_before_work_finishes() {
        let store = Arc::new(TaskStore::default());
        let dispatcher = Dispatcher::new(Arc::clone(&store));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let id = dispatcher
            .delegate("n", "Coding Agent", async move {
                let _ = release_rx.await;
                Ok("done".to_string())
            })
            .await
            .unwrap();

        let rec = store.get(&id).await.unwrap();
        assert_eq!(rec.status, TaskStatus::Running);
        assert!(rec.result.is_none() && rec.error.is_none());
        assert_eq!(dispatcher.in_flight().await, 1);

        release_tx.send(()).unwrap();
        assert_eq!(wait_terminal(&store, &id).await, TaskStatus::Completed);
        assert_eq!(store.get(&id).await.unwrap().result.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn work_error_is_stored() {
        let store = Arc::new(TaskStore::default());
        let dispatcher = Dispatcher::new(Arc::clone(&store));

        let id = dispatcher
            .delegate("n", "a", async { Err(WorkError::new("boom")) })
            .await
            .unwrap();

        assert_eq!(wait_terminal(&store, &id).await, TaskStatus::Error);
        let rec = store.get(&id).await.unwrap();
        assert_eq!(rec.error.as_deref(), Some("boom"));
        assert!(rec.result.is_none());
    }

    #[tokio::test]
    async fn panicking_work_is_recorded_as_error() {
        let store = Arc::new(TaskStore::default());
        let dispatcher = Dispatcher::new(Arc::clone(&store));

        let id = dispatcher
            .delegate("n", "a", async {
                if true {
                    panic!("child exploded");
                }
                Ok(String::new())
            })
            .await
            .unwrap();

        assert_eq!(wait_terminal(&store, &id).await, TaskStatus::Error);
        let rec = store.get(&id).await.unwrap();
        assert!(rec.error.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_work() {
        let store = Arc::new(TaskStore::default());
        let dispatcher = Dispatcher::new(Arc::clone(&store));

        let id = dispatcher
            .delegate("n", "slow", async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("never".to_string())
            })
            .await
            .unwrap();

        dispatcher.shutdown_and_join().await;

        let rec = store.get(&id).await.unwrap();
        assert_eq!(rec.status, TaskStatus::Cancelled);
        assert!(rec.result.is_none() && rec.error.is_none());
        assert_eq!(dispatcher.in_flight().await, 0);
    }

    #[tokio::test]
    async fn delegate_after_shutdown_is_refused() {
        let store = Arc::new(TaskStore::default());
        let dispatcher = Dispatcher::new(Arc::clone(&store));
        dispatcher.request_shutdown();

        let err = dispatcher
            .delegate("n", "a", async { Ok(String::new()) })
            .await
            .unwrap_err();
        assert_eq!(err, TaskError::ShuttingDown);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn force_removed_task_drops_late_outcome() {
        let store = Arc::new(TaskStore::default());
        let dispatcher = Dispatcher::new(Arc::clone(&store));
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let id = dispatcher
            .delegate("n", "a", async move {
                let _ = release_rx.await;
                Ok("late".to_string())
            })
            .await
            .unwrap();

        store.remove(&id, true).await.unwrap();
        release_tx.send(()).unwrap();

        for _ in 0..200 {
            if dispatcher.in_flight().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(dispatcher.in_flight().await, 0);
        assert!(store.get(&id).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shutdown_racing_delegations_leaves_nothing_running() {
        let store = Arc::new(TaskStore::default());
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store)));

        let mut callers = Vec::new();
        for _ in 0..64 {
            let dispatcher = Arc::clone(&dispatcher);
            callers.push(tokio::spawn(async move {
                dispatcher
                    .delegate(
                        "n",
                        "a",
                        std::future::pending::<Result<String, WorkError>>(),
                    )
                    .await
            }));
        }
        tokio::task::yield_now().await;
        dispatcher.shutdown_and_join().await;

        let mut accepted = 0;
        for caller in callers {
            match caller.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => assert_eq!(e, TaskError::ShuttingDown),
            }
        }

        let counts = store.counts().await;
        assert_eq!(counts.running, 0);
        assert_eq!(counts.cancelled, accepted);
        assert_eq!(dispatcher.in_flight().await, 0);
    }
}
