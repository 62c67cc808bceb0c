//! Task store: in-memory task records with broadcast of lifecycle events.
//!
//! The store is the only owner of `TaskRecord`s. Every accessor hands out
//! cloned snapshots, and every mutation happens under the single write lock,
//! so create/transition/delete are atomic with respect to each other.

use std::collections::HashMap;

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use super::id::generate_task_id;
use super::model::{TaskCounts, TaskEvent, TaskOutcome, TaskRecord, TaskStatus};
use crate::config::RegistryConfig;
use crate::error::TaskError;

struct StoreState {
    tasks: HashMap<String, TaskRecord>,
    next_seq: u64,
}

/// In-memory registry of delegated tasks.
pub struct TaskStore {
    state: RwLock<StoreState>,
    tx: broadcast::Sender<TaskEvent>,
    max_result_chars: usize,
    max_running_tasks: usize,
}

impl TaskStore {
    pub fn new(config: &RegistryConfig) -> Self {
        let (tx, _rx) = broadcast::channel(config.event_capacity.max(1));
        Self {
            state: RwLock::new(StoreState {
                tasks: HashMap::new(),
                next_seq: 0,
            }),
            tx,
            max_result_chars: config.max_result_chars,
            max_running_tasks: config.max_running_tasks,
        }
    }

    /// Subscribe to task lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }

    /// Insert a new `running` task and return its id.
    pub async fn create(
        &self,
        source_node_id: &str,
        agent_name: &str,
    ) -> Result<String, TaskError> {
        let mut state = self.state.write().await;

        if self.max_running_tasks > 0 {
            let running = state.tasks.values().filter(|t| t.active).count();
            if running >= self.max_running_tasks {
                warn!(
                    agent = %agent_name,
                    max = self.max_running_tasks,
                    "Rejected delegation: running task limit reached"
                );
                return Err(TaskError::CapacityExceeded {
                    max: self.max_running_tasks,
                });
            }
        }

        let mut task_id = generate_task_id(source_node_id);
        while state.tasks.contains_key(&task_id) {
            debug!(task_id = %task_id, "Task id collision, regenerating suffix");
            task_id = generate_task_id(source_node_id);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.tasks.insert(
            task_id.clone(),
            TaskRecord::new(task_id.clone(), source_node_id, agent_name, seq),
        );
        // Events go out under the write lock so subscribers see them in store order.
        let _ = self.tx.send(TaskEvent::Created {
            task_id: task_id.clone(),
            agent_name: agent_name.to_string(),
        });
        drop(state);

        info!(task_id = %task_id, agent = %agent_name, "Task created");
        Ok(task_id)
    }

    /// Move a running task to its terminal state. Returns the updated record.
    ///
    /// A task that is already terminal is left untouched and
    /// `InvalidTransition` is returned.
    pub async fn transition(
        &self,
        task_id: &str,
        outcome: TaskOutcome,
    ) -> Result<TaskRecord, TaskError> {
        let mut state = self.state.write().await;
        let record = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TaskError::NotFound {
                id: task_id.to_string(),
            })?;

        record.finish(outcome, self.max_result_chars)?;
        let updated = record.clone();
        let _ = self.tx.send(TaskEvent::Finished {
            task_id: task_id.to_string(),
            status: updated.status,
        });
        drop(state);

        info!(task_id = %task_id, status = %updated.status, "Task finished");
        Ok(updated)
    }

    pub async fn get(&self, task_id: &str) -> Result<TaskRecord, TaskError> {
        self.state
            .read()
            .await
            .tasks
            .get(task_id)
            .cloned()
            .ok_or_else(|| TaskError::NotFound {
                id: task_id.to_string(),
            })
    }

    /// Snapshot of all tasks, oldest first, optionally narrowed to one status.
    pub async fn list(&self, status_filter: Option<TaskStatus>) -> Vec<TaskRecord> {
        self.list_with_counts(status_filter).await.0
    }

    /// Filtered listing plus global counts, both taken from one snapshot.
    pub async fn list_with_counts(
        &self,
        status_filter: Option<TaskStatus>,
    ) -> (Vec<TaskRecord>, TaskCounts) {
        let state = self.state.read().await;
        let counts = count_tasks(&state.tasks);
        let mut tasks: Vec<TaskRecord> = state
            .tasks
            .values()
            .filter(|t| status_filter.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        drop(state);

        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq)));
        (tasks, counts)
    }

    /// Delete a task regardless of status. Returns whether it existed.
    pub async fn delete(&self, task_id: &str) -> bool {
        let mut state = self.state.write().await;
        let removed = state.tasks.remove(task_id).is_some();
        if removed {
            self.announce_removal(task_id);
        }
        removed
    }

    /// Delete a finished task. Running tasks are kept unless `force` is set.
    pub async fn remove(&self, task_id: &str, force: bool) -> Result<TaskRecord, TaskError> {
        let mut state = self.state.write().await;
        let status = state
            .tasks
            .get(task_id)
            .map(|t| t.status)
            .ok_or_else(|| TaskError::NotFound {
                id: task_id.to_string(),
            })?;

        if status.is_active() && !force {
            return Err(TaskError::InvalidState {
                id: task_id.to_string(),
                state: status,
            });
        }

        let removed = state
            .tasks
            .remove(task_id)
            .ok_or_else(|| TaskError::NotFound {
                id: task_id.to_string(),
            })?;
        self.announce_removal(task_id);
        drop(state);

        if status.is_active() {
            warn!(task_id = %task_id, "Force-removed a running task; its outcome will be discarded");
        }
        Ok(removed)
    }

    /// Counts by status over every stored task.
    pub async fn counts(&self) -> TaskCounts {
        count_tasks(&self.state.read().await.tasks)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.tasks.is_empty()
    }

    /// Call with the write lock held.
    fn announce_removal(&self, task_id: &str) {
        info!(task_id = %task_id, "Task removed");
        let _ = self.tx.send(TaskEvent::Removed {
            task_id: task_id.to_string(),
        });
    }
}

fn count_tasks(tasks: &HashMap<String, TaskRecord>) -> TaskCounts {
    let mut counts = TaskCounts::default();
    for task in tasks.values() {
        counts.add(task.status);
    }
    counts
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new(&RegistryConfig::default())
    }
}
