//! Registry of asynchronous sync tasks.

use chrono::Utc;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use super::sync_log_model::EntityType;
use super::sync_run_model::{RunReport, SyncTask, TaskStatus};
use crate::errors::{Result, SyncError};

/// Finished tasks kept for status queries.
const MAX_FINISHED_TASKS: usize = 256;

/// Tracks task state and the cancellation token of every running task.
///
/// Task tokens are children of the registry's root token, so cancelling the
/// root (process shutdown) cancels every task.
pub struct TaskRegistry {
    tasks: DashMap<String, SyncTask>,
    tokens: DashMap<String, CancellationToken>,
    root: CancellationToken,
}

impl TaskRegistry {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            tasks: DashMap::new(),
            tokens: DashMap::new(),
            root,
        }
    }

    pub fn register(
        &self,
        entity_type: EntityType,
        integration_id: Option<String>,
    ) -> (SyncTask, CancellationToken) {
        self.prune();
        let task = SyncTask {
            task_id: uuid::Uuid::new_v4().to_string(),
            entity_type,
            integration_id,
            status: TaskStatus::Started,
            attempts: 0,
            created_at: Utc::now(),
            finished_at: None,
            report: None,
            error: None,
        };
        let token = self.root.child_token();
        self.tokens.insert(task.task_id.clone(), token.clone());
        self.tasks.insert(task.task_id.clone(), task.clone());
        (task, token)
    }

    pub fn mark_running(&self, task_id: &str, attempt: u32) {
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            task.status = TaskStatus::Running;
            task.attempts = attempt;
        }
    }

    pub fn finish(&self, task_id: &str, report: RunReport) {
        self.tokens.remove(task_id);
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            task.status = report.status;
            task.attempts = report.attempts;
            task.finished_at = Some(Utc::now());
            task.report = Some(report);
        }
    }

    pub fn fail(&self, task_id: &str, error: String) {
        self.tokens.remove(task_id);
        if let Some(mut task) = self.tasks.get_mut(task_id) {
            task.status = TaskStatus::Failed;
            task.finished_at = Some(Utc::now());
            task.error = Some(error);
        }
    }

    pub fn get(&self, task_id: &str) -> Result<SyncTask> {
        self.tasks
            .get(task_id)
            .map(|task| task.clone())
            .ok_or_else(|| SyncError::TaskNotFound(task_id.to_string()).into())
    }

    /// Requests cooperative cancellation of a running task.
    pub fn cancel(&self, task_id: &str) -> Result<SyncTask> {
        let task = self.get(task_id)?;
        if task.status.is_final() {
            return Err(SyncError::TaskFinished(task_id.to_string()).into());
        }
        if let Some(token) = self.tokens.get(task_id) {
            token.cancel();
        }
        Ok(task)
    }

    /// Tasks that have not finished yet.
    pub fn active(&self) -> Vec<SyncTask> {
        self.tasks
            .iter()
            .filter(|task| !task.status.is_final())
            .map(|task| task.clone())
            .collect()
    }

    fn prune(&self) {
        let mut finished: Vec<(String, chrono::DateTime<Utc>)> = self
            .tasks
            .iter()
            .filter_map(|task| task.finished_at.map(|at| (task.task_id.clone(), at)))
            .collect();
        if finished.len() < MAX_FINISHED_TASKS {
            return;
        }
        finished.sort_by_key(|(_, at)| *at);
        let excess = finished.len() + 1 - MAX_FINISHED_TASKS;
        for (task_id, _) in finished.into_iter().take(excess) {
            self.tasks.remove(&task_id);
        }
    }
}
