// src/coordinator/tasks.rs
// At-most-one live classification task per post id.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle for one in-flight or finished classification. The token is
/// set on both outcomes: settling (the verdict was written, no further
/// writes expected) and supersession (a newer task took over and this
/// one's eventual result must be discarded).
#[derive(Debug, Clone)]
pub struct Task {
    token: CancellationToken,
}

impl Task {
    fn new() -> Self {
        Self { token: CancellationToken::new() }
    }

    pub fn finish(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Task registry. A thread's members share one task registered under
/// every member id.
#[derive(Default)]
pub struct TaskMap {
    tasks: Mutex<HashMap<String, Task>>,
}

impl TaskMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-supersede, atomically for the given ids: any unfinished
    /// task registered under one of them is finished (its pending result
    /// becomes a stale write and gets dropped at its token check), then
    /// one fresh shared task is registered under all of them.
    pub async fn begin(&self, ids: &[String]) -> Task {
        let mut tasks = self.tasks.lock().await;
        for id in ids {
            if let Some(existing) = tasks.get(id) {
                if !existing.is_finished() {
                    debug!("superseding live task for {id}");
                    existing.finish();
                }
            }
        }
        let task = Task::new();
        for id in ids {
            tasks.insert(id.clone(), task.clone());
        }
        task
    }

    pub async fn get(&self, id: &str) -> Option<Task> {
        self.tasks.lock().await.get(id).cloned()
    }

    /// Number of registered ids whose task has not finished.
    pub async fn live_count(&self) -> usize {
        self.tasks
            .lock()
            .await
            .values()
            .filter(|task| !task.is_finished())
            .count()
    }
}
