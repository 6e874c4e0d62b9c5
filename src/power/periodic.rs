//! Periodic-task registry (spec §4.I).

use std::collections::HashMap;

use crate::error::CoreError;

/// Unix seconds for 2020-01-01T00:00:00Z. Below this, the clock hasn't
/// been set yet (first post-provisioning boot, or RTC reset) and every
/// task is unconditionally due (spec §4.I).
const CLOCK_NOT_SET_CUTOFF: i64 = 1_577_836_800;

struct TaskState {
    period_seconds: u64,
    last_run_unix: i64,
}

fn is_due(state: &TaskState, now_unix: i64) -> bool {
    now_unix < CLOCK_NOT_SET_CUTOFF
        || state.last_run_unix == 0
        || now_unix - state.last_run_unix >= state.period_seconds as i64
}

/// Named tasks with persisted-across-the-process-lifetime last-run
/// timestamps.
pub struct PeriodicTaskRegistry {
    tasks: tokio::sync::Mutex<HashMap<String, TaskState>>,
}

impl PeriodicTaskRegistry {
    pub fn new() -> Self {
        Self {
            tasks: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Register a task. Idempotent: re-registering an already-known
    /// task leaves its `last_run` untouched.
    pub async fn register(&self, name: &str, period_seconds: u64) {
        let mut tasks = self.tasks.lock().await;
        tasks.entry(name.to_string()).or_insert(TaskState {
            period_seconds,
            last_run_unix: 0,
        });
    }

    /// Force a task due on the next `check_and_run_all` (spec §4.I:
    /// "sets last_run = 0").
    pub async fn force(&self, name: &str) {
        let mut tasks = self.tasks.lock().await;
        if let Some(state) = tasks.get_mut(name) {
            state.last_run_unix = 0;
        }
    }

    /// Run every due task's callback synchronously in registration
    /// order is not guaranteed; failures are logged and leave
    /// `last_run` unchanged so the next cycle retries (spec §7).
    pub async fn check_and_run_all(&self, now_unix: i64, mut run: impl FnMut(&str) -> Result<(), CoreError>) {
        let due_names: Vec<String> = {
            let tasks = self.tasks.lock().await;
            tasks
                .iter()
                .filter(|(_, state)| is_due(state, now_unix))
                .map(|(name, _)| name.clone())
                .collect()
        };

        for name in due_names {
            match run(&name) {
                Ok(()) => {
                    let mut tasks = self.tasks.lock().await;
                    if let Some(state) = tasks.get_mut(&name) {
                        state.last_run_unix = now_unix;
                    }
                }
                Err(e) => {
                    tracing::warn!(task = %name, error = %e, "periodic task failed, will retry next cycle");
                }
            }
        }
    }

    #[cfg(test)]
    pub async fn last_run(&self, name: &str) -> Option<i64> {
        self.tasks.lock().await.get(name).map(|s| s.last_run_unix)
    }
}

impl Default for PeriodicTaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn unset_clock_makes_every_task_due() {
        let registry = PeriodicTaskRegistry::new();
        registry.register("a", 3600).await;
        registry.force("a").await;
        let mut ran = false;
        // Simulate last_run already in the past but clock not set yet.
        registry.check_and_run_all(100, |_| {
            ran = true;
            Ok(())
        })
        .await;
        assert!(ran);
    }

    #[tokio::test]
    async fn due_task_updates_last_run_only_on_success() {
        let registry = PeriodicTaskRegistry::new();
        registry.register("a", 100).await;
        let count = AtomicU32::new(0);

        registry
            .check_and_run_all(CLOCK_NOT_SET_CUTOFF + 1000, |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::Timeout)
            })
            .await;
        assert_eq!(registry.last_run("a").await, Some(0));

        registry
            .check_and_run_all(CLOCK_NOT_SET_CUTOFF + 1000, |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert_eq!(registry.last_run("a").await, Some(CLOCK_NOT_SET_CUTOFF + 1000));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn task_is_not_due_again_before_its_period_elapses() {
        let registry = PeriodicTaskRegistry::new();
        registry.register("a", 1000).await;
        let now = CLOCK_NOT_SET_CUTOFF + 10_000;
        registry.check_and_run_all(now, |_| Ok(())).await;

        let mut ran = false;
        registry
            .check_and_run_all(now + 500, |_| {
                ran = true;
                Ok(())
            })
            .await;
        assert!(!ran);
    }

    #[tokio::test]
    async fn force_makes_a_task_due_immediately() {
        let registry = PeriodicTaskRegistry::new();
        registry.register("a", 1000).await;
        let now = CLOCK_NOT_SET_CUTOFF + 10_000;
        registry.check_and_run_all(now, |_| Ok(())).await;

        registry.force("a").await;
        let mut ran = false;
        registry
            .check_and_run_all(now + 1, |_| {
                ran = true;
                Ok(())
            })
            .await;
        assert!(ran);
    }
}
