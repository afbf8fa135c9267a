//! Per-run, per-scope delegation call stacks.
//!
//! Every top-level run installs a fresh [`RunStacks`] table in task-local
//! storage. Each swarm scope (root or nested sub-swarm) owns its own entry
//! in that table, keyed by the scope's hierarchical id, so concurrent runs
//! never share a stack and nested scopes never see their parent's frames.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::SwarmError;

tokio::task_local! {
    static RUN_STACKS: RunStacks;
}

/// Call stacks of one run, keyed by scope id.
#[derive(Debug, Clone, Default)]
pub struct RunStacks {
    stacks: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

/// Run `future` with a fresh set of call stacks.
pub async fn new_run<F: Future>(future: F) -> F::Output {
    RUN_STACKS.scope(RunStacks::default(), future).await
}

/// Run `future` inside the current run, starting one if none is active.
pub async fn within_run<F: Future>(future: F) -> F::Output {
    match RUN_STACKS.try_with(Clone::clone) {
        Ok(stacks) => RUN_STACKS.scope(stacks, future).await,
        Err(_) => new_run(future).await,
    }
}

/// Handle to one scope's stack within the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStack {
    scope_id: String,
}

impl CallStack {
    pub fn new(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
        }
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    /// Push `name`, rejecting it if it is already active in this scope.
    ///
    /// The returned frame pops the entry when dropped, whether the call
    /// completed, failed, or was cancelled by a timeout.
    pub fn push(&self, name: &str) -> Result<CallFrame, SwarmError> {
        let stacks = RUN_STACKS
            .try_with(Clone::clone)
            .map_err(|_| SwarmError::InvalidState("call stack used outside of a run".into()))?;
        {
            let mut table = stacks.stacks.lock();
            let frames = table.entry(self.scope_id.clone()).or_default();
            if frames.iter().any(|frame| frame == name) {
                let mut chain = frames.clone();
                chain.push(name.to_string());
                return Err(SwarmError::CircularDependency { chain });
            }
            frames.push(name.to_string());
        }
        Ok(CallFrame {
            stacks,
            scope_id: self.scope_id.clone(),
            name: name.to_string(),
        })
    }

    /// Names currently active in this scope, outermost first.
    pub fn frames(&self) -> Vec<String> {
        RUN_STACKS
            .try_with(|stacks| {
                stacks
                    .stacks
                    .lock()
                    .get(&self.scope_id)
                    .cloned()
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }
}

/// Active entry on a call stack; popped on drop.
#[derive(Debug)]
pub struct CallFrame {
    stacks: RunStacks,
    scope_id: String,
    name: String,
}

impl CallFrame {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for CallFrame {
    fn drop(&mut self) {
        let mut table = self.stacks.stacks.lock();
        if let Some(frames) = table.get_mut(&self.scope_id) {
            if let Some(pos) = frames.iter().rposition(|frame| *frame == self.name) {
                frames.remove(pos);
            }
            if frames.is_empty() {
                table.remove(&self.scope_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn repeated_name_reports_full_chain() {
        new_run(async {
            let stack = CallStack::new("root");
            let _lead = stack.push("lead").unwrap();
            let _backend = stack.push("backend").unwrap();
            let err = stack.push("lead").unwrap_err();
            assert_eq!(err.to_string(), "Circular delegation detected: lead -> backend -> lead");
        })
        .await;
    }

    #[tokio::test]
    async fn frames_pop_on_drop() {
        new_run(async {
            let stack = CallStack::new("root");
            {
                let _a = stack.push("a").unwrap();
                assert_eq!(stack.frames(), vec!["a"]);
            }
            assert!(stack.frames().is_empty());
            assert!(stack.push("a").is_ok());
        })
        .await;
    }

    #[tokio::test]
    async fn nested_scopes_do_not_collide() {
        new_run(async {
            let parent = CallStack::new("root");
            let child = CallStack::new("root/research");
            let _outer = parent.push("lead").unwrap();
            let _inner = child.push("lead").unwrap();
            assert_eq!(child.frames(), vec!["lead"]);
        })
        .await;
    }

    #[tokio::test]
    async fn concurrent_runs_have_independent_stacks() {
        let first = tokio::spawn(new_run(async {
            let _lead = CallStack::new("root").push("lead").unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }));
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = new_run(async { CallStack::new("root").push("lead").map(|_| ()) }).await;
        assert!(second.is_ok());
        first.await.unwrap();
    }

    #[tokio::test]
    async fn frame_is_released_when_a_timeout_cancels_the_call() {
        new_run(async {
            let stack = CallStack::new("root");
            let slow = async {
                let _frame = stack.push("worker")?;
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, SwarmError>(())
            };
            let timed_out = tokio::time::timeout(Duration::from_millis(5), slow).await;
            assert!(timed_out.is_err());
            assert!(stack.frames().is_empty());
        })
        .await;
    }

    #[tokio::test]
    async fn within_run_reuses_the_active_table() {
        new_run(async {
            let _lead = CallStack::new("root").push("lead").unwrap();
            within_run(async {
                assert_eq!(CallStack::new("root").frames(), vec!["lead"]);
            })
            .await;
        })
        .await;
        assert!(within_run(async { CallStack::new("root").push("x").is_ok() }).await);
    }
}
