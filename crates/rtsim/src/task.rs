//! Inert task stand-ins and the tick counter.
//!
//! Nothing here schedules anything. Application code under test creates and
//! deletes tasks and calls [`Kernel::task_delay`] exactly as it would on
//! target; the kernel records the tasks and turns delays into virtual time.

use std::collections::BTreeMap;

use crate::config::Ticks;
use crate::kernel::Kernel;

/// Identifier returned by [`Kernel::task_create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskHandle(u32);

impl TaskHandle {
    pub fn id(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub name: String,
    pub stack_depth: usize,
    pub priority: u8,
}

#[derive(Debug, Default)]
pub(crate) struct TaskState {
    ticks: Ticks,
    next_id: u32,
    tasks: BTreeMap<TaskHandle, TaskInfo>,
}

impl Kernel {
    /// Records a task. The entry function is never run.
    pub fn task_create<F>(
        &mut self,
        name: &str,
        stack_depth: usize,
        priority: u8,
        entry: F,
    ) -> TaskHandle
    where
        F: FnOnce() + 'static,
    {
        drop(entry);
        let state = &mut self.tasks;
        state.next_id += 1;
        let handle = TaskHandle(state.next_id);
        state.tasks.insert(
            handle,
            TaskInfo {
                name: name.to_owned(),
                stack_depth,
                priority,
            },
        );
        log::debug!("task {name:?} created as {handle:?} (priority {priority})");
        handle
    }

    /// Forgets a task. `None` stands for the calling task and does nothing.
    pub fn task_delete(&mut self, task: Option<TaskHandle>) {
        let Some(task) = task else {
            return;
        };
        if self.tasks.tasks.remove(&task).is_none() {
            log::warn!("deleting unknown task {task:?}");
        }
    }

    pub fn task_info(&self, task: TaskHandle) -> Option<&TaskInfo> {
        self.tasks.tasks.get(&task)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.tasks.len()
    }

    /// Lets `ticks` ticks pass.
    ///
    /// With the timer engine running this advances virtual time and fires
    /// every timer due on the way; otherwise only the tick counter moves.
    pub fn task_delay(&mut self, ticks: Ticks) {
        if self.timers_active() {
            let duration = self.config().ticks_to_duration(ticks);
            self.advance_time(duration);
        } else {
            self.tasks.ticks = self.tasks.ticks.wrapping_add(ticks);
        }
    }

    /// Ticks elapsed, read from the virtual clock while timers are running.
    pub fn tick_count(&self) -> Ticks {
        if self.timers_active() {
            self.config().duration_to_ticks(self.timers_now())
        } else {
            self.tasks.ticks
        }
    }
}
