use std::collections::VecDeque;

use crate::core::Task;

/// Ordered run queue, owned by the worker for the whole run.
///
/// Tasks leave from the front. Follow-ups spawned by the running task are
/// spliced in at the front so they run before anything queued earlier.
/// Dropping a queue abandons whatever is still in it, so scratch files
/// reserved while building never outlive a run that did not start.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    /// Insert `tasks`, in order, ahead of everything still waiting.
    pub fn insert_next(&mut self, tasks: Vec<Task>) {
        for task in tasks.into_iter().rev() {
            self.tasks.push_front(task);
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Discard every waiting task, letting each release its scratch files.
    pub fn abandon_all(&mut self) -> usize {
        let count = self.tasks.len();
        for mut task in self.tasks.drain(..) {
            task.abandon();
        }
        count
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.abandon_all();
    }
}

impl FromIterator<Task> for TaskQueue {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        Self {
            tasks: iter.into_iter().collect(),
        }
    }
}

impl Extend<Task> for TaskQueue {
    fn extend<I: IntoIterator<Item = Task>>(&mut self, iter: I) {
        self.tasks.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PipelineStep, TaskContext};
    use crate::utils::EngineResult;

    struct Named(&'static str);

    impl PipelineStep for Named {
        fn describe(&self) -> String {
            self.0.to_string()
        }

        fn execute(&mut self, _ctx: &mut TaskContext<'_>) -> EngineResult<()> {
            Ok(())
        }
    }

    fn named(name: &'static str) -> Task {
        Task::Custom(Box::new(Named(name)))
    }

    #[test]
    fn follow_ups_run_before_earlier_tasks() {
        let mut queue: TaskQueue = [named("a"), named("b"), named("c")].into_iter().collect();
        assert_eq!(queue.pop().unwrap().describe(), "a");

        queue.insert_next(vec![named("a1"), named("a2")]);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|t| t.describe()).collect();
        assert_eq!(order, ["a1", "a2", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn abandon_empties_queue() {
        let mut queue = TaskQueue::new();
        queue.push(named("x"));
        queue.push(named("y"));
        assert_eq!(queue.abandon_all(), 2);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn dropped_queue_releases_scratch_inputs() {
        let scratch = crate::utils::temp_path("webp").unwrap();
        let mut queue = TaskQueue::new();
        queue.push(Task::LossyCompress(crate::processing::LossyCompressTask::new(
            scratch.clone(),
            scratch.with_extension("jpg"),
            80,
        )));
        assert!(scratch.exists());
        drop(queue);
        assert!(!scratch.exists());
    }
}
