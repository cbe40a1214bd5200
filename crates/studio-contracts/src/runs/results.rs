use serde::Serialize;

use crate::image::EncodedImage;

use super::task::{GenerationTask, TaskStatus, TransitionRefused};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.succeeded + self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    #[error("no task with id '{0}'")]
    UnknownTask(String),
    #[error(transparent)]
    Refused(#[from] TransitionRefused),
}

/// Ordered task collection rendered as the result grid.
///
/// Batch runs replace the whole set; ad hoc runs push to the front. Updates
/// address tasks by id so a transition never touches a neighbour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResultSet {
    tasks: Vec<GenerationTask>,
}

impl RunResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks(tasks: Vec<GenerationTask>) -> Self {
        Self { tasks }
    }

    pub fn prepend(&mut self, task: GenerationTask) {
        self.tasks.insert(0, task);
    }

    pub fn get(&self, id: &str) -> Option<&GenerationTask> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn succeed(&mut self, id: &str, image: EncodedImage) -> Result<&GenerationTask, UpdateError> {
        self.update(id, |task| task.succeed(image))
    }

    pub fn fail(&mut self, id: &str, message: impl Into<String>) -> Result<&GenerationTask, UpdateError> {
        let message = message.into();
        self.update(id, |task| task.fail(message))
    }

    pub fn tasks(&self) -> &[GenerationTask] {
        &self.tasks
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenerationTask> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for task in &self.tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Succeeded { .. } => counts.succeeded += 1,
                TaskStatus::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    fn update<F>(&mut self, id: &str, apply: F) -> Result<&GenerationTask, UpdateError>
    where
        F: FnOnce(&mut GenerationTask) -> Result<(), TransitionRefused>,
    {
        let Some(task) = self.tasks.iter_mut().find(|task| task.id == id) else {
            return Err(UpdateError::UnknownTask(id.to_string()));
        };
        apply(task)?;
        Ok(task)
    }
}

impl IntoIterator for RunResultSet {
    type Item = GenerationTask;
    type IntoIter = std::vec::IntoIter<GenerationTask>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{RunResultSet, StatusCounts, UpdateError};
    use crate::image::EncodedImage;
    use crate::runs::task::{GenerationTask, TaskStatus};

    fn png(data: &str) -> EncodedImage {
        EncodedImage::from_base64("image/png", data)
    }

    fn three_pending() -> RunResultSet {
        RunResultSet::from_tasks(vec![
            GenerationTask::pending("a", "pa", "A"),
            GenerationTask::pending("b", "pb", "B"),
            GenerationTask::pending("c", "pc", "C"),
        ])
    }

    #[test]
    fn update_by_id_leaves_neighbours_untouched() {
        let mut results = three_pending();
        results.succeed("b", png("BBBB")).unwrap();
        assert_eq!(results.get("a").unwrap().status, TaskStatus::Pending);
        assert_eq!(results.get("c").unwrap().status, TaskStatus::Pending);
        assert_eq!(
            results.get("b").and_then(GenerationTask::result_image),
            Some(&png("BBBB"))
        );
        assert_eq!(results.tasks()[1].id, "b");
    }

    #[test]
    fn prepend_puts_new_task_first() {
        let mut results = three_pending();
        results.prepend(GenerationTask::pending("custom-1", "add sunglasses", "Custom Edit"));
        let ids: Vec<&str> = results.iter().map(|task| task.id.as_str()).collect();
        assert_eq!(ids, vec!["custom-1", "a", "b", "c"]);
    }

    #[test]
    fn unknown_and_repeated_updates_are_errors() {
        let mut results = three_pending();
        assert_eq!(
            results.fail("zzz", "boom").unwrap_err(),
            UpdateError::UnknownTask("zzz".to_string())
        );
        results.fail("a", "Failed to generate").unwrap();
        let err = results.succeed("a", png("AAAA")).unwrap_err();
        assert!(matches!(err, UpdateError::Refused(_)));
        assert_eq!(err.to_string(), "task 'a' already failed");
    }

    #[test]
    fn counts_track_each_status() {
        let mut results = three_pending();
        results.succeed("a", png("AAAA")).unwrap();
        results.fail("b", "Cancelled").unwrap();
        results.fail("c", "Cancelled").unwrap();
        assert_eq!(
            results.counts(),
            StatusCounts {
                pending: 0,
                succeeded: 1,
                failed: 2
            }
        );
        assert_eq!(results.get("c").and_then(GenerationTask::error_message), Some("Cancelled"));
        assert_eq!(results.counts().total(), 3);
    }
}
