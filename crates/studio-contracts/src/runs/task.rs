use serde::{Deserialize, Serialize};

use crate::image::EncodedImage;
use crate::presets::StylePreset;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Succeeded { image: EncodedImage },
    Failed { message: String },
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Succeeded { .. } => "succeeded",
            TaskStatus::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

/// Returned when a task that already reached a terminal state is asked to
/// transition again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("task '{id}' already {state}")]
pub struct TransitionRefused {
    pub id: String,
    pub state: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTask {
    pub id: String,
    pub prompt_text: String,
    pub display_name: String,
    pub status: TaskStatus,
}

impl GenerationTask {
    pub fn pending(
        id: impl Into<String>,
        prompt_text: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            prompt_text: prompt_text.into(),
            display_name: display_name.into(),
            status: TaskStatus::Pending,
        }
    }

    pub fn from_preset(preset: &StylePreset) -> Self {
        Self::pending(&preset.id, &preset.prompt_text, &preset.display_name)
    }

    pub fn succeed(&mut self, image: EncodedImage) -> Result<(), TransitionRefused> {
        self.transition(TaskStatus::Succeeded { image })
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionRefused> {
        self.transition(TaskStatus::Failed {
            message: message.into(),
        })
    }

    pub fn result_image(&self) -> Option<&EncodedImage> {
        match &self.status {
            TaskStatus::Succeeded { image } => Some(image),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            TaskStatus::Failed { message } => Some(message.as_str()),
            _ => None,
        }
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), TransitionRefused> {
        if self.status.is_terminal() {
            return Err(TransitionRefused {
                id: self.id.clone(),
                state: self.status.label(),
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{GenerationTask, TaskStatus};
    use crate::image::EncodedImage;

    #[test]
    fn pending_task_transitions_once() {
        let mut task = GenerationTask::pending("hair-bob", "prompt", "Sleek Bob");
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.result_image().is_none());

        task.succeed(EncodedImage::from_base64("image/png", "AAAA"))
            .unwrap();
        assert_eq!(task.status.label(), "succeeded");
        assert_eq!(task.result_image().map(EncodedImage::payload), Some("AAAA"));

        let refused = task.fail("late failure").unwrap_err();
        assert_eq!(refused.state, "succeeded");
        assert_eq!(refused.to_string(), "task 'hair-bob' already succeeded");
        assert!(task.error_message().is_none());
    }

    #[test]
    fn failed_task_keeps_its_message() {
        let mut task = GenerationTask::pending("custom-1", "add sunglasses", "Custom Edit");
        task.fail("Rate limit exceeded").unwrap();
        assert_eq!(task.error_message(), Some("Rate limit exceeded"));
        assert!(task
            .succeed(EncodedImage::from_base64("image/png", "AAAA"))
            .is_err());
        assert_eq!(
            task.status,
            TaskStatus::Failed {
                message: "Rate limit exceeded".to_string()
            }
        );
    }

    #[test]
    fn status_serializes_with_state_tag() -> anyhow::Result<()> {
        let mut task = GenerationTask::pending("a", "p", "A");
        task.fail("boom").unwrap();
        let value = serde_json::to_value(&task)?;
        assert_eq!(value["status"]["state"], "failed");
        assert_eq!(value["status"]["message"], "boom");
        Ok(())
    }
}
