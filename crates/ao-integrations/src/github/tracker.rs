//! [`GitHubClient`] as the lifecycle core's task source and notifier.

use async_trait::async_trait;

use ao_core::collaborators::{CollaboratorError, Notifier, TaskSource};
use ao_core::types::{Task, TaskId};

use super::client::GitHubClient;
use super::issues;

#[async_trait]
impl TaskSource for GitHubClient {
    async fn list_open_tasks(&self) -> Result<Vec<Task>, CollaboratorError> {
        let open = issues::open_tasks(self).await?;
        Ok(open.into_iter().map(Task::from).collect())
    }
}

#[async_trait]
impl Notifier for GitHubClient {
    async fn post_comment(&self, task_id: TaskId, text: &str) -> Result<(), CollaboratorError> {
        issues::create_comment(self, task_id, text).await?;
        Ok(())
    }
}
