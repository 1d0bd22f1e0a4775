//! Issue-tracker integration: GitHub issues as the task source and issue
//! comments as the notification channel.

pub mod github;
pub mod types;
