use ao_core::collaborators::CollaboratorError;
use ao_core::config::Config;
use ao_core::types::Task;
use ao_integrations::github::client::{GitHubClient, GitHubError};
use ao_integrations::github::issues::without_pull_requests;
use ao_integrations::types::*;

use chrono::Utc;

// ===========================================================================
// Test helpers
// ===========================================================================

fn make_config(token: Option<&str>) -> GitHubConfig {
    GitHubConfig {
        token: token.map(|t| t.to_string()),
        owner: "octo".to_string(),
        repo: "widgets".to_string(),
    }
}

fn make_issue(number: u64, is_pull_request: bool) -> GitHubIssue {
    let now = Utc::now();
    GitHubIssue {
        number,
        title: format!("Issue {number}"),
        body: None,
        state: IssueState::Open,
        labels: vec![
            GitHubLabel {
                name: "bug".to_string(),
                color: "d73a4a".to_string(),
            },
            GitHubLabel {
                name: "backend".to_string(),
                color: "0e8a16".to_string(),
            },
        ],
        assignees: vec!["alice".to_string(), "bob".to_string()],
        author: "carol".to_string(),
        created_at: now,
        updated_at: now,
        html_url: format!("https://github.com/octo/widgets/issues/{number}"),
        is_pull_request,
    }
}

// ===========================================================================
// Client construction
// ===========================================================================

#[tokio::test]
async fn test_client_with_token() {
    let client = GitHubClient::new(make_config(Some("ghp_test"))).unwrap();
    assert_eq!(client.owner(), "octo");
    assert_eq!(client.repo(), "widgets");
    assert_eq!(client.full_name(), "octo/widgets");
}

#[test]
fn test_client_missing_token() {
    let err = GitHubClient::new(make_config(None)).unwrap_err();
    assert!(matches!(err, GitHubError::MissingToken));
}

#[test]
fn test_client_missing_repo() {
    let mut config = make_config(Some("ghp_test"));
    config.repo.clear();
    let err = GitHubClient::new(config).unwrap_err();
    assert!(matches!(err, GitHubError::MissingRepository));
}

#[test]
fn test_from_config_without_repo() {
    let mut config = Config::default();
    // Point at a variable that is certainly set so only the repo is missing.
    config.github.token_env = "PATH".to_string();
    let err = GitHubClient::from_config(&config).unwrap_err();
    assert!(matches!(err, GitHubError::MissingRepository));
}

#[test]
fn test_setup_errors_map_to_unavailable() {
    let err: CollaboratorError = GitHubError::MissingToken.into();
    assert!(matches!(err, CollaboratorError::Unavailable(_)));
}

// ===========================================================================
// Issue mapping
// ===========================================================================

#[test]
fn test_pull_requests_are_dropped() {
    let issues = vec![make_issue(1, false), make_issue(2, true), make_issue(3, false)];
    let numbers: Vec<u64> = without_pull_requests(issues)
        .iter()
        .map(|i| i.number)
        .collect();
    assert_eq!(numbers, vec![1, 3]);
}

#[test]
fn test_issue_to_task() {
    let task = Task::from(make_issue(42, false));
    assert_eq!(task.id, 42);
    assert_eq!(task.title, "Issue 42");
    assert_eq!(task.body, "");
    assert_eq!(task.labels, vec!["bug", "backend"]);
    assert_eq!(task.assignee.as_deref(), Some("alice"));
    assert_eq!(task.state, "open");
    assert_eq!(task.url, "https://github.com/octo/widgets/issues/42");
}

#[test]
fn test_issue_state_serde() {
    assert_eq!(serde_json::to_string(&IssueState::Closed).unwrap(), "\"closed\"");
    let state: IssueState = serde_json::from_str("\"open\"").unwrap();
    assert_eq!(state, IssueState::Open);
}
