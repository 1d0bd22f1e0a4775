use crate::types::{GitHubIssue, GitHubLabel, IssueState};

use super::client::{GitHubClient, Result};

const PAGE_SIZE: u8 = 100;

/// Every open issue in the repository, following pagination. Pull requests
/// are included and flagged; see [`open_tasks`] for the filtered view.
pub async fn list_open_issues(client: &GitHubClient) -> Result<Vec<GitHubIssue>> {
    let first = client
        .octocrab
        .issues(&client.owner, &client.repo)
        .list()
        .state(octocrab::params::State::Open)
        .per_page(PAGE_SIZE)
        .send()
        .await?;

    let all = client.octocrab.all_pages(first).await?;
    Ok(all.into_iter().map(octocrab_issue_to_github_issue).collect())
}

/// Open issues with pull requests dropped.
pub async fn open_tasks(client: &GitHubClient) -> Result<Vec<GitHubIssue>> {
    let issues = list_open_issues(client).await?;
    let total = issues.len();
    let tasks = without_pull_requests(issues);
    tracing::info!(
        repo = %client.full_name(),
        found = tasks.len(),
        skipped_prs = total - tasks.len(),
        "fetched open issues"
    );
    Ok(tasks)
}

pub fn without_pull_requests(issues: Vec<GitHubIssue>) -> Vec<GitHubIssue> {
    issues.into_iter().filter(|i| !i.is_pull_request).collect()
}

pub async fn create_comment(client: &GitHubClient, number: u64, body: &str) -> Result<()> {
    client
        .octocrab
        .issues(&client.owner, &client.repo)
        .create_comment(number, body)
        .await?;
    tracing::debug!(issue = number, "comment posted");
    Ok(())
}

// ---- internal helpers -------------------------------------------------------

fn octocrab_issue_to_github_issue(issue: octocrab::models::issues::Issue) -> GitHubIssue {
    let state = match issue.state {
        octocrab::models::IssueState::Closed => IssueState::Closed,
        _ => IssueState::Open,
    };

    let labels = issue
        .labels
        .iter()
        .map(|l| GitHubLabel {
            name: l.name.clone(),
            color: l.color.clone(),
        })
        .collect();

    GitHubIssue {
        number: issue.number,
        title: issue.title,
        body: issue.body,
        state,
        labels,
        assignees: issue.assignees.iter().map(|a| a.login.clone()).collect(),
        author: issue.user.login.clone(),
        created_at: issue.created_at,
        updated_at: issue.updated_at,
        html_url: issue.html_url.to_string(),
        is_pull_request: issue.pull_request.is_some(),
    }
}
