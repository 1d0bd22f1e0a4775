//! Task analysis and step execution through a language model.
//!
//! Replies are free text that usually contains a JSON object. The object is
//! taken from the first `{` to the last `}`; anything unparseable degrades
//! to a fallback value instead of an error. Only a provider failure is an
//! error, and the lifecycle controller counts it against the agent.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ao_core::types::Task;
use ao_intelligence::llm::{CompletionRequest, LlmError, LlmProvider};

pub const ANALYSIS_MAX_TOKENS: u32 = 2000;
pub const STEP_MAX_TOKENS: u32 = 1500;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("language model request failed: {0}")]
    Llm(#[from] LlmError),
}

// ---------------------------------------------------------------------------
// TaskAnalysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    pub task_type: String,
    pub priority: String,
    pub estimated_time: String,
    pub skills: Vec<String>,
    pub dependencies: Vec<String>,
    pub plan: Vec<String>,
    /// Reply text kept when it contained braces but no valid JSON.
    pub raw_response: Option<String>,
}

impl TaskAnalysis {
    pub fn fallback() -> Self {
        Self {
            task_type: "unknown".into(),
            priority: "medium".into(),
            estimated_time: "unknown".into(),
            skills: Vec::new(),
            dependencies: Vec::new(),
            plan: vec![
                "Analyze task".into(),
                "Plan".into(),
                "Implement".into(),
                "Test".into(),
            ],
            raw_response: None,
        }
    }

    pub fn from_reply(reply: &str) -> Self {
        let Some(json) = extract_json_object(reply) else {
            return Self::fallback();
        };
        match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(map)) => {
                let base = Self::fallback();
                let plan = list_field(&map, &["plan", "steps"]);
                Self {
                    task_type: text_field(&map, &["type", "task_type"]).unwrap_or(base.task_type),
                    priority: text_field(&map, &["priority"]).unwrap_or(base.priority),
                    estimated_time: text_field(&map, &["estimated_time", "time"])
                        .unwrap_or(base.estimated_time),
                    skills: list_field(&map, &["skills", "technologies"]),
                    dependencies: list_field(&map, &["dependencies"]),
                    plan: if plan.is_empty() { base.plan } else { plan },
                    raw_response: None,
                }
            }
            _ => Self {
                raw_response: Some(reply.to_string()),
                ..Self::fallback()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// StepOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    InProgress,
    Blocked,
    Failed,
}

impl StepStatus {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "completed" | "done" => StepStatus::Completed,
            "blocked" => StepStatus::Blocked,
            "failed" | "error" => StepStatus::Failed,
            _ => StepStatus::InProgress,
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StepStatus::Completed => "completed",
            StepStatus::InProgress => "in_progress",
            StepStatus::Blocked => "blocked",
            StepStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub result: String,
    pub next_actions: Vec<String>,
    pub issues: Vec<String>,
    /// Whole-task progress, 0..=100.
    pub completion_percentage: u8,
    pub raw_response: Option<String>,
}

impl StepOutcome {
    /// The task is done as far as the model is concerned.
    pub fn finishes_task(&self) -> bool {
        self.status == StepStatus::Completed && self.completion_percentage >= 100
    }

    /// Outcome used when no model is configured.
    pub fn offline(task: &Task, step: &str) -> Self {
        Self {
            status: StepStatus::InProgress,
            result: format!("Basic execution of step '{step}' for task {}", task.title),
            next_actions: vec!["Continue work".into()],
            issues: vec!["Language model unavailable".into()],
            completion_percentage: 25,
            raw_response: None,
        }
    }

    fn unstructured(reply: &str) -> Self {
        Self {
            status: StepStatus::InProgress,
            result: reply.to_string(),
            next_actions: vec!["Continue work".into()],
            issues: Vec::new(),
            completion_percentage: 50,
            raw_response: None,
        }
    }

    pub fn from_reply(reply: &str) -> Self {
        let Some(json) = extract_json_object(reply) else {
            return Self::unstructured(reply);
        };
        match serde_json::from_str::<Value>(json) {
            Ok(Value::Object(map)) => Self {
                status: text_field(&map, &["status"])
                    .map(|s| StepStatus::parse(&s))
                    .unwrap_or(StepStatus::InProgress),
                result: text_field(&map, &["result"]).unwrap_or_default(),
                next_actions: list_field(&map, &["next_actions"]),
                issues: list_field(&map, &["issues", "problems"]),
                completion_percentage: percent_field(&map, &["completion_percentage", "progress"])
                    .unwrap_or(0),
                raw_response: None,
            },
            _ => Self {
                raw_response: Some(reply.to_string()),
                ..Self::unstructured(reply)
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Slice from the first `{` through the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

type JsonMap = serde_json::Map<String, Value>;

fn text_field(map: &JsonMap, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match map.get(*k)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    })
}

fn list_field(map: &JsonMap, keys: &[&str]) -> Vec<String> {
    let Some(value) = keys.iter().find_map(|k| map.get(*k)) else {
        return Vec::new();
    };
    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::String(s) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn percent_field(map: &JsonMap, keys: &[&str]) -> Option<u8> {
    keys.iter().find_map(|k| {
        let value = map.get(*k)?;
        let n = match value {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
            _ => return None,
        };
        Some(n.clamp(0.0, 100.0).round() as u8)
    })
}

// ---------------------------------------------------------------------------
// TaskAnalyzer
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TaskAnalyzer: Send + Sync {
    async fn analyze(&self, task: &Task) -> Result<TaskAnalysis, AnalyzerError>;

    async fn execute_step(
        &self,
        task: &Task,
        step: &str,
        context: &Value,
    ) -> Result<StepOutcome, AnalyzerError>;
}

/// [`TaskAnalyzer`] backed by an [`LlmProvider`].
pub struct LlmTaskAnalyzer {
    provider: Arc<dyn LlmProvider>,
    model: String,
    analysis_max_tokens: u32,
    step_max_tokens: u32,
}

impl LlmTaskAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            analysis_max_tokens: ANALYSIS_MAX_TOKENS,
            step_max_tokens: STEP_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, analysis: u32, step: u32) -> Self {
        self.analysis_max_tokens = analysis;
        self.step_max_tokens = step;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

#[async_trait]
impl TaskAnalyzer for LlmTaskAnalyzer {
    async fn analyze(&self, task: &Task) -> Result<TaskAnalysis, AnalyzerError> {
        let request = CompletionRequest::new(&self.model, self.analysis_max_tokens)
            .user(analysis_prompt(task));
        let reply = self.provider.complete(&request).await?;
        Ok(TaskAnalysis::from_reply(&reply.text))
    }

    async fn execute_step(
        &self,
        task: &Task,
        step: &str,
        context: &Value,
    ) -> Result<StepOutcome, AnalyzerError> {
        let request = CompletionRequest::new(&self.model, self.step_max_tokens)
            .user(step_prompt(task, step, context));
        let reply = self.provider.complete(&request).await?;
        Ok(StepOutcome::from_reply(&reply.text))
    }
}

pub fn analysis_prompt(task: &Task) -> String {
    format!(
        "Analyze the following development task.\n\n\
         Title: {title}\n\
         Description: {body}\n\
         Labels: {labels}\n\
         URL: {url}\n\n\
         Determine:\n\
         1. Task type (bug, feature, documentation, refactoring, ...)\n\
         2. Priority (high, medium, low)\n\
         3. Estimated time to complete\n\
         4. Required skills and technologies\n\
         5. Dependencies on other tasks\n\
         6. Execution plan (list of steps)\n\n\
         Reply with a JSON object with the keys type, priority, estimated_time, \
         skills, dependencies and plan.",
        title = task.title,
        body = task.body,
        labels = task.labels.join(", "),
        url = task.url,
    )
}

pub fn step_prompt(task: &Task, step: &str, context: &Value) -> String {
    let context = serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
    format!(
        "You are a development agent working on a GitHub issue.\n\n\
         Task: {title}\n\
         Description: {body}\n\
         Current step: {step}\n\
         Context: {context}\n\n\
         Carry out this step and report:\n\
         1. Status (completed, in_progress, blocked, failed)\n\
         2. Result\n\
         3. Next actions\n\
         4. Issues or blockers\n\
         5. Completion percentage of the whole task\n\n\
         Reply with a JSON object with the keys status, result, next_actions, \
         issues and completion_percentage.",
        title = task.title,
        body = task.body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ao_core::testing::sample_task;
    use ao_intelligence::llm::MockProvider;

    #[test]
    fn extracts_outermost_braces() {
        assert_eq!(
            extract_json_object("Sure! {\"a\": {\"b\": 1}} hope that helps"),
            Some("{\"a\": {\"b\": 1}}")
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn analysis_reads_model_fields() {
        let reply = r#"Here you go:
        {"type": "bug", "priority": "high", "estimated_time": 4,
         "skills": ["rust"], "dependencies": [], "plan": ["Reproduce", "Fix"]}"#;
        let analysis = TaskAnalysis::from_reply(reply);
        assert_eq!(analysis.task_type, "bug");
        assert_eq!(analysis.priority, "high");
        assert_eq!(analysis.estimated_time, "4");
        assert_eq!(analysis.skills, vec!["rust"]);
        assert_eq!(analysis.plan, vec!["Reproduce", "Fix"]);
        assert!(analysis.raw_response.is_none());
    }

    #[test]
    fn analysis_without_json_falls_back() {
        assert_eq!(TaskAnalysis::from_reply("I cannot help"), TaskAnalysis::fallback());
    }

    #[test]
    fn analysis_with_broken_json_keeps_raw_reply() {
        let analysis = TaskAnalysis::from_reply("{type: bug,}");
        assert_eq!(analysis.plan, TaskAnalysis::fallback().plan);
        assert_eq!(analysis.raw_response.as_deref(), Some("{type: bug,}"));
    }

    #[test]
    fn step_outcome_parsing() {
        let done = StepOutcome::from_reply(
            r#"{"status": "completed", "result": "ok", "completion_percentage": "100%"}"#,
        );
        assert!(done.finishes_task());

        let partial = StepOutcome::from_reply(r#"{"status": "completed", "completion_percentage": 80}"#);
        assert!(!partial.finishes_task());

        let failed = StepOutcome::from_reply(r#"{"status": "Failed", "issues": "disk full"}"#);
        assert_eq!(failed.status, StepStatus::Failed);
        assert_eq!(failed.issues, vec!["disk full"]);

        let prose = StepOutcome::from_reply("working on it");
        assert_eq!(prose.status, StepStatus::InProgress);
        assert_eq!(prose.completion_percentage, 50);
        assert_eq!(prose.result, "working on it");
    }

    #[tokio::test]
    async fn llm_analyzer_sends_task_in_prompt() {
        let mock = Arc::new(MockProvider::new().with_reply(r#"{"type": "feature", "plan": ["Build"]}"#));
        let analyzer = LlmTaskAnalyzer::new(mock.clone(), "test-model");
        let analysis = analyzer.analyze(&sample_task(12)).await.unwrap();
        assert_eq!(analysis.task_type, "feature");

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "test-model");
        assert_eq!(requests[0].max_tokens, ANALYSIS_MAX_TOKENS);
        assert!(requests[0].messages[0].content.contains("Task 12"));
    }

    #[tokio::test]
    async fn llm_failure_is_an_error() {
        let mock = Arc::new(MockProvider::new().with_error(LlmError::Timeout));
        let analyzer = LlmTaskAnalyzer::new(mock, "m");
        let err = analyzer
            .execute_step(&sample_task(1), "Plan", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyzerError::Llm(LlmError::Timeout)));
    }
}
