//! Language-model access for task analysis.
//!
//! [`llm::LlmProvider`] is the seam: the Anthropic Messages API in
//! production, [`llm::MockProvider`] in tests.

pub mod llm;
