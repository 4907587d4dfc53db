//! Mock LLM provider producing deterministic offline completions.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use reasoner_core::AppResult;

/// Mock provider for demos and testing.
///
/// Never touches the network. A prompt asking for a JSON array of search
/// terms gets an empty array back; a prompt asking for a JSON quality
/// assessment gets a neutral one; everything else is answered by echoing the
/// leading lines of the prompt, which keeps answers traceable to their input.
#[derive(Debug, Default)]
pub struct MockLlmClient;

/// Number of prompt lines echoed back in a mock answer.
const ECHO_LINES: usize = 6;

impl MockLlmClient {
    pub fn new() -> Self {
        Self
    }

    fn mock_content(prompt: &str) -> String {
        let lower = prompt.to_lowercase();

        if lower.contains("json array") {
            return "[]".to_string();
        }

        if lower.contains("needsmorecontext") {
            return r#"{"confidence": 0.7, "needsMoreContext": false, "missingAspects": []}"#
                .to_string();
        }

        let echoed: Vec<&str> = prompt
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(ECHO_LINES)
            .collect();

        format!("[mock answer]\n{}", echoed.join("\n"))
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlmClient {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        let content = Self::mock_content(&request.prompt);
        let prompt_tokens = request.prompt.split_whitespace().count() as u32;
        let completion_tokens = content.split_whitespace().count() as u32;

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::new(prompt_tokens, completion_tokens),
            done: true,
        })
    }
}
