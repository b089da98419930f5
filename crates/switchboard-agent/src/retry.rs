// ABOUTME: Retry policy for LLM invocations: attempt budget, backoff, and error classification.
// ABOUTME: Distinguishes retryable failures, salvageable answers, and terminal errors.

use std::time::Duration;

use crate::llm::LlmError;

const SALVAGE_MARKER: &str = "Could not parse LLM output: `";

/// What to do after a failed LLM invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    /// The model answered but the parser choked; use this text as the answer.
    Salvage(String),
    Fail,
}

/// Bounded retry policy for a run context's LLM calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Classify an error. Salvage never consumes an attempt.
    pub fn classify(&self, error: &LlmError) -> RetryDecision {
        match error {
            LlmError::OutputParsing(message) => match salvage_output(message) {
                Some(answer) => RetryDecision::Salvage(answer),
                None => RetryDecision::Retry,
            },
            LlmError::Api { .. }
            | LlmError::Transport(_)
            | LlmError::MissingKey(_)
            | LlmError::InvalidResponse(_) => RetryDecision::Retry,
            LlmError::Timeout(_) | LlmError::Config(_) => RetryDecision::Fail,
        }
    }

    /// Decide for attempt number `attempt` (1-based) that just failed.
    pub fn decide(&self, error: &LlmError, attempt: u32) -> RetryDecision {
        match self.classify(error) {
            RetryDecision::Retry if attempt < self.max_attempts => RetryDecision::Retry,
            RetryDecision::Retry => RetryDecision::Fail,
            other => other,
        }
    }

    /// Linear backoff before attempt `attempt + 1`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Pull the raw answer out of an output-parsing failure message.
pub fn salvage_output(message: &str) -> Option<String> {
    let start = message.find(SALVAGE_MARKER)? + SALVAGE_MARKER.len();
    let rest = &message[start..];
    let end = rest.rfind('`')?;
    Some(rest[..end].to_string())
}

/// The final message a run reports when its LLM call cannot complete.
pub fn exception_message(error: &LlmError) -> String {
    format!("Agent stopped due to exception {error}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salvages_parsed_answer() {
        let policy = RetryPolicy::default();
        let err = LlmError::OutputParsing(
            "An output parsing error occurred. Could not parse LLM output: `The answer is 42`".to_string(),
        );
        assert_eq!(
            policy.decide(&err, 1),
            RetryDecision::Salvage("The answer is 42".to_string())
        );
    }

    #[test]
    fn salvage_keeps_inner_backticks() {
        assert_eq!(
            salvage_output("Could not parse LLM output: `use `x` here`").as_deref(),
            Some("use `x` here")
        );
        assert_eq!(salvage_output("Could not parse LLM output: no ticks"), None);
    }

    #[test]
    fn api_errors_retry_until_budget_spent() {
        let policy = RetryPolicy::default();
        let err = LlmError::Api {
            status: 529,
            message: "overloaded".to_string(),
        };
        assert_eq!(policy.decide(&err, 1), RetryDecision::Retry);
        assert_eq!(policy.decide(&err, 2), RetryDecision::Retry);
        assert_eq!(policy.decide(&err, 3), RetryDecision::Fail);
    }

    #[test]
    fn timeouts_and_config_fail_immediately() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.decide(&LlmError::Timeout(5), 1), RetryDecision::Fail);
        assert_eq!(
            policy.decide(&LlmError::Config("bad".to_string()), 1),
            RetryDecision::Fail
        );
    }

    #[test]
    fn unparseable_output_without_marker_retries() {
        let policy = RetryPolicy::default();
        let err = LlmError::OutputParsing("garbled".to_string());
        assert_eq!(policy.decide(&err, 1), RetryDecision::Retry);
    }

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    }

    #[test]
    fn exception_message_names_error() {
        assert_eq!(
            exception_message(&LlmError::Timeout(30)),
            "Agent stopped due to exception timed out after 30 seconds"
        );
    }
}
