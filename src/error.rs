//! Error types for the assistant session client.

use std::time::Duration;

use thiserror::Error;

use crate::OpenAiError;

pub type Result<T, E = AssistantError> = std::result::Result<T, E>;

/// Every way an assistant session call can fail.
///
/// Nothing is retried: each variant is returned to the caller as soon as it
/// happens, including in the middle of a polling loop.
#[derive(Error, Debug)]
pub enum AssistantError {
    /// The request never produced a readable response (connection, DNS,
    /// TLS, or body read failure).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The API answered with a non-success HTTP status.
    #[error("unexpected HTTP status {status}: {}", status_message(.error, .body))]
    UnexpectedStatus {
        status: u16,
        body: String,
        error: Option<OpenAiError>,
    },

    /// The response body reported an error of its own.
    #[error("API returned error: {0}")]
    Upstream(OpenAiError),

    /// The response body is missing a field the operation depends on, or
    /// could not be decoded at all.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The operation needs state the session does not have yet.
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("tool `{0}` is not callable: no handler is registered under that name")]
    ToolNotCallable(String),

    #[error("arguments for tool `{name}` could not be decoded: {source}")]
    ToolArguments {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("tool `{name}` failed: {source}")]
    ToolExecution {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("run {run_id} did not settle after {attempts} polls")]
    PollAttemptsExhausted { run_id: String, attempts: u32 },

    #[error("run {run_id} did not settle within {timeout:?}")]
    PollTimeout { run_id: String, timeout: Duration },

    #[error("configuration error: {0}")]
    Configuration(String),
}

fn status_message<'a>(error: &'a Option<OpenAiError>, body: &'a str) -> &'a str {
    error.as_ref().map(|e| e.message.as_str()).unwrap_or(body)
}

impl AssistantError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_status_prefers_api_message() {
        let with_error = AssistantError::UnexpectedStatus {
            status: 404,
            body: "{\"error\":{}}".to_string(),
            error: Some(OpenAiError::new(
                "No assistant found".to_string(),
                "invalid_request_error".to_string(),
            )),
        };
        let without_error = AssistantError::UnexpectedStatus {
            status: 502,
            body: "Bad Gateway".to_string(),
            error: None,
        };

        assert_eq!(
            with_error.to_string(),
            "unexpected HTTP status 404: No assistant found"
        );
        assert_eq!(
            without_error.to_string(),
            "unexpected HTTP status 502: Bad Gateway"
        );
    }

    #[test]
    fn tool_errors_name_the_tool() {
        let error = AssistantError::ToolNotCallable("lookup".to_string());
        assert!(error.to_string().contains("`lookup`"));

        let error = AssistantError::ToolExecution {
            name: "lookup".to_string(),
            source: anyhow::anyhow!("database offline"),
        };
        assert_eq!(error.to_string(), "tool `lookup` failed: database offline");
    }
}
