//! A session client for the OpenAI Assistants API.
//!
//! [`AssistantSession`] wraps the REST endpoints for assistants, threads,
//! messages and runs, drives runs to completion by polling, and dispatches
//! the tool calls a run asks for to handlers registered in a
//! [`ToolRegistry`].
//!
//! ```no_run
//! use openai_assistant::{AssistantSession, Credentials, SessionConfig, ToolRegistry};
//! use serde_json::{json, Value};
//!
//! # async fn demo() -> openai_assistant::Result<()> {
//! let mut tools = ToolRegistry::new();
//! tools.register_fn("get_weather", |args: Value| Ok(json!({ "city": args["city"], "sky": "clear" })));
//!
//! let config = SessionConfig::builder()
//!     .credentials(Credentials::from_env())
//!     .assistant_id("asst_abc123")
//!     .build()?;
//! let session = AssistantSession::new(config, tools)?;
//!
//! let thread_id = session.create_thread("What's the weather in Paris?", None).await?;
//! let run_id = session.run_to_completion(&thread_id).await?;
//! println!("finished {run_id}");
//! # Ok(())
//! # }
//! ```
use serde::{Deserialize, Serialize};
use std::env;

pub mod assistants;
pub mod client;
pub mod error;
pub mod session;
pub mod tool_log;
pub mod tools;

pub use assistants::*;
pub use error::{AssistantError, Result};
pub use session::{
    AssistantSession, MessageOutcome, PollOptions, RunOutcome, SessionConfig, SessionConfigBuilder,
};
pub use tools::{InvalidArguments, ToolHandler, ToolRegistry};

pub const BASE_URL: &str = "https://api.openai.com/v1/";

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct OpenAiError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    pub param: Option<String>,
    pub code: Option<String>,
}

impl OpenAiError {
    pub fn new(message: String, error_type: String) -> OpenAiError {
        OpenAiError {
            message,
            error_type,
            param: None,
            code: None,
        }
    }
}

impl std::fmt::Display for OpenAiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for OpenAiError {}

/// The API key and base URL every request is made with.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    base_url: String,
}

impl Credentials {
    /// Creates credentials from an API key and a base URL.
    ///
    /// The base URL is stored with exactly one trailing slash so routes can be
    /// appended to it directly.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = format!("{}/", base_url.trim_end_matches('/'));

        Self {
            api_key: api_key.into(),
            base_url,
        }
    }

    /// Reads `OPENAI_KEY` and, if set, `OPENAI_BASE_URL` from the environment,
    /// loading a `.env` file first when one is present.
    ///
    /// A missing key yields empty credentials; the API will then reject
    /// requests with an unexpected status.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let api_key = env::var("OPENAI_KEY").unwrap_or_default();
        let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| BASE_URL.to_string());

        Self::new(api_key, base_url)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new("", BASE_URL)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_single_trailing_slash() {
        assert_eq!(
            Credentials::new("k", "http://localhost:8080").base_url(),
            "http://localhost:8080/"
        );
        assert_eq!(
            Credentials::new("k", "http://localhost:8080//").base_url(),
            "http://localhost:8080/"
        );
        assert_eq!(Credentials::default().base_url(), BASE_URL);
    }

    #[test]
    fn debug_output_hides_api_key() {
        let credentials = Credentials::new("sk-secret", BASE_URL);
        let debug = format!("{credentials:?}");

        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("api.openai.com"));
    }

    #[test]
    fn api_error_deserializes_without_type() {
        let error: OpenAiError =
            serde_json::from_str(r#"{"message":"No thread found","param":null,"code":null}"#)
                .unwrap();

        assert_eq!(error.to_string(), "No thread found");
        assert_eq!(error.error_type, "");
    }
}
