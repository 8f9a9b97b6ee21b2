//! The stateful assistant session: assistant binding, per-thread pending
//! tool-call tracking, and the run lifecycle.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use derive_builder::Builder;

use crate::{
    assistants::{
        messages::{CreateMessageRequest, Message, Role},
        runs::{CreateRunRequest, Run, Status, SubmitToolOutputsRequest, ToolOutput},
        threads::{CreateThreadRequest, Thread},
        Assistant, AssistantRequest, Tool, DEFAULT_MODEL,
    },
    client::{Deleted, OpenAiClient, Order, DEFAULT_VERSION},
    error::Result,
    tool_log::ToolLog,
    tools::ToolRegistry,
    AssistantError, Credentials,
};

/// How long and how often to wait for a run to settle.
///
/// By default polling never gives up: a run that stays in a non-settling
/// status (including `failed` without an error payload, `cancelled` or
/// `expired`) is polled forever. Set `max_attempts` or `timeout` to bound it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_attempts: Option<u32>,
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: None,
            timeout: None,
        }
    }
}

impl PollOptions {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Builder, Debug, Clone)]
#[builder(pattern = "owned")]
#[builder(name = "SessionConfigBuilder")]
#[builder(setter(into))]
pub struct SessionConfig {
    #[builder(default)]
    pub credentials: Credentials,
    /// Assistant runs are created for, until one is created or modified.
    #[builder(default, setter(strip_option, into))]
    pub assistant_id: Option<String>,
    /// Model sent when creating or modifying an assistant.
    #[builder(default = "DEFAULT_MODEL.to_string()")]
    pub model: String,
    /// Value of the `OpenAI-Beta` protocol version header.
    #[builder(default = "DEFAULT_VERSION.to_string()")]
    pub version: String,
    #[builder(default)]
    pub poll: PollOptions,
    /// File tool invocations and submitted outputs are appended to.
    ///
    /// Unset by default, in which case no log is written.
    #[builder(default, setter(strip_option, into))]
    pub tool_log: Option<PathBuf>,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

impl From<SessionConfigBuilderError> for AssistantError {
    fn from(error: SessionConfigBuilderError) -> Self {
        AssistantError::Configuration(error.to_string())
    }
}

/// Where a run lifecycle call left the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run finished.
    Completed(String),
    /// The run stopped to wait for tool outputs.
    RequiresAction(String),
    /// Nothing was started: an earlier run of the thread still waits for
    /// tool outputs.
    PendingToolCalls(String),
}

impl RunOutcome {
    pub fn run_id(&self) -> &str {
        match self {
            RunOutcome::Completed(run_id)
            | RunOutcome::RequiresAction(run_id)
            | RunOutcome::PendingToolCalls(run_id) => run_id,
        }
    }

    /// Whether the caller owes tool outputs for [`RunOutcome::run_id`].
    pub fn requires_tool_outputs(&self) -> bool {
        !matches!(self, RunOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The message was added; carries its ID.
    Created(String),
    /// The message was not sent because the run carried here still waits for
    /// tool outputs.
    PendingToolCalls(String),
}

/// A client session against the Assistants API.
///
/// The session is `Send + Sync`; pending tool-call state is tracked per
/// thread, so one session can drive several threads concurrently.
#[derive(Debug)]
pub struct AssistantSession {
    client: OpenAiClient,
    model: String,
    poll: PollOptions,
    tools: ToolRegistry,
    tool_log: ToolLog,
    assistant_id: RwLock<Option<String>>,
    // thread ID -> ID of the run waiting for tool outputs
    pending: Mutex<HashMap<String, String>>,
}

impl AssistantSession {
    pub fn new(config: SessionConfig, tools: ToolRegistry) -> Result<Self> {
        let client = OpenAiClient::with_version(config.credentials, &config.version)?;

        Ok(Self {
            client,
            model: config.model,
            poll: config.poll,
            tools,
            tool_log: ToolLog::new(config.tool_log),
            assistant_id: RwLock::new(config.assistant_id),
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn client(&self) -> &OpenAiClient {
        &self.client
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn poll_options(&self) -> PollOptions {
        self.poll
    }

    pub fn assistant_id(&self) -> Option<String> {
        self.assistant_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_assistant_id(&self, assistant_id: Option<String>) {
        *self
            .assistant_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = assistant_id;
    }

    /// Whether the last observed run of `thread_id` waits for tool outputs.
    pub fn has_tool_calls(&self, thread_id: &str) -> bool {
        self.pending_lock().contains_key(thread_id)
    }

    /// The run of `thread_id` waiting for tool outputs, if any.
    pub fn tool_call_id(&self, thread_id: &str) -> Option<String> {
        self.pending_lock().get(thread_id).cloned()
    }

    /// Snapshot of every thread waiting for tool outputs, mapped to its run.
    pub fn pending_tool_calls(&self) -> HashMap<String, String> {
        self.pending_lock().clone()
    }

    fn pending_lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_pending(&self, thread_id: &str, run_id: &str) {
        self.pending_lock()
            .insert(thread_id.to_string(), run_id.to_string());
    }

    fn clear_pending(&self, thread_id: &str) {
        self.pending_lock().remove(thread_id);
    }

    fn assistant_request(
        &self,
        name: &str,
        instructions: &str,
        tools: Vec<Tool>,
    ) -> AssistantRequest {
        AssistantRequest {
            model: self.model.clone(),
            name: Some(name.to_string()),
            instructions: Some(instructions.to_string()),
            tools,
            ..Default::default()
        }
    }

    /// Creates an assistant and binds the session to it.
    pub async fn create_assistant(
        &self,
        name: &str,
        instructions: &str,
        tools: Vec<Tool>,
    ) -> Result<String> {
        let request = self.assistant_request(name, instructions, tools);
        let assistant = self.client.create_assistant(&request).await?;

        log::debug!("Created assistant {}", assistant.id);
        self.set_assistant_id(Some(assistant.id.clone()));
        Ok(assistant.id)
    }

    /// Replaces the name, instructions and tools of the bound assistant.
    pub async fn modify_assistant(
        &self,
        name: &str,
        instructions: &str,
        tools: Vec<Tool>,
    ) -> Result<String> {
        let assistant_id = self.assistant_id().ok_or_else(|| {
            AssistantError::precondition("provide an assistant_id or create an assistant first")
        })?;

        let request = self.assistant_request(name, instructions, tools);
        let assistant = self
            .client
            .update_assistant(&assistant_id, &request)
            .await?;

        self.set_assistant_id(Some(assistant.id.clone()));
        Ok(assistant.id)
    }

    pub async fn get_assistant(&self, assistant_id: &str) -> Result<Assistant> {
        self.client.get_assistant(assistant_id).await
    }

    /// Deletes an assistant, unbinding the session if it was the bound one.
    pub async fn delete_assistant(&self, assistant_id: &str) -> Result<Deleted> {
        let deleted = self.client.delete_assistant(assistant_id).await?;

        let mut bound = self
            .assistant_id
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if bound.as_deref() == Some(assistant_id) {
            *bound = None;
        }

        Ok(deleted)
    }

    pub async fn list_assistants(&self) -> Result<Vec<Assistant>> {
        self.client.list_assistants().await
    }

    /// Creates a thread seeded with one message and returns its ID.
    pub async fn create_thread(&self, content: &str, role: Option<Role>) -> Result<String> {
        let request = CreateThreadRequest {
            messages: vec![CreateMessageRequest::new(role.unwrap_or_default(), content)],
            metadata: None,
        };
        let thread = self.client.create_thread(&request).await?;

        Ok(thread.id)
    }

    pub async fn get_thread(&self, thread_id: &str) -> Result<Thread> {
        self.client.get_thread(thread_id).await
    }

    /// Deletes a thread and forgets its pending tool calls.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<String> {
        let deleted = self.client.delete_thread(thread_id).await?;

        self.clear_pending(thread_id);
        Ok(deleted.id)
    }

    /// Adds a message to a thread, unless the thread's latest run still waits
    /// for tool outputs.
    pub async fn add_message(
        &self,
        thread_id: &str,
        content: &str,
        role: Option<Role>,
    ) -> Result<MessageOutcome> {
        if let Some(run_id) = self.check_pending(thread_id).await? {
            return Ok(MessageOutcome::PendingToolCalls(run_id));
        }

        let request = CreateMessageRequest::new(role.unwrap_or_default(), content);
        let message = self.client.create_message(thread_id, &request).await?;

        Ok(MessageOutcome::Created(message.id))
    }

    pub async fn get_message(&self, thread_id: &str, message_id: &str) -> Result<Message> {
        self.client.get_message(thread_id, message_id).await
    }

    /// Every message of the thread, newest first.
    pub async fn list_thread_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        self.client.list_messages(thread_id, Order::Desc).await
    }

    /// Every message of the thread, oldest first.
    pub async fn transcript(&self, thread_id: &str) -> Result<Vec<Message>> {
        self.client.list_messages(thread_id, Order::Asc).await
    }

    /// The newest message of the thread, usually the assistant's last reply.
    pub async fn latest_message(&self, thread_id: &str) -> Result<Option<Message>> {
        self.client.latest_message(thread_id).await
    }

    pub async fn list_runs(&self, thread_id: &str) -> Result<Vec<Run>> {
        self.client.list_runs(thread_id).await
    }

    pub async fn latest_run(&self, thread_id: &str) -> Result<Option<Run>> {
        self.client.latest_run(thread_id).await
    }

    /// Records and returns the run blocking `thread_id`, or clears the
    /// thread's pending state when its latest run (if any) is not waiting
    /// for tool outputs.
    async fn check_pending(&self, thread_id: &str) -> Result<Option<String>> {
        match self.client.latest_run(thread_id).await? {
            Some(run) if run.status == Status::RequiresAction => {
                log::debug!("Thread {thread_id} is blocked by run {}", run.id);
                self.mark_pending(thread_id, &run.id);
                Ok(Some(run.id))
            }
            _ => {
                self.clear_pending(thread_id);
                Ok(None)
            }
        }
    }

    /// Runs the bound assistant on a thread and waits until the run
    /// completes or asks for tool outputs.
    ///
    /// No run is created while the thread's latest run waits for tool
    /// outputs; that run is returned as [`RunOutcome::PendingToolCalls`].
    pub async fn run_thread(&self, thread_id: &str) -> Result<RunOutcome> {
        if let Some(run_id) = self.check_pending(thread_id).await? {
            return Ok(RunOutcome::PendingToolCalls(run_id));
        }

        let assistant_id = self.assistant_id().ok_or_else(|| {
            AssistantError::precondition("provide an assistant_id or create an assistant first")
        })?;

        let run = self
            .client
            .create_run(thread_id, &CreateRunRequest::new(assistant_id))
            .await?;

        log::debug!("Started run {} on thread {thread_id}", run.id);
        self.poll_run(thread_id, &run.id).await
    }

    /// Executes the tool calls a run waits on with the session's handlers.
    pub async fn execute_tools(&self, thread_id: &str, run_id: &str) -> Result<Vec<ToolOutput>> {
        self.execute_tools_with(thread_id, run_id, &self.tools).await
    }

    /// Executes the tool calls a run waits on with `tools`.
    ///
    /// Outputs come back in the order of the run's tool calls. Any failure
    /// aborts the batch and leaves the thread's pending state untouched.
    pub async fn execute_tools_with(
        &self,
        thread_id: &str,
        run_id: &str,
        tools: &ToolRegistry,
    ) -> Result<Vec<ToolOutput>> {
        let run = self.client.get_run(thread_id, run_id).await?;
        let calls = run.tool_calls();

        let outputs = tools.dispatch(calls).await?;

        self.tool_log.record_calls(calls).await;
        self.clear_pending(thread_id);
        Ok(outputs)
    }

    /// Submits tool outputs and waits for the resumed run to settle again.
    pub async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<RunOutcome> {
        let request = SubmitToolOutputsRequest {
            tool_outputs: outputs,
        };
        let run = self
            .client
            .submit_tool_outputs(thread_id, run_id, &request)
            .await?;

        self.tool_log.record_outputs(&request.tool_outputs).await;

        self.poll_run(thread_id, &run.id).await
    }

    /// Runs the thread until it completes, answering every tool call along
    /// the way, and returns the ID of the completed run.
    ///
    /// A thread blocked by a pending run has that run resumed and finished
    /// instead of a new one being started.
    pub async fn run_to_completion(&self, thread_id: &str) -> Result<String> {
        let mut outcome = self.run_thread(thread_id).await?;

        loop {
            match outcome {
                RunOutcome::Completed(run_id) => return Ok(run_id),
                RunOutcome::RequiresAction(run_id) | RunOutcome::PendingToolCalls(run_id) => {
                    let outputs = self.execute_tools(thread_id, &run_id).await?;
                    outcome = self.submit_tool_outputs(thread_id, &run_id, outputs).await?;
                }
            }
        }
    }

    async fn poll_run(&self, thread_id: &str, run_id: &str) -> Result<RunOutcome> {
        let run = match self.poll.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.wait_for_run(thread_id, run_id))
                .await
                .map_err(|_| AssistantError::PollTimeout {
                    run_id: run_id.to_string(),
                    timeout,
                })??,
            None => self.wait_for_run(thread_id, run_id).await?,
        };

        if run.status == Status::RequiresAction {
            self.mark_pending(thread_id, &run.id);
            Ok(RunOutcome::RequiresAction(run.id))
        } else {
            self.clear_pending(thread_id);
            Ok(RunOutcome::Completed(run.id))
        }
    }

    /// Fetches the run every interval until its status settles polling.
    async fn wait_for_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let mut attempts: u32 = 0;
        let mut last_status = None;

        loop {
            if self.poll.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(AssistantError::PollAttemptsExhausted {
                    run_id: run_id.to_string(),
                    attempts,
                });
            }

            tokio::time::sleep(self.poll.interval).await;
            attempts += 1;

            let run = self.client.get_run(thread_id, run_id).await?;

            if last_status != Some(run.status) {
                log::debug!("Run {run_id} is {:?}", run.status);
                if run.status.is_terminal() && !run.status.settles_polling() {
                    log::warn!("Run {run_id} ended as {:?}; still polling", run.status);
                }
                last_status = Some(run.status);
            }

            if run.status.settles_polling() {
                return Ok(run);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = SessionConfig::builder().build().unwrap();

        assert_eq!(config.model, "gpt-3.5-turbo-1106");
        assert_eq!(config.version, "assistants=v2");
        assert_eq!(config.poll, PollOptions::default());
        assert_eq!(config.poll.interval, Duration::from_secs(5));
        assert!(config.assistant_id.is_none());
        assert!(config.tool_log.is_none());
    }

    #[test]
    fn config_setters() {
        let config = SessionConfig::builder()
            .credentials(Credentials::new("sk-test", "http://localhost:1234"))
            .assistant_id("asst_1")
            .model("gpt-4o")
            .poll(PollOptions::default().with_max_attempts(3))
            .tool_log("tool_calls_log")
            .build()
            .unwrap();

        assert_eq!(config.assistant_id.as_deref(), Some("asst_1"));
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.poll.max_attempts, Some(3));
        assert_eq!(config.tool_log, Some(PathBuf::from("tool_calls_log")));
    }

    #[test]
    fn pending_state_is_per_thread() {
        let session = AssistantSession::new(
            SessionConfig::builder().build().unwrap(),
            ToolRegistry::new(),
        )
        .unwrap();

        session.mark_pending("thread_a", "run_1");

        assert!(session.has_tool_calls("thread_a"));
        assert_eq!(session.tool_call_id("thread_a").as_deref(), Some("run_1"));
        assert!(!session.has_tool_calls("thread_b"));
        assert_eq!(session.tool_call_id("thread_b"), None);

        session.clear_pending("thread_a");
        assert!(session.pending_tool_calls().is_empty());
    }

    #[test]
    fn outcome_accessors() {
        assert_eq!(RunOutcome::Completed("run_1".into()).run_id(), "run_1");
        assert!(!RunOutcome::Completed("run_1".into()).requires_tool_outputs());
        assert!(RunOutcome::RequiresAction("run_2".into()).requires_tool_outputs());
        assert!(RunOutcome::PendingToolCalls("run_3".into()).requires_tool_outputs());
    }

    #[test]
    fn session_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AssistantSession>();
    }
}
