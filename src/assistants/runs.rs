use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{require_id, Tool};
use crate::{
    client::{ListQuery, OpenAiClient, Order},
    error::Result,
    OpenAiError,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Run {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created_at: u64,
    /// The ID of the assistant used for this run.
    #[serde(default)]
    pub assistant_id: String,
    /// The ID of the thread associated with this run.
    #[serde(default)]
    pub thread_id: String,
    /// The status of the run.
    pub status: Status,
    /// Details on the action required to continue the run. Will be null if no action is required.
    pub required_action: Option<RequiredAction>,
    /// The last error that occurred during this run.
    pub last_error: Option<OpenAiError>,
    pub expires_at: Option<u64>,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub cancelled_at: Option<u64>,
    pub failed_at: Option<u64>,
    pub model: Option<String>,
    pub instructions: Option<String>,
    #[serde(default)]
    pub tools: Vec<Tool>,
    pub metadata: Option<HashMap<String, String>>,
}

impl Run {
    /// The tool calls the run is waiting on; empty unless it requires action.
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.required_action
            .as_ref()
            .and_then(|action| action.submit_tool_outputs.as_ref())
            .map(|outputs| outputs.tool_calls.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl Status {
    /// Whether a poller should stop waiting on a run in this status.
    ///
    /// Only `completed` and `requires_action` qualify. Other end states keep
    /// the poller waiting until its attempt or time bound runs out.
    pub fn settles_polling(&self) -> bool {
        matches!(self, Status::Completed | Status::RequiresAction)
    }

    /// Whether the run can no longer change status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Cancelled
                | Status::Failed
                | Status::Completed
                | Status::Incomplete
                | Status::Expired
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RequiredAction {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub submit_tool_outputs: Option<SubmitToolOutputsAction>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SubmitToolOutputsAction {
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Eq, PartialEq)]
pub struct ToolCall {
    /// The ID of the tool call, echoed back with its output.
    pub id: String,
    /// The type of the tool. Currently, only `function` is supported.
    #[serde(rename = "type", default = "function_literal")]
    pub kind: String,
    /// The function that the model called.
    pub function: ToolCallFunction,
}

fn function_literal() -> String {
    "function".to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, Eq, PartialEq)]
pub struct ToolCallFunction {
    /// The name of the function to call.
    pub name: String,
    /// The arguments to call the function with, as generated by the model in
    /// JSON format.
    /// Note that the model does not always generate valid JSON, and may
    /// hallucinate parameters not defined by your function schema.
    #[serde(default)]
    pub arguments: String,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct CreateRunRequest {
    /// ID of the assistant to use.
    pub assistant_id: String,
    /// Overrides the assistant's model for this run only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,
}

impl CreateRunRequest {
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SubmitToolOutputsRequest {
    pub tool_outputs: Vec<ToolOutput>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

impl OpenAiClient {
    pub async fn create_run(&self, thread_id: &str, request: &CreateRunRequest) -> Result<Run> {
        let run: Run = self
            .post(format!("threads/{thread_id}/runs"), request)
            .await?;
        require_id(run.id.clone(), "create a run")?;
        Ok(run)
    }

    pub async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let run: Run = self
            .get(format!("threads/{thread_id}/runs/{run_id}"))
            .await?;
        require_id(run.id.clone(), "retrieve the run")?;
        Ok(run)
    }

    /// Lists every run of a thread, newest first.
    pub async fn list_runs(&self, thread_id: &str) -> Result<Vec<Run>> {
        self.list(&format!("threads/{thread_id}/runs"), Order::Desc)
            .await
    }

    /// The most recently created run of a thread, if it has any.
    pub async fn latest_run(&self, thread_id: &str) -> Result<Option<Run>> {
        let query = ListQuery {
            order: Order::Desc,
            limit: Some(1),
            after: None,
        };
        let page = self
            .list_page::<Run>(&format!("threads/{thread_id}/runs"), &query)
            .await?;

        Ok(page.data.into_iter().next())
    }

    pub async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        request: &SubmitToolOutputsRequest,
    ) -> Result<Run> {
        let run: Run = self
            .post(
                format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                request,
            )
            .await?;
        require_id(run.id.clone(), "submit tool outputs")?;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_completed_and_requires_action_settle() {
        let settling: Vec<Status> = [
            Status::Queued,
            Status::InProgress,
            Status::RequiresAction,
            Status::Cancelling,
            Status::Cancelled,
            Status::Failed,
            Status::Completed,
            Status::Incomplete,
            Status::Expired,
            Status::Unknown,
        ]
        .into_iter()
        .filter(Status::settles_polling)
        .collect();

        assert_eq!(settling, vec![Status::RequiresAction, Status::Completed]);
    }

    #[test]
    fn unknown_status_is_tolerated() {
        let status: Status = serde_json::from_value(json!("paused_for_review")).unwrap();
        assert_eq!(status, Status::Unknown);
    }

    #[test]
    fn tool_calls_are_read_from_required_action() {
        let run: Run = serde_json::from_value(json!({
            "id": "run_1",
            "thread_id": "thread_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [
                        {
                            "id": "call_1",
                            "type": "function",
                            "function": { "name": "get_weather", "arguments": "{\"city\":\"Paris\"}" }
                        }
                    ]
                }
            },
            "last_error": null
        }))
        .unwrap();

        let calls = run.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.name, "get_weather");
    }

    #[test]
    fn run_without_action_has_no_tool_calls() {
        let run: Run =
            serde_json::from_value(json!({ "id": "run_2", "status": "completed" })).unwrap();

        assert!(run.tool_calls().is_empty());
    }
}
