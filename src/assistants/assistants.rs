use std::collections::HashMap;

use derive_builder::Builder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::require_id;
use crate::{
    client::{Deleted, OpenAiClient, Order},
    error::Result,
};

/// Model every assistant is created with unless the session says otherwise.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo-1106";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Assistant {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created_at: u64,
    /// The name of the assistant. The maximum length is 256 characters.
    pub name: Option<String>,
    pub description: Option<String>,
    /// ID of the model the assistant runs on.
    #[serde(default)]
    pub model: String,
    /// The system instructions that the assistant uses. The maximum length is 256,000 characters.
    pub instructions: Option<String>,
    #[serde(default)]
    pub tools: Vec<Tool>,
    /// Set of 16 key-value pairs that can be attached to an object.
    pub metadata: Option<HashMap<String, String>>,
}

/// A tool declaration attached to an assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    CodeInterpreter,
    FileSearch,
    Function { function: FunctionDefinition },
}

impl Tool {
    pub fn function(definition: FunctionDefinition) -> Self {
        Tool::Function {
            function: definition,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FunctionDefinition {
    /// The name of the function to be called. Must be a-z, A-Z, 0-9, or contain underscores and dashes, with a maximum length of 64.
    pub name: String,
    /// A description of what the function does, used by the model to choose when and how to call the function.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The parameters the function accepts, described as a JSON Schema object.
    /// Omitting `parameters` defines a function with an empty parameter list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl FunctionDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters: Some(parameters),
        }
    }

    /// Declares a function whose parameters are the JSON Schema of `T`.
    ///
    /// Pair it with a handler registered through
    /// [`ToolRegistry::register_fn`](crate::ToolRegistry::register_fn) taking
    /// the same `T`, so the declared and decoded shapes cannot drift apart.
    pub fn from_schema<T: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        let schema = schemars::schema_for!(T);

        Self {
            name: name.into(),
            description: Some(description.into()),
            parameters: serde_json::to_value(schema).ok(),
        }
    }
}

#[derive(Serialize, Builder, Debug, Clone, Default, PartialEq)]
#[builder(pattern = "owned")]
#[builder(name = "AssistantRequestBuilder")]
#[builder(setter(strip_option, into))]
pub struct AssistantRequest {
    /// ID of the model to use.
    pub model: String,
    /// The name of the assistant. The maximum length is 256 characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub name: Option<String>,
    /// The description of the assistant. The maximum length is 512 characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub description: Option<String>,
    /// The system instructions that the assistant uses.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub instructions: Option<String>,
    /// A set of tools that the assistant can use.
    #[builder(default)]
    pub tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl AssistantRequest {
    pub fn builder(model: impl Into<String>) -> AssistantRequestBuilder {
        AssistantRequestBuilder::default().model(model)
    }
}

impl OpenAiClient {
    pub async fn create_assistant(&self, request: &AssistantRequest) -> Result<Assistant> {
        let assistant: Assistant = self.post("assistants", request).await?;
        require_id(assistant.id.clone(), "create an assistant")?;
        Ok(assistant)
    }

    pub async fn get_assistant(&self, assistant_id: &str) -> Result<Assistant> {
        let assistant: Assistant = self.get(format!("assistants/{assistant_id}")).await?;
        require_id(assistant.id.clone(), "retrieve the assistant")?;
        Ok(assistant)
    }

    pub async fn update_assistant(
        &self,
        assistant_id: &str,
        request: &AssistantRequest,
    ) -> Result<Assistant> {
        let assistant: Assistant = self
            .post(format!("assistants/{assistant_id}"), request)
            .await?;
        require_id(assistant.id.clone(), "modify the assistant")?;
        Ok(assistant)
    }

    pub async fn delete_assistant(&self, assistant_id: &str) -> Result<Deleted> {
        self.delete(format!("assistants/{assistant_id}")).await
    }

    pub async fn list_assistants(&self) -> Result<Vec<Assistant>> {
        self.list("assistants", Order::Desc).await
    }
}
