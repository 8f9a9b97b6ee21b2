use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::require_id;
use crate::{
    client::{ListQuery, OpenAiClient, Order},
    error::Result,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created_at: u64,
    /// The thread ID that this message belongs to.
    #[serde(default)]
    pub thread_id: String,
    /// The entity that produced the message. One of user or assistant
    #[serde(default)]
    pub role: Role,
    /// The content of the message.
    #[serde(default)]
    pub content: Vec<Content>,
    /// The assistant that produced the message.
    pub assistant_id: Option<String>,
    /// The ID of the run associated with the creation of this message. Value is null when messages are created manually using the create message or create thread endpoints.
    pub run_id: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl Message {
    /// All text parts of the message, joined by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|content| match content {
                Content::Text { text } => Some(text.value.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Content {
    Text { text: Text },
    ImageFile { image_file: ImageFile },
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Text {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageFile {
    pub file_id: String,
}

#[derive(Serialize, Builder, Debug, Clone, PartialEq)]
#[builder(pattern = "owned")]
#[builder(name = "CreateMessageBuilder")]
#[builder(setter(strip_option, into))]
pub struct CreateMessageRequest {
    #[builder(default)]
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl CreateMessageRequest {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: None,
        }
    }
}

impl OpenAiClient {
    pub async fn create_message(
        &self,
        thread_id: &str,
        request: &CreateMessageRequest,
    ) -> Result<Message> {
        let message: Message = self
            .post(format!("threads/{thread_id}/messages"), request)
            .await?;
        require_id(message.id.clone(), "create a message")?;
        Ok(message)
    }

    pub async fn get_message(&self, thread_id: &str, message_id: &str) -> Result<Message> {
        let message: Message = self
            .get(format!("threads/{thread_id}/messages/{message_id}"))
            .await?;
        require_id(message.id.clone(), "retrieve the message")?;
        Ok(message)
    }

    /// Lists every message of a thread in the given creation order.
    pub async fn list_messages(&self, thread_id: &str, order: Order) -> Result<Vec<Message>> {
        self.list(&format!("threads/{thread_id}/messages"), order)
            .await
    }

    /// The most recently created message of a thread, if it has any.
    pub async fn latest_message(&self, thread_id: &str) -> Result<Option<Message>> {
        let query = ListQuery {
            order: Order::Desc,
            limit: Some(1),
            after: None,
        };
        let page = self
            .list_page::<Message>(&format!("threads/{thread_id}/messages"), &query)
            .await?;

        Ok(page.data.into_iter().next())
    }
}
