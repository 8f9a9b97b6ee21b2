use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{messages::CreateMessageRequest, require_id};
use crate::{
    client::{Deleted, OpenAiClient},
    error::Result,
};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Thread {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created_at: u64,
    /// Set of 16 key-value pairs that can be attached to an object. This can be useful for storing additional information about the object in a structured format. Keys can be a maximum of 64 characters long and values can be a maximum of 512 characters long.
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct CreateThreadRequest {
    pub messages: Vec<CreateMessageRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl OpenAiClient {
    pub async fn create_thread(&self, request: &CreateThreadRequest) -> Result<Thread> {
        let thread: Thread = self.post("threads", request).await?;
        require_id(thread.id.clone(), "create a thread")?;
        Ok(thread)
    }

    pub async fn get_thread(&self, thread_id: &str) -> Result<Thread> {
        let thread: Thread = self.get(format!("threads/{thread_id}")).await?;
        require_id(thread.id.clone(), "retrieve the thread")?;
        Ok(thread)
    }

    pub async fn delete_thread(&self, thread_id: &str) -> Result<Deleted> {
        self.delete(format!("threads/{thread_id}")).await
    }
}
