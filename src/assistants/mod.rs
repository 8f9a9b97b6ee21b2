pub mod assistants;
pub use assistants::*;

pub mod messages;
pub mod runs;
pub mod threads;

use crate::{error::Result, AssistantError};

/// Fails unless the API handed back a non-empty identifier.
pub(crate) fn require_id(id: String, what: &str) -> Result<String> {
    if id.is_empty() {
        Err(AssistantError::malformed(format!(
            "unable to {what}: response carries no `id`"
        )))
    } else {
        Ok(id)
    }
}
