use serde::{Deserialize, Serialize};
use serde_valid::Validate;

/// Body of agent and end-user messages.
#[derive(Serialize, Deserialize, Debug, Validate)]
pub struct MessageForm {
    #[validate(min_length = 1)]
    #[validate(max_length = 4000)]
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Default, Validate)]
pub struct HandoffForm {
    #[validate(max_length = 500)]
    pub reason: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityForm {
    pub is_available: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PollQuery {
    pub last_message_id: Option<String>,
}
