use serde::{Deserialize, Serialize};

use crate::models::ReviewKind;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub kind: ReviewKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RejectRequest {
    pub kind: ReviewKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
