use serde::{Deserialize, Serialize};

use crate::models::{ConnectionRequest, ConnectionStatus, RequestBook};

#[derive(Debug, Serialize, Deserialize)]
pub struct SendConnectionRequest {
    pub to: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateConnectionRequest {
    pub status: ConnectionStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectionsResponse {
    pub requests: Vec<ConnectionRequest>,
    #[serde(flatten)]
    pub book: RequestBook,
    pub accepted_count: usize,
}
