use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::Message;

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadResponse {
    pub partner: String,
    pub messages: Vec<Message>,
}

/// Unread message counts keyed by sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCounts {
    pub counts: BTreeMap<String, usize>,
    pub total: usize,
}

impl UnreadCounts {
    pub fn from_counts(counts: BTreeMap<String, usize>) -> Self {
        let total = counts.values().sum();
        Self { counts, total }
    }

    pub fn get(&self, sender: &str) -> usize {
        self.counts.get(sender).copied().unwrap_or(0)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub marked: usize,
}
