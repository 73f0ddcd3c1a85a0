use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The two things an admin can review on a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewKind {
    Certificate,
    Profile,
}

impl ReviewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Certificate => "certificate",
            Self::Profile => "profile",
        }
    }

    /// Document field names holding the approved/rejected flags.
    pub fn flag_fields(&self) -> (&'static str, &'static str) {
        match self {
            Self::Certificate => ("certificateApproved", "certificateRejected"),
            Self::Profile => ("profileApproved", "profileRejected"),
        }
    }
}

impl fmt::Display for ReviewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown review kind: {0}")]
pub struct ParseReviewKindError(pub String);

impl FromStr for ReviewKind {
    type Err = ParseReviewKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "certificate" => Ok(Self::Certificate),
            "profile" => Ok(Self::Profile),
            _ => Err(ParseReviewKindError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingReview {
    pub username: String,
    pub kind: ReviewKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_users: usize,
    pub verified_users: usize,
    pub certificates_approved: usize,
    pub certificates_pending: usize,
    pub certificates_rejected: usize,
    pub profiles_approved: usize,
    pub connections_pending: usize,
    pub connections_accepted: usize,
    pub connections_rejected: usize,
    pub total_messages: usize,
}
