use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Rejected,
}

impl ConnectionStatus {
    /// Accepted and rejected requests never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn can_transition_to(&self, next: ConnectionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted) | (Self::Pending, Self::Rejected)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown connection status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for ConnectionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

/// A directed request from one user to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    pub id: Uuid,
    pub from: String,
    pub to: String,
    pub status: ConnectionStatus,
    #[serde(default, alias = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl ConnectionRequest {
    pub fn involves(&self, username: &str) -> bool {
        self.from == username || self.to == username
    }

    /// The other endpoint, if `username` is one of the two.
    pub fn partner_of(&self, username: &str) -> Option<&str> {
        if self.from == username {
            Some(&self.to)
        } else if self.to == username {
            Some(&self.from)
        } else {
            None
        }
    }

    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }
}

/// How one user currently relates to another, seen from the viewer's side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStatus {
    #[default]
    None,
    RequestSent,
    RequestReceived,
    Connected,
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub request_id: Uuid,
    pub partner: String,
    pub since: DateTime<Utc>,
}

/// A user's requests split the way the messages screen shows them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestBook {
    pub incoming: Vec<ConnectionRequest>,
    pub outgoing: Vec<ConnectionRequest>,
    pub matches: Vec<Match>,
}

impl RequestBook {
    pub fn partition(username: &str, requests: &[ConnectionRequest]) -> Self {
        let mut book = Self::default();
        for request in requests {
            match request.status {
                ConnectionStatus::Pending if request.to == username => {
                    book.incoming.push(request.clone())
                }
                ConnectionStatus::Pending if request.from == username => {
                    book.outgoing.push(request.clone())
                }
                ConnectionStatus::Accepted => {
                    if let Some(partner) = request.partner_of(username) {
                        book.matches.push(Match {
                            request_id: request.id,
                            partner: partner.to_string(),
                            since: request.created_at,
                        });
                    }
                }
                _ => {}
            }
        }
        book
    }
}
