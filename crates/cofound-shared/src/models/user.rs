use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::moderation::{ReviewKind, ReviewState};

/// Number of profile fields counted by [`User::completion`].
pub const COMPLETION_FIELDS: usize = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "Founder")]
    Founder,
    #[serde(rename = "Co-Founder")]
    CoFounder,
    #[serde(rename = "admin", alias = "Admin")]
    Admin,
    #[default]
    #[serde(rename = "user")]
    User,
}

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Roles a person may pick for themselves at signup.
    pub fn is_self_assignable(&self) -> bool {
        matches!(self, Self::Founder | Self::CoFounder | Self::User)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Founder => "Founder",
            Self::CoFounder => "Co-Founder",
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "founder" => Ok(Self::Founder),
            "co-founder" | "cofounder" => Ok(Self::CoFounder),
            "admin" => Ok(Self::Admin),
            "user" | "" => Ok(Self::User),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// One user record, keyed by the identity that owns it.
///
/// Every optional field defaults when missing from the stored document, so
/// records written by older versions (or by hand) decode without error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub certificate_approved: bool,
    #[serde(default)]
    pub profile_approved: bool,
    #[serde(default)]
    pub certificate_rejected: bool,
    #[serde(default)]
    pub profile_rejected: bool,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
}

fn filled(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl User {
    /// A freshly signed-up user: empty profile, nothing verified.
    pub fn new(id: Uuid, username: &str, email: &str, role: Role, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            username: username.to_string(),
            email: email.to_string(),
            role,
            full_name: None,
            skills: None,
            domain: None,
            experience: None,
            availability: None,
            about: None,
            location: None,
            whatsapp: None,
            linkedin: None,
            github: None,
            profile_pic_url: None,
            certificate_url: None,
            verified: false,
            certificate_approved: false,
            profile_approved: false,
            certificate_rejected: false,
            profile_rejected: false,
            created_at,
        }
    }

    pub fn skills(&self) -> &str {
        self.skills.as_deref().unwrap_or("")
    }

    pub fn domain(&self) -> &str {
        self.domain.as_deref().unwrap_or("")
    }

    pub fn experience(&self) -> &str {
        self.experience.as_deref().unwrap_or("")
    }

    pub fn availability(&self) -> &str {
        self.availability.as_deref().unwrap_or("")
    }

    pub fn completion(&self) -> ProfileCompletion {
        let fields = [
            &self.skills,
            &self.domain,
            &self.experience,
            &self.availability,
            &self.full_name,
            &self.location,
            &self.about,
        ];
        let filled = fields.iter().filter(|f| filled(f)).count();
        ProfileCompletion::new(filled, COMPLETION_FIELDS)
    }

    pub fn review_state(&self, kind: ReviewKind) -> ReviewState {
        let (approved, rejected) = match kind {
            ReviewKind::Certificate => (self.certificate_approved, self.certificate_rejected),
            ReviewKind::Profile => (self.profile_approved, self.profile_rejected),
        };
        match (approved, rejected) {
            (true, _) => ReviewState::Approved,
            (false, true) => ReviewState::Rejected,
            (false, false) => ReviewState::Pending,
        }
    }

    pub fn contacts(&self) -> ContactLinks {
        ContactLinks {
            email: self.email.clone(),
            whatsapp: self.whatsapp.clone(),
            linkedin: self.linkedin.clone(),
            github: self.github.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileCompletion {
    pub filled: usize,
    pub total: usize,
    pub percent: u8,
}

impl ProfileCompletion {
    pub fn new(filled: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100
        } else {
            (filled.min(total) * 100 / total) as u8
        };
        Self {
            filled,
            total,
            percent,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.filled >= self.total
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactLinks {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
}

/// What other users get to see of a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub username: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experience: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub about: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_pic_url: Option<String>,
    /// Only filled in for accepted matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contacts: Option<ContactLinks>,
}

impl From<&User> for PublicProfile {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            role: user.role,
            full_name: user.full_name.clone(),
            skills: user.skills.clone(),
            domain: user.domain.clone(),
            experience: user.experience.clone(),
            availability: user.availability.clone(),
            location: user.location.clone(),
            about: user.about.clone(),
            profile_pic_url: user.profile_pic_url.clone(),
            contacts: None,
        }
    }
}
